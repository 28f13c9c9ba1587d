pub mod module;
pub mod program;

pub use module::Context as ModuleContext;
pub use program::Context as ProgramContext;
