pub mod constants;
pub mod module;

pub use module::{ModuleCommand, ModuleRecord, StartMode};
