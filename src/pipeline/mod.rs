//! Operation pipeline: compose → invoke → parse, driven by the orchestrator.

pub mod composer;
pub mod insights;
pub mod orchestrator;
pub mod parser;
pub mod types;

pub use composer::Composer;
pub use orchestrator::Orchestrator;
pub use parser::ResponseParser;
pub use types::*;
