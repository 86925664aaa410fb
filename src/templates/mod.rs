//! User-editable prompt templates, one per operation kind.

pub mod model;
pub mod store;

pub use model::{OperationKind, PromptTemplate, Segment, default_template_text};
pub use store::TemplateStore;
