//! Human-in-the-loop draft review.

pub mod gate;
pub mod model;

pub use gate::DraftGate;
pub use model::{DraftStatus, PendingDraft};
