//! Inbox Brain: prompt-driven email triage.
//!
//! Emails go through a fixed pipeline: the current prompt template for an
//! operation is filled from the email, sent to a language model, and the
//! raw answer is parsed into a typed result. Draft replies are only ever
//! held for review.

pub mod api;
pub mod config;
pub mod drafts;
pub mod error;
pub mod inbox;
pub mod llm;
pub mod pipeline;
pub mod results;
pub mod templates;
