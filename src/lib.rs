//! Book Assist: book-discovery assistant core.

pub mod api;
pub mod config;
pub mod error;
pub mod intent;
pub mod llm;
pub mod prompts;
pub mod retrieval;
pub mod safety;
pub mod search;
pub mod workflow;
