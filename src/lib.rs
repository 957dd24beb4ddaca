//! aichat library
//!
//! Core library for the aichat server: a chat API over locally hosted models,
//! with optional web research and document context.

pub mod documents;
pub mod inference;
pub mod prompts;
pub mod research;
pub mod server;
pub mod storage;
pub mod types;
