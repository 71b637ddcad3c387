//! novelforge: an orchestration engine for incremental long-form text
//! generation against an OpenAI-compatible endpoint.
//!
//! The library drives many concurrent generation jobs, each accumulating a
//! novel chunk by chunk: prompts assembled from a durable setup record and
//! a trailing context window, responses sanitized and checked for
//! repetition before merging, progress checkpointed to disk after every
//! step, and the whole batch pausable, resumable, and stoppable through
//! shared control signals.

pub mod checkpoint;
pub mod config;
pub mod control;
pub mod error;
pub mod job;
pub mod llm;
pub mod pool;
pub mod prompt;
pub mod setup;
pub mod summarize;
pub mod text;
pub mod util;

pub use error::Error;
