//! Pure text transforms: similarity scoring, sanitization, paragraph
//! dedup, and paragraph-aware merging. None of these touch I/O.

pub mod dedup;
pub mod merge;
pub mod sanitize;
pub mod similarity;
