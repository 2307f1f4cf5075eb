//! Position input for the proximity monitor.
//!
//! Reads fixes from a line-oriented log and keeps the latest accepted one.

pub mod cache;
pub mod feed;
pub mod parser;
pub mod tailer;
