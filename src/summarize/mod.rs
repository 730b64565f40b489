// src/summarize/mod.rs — Summarization stage

pub mod runner;
pub mod schema;
