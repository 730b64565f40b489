// src/judge/mod.rs — Rubric-gated LLM-as-judge subsystem

pub mod normalize;
pub mod rubric;
pub mod runner;
