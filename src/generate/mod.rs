// src/generate/mod.rs — Synthetic transcript generation stage

pub mod runner;
