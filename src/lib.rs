// src/lib.rs — callgrade library root

pub mod cli;
pub mod core;
pub mod generate;
pub mod infra;
pub mod judge;
pub mod provider;
pub mod report;
pub mod summarize;
