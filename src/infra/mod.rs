// src/infra/mod.rs

pub mod audit;
pub mod config;
pub mod errors;
pub mod logger;
pub mod prompts;
pub mod store;
