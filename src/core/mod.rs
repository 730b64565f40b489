// src/core/mod.rs

pub mod cost;
pub mod pool;
pub mod types;
