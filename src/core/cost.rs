// src/core/cost.rs — Cost computation from usage and per-million-token pricing

use serde::{Deserialize, Serialize};

use crate::provider::Usage;

/// Per-million-token pricing for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

impl Pricing {
    pub fn new(input_per_1m: f64, output_per_1m: f64) -> Self {
        Self {
            input_per_1m,
            output_per_1m,
        }
    }
}

/// Cost in USD for one call. Estimated usage yields an estimated cost; the
/// audit record carries the `estimated` flag alongside.
pub fn compute_cost(usage: &Usage, pricing: &Pricing) -> f64 {
    let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * pricing.input_per_1m;
    let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * pricing.output_per_1m;
    input_cost + output_cost
}
