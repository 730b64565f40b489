// src/judge/rubric.rs — Rubric loading and gate evaluation

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::infra::errors::PipelineError;

/// A named axis of quality carrying a weight and a minimum threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub weight: f64,
    pub min_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gates {
    pub avg_threshold: f64,
    pub no_critical_failures: bool,
}

/// Dimension weights/thresholds and gate rules. Loaded once from a
/// configuration artifact; read-only for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    pub dimensions: Vec<Dimension>,
    pub gates: Gates,
}

impl Rubric {
    /// Missing `dimensions`/`gates` keys are a fatal configuration error at
    /// load time, not a per-call error.
    pub fn load(config_path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(config_path)?;
        serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", config_path.display())))
    }

    pub fn dimension_names(&self) -> Vec<String> {
        self.dimensions.iter().map(|d| d.name.clone()).collect()
    }

    /// Gate passes iff the weighted average clears `avg_threshold`, every
    /// dimension clears its own `min_threshold`, and (when
    /// `no_critical_failures` is set) no hallucination flags are present.
    /// Missing dimensions score 0, penalizing incompleteness. No partial
    /// credit.
    pub fn check_gates(&self, scores: &BTreeMap<String, f64>, hallucination_flags: &[String]) -> bool {
        let total_weight: f64 = self.dimensions.iter().map(|d| d.weight).sum();
        let weighted_sum: f64 = self
            .dimensions
            .iter()
            .map(|d| scores.get(&d.name).copied().unwrap_or(0.0) * d.weight)
            .sum();
        let avg_score = if total_weight > 0.0 {
            weighted_sum / total_weight
        } else {
            0.0
        };

        if avg_score < self.gates.avg_threshold {
            return false;
        }

        for dim in &self.dimensions {
            if scores.get(&dim.name).copied().unwrap_or(0.0) < dim.min_threshold {
                return false;
            }
        }

        if self.gates.no_critical_failures && !hallucination_flags.is_empty() {
            return false;
        }

        true
    }
}
