// src/report/aggregate.rs — Aggregate evaluations and audit records into a
// markdown report

use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::core::types::Evaluation;
use crate::infra::audit::AuditRecord;
use crate::infra::errors::PipelineError;
use crate::infra::store;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_tokens: u64,
    pub estimated_count: u64,
}

pub fn dimension_stats(evaluations: &[Evaluation]) -> BTreeMap<String, DimStats> {
    let mut by_dim: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for eval in evaluations {
        for (dim, score) in &eval.scores {
            by_dim.entry(dim.clone()).or_default().push(*score);
        }
    }
    by_dim
        .into_iter()
        .map(|(dim, scores)| {
            let avg = scores.iter().sum::<f64>() / scores.len() as f64;
            let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
            let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (dim, DimStats { avg, min, max })
        })
        .collect()
}

/// Count, among failing evaluations only, how often each dimension scored
/// below 4.0.
pub fn failure_modes(evaluations: &[Evaluation]) -> Vec<(String, u64)> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for eval in evaluations.iter().filter(|e| !e.overall_pass) {
        for (dim, score) in &eval.scores {
            if *score < 4.0 {
                *counts.entry(dim.clone()).or_insert(0) += 1;
            }
        }
    }
    let mut modes: Vec<_> = counts.into_iter().collect();
    // Descending by count; the BTreeMap already gave a stable name order
    // for ties.
    modes.sort_by(|a, b| b.1.cmp(&a.1));
    modes
}

/// A missing audit file is not an error; the run may have skipped audited
/// phases entirely.
pub fn cost_summary(calls_file: &Path) -> Result<CostSummary, PipelineError> {
    if !calls_file.exists() {
        return Ok(CostSummary::default());
    }
    let records: Vec<AuditRecord> = store::read_jsonl(calls_file)?;
    let mut summary = CostSummary::default();
    for record in records {
        if let Some(cost) = record.cost_usd {
            summary.total_cost += cost;
        }
        if let Some(usage) = &record.usage {
            summary.total_tokens += u64::from(usage.total_tokens);
        }
        if record.estimated {
            summary.estimated_count += 1;
        }
    }
    Ok(summary)
}

/// Write the markdown report: pass rate, per-dimension stats, top failure
/// modes, and a cost summary sourced from the audit trail.
pub fn generate_report(
    evaluations: &[Evaluation],
    calls_file: &Path,
    output_file: &Path,
) -> Result<(), PipelineError> {
    let total = evaluations.len();
    let passed = evaluations.iter().filter(|e| e.overall_pass).count();
    let pass_rate = if total > 0 {
        passed as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let stats = dimension_stats(evaluations);
    let modes = failure_modes(evaluations);
    let costs = cost_summary(calls_file)?;

    if let Some(parent) = output_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(output_file)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "# Evaluation Report\n")?;
    writeln!(out, "**Pass Rate:** {passed}/{total} ({pass_rate:.1}%)\n")?;

    writeln!(out, "## Dimension Statistics\n")?;
    for (dim, s) in &stats {
        writeln!(
            out,
            "- **{dim}:** avg={:.2}, min={}, max={}",
            s.avg, s.min, s.max
        )?;
    }

    writeln!(out, "\n## Top Failure Modes\n")?;
    if modes.is_empty() {
        writeln!(out, "No failures detected.")?;
    } else {
        for (dim, count) in &modes {
            writeln!(out, "- **{dim}:** {count} failures")?;
        }
    }

    writeln!(out, "\n## Cost Summary\n")?;
    writeln!(out, "- **Total Cost:** ${:.4}", costs.total_cost)?;
    writeln!(out, "- **Total Tokens:** {}", costs.total_tokens)?;
    if costs.estimated_count > 0 {
        writeln!(
            out,
            "- **Estimated Records:** {} (verify with provider billing)",
            costs.estimated_count
        )?;
    } else {
        writeln!(out, "- All costs based on provider-reported usage.")?;
    }
    out.flush()?;

    println!("[report] Generated report at {}", output_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eval(call_id: &str, scores: &[(&str, f64)], pass: bool) -> Evaluation {
        Evaluation {
            call_id: call_id.into(),
            evaluation_id: format!("EVA-{call_id}"),
            summary_id: format!("SUM-{call_id}"),
            transcript_id: call_id.into(),
            scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            rationales: BTreeMap::new(),
            hallucination_flags: vec![],
            overall_pass: pass,
            suggested_prompt_changes: vec![],
        }
    }

    #[test]
    fn test_dimension_stats() {
        let evals = vec![
            eval("a", &[("coverage", 5.0), ("factuality", 3.0)], true),
            eval("b", &[("coverage", 3.0), ("factuality", 5.0)], true),
        ];
        let stats = dimension_stats(&evals);
        assert_eq!(stats["coverage"].avg, 4.0);
        assert_eq!(stats["coverage"].min, 3.0);
        assert_eq!(stats["coverage"].max, 5.0);
    }

    #[test]
    fn test_failure_modes_only_count_failing_evaluations() {
        let evals = vec![
            eval("a", &[("coverage", 2.0)], false),
            eval("b", &[("coverage", 3.0), ("factuality", 2.0)], false),
            // Low score on a passing evaluation never counts
            eval("c", &[("coverage", 1.0)], true),
        ];
        let modes = failure_modes(&evals);
        assert_eq!(modes[0], ("coverage".to_string(), 2));
        assert_eq!(modes[1], ("factuality".to_string(), 1));
    }

    #[test]
    fn test_failure_modes_threshold_is_four() {
        let evals = vec![eval("a", &[("coverage", 4.0), ("factuality", 3.9)], false)];
        let modes = failure_modes(&evals);
        assert_eq!(modes, vec![("factuality".to_string(), 1)]);
    }

    #[test]
    fn test_cost_summary_missing_file_is_zeroes() {
        let summary = cost_summary(Path::new("/nonexistent/calls.jsonl")).unwrap();
        assert_eq!(summary, CostSummary::default());
    }

    #[test]
    fn test_generate_report_markdown_shape() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.md");
        let evals = vec![
            eval("a", &[("coverage", 5.0)], true),
            eval("b", &[("coverage", 2.0)], false),
        ];
        generate_report(&evals, &dir.path().join("calls.jsonl"), &out).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("# Evaluation Report"));
        assert!(text.contains("**Pass Rate:** 1/2 (50.0%)"));
        assert!(text.contains("- **coverage:** avg=3.50, min=2, max=5"));
        assert!(text.contains("- **coverage:** 1 failures"));
        assert!(text.contains("All costs based on provider-reported usage."));
    }

    #[test]
    fn test_generate_report_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.md");
        generate_report(&[], &dir.path().join("calls.jsonl"), &out).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("**Pass Rate:** 0/0 (0.0%)"));
        assert!(text.contains("No failures detected."));
    }
}
