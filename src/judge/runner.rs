// src/judge/runner.rs — Evaluate summaries against transcripts with an LLM
// judge

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use minijinja::{context, Environment};
use tracing::warn;

use crate::core::cost::{compute_cost, Pricing};
use crate::core::pool::run_pool;
use crate::core::types::{seq_suffix, Evaluation, Transcript};
use crate::infra::audit::AuditLogger;
use crate::infra::errors::PipelineError;
use crate::infra::prompts::load_prompt;
use crate::infra::store;
use crate::judge::normalize::{extract_json, normalize_scores};
use crate::judge::rubric::Rubric;
use crate::provider::{Message, Provider};
use crate::summarize::schema::Summary;

const JUDGE_MAX_TOKENS: u32 = 2048;

/// Per-pair result surfaced to the progress line and session totals.
pub struct JudgeOutcome {
    /// None means the call succeeded but returned no parseable payload;
    /// the item is dropped from the output set rather than polluting
    /// aggregate statistics with a garbage record.
    pub evaluation: Option<Evaluation>,
    pub call_id: String,
    pub avg_score: f64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: Option<f64>,
    pub error: Option<String>,
}

struct JudgeCtx {
    provider: Arc<dyn Provider>,
    rubric: Rubric,
    system_prompt: String,
    env: Environment<'static>,
    audit: Option<Arc<AuditLogger>>,
    pricing: Option<Pricing>,
    temperature: f32,
    seed: Option<u64>,
}

/// Drives one judge call per (transcript, summary) pair through the bounded
/// worker pool, recomputing `overall_pass` from the rubric for every record.
pub struct JudgeRunner {
    ctx: Arc<JudgeCtx>,
    output_dir: PathBuf,
}

impl JudgeRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        prompts_dir: &Path,
        rubric_path: &Path,
        output_dir: &Path,
        audit: Option<Arc<AuditLogger>>,
        pricing: Option<Pricing>,
        temperature: f32,
        seed: Option<u64>,
    ) -> Result<Self, PipelineError> {
        let rubric = Rubric::load(rubric_path)?;
        let system_prompt = load_prompt(&prompts_dir.join("judge.system.txt"))?;
        let user_template = load_prompt(&prompts_dir.join("judge.user.txt"))?;

        let mut env = Environment::new();
        env.add_template_owned("judge.user".to_string(), user_template)
            .map_err(|e| PipelineError::Config(format!("judge.user.txt: {e}")))?;

        std::fs::create_dir_all(output_dir)?;

        Ok(Self {
            ctx: Arc::new(JudgeCtx {
                provider,
                rubric,
                system_prompt,
                env,
                audit,
                pricing,
                temperature,
                seed,
            }),
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn rubric(&self) -> &Rubric {
        &self.ctx.rubric
    }

    /// Evaluate all pairs with `workers` concurrent LLM calls. Output order
    /// is completion order; re-sort by ID if stable order is needed. The
    /// batch always completes, even if every item individually failed.
    pub async fn run(
        &self,
        transcripts: &[Transcript],
        summaries: &[Summary],
        workers: usize,
    ) -> Result<Vec<Evaluation>, PipelineError> {
        let pairs: Vec<(Transcript, Summary)> = transcripts
            .iter()
            .cloned()
            .zip(summaries.iter().cloned())
            .collect();
        let total = pairs.len();
        println!("[judge] Evaluating {total} summaries with {workers} workers...");

        let ctx = self.ctx.clone();
        let outcomes = run_pool(
            pairs,
            workers,
            move |_, (transcript, summary)| evaluate_one(ctx.clone(), transcript, summary),
            |done, total, outcome| {
                match outcome {
                    Ok(o) => {
                        if let Some(err) = &o.error {
                            println!("  [{done}/{total}] {} → ERROR: {err}", o.call_id);
                        } else {
                            let mark = o
                                .evaluation
                                .as_ref()
                                .map(|e| if e.overall_pass { "✓" } else { "✗" })
                                .unwrap_or("✗");
                            let cost = o.cost.unwrap_or(0.0);
                            println!(
                                "  [{done}/{total}] {} → {mark} avg={:.1}, {} tokens, ${cost:.4}",
                                o.call_id,
                                o.avg_score,
                                o.prompt_tokens + o.completion_tokens,
                            );
                        }
                    }
                    Err(e) => println!("  [{done}/{total}] → ERROR: {e}"),
                }
                println!("[judge] Progress: {done}/{total} evaluations completed");
            },
        )
        .await?;

        let mut evaluations = Vec::new();
        let mut input_tokens: u64 = 0;
        let mut output_tokens: u64 = 0;
        let mut total_cost = 0.0;
        for outcome in outcomes {
            match outcome {
                Ok(o) => {
                    input_tokens += u64::from(o.prompt_tokens);
                    output_tokens += u64::from(o.completion_tokens);
                    if let Some(c) = o.cost {
                        total_cost += c;
                    }
                    if let Some(evaluation) = o.evaluation {
                        evaluations.push(evaluation);
                    }
                }
                Err(e) => warn!("judge task failed: {e}"),
            }
        }

        let output_file = self.output_dir.join("evaluations.jsonl");
        store::write_jsonl(&output_file, &evaluations)?;

        println!(
            "\n[judge] ✓ Saved {} evaluations to {}",
            evaluations.len(),
            output_file.display()
        );
        println!(
            "[judge] Session totals: {input_tokens} in + {output_tokens} out = {} tokens, ${total_cost:.4}",
            input_tokens + output_tokens
        );

        Ok(evaluations)
    }
}

async fn evaluate_one(
    ctx: Arc<JudgeCtx>,
    transcript: Transcript,
    summary: Summary,
) -> Result<JudgeOutcome, PipelineError> {
    let user_prompt = render_user_prompt(&ctx, &transcript, &summary)?;
    let messages = vec![
        Message::system(ctx.system_prompt.clone()),
        Message::user(user_prompt),
    ];

    match ctx
        .provider
        .generate(&messages, ctx.temperature, ctx.seed, Some(JUDGE_MAX_TOKENS))
        .await
    {
        Ok(response) => {
            let cost = ctx
                .pricing
                .as_ref()
                .map(|p| compute_cost(&response.usage, p));
            log_audit(&ctx, &messages, Some(&response), cost, "ok", None);

            match extract_json(&response.text) {
                Ok(payload) => {
                    let evaluation = build_evaluation(&ctx.rubric, &transcript, &summary, &payload);
                    let avg_score = mean(&evaluation.scores);
                    Ok(JudgeOutcome {
                        call_id: evaluation.call_id.clone(),
                        evaluation: Some(evaluation),
                        avg_score,
                        prompt_tokens: response.usage.prompt_tokens,
                        completion_tokens: response.usage.completion_tokens,
                        cost,
                        error: None,
                    })
                }
                Err(e) => {
                    // The call itself succeeded; the payload is garbage.
                    // Dropped from the output set rather than scored.
                    warn!("dropping {}: {e}", summary.call_id);
                    Ok(JudgeOutcome {
                        evaluation: None,
                        call_id: summary.call_id.clone(),
                        avg_score: 0.0,
                        prompt_tokens: response.usage.prompt_tokens,
                        completion_tokens: response.usage.completion_tokens,
                        cost,
                        error: Some(e.to_string()),
                    })
                }
            }
        }
        Err(e) => {
            log_audit(&ctx, &messages, None, None, "error", Some(&e.to_string()));
            // Stub evaluation keeps one output record per input pair, so
            // downstream joins stay aligned under capability failure.
            let stub = stub_evaluation(&ctx.rubric, &transcript, &summary, &e.to_string());
            Ok(JudgeOutcome {
                call_id: stub.call_id.clone(),
                evaluation: Some(stub),
                avg_score: 0.0,
                prompt_tokens: 0,
                completion_tokens: 0,
                cost: None,
                error: Some(e.to_string()),
            })
        }
    }
}

fn render_user_prompt(
    ctx: &JudgeCtx,
    transcript: &Transcript,
    summary: &Summary,
) -> Result<String, PipelineError> {
    let rubric_json = serde_json::to_string_pretty(&ctx.rubric)
        .map_err(|e| PipelineError::Data(format!("serialize rubric: {e}")))?;
    let transcript_json = serde_json::to_string_pretty(transcript)
        .map_err(|e| PipelineError::Data(format!("serialize transcript: {e}")))?;
    let summary_json = serde_json::to_string_pretty(summary)
        .map_err(|e| PipelineError::Data(format!("serialize summary: {e}")))?;

    let template = ctx
        .env
        .get_template("judge.user")
        .map_err(|e| PipelineError::Config(e.to_string()))?;
    template
        .render(context! {
            rubric => rubric_json,
            transcript_json => transcript_json,
            summary_json => summary_json,
        })
        .map_err(|e| PipelineError::Config(format!("judge.user.txt: {e}")))
}

fn build_evaluation(
    rubric: &Rubric,
    transcript: &Transcript,
    summary: &Summary,
    payload: &serde_json::Value,
) -> Evaluation {
    let transcript_id = if summary.transcript_id.is_empty() {
        transcript.call_id.clone()
    } else {
        summary.transcript_id.clone()
    };
    let suffix = seq_suffix(&transcript_id).to_string();

    let (scores, extracted_rationales) = normalize_scores(
        payload
            .get("scores")
            .unwrap_or(&serde_json::Value::Null),
    );

    // An explicit top-level rationales map from the model wins over the
    // rationales unpacked from nested score entries.
    let top_level_rationales: BTreeMap<String, String> = payload
        .get("rationales")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let rationales = if top_level_rationales.is_empty() {
        extracted_rationales
    } else {
        top_level_rationales
    };

    let hallucination_flags = string_list(payload.get("hallucination_flags"));
    let suggested_prompt_changes = string_list(payload.get("suggested_prompt_changes"));

    // Never trust the LLM's own claimed verdict.
    let overall_pass = rubric.check_gates(&scores, &hallucination_flags);

    let summary_id = if summary.summary_id.is_empty() {
        format!("SUM-{suffix}")
    } else {
        summary.summary_id.clone()
    };

    Evaluation {
        call_id: summary.call_id.clone(),
        evaluation_id: format!("EVA-{suffix}"),
        summary_id,
        transcript_id,
        scores,
        rationales,
        hallucination_flags,
        overall_pass,
        suggested_prompt_changes,
    }
}

/// All-zero failing record emitted when the capability call itself failed.
fn stub_evaluation(
    rubric: &Rubric,
    transcript: &Transcript,
    summary: &Summary,
    error: &str,
) -> Evaluation {
    let transcript_id = if summary.transcript_id.is_empty() {
        transcript.call_id.clone()
    } else {
        summary.transcript_id.clone()
    };
    let suffix = seq_suffix(&transcript_id).to_string();

    let scores: BTreeMap<String, f64> = rubric
        .dimension_names()
        .into_iter()
        .map(|d| (d, 0.0))
        .collect();
    let rationales: BTreeMap<String, String> = rubric
        .dimension_names()
        .into_iter()
        .map(|d| (d, format!("ERROR: {error}")))
        .collect();

    let summary_id = if summary.summary_id.is_empty() {
        format!("SUM-{suffix}")
    } else {
        summary.summary_id.clone()
    };

    Evaluation {
        call_id: summary.call_id.clone(),
        evaluation_id: format!("EVA-{suffix}"),
        summary_id,
        transcript_id,
        scores,
        rationales,
        hallucination_flags: Vec::new(),
        overall_pass: false,
        suggested_prompt_changes: Vec::new(),
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn mean(scores: &BTreeMap<String, f64>) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.values().sum::<f64>() / scores.len() as f64
}

fn log_audit(
    ctx: &JudgeCtx,
    messages: &[Message],
    response: Option<&crate::provider::LlmResponse>,
    cost: Option<f64>,
    status: &str,
    error: Option<&str>,
) {
    if let Some(audit) = &ctx.audit {
        if let Err(e) = audit.log_call(
            "judge",
            ctx.provider.id(),
            ctx.provider.model_id(),
            messages,
            response,
            ctx.temperature,
            ctx.seed,
            cost,
            status,
            error,
        ) {
            warn!("audit log write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Lob, Segment, Speaker, TranscriptMetadata};
    use crate::judge::rubric::{Dimension, Gates};
    use serde_json::json;

    fn rubric() -> Rubric {
        Rubric {
            dimensions: vec![
                Dimension {
                    name: "coverage".into(),
                    weight: 1.0,
                    min_threshold: 4.0,
                },
                Dimension {
                    name: "factuality".into(),
                    weight: 1.0,
                    min_threshold: 4.0,
                },
            ],
            gates: Gates {
                avg_threshold: 4.2,
                no_critical_failures: true,
            },
        }
    }

    fn transcript(call_id: &str) -> Transcript {
        Transcript {
            call_id: call_id.into(),
            lob: Lob::Benefits,
            segments: vec![Segment {
                t: "00:00".into(),
                speaker: Speaker::Agent,
                text: "Hello".into(),
            }],
            metadata: TranscriptMetadata { duration_s: 60 },
        }
    }

    fn summary(call_id: &str, transcript_id: &str) -> Summary {
        Summary {
            call_id: call_id.into(),
            summary_id: String::new(),
            transcript_id: transcript_id.into(),
            fields: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_build_evaluation_recomputes_pass() {
        // The model claims a pass, but the scores fail the gates.
        let payload = json!({
            "scores": {"coverage": 2, "factuality": 2},
            "overall_pass": true
        });
        let t = transcript("TRA-20251002-007");
        let s = summary("TRA-20251002-007", "TRA-20251002-007");
        let e = build_evaluation(&rubric(), &t, &s, &payload);
        assert!(!e.overall_pass);
    }

    #[test]
    fn test_build_evaluation_derives_ids_from_suffix() {
        let payload = json!({"scores": {"coverage": 5, "factuality": 5}});
        let t = transcript("TRA-20251002-013");
        let s = summary("TRA-20251002-013", "TRA-20251002-013");
        let e = build_evaluation(&rubric(), &t, &s, &payload);
        assert_eq!(e.evaluation_id, "EVA-013");
        assert_eq!(e.summary_id, "SUM-013");
        assert_eq!(e.transcript_id, "TRA-20251002-013");
        assert!(e.overall_pass);
    }

    #[test]
    fn test_build_evaluation_empty_transcript_id_falls_back() {
        let payload = json!({"scores": {}});
        let t = transcript("TRA-20251002-021");
        let s = summary("TRA-20251002-021", "");
        let e = build_evaluation(&rubric(), &t, &s, &payload);
        assert_eq!(e.transcript_id, "TRA-20251002-021");
        assert_eq!(e.evaluation_id, "EVA-021");
    }

    #[test]
    fn test_build_evaluation_nested_scores_fill_rationales() {
        let payload = json!({
            "scores": {
                "coverage": {"score": 5, "rationale": "complete"},
                "factuality": {"score": 5, "rationale": "accurate"}
            },
            "hallucination_flags": []
        });
        let t = transcript("TRA-1-001");
        let s = summary("TRA-1-001", "TRA-1-001");
        let e = build_evaluation(&rubric(), &t, &s, &payload);
        assert_eq!(e.scores["coverage"], 5.0);
        assert_eq!(e.rationales["coverage"], "complete");
        assert!(e.overall_pass);
    }

    #[test]
    fn test_build_evaluation_top_level_rationales_win() {
        let payload = json!({
            "scores": {"coverage": {"score": 5, "rationale": "nested"}},
            "rationales": {"coverage": "top-level"}
        });
        let t = transcript("TRA-1-001");
        let s = summary("TRA-1-001", "TRA-1-001");
        let e = build_evaluation(&rubric(), &t, &s, &payload);
        assert_eq!(e.rationales["coverage"], "top-level");
    }

    #[test]
    fn test_build_evaluation_flags_force_failure() {
        let payload = json!({
            "scores": {"coverage": 5, "factuality": 5},
            "hallucination_flags": ["invented claim number"]
        });
        let t = transcript("TRA-1-001");
        let s = summary("TRA-1-001", "TRA-1-001");
        let e = build_evaluation(&rubric(), &t, &s, &payload);
        assert_eq!(e.hallucination_flags.len(), 1);
        assert!(!e.overall_pass);
    }

    #[test]
    fn test_stub_evaluation_shape() {
        let t = transcript("TRA-20251002-042");
        let s = summary("TRA-20251002-042", "TRA-20251002-042");
        let e = stub_evaluation(&rubric(), &t, &s, "connection reset");
        assert_eq!(e.scores.len(), 2);
        assert!(e.scores.values().all(|&v| v == 0.0));
        assert!(e.rationales.values().all(|r| r == "ERROR: connection reset"));
        assert!(e.hallucination_flags.is_empty());
        assert!(!e.overall_pass);
        assert_eq!(e.evaluation_id, "EVA-042");
    }

    #[test]
    fn test_mean() {
        let mut m = BTreeMap::new();
        assert_eq!(mean(&m), 0.0);
        m.insert("a".into(), 4.0);
        m.insert("b".into(), 5.0);
        assert!((mean(&m) - 4.5).abs() < 1e-9);
    }
}
