// src/summarize/runner.rs — Produce structured summaries from transcripts

use std::path::{Path, PathBuf};
use std::sync::Arc;

use minijinja::{context, Environment};
use tracing::warn;

use crate::core::cost::{compute_cost, Pricing};
use crate::core::pool::run_pool;
use crate::core::types::{seq_suffix, Transcript};
use crate::infra::audit::AuditLogger;
use crate::infra::errors::PipelineError;
use crate::infra::prompts::load_prompt;
use crate::infra::store;
use crate::judge::normalize::extract_json;
use crate::provider::{Message, Provider};
use crate::summarize::schema::{self, Summary};

const SUMMARIZE_MAX_TOKENS: u32 = 1024;

/// Per-transcript result. A capability or parse failure yields a null
/// summary for that item, dropped from the output; the batch continues.
pub struct SummarizeOutcome {
    pub summary: Option<Summary>,
    pub call_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: Option<f64>,
    pub error: Option<String>,
}

struct SummarizeCtx {
    provider: Arc<dyn Provider>,
    system_prompt: String,
    env: Environment<'static>,
    audit: Option<Arc<AuditLogger>>,
    pricing: Option<Pricing>,
    temperature: f32,
    seed: Option<u64>,
}

pub struct SummarizeRunner {
    ctx: Arc<SummarizeCtx>,
    output_dir: PathBuf,
}

impl SummarizeRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        prompts_dir: &Path,
        output_dir: &Path,
        audit: Option<Arc<AuditLogger>>,
        pricing: Option<Pricing>,
        temperature: f32,
        seed: Option<u64>,
    ) -> Result<Self, PipelineError> {
        let system_prompt = load_prompt(&prompts_dir.join("summarizer.system.txt"))?;
        let user_template = load_prompt(&prompts_dir.join("summarizer.user.txt"))?;

        let mut env = Environment::new();
        env.add_template_owned("summarizer.user".to_string(), user_template)
            .map_err(|e| PipelineError::Config(format!("summarizer.user.txt: {e}")))?;

        std::fs::create_dir_all(output_dir)?;

        Ok(Self {
            ctx: Arc::new(SummarizeCtx {
                provider,
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

    pub async fn run(
        &self,
        transcripts: &[Transcript],
        workers: usize,
    ) -> Result<Vec<Summary>, PipelineError> {
        let total = transcripts.len();
        println!("[summarize] Summarizing {total} transcripts with {workers} workers...");

        let ctx = self.ctx.clone();
        let outcomes = run_pool(
            transcripts.to_vec(),
            workers,
            move |_, transcript| summarize_one(ctx.clone(), transcript),
            |done, total, outcome| {
                match outcome {
                    Ok(o) => {
                        if let Some(err) = &o.error {
                            println!("  [{done}/{total}] {} → ERROR: {err}", o.call_id);
                        } else {
                            let cost = o.cost.unwrap_or(0.0);
                            println!(
                                "  [{done}/{total}] {} → {} tokens, ${cost:.4}",
                                o.call_id,
                                o.prompt_tokens + o.completion_tokens,
                            );
                        }
                    }
                    Err(e) => println!("  [{done}/{total}] → ERROR: {e}"),
                }
                println!("[summarize] Progress: {done}/{total} summaries completed");
            },
        )
        .await?;

        let mut summaries = Vec::new();
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
                    if let Some(summary) = o.summary {
                        summaries.push(summary);
                    }
                }
                Err(e) => warn!("summarize task failed: {e}"),
            }
        }

        let out_file = self.output_dir.join("summaries.jsonl");
        store::write_jsonl(&out_file, &summaries)?;
        println!(
            "[summarize] ✓ Saved {} summaries to {}",
            summaries.len(),
            out_file.display()
        );
        println!("[summarize] Total cost: ${total_cost:.4}");
        println!(
            "[summarize] Total tokens: {} (in: {input_tokens}, out: {output_tokens})",
            input_tokens + output_tokens
        );

        Ok(summaries)
    }
}

async fn summarize_one(
    ctx: Arc<SummarizeCtx>,
    transcript: Transcript,
) -> Result<SummarizeOutcome, PipelineError> {
    let transcript_json = serde_json::to_string_pretty(&transcript)
        .map_err(|e| PipelineError::Data(format!("serialize transcript: {e}")))?;
    let template = ctx
        .env
        .get_template("summarizer.user")
        .map_err(|e| PipelineError::Config(e.to_string()))?;
    let user_prompt = template
        .render(context! {
            transcript_json => transcript_json,
            schema => schema::schema_text(),
            example => schema::example_summary(),
        })
        .map_err(|e| PipelineError::Config(format!("summarizer.user.txt: {e}")))?;

    let messages = vec![
        Message::system(ctx.system_prompt.clone()),
        Message::user(user_prompt),
    ];

    match ctx
        .provider
        .generate(
            &messages,
            ctx.temperature,
            ctx.seed,
            Some(SUMMARIZE_MAX_TOKENS),
        )
        .await
    {
        Ok(response) => {
            let cost = ctx
                .pricing
                .as_ref()
                .map(|p| compute_cost(&response.usage, p));

            match extract_json(&response.text).and_then(|p| build_summary(&transcript, p)) {
                Ok(summary) => {
                    log_audit(&ctx, &messages, Some(&response), cost, "ok", None);
                    Ok(SummarizeOutcome {
                        summary: Some(summary),
                        call_id: transcript.call_id.clone(),
                        prompt_tokens: response.usage.prompt_tokens,
                        completion_tokens: response.usage.completion_tokens,
                        cost,
                        error: None,
                    })
                }
                Err(e) => {
                    // Treated identically to a capability error: null summary,
                    // dropped from the output set.
                    log_audit(
                        &ctx,
                        &messages,
                        Some(&response),
                        cost,
                        "error",
                        Some(&e.to_string()),
                    );
                    Ok(SummarizeOutcome {
                        summary: None,
                        call_id: transcript.call_id.clone(),
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
            Ok(SummarizeOutcome {
                summary: None,
                call_id: transcript.call_id.clone(),
                prompt_tokens: 0,
                completion_tokens: 0,
                cost: None,
                error: Some(e.to_string()),
            })
        }
    }
}

/// Attach traceability IDs derived from the transcript ID suffix; the
/// summarizer's own ID fields are never trusted.
fn build_summary(
    transcript: &Transcript,
    payload: serde_json::Value,
) -> Result<Summary, PipelineError> {
    let Some(obj) = payload.as_object() else {
        return Err(PipelineError::Parse("summary payload is not an object".into()));
    };

    let suffix = seq_suffix(&transcript.call_id).to_string();
    let mut fields = obj.clone();
    let call_id = fields
        .remove("call_id")
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| transcript.call_id.clone());
    fields.remove("summary_id");
    fields.remove("transcript_id");

    Ok(Summary {
        call_id,
        summary_id: format!("SUM-{suffix}"),
        transcript_id: transcript.call_id.clone(),
        fields,
    })
}

fn log_audit(
    ctx: &SummarizeCtx,
    messages: &[Message],
    response: Option<&crate::provider::LlmResponse>,
    cost: Option<f64>,
    status: &str,
    error: Option<&str>,
) {
    if let Some(audit) = &ctx.audit {
        if let Err(e) = audit.log_call(
            "summarize",
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
