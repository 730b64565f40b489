// src/generate/runner.rs — Synthesize call transcripts and normalize them
// into schema-valid records

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::core::cost::{compute_cost, Pricing};
use crate::core::pool::run_pool;
use crate::core::types::{
    Lob, Segment, Speaker, Transcript, TranscriptMetadata, ALLOWED_LOBS,
};
use crate::infra::audit::AuditLogger;
use crate::infra::errors::PipelineError;
use crate::infra::store;
use crate::provider::{Message, Provider};

const GENERATE_TEMPERATURE: f32 = 0.8;
const GENERATE_MAX_TOKENS: u32 = 8192;

const SYSTEM_PROMPT: &str = "You generate realistic, lengthy call-center transcripts for training. \
     Honor the JSON schema exactly. Avoid PHI/PII; use placeholders where needed.";

// Few-shot examples mirrored for length and structure.
const FEW_SHOT_EXAMPLES: &str = r#"Example 1:
{
  "call_id": "AEP-2025-000001",
  "lob": "Benefits",
  "segments": [
    {"t": "00:00", "speaker": "caller", "text": "Hi there, I'm trying to add my spouse after our wedding and I'm not sure which forms I need."},
    {"t": "00:05", "speaker": "agent", "text": "Congrats! I can help with that. This call may be recorded. Can I confirm your member ID suffix and full name?"},
    {"t": "00:12", "speaker": "caller", "text": "Sure, the ID ends in 4321 and the name on file should be Jamie Rivera."},
    {"t": "00:20", "speaker": "agent", "text": "Thank you, Jamie. I see you're on the PPO Silver plan. For a qualifying life event like marriage, you have a 30-day window to add a spouse."},
    {"t": "00:31", "speaker": "caller", "text": "Got it. We were married last Friday, so I should be within that window."},
    {"t": "00:38", "speaker": "agent", "text": "Perfect timing. You'll need a marriage certificate and a dependent add form; both can be uploaded in your member portal."},
    {"t": "00:49", "speaker": "caller", "text": "Do I need the certified copy, or will a scan work?"},
    {"t": "00:54", "speaker": "agent", "text": "A clear scan is fine for submission. Once approved, coverage is effective the date of the event."},
    {"t": "01:03", "speaker": "caller", "text": "Okay, that helps. Anything else I should know before I submit?"},
    {"t": "01:08", "speaker": "agent", "text": "Just ensure you submit within 30 days and keep an eye on portal messages in case we request clarification."},
    {"t": "01:16", "speaker": "caller", "text": "Sounds good. I appreciate the clear steps."},
    {"t": "01:20", "speaker": "agent", "text": "My pleasure, Jamie. I'm sending a checklist and the upload link now. Have a great day!"}
  ],
  "metadata": {"duration_s": 84}
}

Example 2:
{
  "call_id": "AEP-2025-000002",
  "lob": "Claims",
  "segments": [
    {"t": "00:00", "speaker": "caller", "text": "Hi, I'm following up on claim number XYZ789. The Explanation of Benefits confused me."},
    {"t": "00:05", "speaker": "agent", "text": "Happy to help. This call may be recorded. Can I verify your full name and date of service noted on the EOB?"},
    {"t": "00:13", "speaker": "caller", "text": "Sure, Alex Chen, and the visit was on June 12th."},
    {"t": "00:19", "speaker": "agent", "text": "Thanks, Alex. I see the claim is pending because the provider's billing code requires additional documentation."},
    {"t": "00:28", "speaker": "caller", "text": "Does that mean I'll be billed more? The EOB shows something under 'member responsibility'."},
    {"t": "00:35", "speaker": "agent", "text": "Not necessarily. EOBs aren't bills. That line reflects what could apply after processing, like a deductible or copay."},
    {"t": "00:45", "speaker": "caller", "text": "Okay. What happens next?"},
    {"t": "00:48", "speaker": "agent", "text": "We've requested notes from the provider to support the code. Once received, the claim finalizes in 7 to 10 business days."},
    {"t": "00:58", "speaker": "caller", "text": "Can I do anything to speed that up?"},
    {"t": "01:01", "speaker": "agent", "text": "You can call the provider and mention our request. I'll also place a courtesy follow-up on our side."},
    {"t": "01:10", "speaker": "caller", "text": "Appreciate that. Please add a note that I called today."},
    {"t": "01:13", "speaker": "agent", "text": "Already done, timestamped. We'll message you when the provider responds. Have a great day, Alex!"}
  ],
  "metadata": {"duration_s": 77}
}"#;

/// A transcript normalized from lenient model output but not yet assigned
/// its sequential ID.
#[derive(Debug, Clone)]
pub struct DraftTranscript {
    pub lob: Option<Lob>,
    pub segments: Vec<Segment>,
    pub duration_s: u64,
}

struct GenerateCtx {
    provider: Arc<dyn Provider>,
    audit: Option<Arc<AuditLogger>>,
    pricing: Option<Pricing>,
    seed: Option<u64>,
}

/// Generate N synthetic transcripts, one LLM call per transcript, through
/// the bounded worker pool.
pub struct DatasetGenerator {
    ctx: Arc<GenerateCtx>,
    output_dir: PathBuf,
}

impl DatasetGenerator {
    pub fn new(
        provider: Arc<dyn Provider>,
        output_dir: &Path,
        audit: Option<Arc<AuditLogger>>,
        pricing: Option<Pricing>,
        seed: Option<u64>,
    ) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(output_dir)?;
        Ok(Self {
            ctx: Arc::new(GenerateCtx {
                provider,
                audit,
                pricing,
                seed,
            }),
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Generate `n` transcripts. Failed tasks are logged and excluded from
    /// the result set; sequential IDs are assigned to the survivors after
    /// collection, so IDs are always contiguous.
    pub async fn generate(&self, n: usize, workers: usize) -> Result<Vec<Transcript>, PipelineError> {
        println!("[generate] Generating {n} synthetic transcripts with {workers} workers...");

        let ctx = self.ctx.clone();
        let outcomes = run_pool(
            (0..n).collect::<Vec<_>>(),
            workers,
            move |_, idx| generate_one(ctx.clone(), idx),
            |done, total, outcome| {
                if let Err(e) = outcome {
                    eprintln!("[generate] Warning: {e}");
                }
                println!("[generate] Progress: {done}/{total} transcripts completed");
            },
        )
        .await?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut transcripts = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(draft) => {
                    let seq = transcripts.len() + 1;
                    transcripts.push(finalize(draft, seq, &stamp));
                }
                Err(e) => warn!("generation task excluded: {e}"),
            }
        }

        Ok(transcripts)
    }

    pub fn save(&self, transcripts: &[Transcript]) -> Result<PathBuf, PipelineError> {
        let path = self.output_dir.join("transcripts.jsonl");
        store::write_jsonl(&path, transcripts)?;
        println!(
            "[generate] Saved {} transcripts to {}",
            transcripts.len(),
            path.display()
        );
        Ok(path)
    }
}

async fn generate_one(ctx: Arc<GenerateCtx>, idx: usize) -> Result<DraftTranscript, PipelineError> {
    let messages = vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(build_prompt()),
    ];

    let response = match ctx
        .provider
        .generate(
            &messages,
            GENERATE_TEMPERATURE,
            ctx.seed,
            Some(GENERATE_MAX_TOKENS),
        )
        .await
    {
        Ok(r) => r,
        Err(e) => {
            log_audit(&ctx, &messages, None, None, "error", Some(&e.to_string()));
            return Err(PipelineError::Data(format!(
                "Failed to generate transcript {}: {e}",
                idx + 1
            )));
        }
    };

    let cost = ctx
        .pricing
        .as_ref()
        .map(|p| compute_cost(&response.usage, p));
    log_audit(&ctx, &messages, Some(&response), cost, "ok", None);

    let raw = extract_transcript_value(&response.text).map_err(|e| {
        PipelineError::Data(format!("Failed to generate transcript {}: {e}", idx + 1))
    })?;
    normalize_draft(&raw)
        .map_err(|e| PipelineError::Data(format!("Failed to generate transcript {}: {e}", idx + 1)))
}

fn build_prompt() -> String {
    format!(
        r#"Generate 1 unique, realistic call-center transcript as a JSON object (no extra text, no array).
The transcript MUST match this schema:
- "call_id": string "AEP-2025-NNNNNN" (unique per transcript; we will normalize later)
- "lob": one of ["Benefits", "Claims", "Pharmacy"]
- "segments": array of objects with:
    - "t": strictly increasing "MM:SS" or "HH:MM:SS", starting at "00:00"
    - "speaker": "caller" or "agent"
    - "text": natural utterance (professional tone; light disfluencies ok; no PHI)
- "metadata": {{"duration_s": integer total seconds consistent with last segment}}

STYLE & LENGTH:
- Mirror the examples below for length and detail (roughly 12-20 segments; 100-150 seconds).
- Include greetings, brief verification (use placeholders), explanation of policy/coverage, clarifying Q&A, and a clean wrap-up.
- No markdown fences, no comments, valid JSON only.

Examples to mirror:
{FEW_SHOT_EXAMPLES}
"#
    )
}

/// Pull a single transcript object out of messy model output: a bare
/// object, the first element of an array, or a `{"transcripts": [...]}`
/// wrapper.
pub fn extract_transcript_value(text: &str) -> Result<Value, PipelineError> {
    let value = crate::judge::normalize::extract_json(text).or_else(|_| {
        // Some models reply with a top-level array instead of an object.
        let trimmed = text.trim();
        if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
            if end > start {
                return serde_json::from_str::<Value>(&trimmed[start..=end])
                    .map_err(|e| PipelineError::Parse(format!("JSON parse error: {e}")));
            }
        }
        Err(PipelineError::Parse("No JSON payload found in LLM response".into()))
    })?;

    let candidate = match value {
        Value::Array(items) => items.into_iter().next(),
        Value::Object(mut obj) => {
            if obj.contains_key("segments") {
                Some(Value::Object(obj))
            } else if let Some(Value::Array(items)) = obj.remove("transcripts") {
                items.into_iter().next()
            } else {
                None
            }
        }
        _ => None,
    };

    match candidate {
        Some(v) if v.get("segments").map(|s| s.is_array()).unwrap_or(false) => Ok(v),
        _ => Err(PipelineError::Parse(
            "LLM returned invalid transcript (missing segments)".into(),
        )),
    }
}

/// Coerce lenient model output to the canonical shape: repair timestamp
/// monotonicity, force speakers into the allowed set, reconcile duration.
/// Zero usable segments after repair is fatal for this task only.
pub fn normalize_draft(raw: &Value) -> Result<DraftTranscript, PipelineError> {
    let lob = raw.get("lob").and_then(Value::as_str).and_then(Lob::parse);

    let mut segments: Vec<Segment> = Vec::new();
    let mut last_s: i64 = -1;
    for seg in raw
        .get("segments")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(obj) = seg.as_object() else { continue };
        let mut ts = parse_ts(obj.get("t").and_then(Value::as_str).unwrap_or("00:00")) as i64;
        if ts <= last_s {
            ts = last_s + 1;
        }
        let speaker = match obj
            .get("speaker")
            .and_then(Value::as_str)
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("caller") => Speaker::Caller,
            Some("agent") => Speaker::Agent,
            // Out-of-set labels alternate to keep every segment well-typed
            _ => {
                if segments.len() % 2 == 0 {
                    Speaker::Caller
                } else {
                    Speaker::Agent
                }
            }
        };
        let text = obj
            .get("text")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("...")
            .to_string();
        segments.push(Segment {
            t: fmt_ts(ts as u64),
            speaker,
            text,
        });
        last_s = ts;
    }

    if segments.is_empty() {
        return Err(PipelineError::Data(
            "Transcript had no usable segments after normalization".into(),
        ));
    }

    let last_ts = parse_ts(&segments[segments.len() - 1].t);
    let duration_s = raw
        .get("metadata")
        .and_then(|m| m.get("duration_s"))
        .and_then(Value::as_u64)
        .filter(|&d| d >= last_ts)
        .unwrap_or(last_ts);

    Ok(DraftTranscript {
        lob,
        segments,
        duration_s,
    })
}

/// Assign the sequential call ID and fall back to a round-robin line of
/// business when the model's value was outside the allowed set.
pub fn finalize(draft: DraftTranscript, seq: usize, stamp: &str) -> Transcript {
    let lob = draft
        .lob
        .unwrap_or(ALLOWED_LOBS[seq % ALLOWED_LOBS.len()]);
    Transcript {
        call_id: format!("TRA-{stamp}-{seq:03}"),
        lob,
        segments: draft.segments,
        metadata: TranscriptMetadata {
            duration_s: draft.duration_s,
        },
    }
}

/// "MM:SS" or "HH:MM:SS" to seconds; anything unparseable is 0.
pub fn parse_ts(ts: &str) -> u64 {
    let parts: Vec<&str> = ts.trim().split(':').collect();
    let nums: Option<Vec<u64>> = parts.iter().map(|p| p.parse().ok()).collect();
    match nums.as_deref() {
        Some([m, s]) => m * 60 + s,
        Some([h, m, s]) => h * 3600 + m * 60 + s,
        _ => 0,
    }
}

pub fn fmt_ts(seconds: u64) -> String {
    if seconds < 3600 {
        format!("{:02}:{:02}", seconds / 60, seconds % 60)
    } else {
        format!(
            "{:02}:{:02}:{:02}",
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        )
    }
}

fn log_audit(
    ctx: &GenerateCtx,
    messages: &[Message],
    response: Option<&crate::provider::LlmResponse>,
    cost: Option<f64>,
    status: &str,
    error: Option<&str>,
) {
    if let Some(audit) = &ctx.audit {
        if let Err(e) = audit.log_call(
            "generate",
            ctx.provider.id(),
            ctx.provider.model_id(),
            messages,
            response,
            GENERATE_TEMPERATURE,
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
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_ts_formats() {
        assert_eq!(parse_ts("00:00"), 0);
        assert_eq!(parse_ts("01:30"), 90);
        assert_eq!(parse_ts("01:00:05"), 3605);
        assert_eq!(parse_ts("garbage"), 0);
        assert_eq!(parse_ts(" 02:10 "), 130);
    }

    #[test]
    fn test_fmt_ts() {
        assert_eq!(fmt_ts(0), "00:00");
        assert_eq!(fmt_ts(90), "01:30");
        assert_eq!(fmt_ts(3605), "01:00:05");
    }

    #[test]
    fn test_timestamp_repair_forces_strict_increase() {
        let raw = json!({
            "lob": "Claims",
            "segments": [
                {"t": "00:10", "speaker": "caller", "text": "a"},
                {"t": "00:05", "speaker": "agent", "text": "b"},
                {"t": "00:11", "speaker": "caller", "text": "c"},
                {"t": "00:11", "speaker": "agent", "text": "d"}
            ],
            "metadata": {"duration_s": 200}
        });
        let draft = normalize_draft(&raw).unwrap();
        let seconds: Vec<u64> = draft.segments.iter().map(|s| parse_ts(&s.t)).collect();
        for pair in seconds.windows(2) {
            assert!(pair[1] > pair[0], "timestamps must strictly increase: {seconds:?}");
        }
        assert_eq!(seconds, vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_unknown_speaker_alternates() {
        let raw = json!({
            "segments": [
                {"t": "00:00", "speaker": "narrator", "text": "a"},
                {"t": "00:05", "speaker": "robot", "text": "b"},
                {"t": "00:10", "speaker": "agent", "text": "c"}
            ]
        });
        let draft = normalize_draft(&raw).unwrap();
        assert_eq!(draft.segments[0].speaker, Speaker::Caller);
        assert_eq!(draft.segments[1].speaker, Speaker::Agent);
        assert_eq!(draft.segments[2].speaker, Speaker::Agent);
    }

    #[test]
    fn test_empty_text_becomes_placeholder() {
        let raw = json!({
            "segments": [{"t": "00:00", "speaker": "caller", "text": "  "}]
        });
        let draft = normalize_draft(&raw).unwrap();
        assert_eq!(draft.segments[0].text, "...");
    }

    #[test]
    fn test_duration_raised_to_last_timestamp() {
        let raw = json!({
            "segments": [
                {"t": "00:00", "speaker": "caller", "text": "a"},
                {"t": "02:00", "speaker": "agent", "text": "b"}
            ],
            "metadata": {"duration_s": 30}
        });
        let draft = normalize_draft(&raw).unwrap();
        assert_eq!(draft.duration_s, 120);
    }

    #[test]
    fn test_zero_segments_is_data_error() {
        let raw = json!({"segments": [], "metadata": {"duration_s": 10}});
        let err = normalize_draft(&raw).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }

    #[test]
    fn test_non_object_segments_skipped() {
        let raw = json!({
            "segments": ["junk", {"t": "00:00", "speaker": "caller", "text": "hello"}]
        });
        let draft = normalize_draft(&raw).unwrap();
        assert_eq!(draft.segments.len(), 1);
    }

    #[test]
    fn test_finalize_assigns_sequential_id_and_lob_fallback() {
        let draft = DraftTranscript {
            lob: None,
            segments: vec![Segment {
                t: "00:00".into(),
                speaker: Speaker::Caller,
                text: "hi".into(),
            }],
            duration_s: 10,
        };
        let t = finalize(draft, 7, "20251002_120000");
        assert_eq!(t.call_id, "TRA-20251002_120000-007");
        assert_eq!(t.lob, ALLOWED_LOBS[7 % 3]);
    }

    #[test]
    fn test_extract_bare_object() {
        let text = r#"{"call_id": "X", "segments": [{"t": "00:00"}]}"#;
        let v = extract_transcript_value(text).unwrap();
        assert!(v.get("segments").is_some());
    }

    #[test]
    fn test_extract_fenced_object() {
        let text = "```json\n{\"segments\": [{\"t\": \"00:00\"}]}\n```";
        let v = extract_transcript_value(text).unwrap();
        assert!(v["segments"].is_array());
    }

    #[test]
    fn test_extract_transcripts_wrapper() {
        let text = r#"{"transcripts": [{"segments": [{"t": "00:00"}]}]}"#;
        let v = extract_transcript_value(text).unwrap();
        assert!(v["segments"].is_array());
    }

    #[test]
    fn test_extract_array_takes_first() {
        let text = r#"[{"segments": [{"t": "00:00"}]}, {"segments": []}]"#;
        let v = extract_transcript_value(text).unwrap();
        assert_eq!(v["segments"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_extract_missing_segments_fails() {
        let err = extract_transcript_value(r#"{"call_id": "X"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }
}
