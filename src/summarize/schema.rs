// src/summarize/schema.rs — Call summary record and prompt schema text

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured summary of one call. The business fields are carried
/// loosely so the judge can serialize whatever shape the summarizer
/// produced; `call_id`/`summary_id`/`transcript_id` are the join keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub call_id: String,
    #[serde(default)]
    pub summary_id: String,
    #[serde(default)]
    pub transcript_id: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

/// Target schema, rendered into the summarizer prompt.
pub fn schema_text() -> &'static str {
    r#"{
  "call_id": "string (from transcript)",
  "call_resolution": "string (what customer wanted and resolution status)",
  "action_items": "string (concrete next steps with ownership and deadlines)",
  "context_preservation": "string (key business context, customer history, account details)",
  "compliance_notes": "string (compliance issues, regulatory requirements, privacy concerns)",
  "quality_indicators": "string (service quality metrics, customer sentiment, performance notes)"
}"#
}

/// A worked example of a summary that scores 5/5 on every rubric dimension,
/// rendered into the summarizer prompt.
pub fn example_summary() -> &'static str {
    r#"EXAMPLE OF A PERFECT BUSINESS SUMMARY:

Transcript: Customer calls about a prescription refill, agent processes it, discusses insurance coverage, schedules follow-up.

{
  "call_id": "TRA-...",
  "call_resolution": "Customer requested refill for Metformin 500mg. Successfully processed refill at CVS Main Street location. Customer confirmed insurance coverage active. Refill ready in 2 hours.",
  "action_items": "1. Customer to pick up prescription at CVS Main Street by 3:00 PM today\n2. Pharmacy to send text notification when ready\n3. Agent to follow up tomorrow to confirm pickup",
  "context_preservation": "Member ID M123456. Previous calls about the same medication. Insurance: policy active. Preferred pharmacy: CVS Main Street.",
  "compliance_notes": "Standard refill process followed. Insurance verification completed. Customer consented to text notifications. Call recorded for quality assurance.",
  "quality_indicators": "Call duration: 4m32s. Customer sentiment: positive. No escalations needed. Customer rated service 5/5."
}

This scores 5/5 on every dimension because each field is specific, grounded in the transcript, and actionable for the next agent."#
}
