// src/core/types.rs — Canonical pipeline record shapes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Line of business a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lob {
    Benefits,
    Claims,
    Pharmacy,
}

pub const ALLOWED_LOBS: [Lob; 3] = [Lob::Benefits, Lob::Claims, Lob::Pharmacy];

impl Lob {
    /// Case-insensitive parse of lenient model output ("benefits", "CLAIMS").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "benefits" => Some(Lob::Benefits),
            "claims" => Some(Lob::Claims),
            "pharmacy" => Some(Lob::Pharmacy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Caller,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Monotonically increasing "MM:SS" / "HH:MM:SS" timestamp.
    pub t: String,
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMetadata {
    pub duration_s: u64,
}

/// A synthetic call transcript. Created by the generation stage; immutable
/// afterward; identified by `call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub call_id: String,
    pub lob: Lob,
    pub segments: Vec<Segment>,
    pub metadata: TranscriptMetadata,
}

/// One judge verdict per (transcript, summary) pair. `overall_pass` is
/// always recomputed from scores + flags + rubric, never copied from the
/// LLM's own claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub call_id: String,
    pub evaluation_id: String,
    pub summary_id: String,
    pub transcript_id: String,
    pub scores: BTreeMap<String, f64>,
    pub rationales: BTreeMap<String, String>,
    pub hallucination_flags: Vec<String>,
    pub overall_pass: bool,
    pub suggested_prompt_changes: Vec<String>,
}

/// Numeric suffix of a transcript ID, e.g. "TRA-20251002_122258-001" -> "001".
/// Evaluation and summary IDs derive from this suffix so the
/// (transcript, summary, evaluation) triple stays joinable even when other
/// ID fields are missing.
pub fn seq_suffix(id: &str) -> &str {
    if id.contains('-') {
        id.rsplit('-').next().unwrap_or("000")
    } else {
        "000"
    }
}
