// src/infra/store.rs — JSONL persistence for pipeline artifacts

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::infra::errors::PipelineError;

/// Write all records to `path` as line-delimited JSON, replacing any
/// existing file. Transcripts/summaries/evaluations are full-rewrite
/// streams; only the audit log is append-only.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| PipelineError::Data(format!("serialize record: {e}")))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a JSONL file into typed records. Blank lines are skipped; a
/// malformed line is a data error naming the line number.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PipelineError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            PipelineError::Data(format!("{}:{}: {e}", path.display(), idx + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}
