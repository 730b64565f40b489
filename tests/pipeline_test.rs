// tests/pipeline_test.rs — End-to-end pipeline tests against canned providers

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use callgrade::generate::runner::DatasetGenerator;
use callgrade::infra::errors::PipelineError;
use callgrade::judge::runner::JudgeRunner;
use callgrade::provider::mock::MockProvider;
use callgrade::provider::{LlmResponse, Message, Provider, Usage};
use callgrade::summarize::runner::SummarizeRunner;

// ---------- Canned providers for testing ----------

/// Returns the same text for every call.
struct CannedProvider {
    text: String,
}

#[async_trait]
impl Provider for CannedProvider {
    fn id(&self) -> &str {
        "canned"
    }

    fn model_id(&self) -> &str {
        "canned-1"
    }

    async fn generate(
        &self,
        _messages: &[Message],
        _temperature: f32,
        _seed: Option<u64>,
        _max_tokens: Option<u32>,
    ) -> Result<LlmResponse, PipelineError> {
        Ok(LlmResponse {
            text: self.text.clone(),
            usage: Usage::reported(100, 50),
            request_id: None,
            latency_ms: 1.0,
            raw_response: None,
        })
    }
}

/// Fails every call with a non-retriable provider error.
struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn id(&self) -> &str {
        "failing"
    }

    fn model_id(&self) -> &str {
        "failing-1"
    }

    async fn generate(
        &self,
        _messages: &[Message],
        _temperature: f32,
        _seed: Option<u64>,
        _max_tokens: Option<u32>,
    ) -> Result<LlmResponse, PipelineError> {
        Err(PipelineError::Provider {
            provider: "failing".into(),
            message: "capability outage".into(),
            retriable: false,
        })
    }
}

// ---------- Fixture helpers ----------

fn write_prompts(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("judge.system.txt"), "You are a judge.").unwrap();
    std::fs::write(
        dir.join("judge.user.txt"),
        "Rubric: {{ rubric }}\nTranscript: {{ transcript_json }}\nSummary: {{ summary_json }}",
    )
    .unwrap();
    std::fs::write(dir.join("summarizer.system.txt"), "You summarize calls.").unwrap();
    std::fs::write(
        dir.join("summarizer.user.txt"),
        "Transcript: {{ transcript_json }}\nSchema: {{ schema }}\nExample: {{ example }}",
    )
    .unwrap();
}

fn write_rubric(path: &Path) {
    std::fs::write(
        path,
        r#"{
  "dimensions": [
    { "name": "coverage", "weight": 0.3, "min_threshold": 4 },
    { "name": "factuality", "weight": 0.3, "min_threshold": 4 },
    { "name": "actionability", "weight": 0.2, "min_threshold": 3 },
    { "name": "structure_brevity", "weight": 0.1, "min_threshold": 3 },
    { "name": "safety_compliance", "weight": 0.1, "min_threshold": 4 }
  ],
  "gates": { "avg_threshold": 4.2, "no_critical_failures": true }
}"#,
    )
    .unwrap();
}

// ---------- Tests ----------

#[tokio::test]
async fn test_full_pipeline_with_mock_provider() {
    let dir = tempfile::tempdir().unwrap();
    let prompts_dir = dir.path().join("prompts");
    let rubric_path = dir.path().join("rubric.json");
    write_prompts(&prompts_dir);
    write_rubric(&rubric_path);

    let provider: Arc<dyn Provider> = Arc::new(MockProvider::new());

    // Generate
    let generator =
        DatasetGenerator::new(provider.clone(), &dir.path().join("data"), None, None, None)
            .unwrap();
    let transcripts = generator.generate(2, 2).await.unwrap();
    assert_eq!(transcripts.len(), 2);
    assert!(transcripts[0].call_id.ends_with("-001"));
    assert!(transcripts[1].call_id.ends_with("-002"));
    assert_ne!(transcripts[0].call_id, transcripts[1].call_id);
    generator.save(&transcripts).unwrap();
    assert!(dir.path().join("data/transcripts.jsonl").exists());

    // Summarize
    let run_dir = dir.path().join("run");
    let summarizer = SummarizeRunner::new(
        provider.clone(),
        &prompts_dir,
        &run_dir,
        None,
        None,
        0.7,
        None,
    )
    .unwrap();
    let summaries = summarizer.run(&transcripts, 2).await.unwrap();
    assert_eq!(summaries.len(), 2);
    for summary in &summaries {
        assert!(transcripts.iter().any(|t| t.call_id == summary.transcript_id));
        assert!(summary.summary_id.starts_with("SUM-"));
        assert!(summary.fields.contains_key("call_resolution"));
    }
    assert!(run_dir.join("summaries.jsonl").exists());

    // Judge
    let judge = JudgeRunner::new(
        provider,
        &prompts_dir,
        &rubric_path,
        &run_dir,
        None,
        None,
        0.0,
        None,
    )
    .unwrap();
    let evaluations = judge.run(&transcripts, &summaries, 2).await.unwrap();
    assert_eq!(evaluations.len(), 2);
    for eval in &evaluations {
        // Mock scores: weighted avg 4.8 over the default rubric, all
        // minimums met, no flags
        assert!(eval.overall_pass);
        assert_eq!(eval.scores.len(), 5);
        assert!(eval.evaluation_id.starts_with("EVA-"));
        assert!(eval.hallucination_flags.is_empty());
    }
    assert!(run_dir.join("evaluations.jsonl").exists());
}

#[tokio::test]
async fn test_judge_recomputes_overall_pass() {
    let dir = tempfile::tempdir().unwrap();
    let prompts_dir = dir.path().join("prompts");
    let rubric_path = dir.path().join("rubric.json");
    write_prompts(&prompts_dir);
    write_rubric(&rubric_path);

    // A judge response claiming a pass despite failing scores
    let provider: Arc<dyn Provider> = Arc::new(CannedProvider {
        text: r#"{
            "scores": {
                "coverage": 2, "factuality": 2, "actionability": 2,
                "structure_brevity": 2, "safety_compliance": 2
            },
            "rationales": {},
            "hallucination_flags": [],
            "overall_pass": true
        }"#
        .into(),
    });

    let gen = DatasetGenerator::new(
        Arc::new(MockProvider::new()),
        &dir.path().join("data"),
        None,
        None,
        None,
    )
    .unwrap();
    let transcripts = gen.generate(1, 1).await.unwrap();
    let summarizer = SummarizeRunner::new(
        Arc::new(MockProvider::new()),
        &prompts_dir,
        &dir.path().join("run"),
        None,
        None,
        0.7,
        None,
    )
    .unwrap();
    let summaries = summarizer.run(&transcripts, 1).await.unwrap();

    let judge = JudgeRunner::new(
        provider,
        &prompts_dir,
        &rubric_path,
        &dir.path().join("run"),
        None,
        None,
        0.0,
        None,
    )
    .unwrap();
    let evaluations = judge.run(&transcripts, &summaries, 1).await.unwrap();
    assert_eq!(evaluations.len(), 1);
    assert!(!evaluations[0].overall_pass, "model-claimed pass must be overridden");
}

#[tokio::test]
async fn test_judge_capability_failure_yields_stub() {
    let dir = tempfile::tempdir().unwrap();
    let prompts_dir = dir.path().join("prompts");
    let rubric_path = dir.path().join("rubric.json");
    write_prompts(&prompts_dir);
    write_rubric(&rubric_path);

    let gen = DatasetGenerator::new(
        Arc::new(MockProvider::new()),
        &dir.path().join("data"),
        None,
        None,
        None,
    )
    .unwrap();
    let transcripts = gen.generate(1, 1).await.unwrap();
    let summarizer = SummarizeRunner::new(
        Arc::new(MockProvider::new()),
        &prompts_dir,
        &dir.path().join("run"),
        None,
        None,
        0.7,
        None,
    )
    .unwrap();
    let summaries = summarizer.run(&transcripts, 1).await.unwrap();

    let judge = JudgeRunner::new(
        Arc::new(FailingProvider),
        &prompts_dir,
        &rubric_path,
        &dir.path().join("run"),
        None,
        None,
        0.0,
        None,
    )
    .unwrap();
    let evaluations = judge.run(&transcripts, &summaries, 1).await.unwrap();

    // Capability errors produce a zero-score stub, not a dropped record
    assert_eq!(evaluations.len(), 1);
    let stub = &evaluations[0];
    assert!(!stub.overall_pass);
    assert_eq!(stub.scores.len(), 5);
    assert!(stub.scores.values().all(|&s| s == 0.0));
    assert!(stub
        .rationales
        .values()
        .all(|r| r.starts_with("ERROR:")));
}

#[tokio::test]
async fn test_judge_drops_unparseable_responses() {
    let dir = tempfile::tempdir().unwrap();
    let prompts_dir = dir.path().join("prompts");
    let rubric_path = dir.path().join("rubric.json");
    write_prompts(&prompts_dir);
    write_rubric(&rubric_path);

    let gen = DatasetGenerator::new(
        Arc::new(MockProvider::new()),
        &dir.path().join("data"),
        None,
        None,
        None,
    )
    .unwrap();
    let transcripts = gen.generate(2, 2).await.unwrap();
    let summarizer = SummarizeRunner::new(
        Arc::new(MockProvider::new()),
        &prompts_dir,
        &dir.path().join("run"),
        None,
        None,
        0.7,
        None,
    )
    .unwrap();
    let summaries = summarizer.run(&transcripts, 2).await.unwrap();
    assert_eq!(summaries.len(), 2);

    // Unlike a capability failure (which stubs), a garbage payload drops
    // the pair from the output set entirely
    let judge = JudgeRunner::new(
        Arc::new(CannedProvider {
            text: "As an AI language model, I cannot score this call.".into(),
        }),
        &prompts_dir,
        &rubric_path,
        &dir.path().join("run"),
        None,
        None,
        0.0,
        None,
    )
    .unwrap();
    let evaluations = judge.run(&transcripts, &summaries, 2).await.unwrap();
    assert!(evaluations.is_empty());
}

#[tokio::test]
async fn test_summarize_drops_unparseable_responses() {
    let dir = tempfile::tempdir().unwrap();
    let prompts_dir = dir.path().join("prompts");
    write_prompts(&prompts_dir);

    let gen = DatasetGenerator::new(
        Arc::new(MockProvider::new()),
        &dir.path().join("data"),
        None,
        None,
        None,
    )
    .unwrap();
    let transcripts = gen.generate(2, 2).await.unwrap();

    let summarizer = SummarizeRunner::new(
        Arc::new(CannedProvider {
            text: "I'm sorry, I can't produce a summary right now.".into(),
        }),
        &prompts_dir,
        &dir.path().join("run"),
        None,
        None,
        0.7,
        None,
    )
    .unwrap();
    let summaries = summarizer.run(&transcripts, 2).await.unwrap();
    assert!(summaries.is_empty());
}

#[tokio::test]
async fn test_generate_excludes_failed_tasks() {
    let dir = tempfile::tempdir().unwrap();

    let gen = DatasetGenerator::new(
        Arc::new(FailingProvider),
        &dir.path().join("data"),
        None,
        None,
        None,
    )
    .unwrap();
    let transcripts = gen.generate(3, 2).await.unwrap();
    assert!(transcripts.is_empty());
}
