// src/cli/commands.rs — Subcommand handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{ModelSize, ProviderKind};
use crate::core::cost::Pricing;
use crate::core::types::{Evaluation, Transcript};
use crate::generate::runner::DatasetGenerator;
use crate::infra::audit::AuditLogger;
use crate::infra::config::{ModelRegistry, Settings};
use crate::infra::errors::PipelineError;
use crate::infra::store;
use crate::judge::runner::JudgeRunner;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::google::GoogleProvider;
use crate::provider::mock::MockProvider;
use crate::provider::openai::OpenAiProvider;
use crate::provider::Provider;
use crate::report::aggregate::generate_report;
use crate::summarize::runner::SummarizeRunner;
use crate::summarize::schema::Summary;

/// Everything a stage handler needs, resolved once at startup.
pub struct PipelineEnv {
    pub provider: Arc<dyn Provider>,
    pub pricing: Option<Pricing>,
    pub workers: usize,
    pub temperature: f32,
    pub seed: Option<u64>,
    pub data_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub rubric_path: PathBuf,
    pub run_dir: PathBuf,
    pub audit: Arc<AuditLogger>,
}

/// Provider factory. Real providers fail fast when their API key is unset;
/// the mock provider never needs one.
pub fn make_provider(
    kind: ProviderKind,
    size: ModelSize,
    settings: &Settings,
    registry: &ModelRegistry,
) -> Result<(Arc<dyn Provider>, Option<Pricing>), PipelineError> {
    if kind == ProviderKind::Mock {
        return Ok((Arc::new(MockProvider::new()), None));
    }

    let model_id = registry
        .get_model_id(kind.as_str(), size.as_str())
        .ok_or_else(|| {
            PipelineError::Config(format!(
                "No model registered for {}/{}",
                kind.as_str(),
                size.as_str()
            ))
        })?
        .to_string();
    let pricing = registry.get_pricing(kind.as_str(), size.as_str());

    let provider: Arc<dyn Provider> = match kind {
        ProviderKind::Openai => {
            let api_key = settings
                .openai_api_key
                .clone()
                .ok_or_else(|| PipelineError::Config("OPENAI_API_KEY not set".into()))?;
            Arc::new(OpenAiProvider::new(api_key, model_id))
        }
        ProviderKind::Anthropic => {
            let api_key = settings
                .anthropic_api_key
                .clone()
                .ok_or_else(|| PipelineError::Config("ANTHROPIC_API_KEY not set".into()))?;
            Arc::new(AnthropicProvider::new(api_key, model_id))
        }
        ProviderKind::Google => {
            let api_key = settings
                .google_api_key
                .clone()
                .ok_or_else(|| PipelineError::Config("GOOGLE_API_KEY not set".into()))?;
            Arc::new(GoogleProvider::new(api_key, model_id))
        }
        ProviderKind::Mock => unreachable!(),
    };

    Ok((provider, pricing))
}

pub fn new_run_dir(runs_root: &Path) -> Result<PathBuf, PipelineError> {
    let run_id = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let run_dir = runs_root.join(&run_id);
    std::fs::create_dir_all(&run_dir)?;
    println!("[cli] Run ID: {run_id}");
    println!("[cli] Run directory: {}\n", run_dir.display());
    Ok(run_dir)
}

/// Most recent run directory, optionally filtered to runs that already
/// produced `required_file`. Lexicographic order on the timestamp names is
/// chronological.
pub fn latest_run_dir(
    runs_root: &Path,
    required_file: Option<&str>,
) -> Result<Option<PathBuf>, PipelineError> {
    if !runs_root.exists() {
        return Ok(None);
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(runs_root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.reverse();

    match required_file {
        Some(file) => Ok(dirs.into_iter().find(|d| d.join(file).exists())),
        None => Ok(dirs.into_iter().next()),
    }
}

pub async fn cmd_generate(
    env: &PipelineEnv,
    n: usize,
    regenerate: bool,
) -> Result<(), PipelineError> {
    let transcripts_file = env.data_dir.join("transcripts.jsonl");
    let generator = DatasetGenerator::new(
        env.provider.clone(),
        &env.data_dir,
        Some(env.audit.clone()),
        env.pricing.clone(),
        env.seed,
    )?;

    if !transcripts_file.exists() {
        let transcripts = generator.generate(n, env.workers).await?;
        generator.save(&transcripts)?;
        println!("[generate] ✓ Generated {} transcripts", transcripts.len());
        return Ok(());
    }

    let existing: Vec<Transcript> = store::read_jsonl(&transcripts_file).unwrap_or_default();

    if regenerate {
        println!(
            "[generate] Regenerating dataset (replacing {} existing transcripts)",
            existing.len()
        );
        std::fs::remove_file(&transcripts_file)?;
        let transcripts = generator.generate(n, env.workers).await?;
        generator.save(&transcripts)?;
        println!("[generate] ✓ Generated {} new transcripts", transcripts.len());
    } else if existing.len() >= n {
        println!(
            "[generate] Dataset already has {} transcripts (target: {n})",
            existing.len()
        );
        println!("[generate] Use --regenerate to replace existing dataset");
    } else {
        let delta = n - existing.len();
        println!(
            "[generate] Found {} existing transcripts, generating {delta} more to reach {n}",
            existing.len()
        );
        let new_transcripts = generator.generate(delta, env.workers).await?;

        // Renumber the merged set so IDs stay sequential under one stamp
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut all = existing;
        all.extend(new_transcripts);
        for (idx, t) in all.iter_mut().enumerate() {
            t.call_id = format!("TRA-{stamp}-{:03}", idx + 1);
        }
        generator.save(&all)?;
        println!("[generate] ✓ Added {delta} transcripts (total: {})", all.len());
    }
    Ok(())
}

pub async fn cmd_summarize(env: &PipelineEnv) -> Result<Vec<Summary>, PipelineError> {
    let transcripts_file = env.data_dir.join("transcripts.jsonl");
    if !transcripts_file.exists() {
        return Err(PipelineError::Config(
            "No transcripts found. Run 'generate' first.".into(),
        ));
    }
    let transcripts: Vec<Transcript> = store::read_jsonl(&transcripts_file)?;
    println!("[summarize] Loading {} transcripts...", transcripts.len());

    let runner = SummarizeRunner::new(
        env.provider.clone(),
        &env.prompts_dir,
        &env.run_dir,
        Some(env.audit.clone()),
        env.pricing.clone(),
        env.temperature,
        env.seed,
    )?;
    runner.run(&transcripts, env.workers).await
}

pub async fn cmd_judge(env: &PipelineEnv) -> Result<Vec<Evaluation>, PipelineError> {
    let summaries_file = env.run_dir.join("summaries.jsonl");
    if !summaries_file.exists() {
        return Err(PipelineError::Config(
            "No summaries found. Run 'summarize' first.".into(),
        ));
    }
    let summaries: Vec<Summary> = store::read_jsonl(&summaries_file)?;
    let transcripts: Vec<Transcript> = store::read_jsonl(&env.data_dir.join("transcripts.jsonl"))?;
    let (transcripts, summaries) = align_pairs(transcripts, summaries);

    let runner = JudgeRunner::new(
        env.provider.clone(),
        &env.prompts_dir,
        &env.rubric_path,
        &env.run_dir,
        Some(env.audit.clone()),
        env.pricing.clone(),
        env.temperature,
        env.seed,
    )?;
    runner.run(&transcripts, &summaries, env.workers).await
}

pub fn cmd_report(env: &PipelineEnv) -> Result<(), PipelineError> {
    let evaluations_file = env.run_dir.join("evaluations.jsonl");
    if !evaluations_file.exists() {
        return Err(PipelineError::Config(
            "No evaluations found. Run 'judge' first.".into(),
        ));
    }
    let evaluations: Vec<Evaluation> = store::read_jsonl(&evaluations_file)?;
    println!(
        "[report] Generating report for {} evaluations...",
        evaluations.len()
    );

    let report_file = env.run_dir.join("report.md");
    generate_report(&evaluations, env.audit.calls_file(), &report_file)?;

    println!("\n{}", "=".repeat(60));
    print!("{}", std::fs::read_to_string(&report_file)?);
    println!("{}", "=".repeat(60));
    Ok(())
}

pub async fn cmd_run(env: &PipelineEnv, n: usize) -> Result<(), PipelineError> {
    cmd_generate(env, n, false).await?;
    cmd_summarize(env).await?;
    cmd_judge(env).await?;
    cmd_report(env)
}

/// Pair transcripts with summaries by call ID, in summary order. Summaries
/// whose transcript is missing are skipped, not errors; earlier stages may
/// have dropped items.
fn align_pairs(
    transcripts: Vec<Transcript>,
    summaries: Vec<Summary>,
) -> (Vec<Transcript>, Vec<Summary>) {
    let by_id: std::collections::BTreeMap<String, Transcript> = transcripts
        .into_iter()
        .map(|t| (t.call_id.clone(), t))
        .collect();

    let mut paired_transcripts = Vec::new();
    let mut paired_summaries = Vec::new();
    for summary in summaries {
        if let Some(t) = by_id.get(&summary.call_id) {
            paired_transcripts.push(t.clone());
            paired_summaries.push(summary);
        }
    }
    (paired_transcripts, paired_summaries)
}
