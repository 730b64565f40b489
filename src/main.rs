// src/main.rs — callgrade entry point

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use callgrade::cli::commands::{
    self, cmd_generate, cmd_judge, cmd_report, cmd_run, cmd_summarize, make_provider, PipelineEnv,
};
use callgrade::cli::{Cli, Commands};
use callgrade::infra::audit::AuditLogger;
use callgrade::infra::config::{ModelRegistry, Settings};
use callgrade::infra::errors::PipelineError;
use callgrade::infra::logger;

#[tokio::main]
async fn main() {
    // RUST_LOG overrides the default level
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), PipelineError> {
    let cli = Cli::parse();

    let settings = Settings::from_env();
    let registry = ModelRegistry::load(Path::new(&cli.models_config))?;

    let (provider, pricing) = make_provider(cli.provider, cli.model, &settings, &registry)?;

    let runs_root = Path::new(&cli.runs_dir);
    let run_dir = match &cli.command {
        // A fresh dataset always starts a fresh run
        Commands::Generate { .. } | Commands::Run { .. } => commands::new_run_dir(runs_root)?,
        Commands::Summarize => commands::latest_run_dir(runs_root, None)?.ok_or_else(|| {
            PipelineError::Config("No run directory found. Run 'generate' first.".into())
        })?,
        Commands::Judge => commands::latest_run_dir(runs_root, Some("summaries.jsonl"))?
            .ok_or_else(|| {
                PipelineError::Config("No run with summaries found. Run 'summarize' first.".into())
            })?,
        Commands::Report => commands::latest_run_dir(runs_root, Some("evaluations.jsonl"))?
            .ok_or_else(|| {
                PipelineError::Config("No run with evaluations found. Run 'judge' first.".into())
            })?,
    };
    if !matches!(cli.command, Commands::Generate { .. } | Commands::Run { .. }) {
        println!(
            "[cli] Using run: {}\n",
            run_dir.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        );
    }

    let env = PipelineEnv {
        provider,
        pricing,
        workers: cli.workers.unwrap_or(settings.default_workers),
        temperature: cli.temperature.unwrap_or(settings.temperature),
        seed: cli.seed.or(settings.seed),
        data_dir: cli.data_dir.clone().into(),
        prompts_dir: cli.prompts_dir.clone().into(),
        rubric_path: cli.rubric.clone().into(),
        run_dir: run_dir.clone(),
        audit: Arc::new(AuditLogger::new(&run_dir)?),
    };

    match cli.command {
        Commands::Generate { n, regenerate } => {
            cmd_generate(&env, n.unwrap_or(settings.default_n), regenerate).await
        }
        Commands::Summarize => cmd_summarize(&env).await.map(|_| ()),
        Commands::Judge => cmd_judge(&env).await.map(|_| ()),
        Commands::Report => cmd_report(&env),
        Commands::Run { n } => cmd_run(&env, n.unwrap_or(settings.default_n)).await,
    }
}
