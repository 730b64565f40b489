// src/cli/mod.rs — CLI definition (clap derive)

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "callgrade", about = "Eval-first call summary pipeline", version)]
pub struct Cli {
    /// LLM provider backing all stages
    #[arg(long, value_enum, default_value_t = ProviderKind::Mock)]
    pub provider: ProviderKind,

    /// Model size class, resolved through the model registry
    #[arg(long, value_enum, default_value_t = ModelSize::Small)]
    pub model: ModelSize,

    /// Concurrent workers per batch (defaults from settings)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Sampling temperature for summarize/judge calls
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Seed forwarded to providers that support it
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory holding the transcript dataset
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Root directory for per-run artifacts
    #[arg(long, default_value = "runs")]
    pub runs_dir: String,

    /// Directory holding prompt templates
    #[arg(long, default_value = "prompts")]
    pub prompts_dir: String,

    /// Rubric definition file
    #[arg(long, default_value = "configs/rubric.default.json")]
    pub rubric: String,

    /// Model registry file
    #[arg(long, default_value = "configs/models.yaml")]
    pub models_config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a synthetic transcript dataset
    Generate {
        /// Target dataset size (defaults from settings)
        #[arg(short)]
        n: Option<usize>,
        /// Delete and regenerate the entire dataset
        #[arg(long)]
        regenerate: bool,
    },
    /// Summarize transcripts into structured summaries
    Summarize,
    /// Evaluate summaries against the rubric
    Judge,
    /// Aggregate evaluations into a markdown report
    Report,
    /// Run the full pipeline: generate, summarize, judge, report
    Run {
        /// Target dataset size (defaults from settings)
        #[arg(short)]
        n: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Openai,
    Anthropic,
    Google,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelSize {
    Small,
    Large,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Small => "small",
            ModelSize::Large => "large",
        }
    }
}
