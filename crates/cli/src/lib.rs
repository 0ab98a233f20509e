pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kendra_core::config::{
    AppConfig, ConfigOverrides, EmbeddingProviderKind, LoadOptions, LogFormat,
};
use tracing_subscriber::EnvFilter;

use commands::analytics::{
    ClustersArgs, RecommendCentersArgs, RecommendTrainingArgs, TrainingPlanArgs,
    UnderperformingArgs,
};
use commands::{CommandContext, CommandResult};

#[derive(Debug, Parser)]
#[command(
    name = "kendra",
    about = "Kendra center analytics CLI",
    long_about = "Cluster service centers, score them against their peers, \
                  and recommend where to launch services and what to train.",
    after_help = "Examples:
  kendra migrate
  kendra seed
  kendra index
  kendra underperforming --num-centers 5
  kendra recommend-centers --description \"income certificate\" --service-type certificate -k 5
  kendra recommend-training --center-id 3"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::Args)]
struct GlobalArgs {
    #[arg(
        long,
        global = true,
        help = "Config file (defaults to kendra.toml or config/kendra.toml)"
    )]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override embedding.provider (hashing|openai|ollama)")]
    embedding_provider: Option<EmbeddingProviderKind>,
    #[arg(long, global = true, help = "Override clustering.cluster_count")]
    clusters: Option<usize>,
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                embedding_provider: self.embedding_provider,
                cluster_count: self.clusters,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, embedding provider, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset (idempotent)")]
    Seed,
    #[command(about = "Embed every service and store the vectors")]
    Index,
    #[command(about = "Show the geographic clustering with members and centroids")]
    Clusters(ClustersArgs),
    #[command(about = "List centers scoring lowest (or highest) against their cluster peers")]
    Underperforming(UnderperformingArgs),
    #[command(about = "Rank centers for launching a new service")]
    RecommendCenters(RecommendCentersArgs),
    #[command(about = "Rank training needs for one center")]
    RecommendTraining(RecommendTrainingArgs),
    #[command(about = "Training needs for every center, largest total gap first")]
    TrainingPlan(TrainingPlanArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Doctor { .. } => "doctor",
            Self::Migrate => "migrate",
            Self::Seed => "seed",
            Self::Index => "index",
            Self::Clusters(_) => "clusters",
            Self::Underperforming(_) => "underperforming",
            Self::RecommendCenters(_) => "recommend-centers",
            Self::RecommendTraining(_) => "recommend-training",
            Self::TrainingPlan(_) => "training-plan",
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let context = CommandContext::new(cli.global.load_options());

    if let Ok(config) = AppConfig::load(context.options.clone()) {
        if let Err(error) = init_logging(&config) {
            eprintln!("logging disabled: {error:#}");
        }
    }

    let span = tracing::info_span!(
        "command",
        command = cli.command.name(),
        correlation_id = %context.correlation_id
    );
    let result = span.in_scope(|| dispatch(&context, &cli.command));

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn dispatch(context: &CommandContext, command: &Command) -> CommandResult {
    match command {
        Command::Config => commands::config::run(context),
        Command::Doctor { json } => commands::doctor::run(context, *json),
        Command::Migrate => commands::migrate::run(context),
        Command::Seed => commands::seed::run(context),
        Command::Index => commands::index::run(context),
        Command::Clusters(args) => commands::analytics::clusters(context, args),
        Command::Underperforming(args) => commands::analytics::underperforming(context, args),
        Command::RecommendCenters(args) => commands::analytics::recommend_centers(context, args),
        Command::RecommendTraining(args) => commands::analytics::recommend_training(context, args),
        Command::TrainingPlan(args) => commands::analytics::training_plan(context, args),
    }
}

/// Logs go to stderr so stdout carries only the JSON envelope.
fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .with_context(|| format!("invalid log level `{}`", config.logging.level))?;
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed
        .map_err(|error| anyhow::anyhow!(error))
        .context("failed to install tracing subscriber")
}
