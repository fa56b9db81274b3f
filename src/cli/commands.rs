//! CLI command definitions for evalforge.
//!
//! Every command reads backend and provider settings from the environment
//! (see [`AppConfig::from_env`]); flags only carry per-invocation arguments.

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, EmbeddingBackend};
use crate::evaluators::embeddings::DEFAULT_EMBEDDING_MODEL;
use crate::evaluators::{EmbeddingProvider, EvaluatorRegistry, HashEmbedder, OpenAiEmbedder};
use crate::llm::{AnthropicProvider, ModelInvoker, OpenAiProvider};
use crate::metrics::{export_metrics, init_metrics};
use crate::scheduler::{
    BatchExecutor, EvaluationWorker, JobQueue, JobSubmission, RedisQueueStore, WorkerConfig,
};
use crate::service::EvaluationService;
use crate::storage::{Database, DEFAULT_RESULTS_LIMIT};

/// Evaluation job runner for LLM prompt experiments.
#[derive(Parser)]
#[command(name = "evalforge")]
#[command(about = "Queue, run and inspect LLM evaluation jobs")]
#[command(version)]
#[command(
    long_about = "evalforge evaluates a dataset against a prompt/model configuration.\n\nJobs are queued in Redis, executed by a worker in concurrent batches, scored by pluggable evaluators, and recorded in PostgreSQL.\n\nExample usage:\n  evalforge migrate\n  evalforge runs create baseline\n  evalforge submit job.yaml\n  evalforge worker"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the worker loop until interrupted.
    Worker(WorkerArgs),

    /// Submit a job from a JSON or YAML file.
    Submit(SubmitArgs),

    /// Show a job's status.
    Status(JobArgs),

    /// Show a run's progress.
    Progress(RunArgs),

    /// List a run's results and metrics.
    Results(ResultsArgs),

    /// Cancel a run that has not finished.
    Cancel(RunArgs),

    /// Manage experiment runs.
    Runs(RunsArgs),

    /// Apply database migrations.
    Migrate,

    /// List the built-in evaluators.
    Evaluators,
}

/// Arguments for `evalforge worker`.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Write Prometheus metrics to this file on shutdown.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// Identifier used in worker logs.
    #[arg(long)]
    pub id: Option<String>,
}

/// Arguments for `evalforge submit`.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Submission file (`.json`, `.yaml` or `.yml`).
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct JobArgs {
    pub job_id: Uuid,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    pub run_id: Uuid,
}

/// Arguments for `evalforge results`.
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    pub run_id: Uuid,

    /// Maximum rows to return.
    #[arg(long, default_value_t = DEFAULT_RESULTS_LIMIT)]
    pub limit: i64,

    /// Rows to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: i64,
}

#[derive(Parser, Debug)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub command: RunsSubcommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum RunsSubcommand {
    /// Create a pending run and print it.
    Create {
        /// Human-readable run name.
        name: String,
    },
}

/// Parse CLI arguments without running any command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse the process arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Evaluators = cli.command {
        let registry = EvaluatorRegistry::with_builtins(
            Arc::new(ModelInvoker::new()),
            Arc::new(HashEmbedder::default()),
        );
        return print_json(&registry.available());
    }

    let config = AppConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Worker(args) => run_worker_command(&config, args).await,
        Commands::Migrate => {
            let db = Database::connect(&config.database_url).await?;
            let applied = db.run_migrations().await?;
            info!(applied = applied, "Migrations complete");
            Ok(())
        }
        Commands::Submit(args) => {
            let submission = read_submission(&args.file)?;
            let receipt = connect_service(&config).await?.submit(submission).await?;
            print_json(&receipt)
        }
        Commands::Status(args) => {
            let view = connect_service(&config).await?.job_status(args.job_id).await?;
            print_json(&view)
        }
        Commands::Progress(args) => {
            let progress = connect_service(&config)
                .await?
                .run_progress(args.run_id)
                .await?;
            print_json(&progress)
        }
        Commands::Results(args) => {
            let results = connect_service(&config)
                .await?
                .run_results(args.run_id, args.limit, args.offset)
                .await?;
            print_json(&results)
        }
        Commands::Cancel(args) => {
            let run = connect_service(&config).await?.cancel_run(args.run_id).await?;
            print_json(&run)
        }
        Commands::Runs(args) => match args.command {
            RunsSubcommand::Create { name } => {
                let run = connect_service(&config).await?.create_run(&name).await?;
                print_json(&run)
            }
        },
        Commands::Evaluators => Ok(()),
    }
}

// ============================================================================
// Wiring
// ============================================================================

async fn connect_queue(config: &AppConfig) -> anyhow::Result<JobQueue> {
    let store = RedisQueueStore::connect(&config.redis_url)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;
    Ok(JobQueue::new(Arc::new(store), config.queue_name.clone()))
}

async fn connect_service(config: &AppConfig) -> anyhow::Result<EvaluationService> {
    let queue = connect_queue(config).await?;
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    Ok(EvaluationService::new(queue, Arc::new(db)))
}

/// Register every provider; one without a key fails its calls with a
/// missing-credential error unless the request carries its own key.
fn build_invoker(config: &AppConfig) -> anyhow::Result<ModelInvoker> {
    let openai = OpenAiProvider::with_timeout(
        config.openai_api_base.clone(),
        config.openai_api_key.clone(),
        config.request_timeout,
    )?;
    let anthropic = AnthropicProvider::with_timeout(
        config.anthropic_api_base.clone(),
        config.anthropic_api_key.clone(),
        config.request_timeout,
    )?;

    if config.openai_api_key.is_none() && config.anthropic_api_key.is_none() {
        warn!("No provider API keys configured; model calls will fail");
    }

    Ok(ModelInvoker::new()
        .with_provider("openai", Arc::new(openai))
        .with_provider("anthropic", Arc::new(anthropic)))
}

fn build_embedder(config: &AppConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match (config.embeddings, config.openai_api_key.as_deref()) {
        (EmbeddingBackend::OpenAi, Some(key)) => Ok(Arc::new(OpenAiEmbedder::new(
            config.openai_api_base.clone(),
            key,
            DEFAULT_EMBEDDING_MODEL,
        )?)),
        (EmbeddingBackend::OpenAi, None) => {
            anyhow::bail!("openai embeddings require OPENAI_API_KEY")
        }
        (EmbeddingBackend::Hash, _) => Ok(Arc::new(HashEmbedder::default())),
    }
}

async fn run_worker_command(config: &AppConfig, args: WorkerArgs) -> anyhow::Result<()> {
    if let Err(e) = init_metrics() {
        warn!(error = %e, "Metrics registry unavailable");
    }

    let invoker = Arc::new(build_invoker(config)?);
    info!(providers = ?invoker.provider_names(), "Model providers registered");
    let registry = Arc::new(EvaluatorRegistry::with_builtins(
        invoker.clone(),
        build_embedder(config)?,
    ));
    info!(evaluators = ?registry.available(), "Evaluator registry ready");

    let queue = connect_queue(config).await?;
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let worker_config = WorkerConfig::default()
        .with_poll_interval(config.poll_interval)
        .with_failure_backoff(config.failure_backoff);
    let mut worker = EvaluationWorker::new(
        queue,
        Arc::new(db),
        BatchExecutor::new(invoker, registry),
        worker_config,
    );
    if let Some(id) = args.id {
        worker = worker.with_id(id);
    }
    let worker = Arc::new(worker);

    let stopper = Arc::clone(&worker);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested; finishing current job");
            stopper.stop();
        }
    });

    worker.run().await;

    if let Some(path) = args.metrics_out {
        std::fs::write(&path, export_metrics())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "Wrote metrics");
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Read a submission, choosing the format by file extension.
fn read_submission(path: &Path) -> anyhow::Result<JobSubmission> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_submission(&content, path)
}

fn parse_submission(content: &str, path: &Path) -> anyhow::Result<JobSubmission> {
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let submission = if is_yaml {
        serde_yaml::from_str(content)
            .with_context(|| format!("Invalid YAML submission in {}", path.display()))?
    } else {
        serde_json::from_str(content)
            .with_context(|| format!("Invalid JSON submission in {}", path.display()))?
    };
    Ok(submission)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
