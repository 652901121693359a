//! A `clap`-derived CLI exposing the engine for local operation: submit a
//! sweep spec file, poll status, fetch the best-run archive, and manage
//! the model registry. This is the crate's own stand-in for the HTTP
//! surface's process, since the HTTP framework itself is out of scope.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::EngineConfig;
use crate::dispatch::{Dispatcher, InProcessDispatcher};
use crate::executions::ExecutionRegistry;
use crate::http::{DssService, DssSurface, SubmitRequest};
use crate::registry::{DuplicatePolicy, ModelRegistry};
use crate::sweep::spec::SweepSpec;

#[derive(Debug, Parser)]
#[command(name = "wqdss")]
#[command(about = "Water quality decision-support parameter-sweep engine")]
#[command(version)]
#[command(long_about = "\
wqdss drives parameter-sweep calibration runs of an external hydrological \
model: submit a sweep specification, poll its status, and retrieve the \
best-scoring run's archive. Example:\n\
\n\
  wqdss submit spec.json\n\
  wqdss status <exec-id>\n\
  wqdss best-run <exec-id> out.zip\n\
  wqdss models add my-model model.zip\n")]
pub struct Cli {
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a sweep specification file and print the new execution id.
    Submit(SubmitArgs),
    /// Print the status (and result, once completed) of an execution.
    Status(StatusArgs),
    /// Write a completed execution's best-run archive to a file.
    BestRun(BestRunArgs),
    /// List known executions.
    Executions,
    /// Manage the model registry.
    #[command(subcommand)]
    Models(ModelsCommands),
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Path to a JSON sweep specification.
    pub spec_path: PathBuf,
    /// Overrides the spec's `model_run.model_name`.
    #[arg(long)]
    pub model_name: Option<String>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    pub exec_id: String,
}

#[derive(Debug, Args)]
pub struct BestRunArgs {
    pub exec_id: String,
    pub out_path: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum ModelsCommands {
    /// List registered models.
    List,
    /// Register a model archive under a name.
    Add {
        name: String,
        archive_path: PathBuf,
        #[arg(long)]
        ignore_already_exists: bool,
    },
    /// Fetch a registered model archive.
    Get { name: String, out_path: PathBuf },
}

pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    let registry = Arc::new(ModelRegistry::new(&config.base_model_dir));
    registry.load_from_disk()?;

    let dispatcher: Arc<dyn Dispatcher> =
        Arc::new(InProcessDispatcher::new(Arc::clone(&registry), config.model_exe.clone()));
    let executions = ExecutionRegistry::new();
    let service = DssService::new(
        Arc::clone(&registry),
        executions,
        dispatcher,
        config.num_parallel_execs,
        config.best_runs_dir.clone(),
    );

    match cli.command {
        Commands::Submit(args) => {
            let contents = std::fs::read_to_string(&args.spec_path)?;
            let spec: SweepSpec = serde_json::from_str(&contents)?;
            let response = service.submit(SubmitRequest { input: spec, model_name: args.model_name }).await?;
            println!("{}", response.id);
        }
        Commands::Status(args) => {
            let response = service.status(&args.exec_id).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::BestRun(args) => {
            let bytes = service
                .best_run(&args.exec_id)
                .await
                .map_err(|e| anyhow::anyhow!("execution '{}' has no best run yet", e.exec_id))?;
            std::fs::write(&args.out_path, bytes)?;
            info!(path = %args.out_path.display(), "wrote best-run archive");
        }
        Commands::Executions => {
            let response = service.executions().await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Models(models_command) => run_models_command(&registry, models_command)?,
    }

    Ok(())
}

fn run_models_command(registry: &ModelRegistry, command: ModelsCommands) -> anyhow::Result<()> {
    match command {
        ModelsCommands::List => {
            for name in registry.list()? {
                println!("{name}");
            }
        }
        ModelsCommands::Add { name, archive_path, ignore_already_exists } => {
            let bytes = std::fs::read(&archive_path)?;
            let policy = if ignore_already_exists { DuplicatePolicy::Ignore } else { DuplicatePolicy::Reject };
            registry.add(&name, &bytes, policy)?;
            println!("{name}");
        }
        ModelsCommands::Get { name, out_path } => {
            let bytes = registry.get(&name)?;
            std::fs::write(&out_path, bytes)?;
        }
    }
    Ok(())
}
