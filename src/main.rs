//! viewhostd: runs the view lifecycle manager over child-process
//! browsing contexts and inspects its on-disk state.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use viewhost::clock::SystemClock;
use viewhost::hibernation::resolve_policy;
use viewhost::hibernation::scheduler::{HibernationScheduler, SchedulerConfig};
use viewhost::lifecycle::DEFAULT_IDLE_THRESHOLD;
use viewhost::provider::process::{ProcessConfig, ProcessProvider};
use viewhost::store::catalog::{DEFAULT_INSTANCE, JsonCatalog};
use viewhost::store::ledger::FileLedger;
use viewhost::store::{ConfigStore, HibernationLedger, StoreError};
use viewhost::view::partition;
use viewhost::{LifecycleError, LifecycleManager, ManagerConfig, ViewKey};

#[derive(Debug, Parser)]
#[command(name = "viewhostd", version, about = "Embedded view lifecycle and hibernation manager")]
struct Cli {
    /// Log filter (e.g. `debug`, `viewhost=trace`). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the manager until interrupted.
    Run(RunArgs),
    /// Print each app's effective hibernation policy and the hibernated views.
    Status {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        ledger: PathBuf,
    },
    /// Print the partition key of an app instance.
    Partition {
        #[arg(long)]
        catalog: PathBuf,
        app: String,
        #[arg(long, default_value = DEFAULT_INSTANCE)]
        instance: String,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// JSON catalog of apps, workspaces and exclusions.
    #[arg(long)]
    catalog: PathBuf,
    /// Hibernation ledger file.
    #[arg(long)]
    ledger: PathBuf,
    /// Directory holding one profile directory per partition.
    #[arg(long)]
    profile_root: PathBuf,
    /// Program hosting each view.
    #[arg(long)]
    program: PathBuf,
    /// Argument template; `{url}`, `{partition}` and `{profile_dir}` are
    /// substituted. Repeatable.
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,
    #[arg(long, default_value_t = 30)]
    tick_secs: u64,
    #[arg(long, default_value_t = 0)]
    jitter_ms: u64,
    /// Idle threshold when neither catalog nor app sets one.
    #[arg(long, default_value_t = DEFAULT_IDLE_THRESHOLD.as_secs() / 60)]
    idle_minutes: u64,
    /// View to bring to the foreground at startup (`app` or `app/instance`).
    #[arg(long)]
    show: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid view {0:?}: expected `app` or `app/instance`")]
    BadView(String),
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_view(text: &str) -> Result<ViewKey, CliError> {
    let (app, instance) = text.split_once('/').unwrap_or((text, DEFAULT_INSTANCE));
    if app.is_empty() || instance.is_empty() || instance.contains('/') {
        return Err(CliError::BadView(text.to_string()));
    }
    Ok(ViewKey::new(app, instance))
}

async fn run(args: RunArgs) -> Result<(), CliError> {
    let catalog = Arc::new(JsonCatalog::open(&args.catalog)?);
    let ledger = Arc::new(FileLedger::open(&args.ledger).await?);
    tokio::fs::create_dir_all(&args.profile_root).await?;

    let provider = Arc::new(ProcessProvider::new(
        ProcessConfig::new(args.program, args.profile_root).with_args(args.args),
    ));
    let config = ManagerConfig {
        default_idle_threshold: Duration::from_secs(args.idle_minutes.saturating_mul(60)),
        ..ManagerConfig::default()
    };
    let manager = Arc::new(LifecycleManager::new(
        provider,
        catalog,
        ledger,
        Arc::new(SystemClock),
        config,
    ));
    manager.restore().await;

    let scheduler = HibernationScheduler::new(
        manager.clone(),
        SchedulerConfig {
            tick: Duration::from_secs(args.tick_secs.max(1)),
            jitter: Duration::from_millis(args.jitter_ms),
        },
    );
    scheduler.start();

    let outcome = serve(&manager, args.show.as_deref()).await;

    scheduler.stop().await;
    manager.shutdown().await;
    outcome
}

async fn serve(manager: &LifecycleManager<ProcessProvider>, show: Option<&str>) -> Result<(), CliError> {
    if let Some(view) = show {
        let key = parse_view(view)?;
        manager.show(&key, None).await?;
    }
    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received; shutting down");
    Ok(())
}

async fn status(catalog: PathBuf, ledger: PathBuf) -> Result<(), CliError> {
    let catalog = JsonCatalog::open(&catalog)?;
    let ledger = FileLedger::open(&ledger).await?;
    let excluded = catalog.excluded_app_ids();

    for app in catalog.apps() {
        let policy = resolve_policy(&catalog, &app.id, DEFAULT_IDLE_THRESHOLD);
        let hibernation = if excluded.contains(&app.id) {
            "excluded".to_string()
        } else if policy.enabled {
            format!("after {}m idle", policy.idle_threshold.as_secs() / 60)
        } else {
            "disabled".to_string()
        };
        println!(
            "{}\t{}\t{}\t{}\t{}",
            app.id,
            app.workspace_id,
            app.sharing_mode,
            catalog.instances(&app.id).join(","),
            hibernation
        );
    }
    for view in ledger.load_hibernated().await? {
        println!("hibernated\t{}\t{}\t{}", view.key, view.partition, view.url);
    }
    Ok(())
}

fn print_partition(catalog: PathBuf, app_id: &str, instance: &str) -> Result<(), CliError> {
    let catalog = JsonCatalog::open(&catalog)?;
    let app = catalog.app(app_id).ok_or_else(|| LifecycleError::UnknownApp {
        app_id: app_id.to_string(),
    })?;
    println!(
        "{}",
        partition::resolve(&app.id, instance, &app.workspace_id, app.sharing_mode)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Status { catalog, ledger } => status(catalog, ledger).await,
        Command::Partition {
            catalog,
            app,
            instance,
        } => print_partition(catalog, &app, &instance),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("viewhostd: {e}");
            ExitCode::FAILURE
        }
    }
}
