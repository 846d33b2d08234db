use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use lbsim_core::app::{DispatchCoordinator, DispatchReport};
use lbsim_core::config::{LogFormat, SimConfig};
use lbsim_core::domain::{Algorithm, TASK_CATALOG, TaskStatus, TaskType, catalog_entry};
use lbsim_core::impls::{LocalTransport, RouterTransport};
use lbsim_core::ports::{UniformLatency, WorkerTransport};
use lbsim_core::worker::{WorkerCapacityService, router};

#[derive(Parser, Debug)]
#[command(name = "lbsim", version, about = "Load-balancer simulator")]
struct Cli {
    /// TOML config file (defaults and LBSIM_* env vars apply without it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the worker endpoints over HTTP until Ctrl-C
    Serve,
    /// Run a batch of concurrent submissions and print the activity log
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// round-robin | least-connections | weighted
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    #[arg(short = 'n', long, default_value_t = 12)]
    count: usize,

    /// Task types to cycle through; the whole catalog when omitted
    #[arg(short = 't', long = "task-type")]
    task_types: Vec<String>,

    /// Go through the HTTP router instead of calling the service directly
    #[arg(long)]
    over_router: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Print the final state as JSON instead of the log
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SimConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(&config)?;

    match cli.command {
        Command::Serve => serve(&config).await,
        Command::Simulate(args) => simulate(&config, args).await,
    }
}

fn init_logging(config: &SimConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format {
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).pretty())
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
    .context("failed to initialize logging")
}

fn build_service(config: &SimConfig, seed: Option<u64>) -> Result<Arc<WorkerCapacityService>> {
    let pool = config.worker_pool()?;
    let latency = match seed {
        Some(seed) => UniformLatency::seeded(seed),
        None => UniformLatency::from_entropy(),
    };
    Ok(Arc::new(
        WorkerCapacityService::new(pool.ids(), config.capacity.max_in_flight)
            .with_durations(config.duration_table())
            .with_latency(Arc::new(latency)),
    ))
}

async fn serve(config: &SimConfig) -> Result<()> {
    let service = build_service(config, config.dispatch.seed)?;
    let address = config.listen_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    info!(
        address = %address,
        max_in_flight = service.max_in_flight(),
        "worker endpoints listening"
    );
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("worker endpoints stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
    }
}

async fn simulate(config: &SimConfig, args: SimulateArgs) -> Result<()> {
    let seed = args.seed.or(config.dispatch.seed);
    let service = build_service(config, seed)?;
    let transport: Arc<dyn WorkerTransport> = if args.over_router {
        Arc::new(RouterTransport::new(router(service.clone())))
    } else {
        Arc::new(LocalTransport::new(service.clone()))
    };

    let mut builder = DispatchCoordinator::builder(transport)
        .pool(&config.worker_pool()?)
        .algorithm(args.algorithm.unwrap_or(config.dispatch.algorithm))
        .visible_window_ms(config.dispatch.visible_window_ms);
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    let coordinator = Arc::new(builder.build()?);

    let task_types: Vec<String> = if args.task_types.is_empty() {
        TASK_CATALOG.iter().map(|d| d.task_type.to_string()).collect()
    } else {
        args.task_types
    };

    info!(
        count = args.count,
        algorithm = coordinator.snapshot().algorithm.name(),
        over_router = args.over_router,
        "starting simulation"
    );
    let handles: Vec<_> = task_types
        .iter()
        .cycle()
        .take(args.count)
        .map(|task_type| {
            let label = catalog_entry(task_type)
                .map(|d| d.label.to_string())
                .unwrap_or_else(|| task_type.clone());
            coordinator.spawn_submit(TaskType::new(task_type.as_str()), label)
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.await.context("submission task panicked")?);
    }

    let state = coordinator.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }
    for entry in state.log.iter().rev() {
        let marker = if entry.ok { ' ' } else { '!' };
        println!("{} {} {}", entry.timestamp.format("%H:%M:%S%.3f"), marker, entry.text);
    }
    print_summary(&reports);
    Ok(())
}

fn print_summary(reports: &[DispatchReport]) {
    let mut per_worker: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for report in reports {
        let counts = per_worker.entry(report.worker.label()).or_default();
        match report.status {
            TaskStatus::Done => counts.0 += 1,
            _ => counts.1 += 1,
        }
    }

    println!();
    for (worker, (done, failed)) in &per_worker {
        println!("{worker}: {done} done, {failed} failed");
    }
    let retried = reports.iter().filter(|r| r.retried).count();
    println!("{} tasks, {} retried", reports.len(), retried);
}
