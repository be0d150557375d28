use clap::Parser;
use gearman_worker::handler::{EchoHandler, ReverseHandler};
use gearman_worker::{JobRegistry, Phase, Worker, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gearman-worker")]
#[command(about = "Gearman job worker", long_about = None)]
struct Args {
    /// Job server address (host or host:port), may be repeated
    #[arg(short, long = "server")]
    servers: Vec<String>,

    /// Worker ID (auto-generated if not provided)
    #[arg(long)]
    worker_id: Option<String>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Job types to announce; defaults to every registered handler
    #[arg(short, long = "ability")]
    abilities: Vec<String>,

    /// Server-side timeout in seconds for announced job types
    #[arg(long)]
    timeout: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        WorkerConfig::from_file(config_path)?
    } else {
        WorkerConfig::default()
    };

    // Override with CLI args
    if !args.servers.is_empty() {
        config.servers = args.servers;
    }
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }

    let registry = JobRegistry::new();
    registry.register("reverse", ReverseHandler);
    registry.register("echo", EchoHandler);

    let abilities = if args.abilities.is_empty() {
        registry.functions()
    } else {
        args.abilities
    };

    tracing::info!("Registered job types: {:?}", registry.functions());

    let mut worker = Worker::connect(config, registry).await?;
    for function in &abilities {
        worker.add_ability(function, args.timeout).await;
    }

    worker.attach_callback(Phase::Fail, |event| {
        tracing::warn!(
            handle = event.handle(),
            function = event.function(),
            "Job reported as failed"
        );
    });

    // Handle shutdown signals
    let shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        shutdown.cancel();
    });

    worker.run_forever().await;
    worker.end_work();

    Ok(())
}
