//! Ledger command-line dispatcher

use anyhow::Context;
use clap::{Parser, Subcommand};
use kyc_ledger::{
    config::StorageBackend, spawn_router_actor, storage, CommandRouter, Config, Invocation,
    Metrics, Response, RouterHandle, TransactionEngine,
};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "KYC ledger dispatcher", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-memory store regardless of configuration
    #[arg(long, global = true)]
    memory: bool,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed two entities: A Aval B Bval
    Init {
        /// Entity names and balances
        #[arg(num_args = 0.., allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run one operation: OP ARGS...
    Invoke {
        /// Operation name followed by its arguments
        #[arg(num_args = 0.., allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Read JSON invocations from stdin, one per line
    Script,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env()?,
    };
    if cli.memory {
        config.backend = StorageBackend::Memory;
    }

    init_tracing(&config);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        backend = ?config.backend,
        "Starting ledger dispatcher"
    );

    let store = storage::open_store(&config)?;
    let metrics = Metrics::new()?;
    let engine = TransactionEngine::new(store, &config);
    let router = CommandRouter::new(engine, metrics.clone())?;
    let (handle, actor_task) = spawn_router_actor(router, config.actor.mailbox_capacity);

    let last = match cli.command {
        Commands::Init { args } => {
            let response = handle.init(Invocation::new("init", args)).await?;
            print_response(&response)?;
            Some(response)
        }
        Commands::Invoke { args } => {
            let response = handle.invoke(Invocation::new("invoke", args)).await?;
            print_response(&response)?;
            Some(response)
        }
        Commands::Script => run_script(&handle).await?,
    };

    handle.shutdown().await?;
    // The store closes when the actor drops its router
    actor_task.await.context("router actor panicked")?;

    if cli.metrics {
        eprint!("{}", metrics.render()?);
    }

    if last.map_or(false, |response| !response.is_ok()) {
        std::process::exit(1);
    }

    Ok(())
}

/// Each stdin line is an `Invocation` as JSON; `init` routes to the seed entry point
async fn run_script(handle: &RouterHandle) -> anyhow::Result<Option<Response>> {
    let stdin = std::io::stdin();
    let mut last = None;

    for (number, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let invocation: Invocation = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid invocation", number + 1))?;

        let response = if invocation.function == "init" {
            handle.init(invocation).await?
        } else {
            handle.invoke(invocation).await?
        };

        print_response(&response)?;
        last = Some(response);
    }

    Ok(last)
}

fn print_response(response: &Response) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&response.to_json())?);
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    // Logs go to stderr; stdout carries responses
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
