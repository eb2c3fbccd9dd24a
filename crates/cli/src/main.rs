use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use events::{event_channel, EventKind, RunEvent};
use node_core::{DedicationResponse, SessionId, UpgradeState};
use orchestrator::{Dedicator, HostProcessRunner, KeypairStore, Orchestrator};
use server::config::AgentConfig;
use server::{create_router, state::AppState};

#[derive(Parser)]
#[command(name = "pnode-agent")]
#[command(about = "Node management agent: upgrades, session control, disk dedication", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to ~/.pnode-agent/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Run the HTTP/WebSocket agent
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Dedicate disk space to the pod and publish it
    Dedicate {
        /// Additional space in GB
        #[arg(short, long)]
        size: u64,

        #[arg(short, long)]
        mount: PathBuf,
    },
    /// Run the upgrade workflow on this host
    Upgrade,
    /// Print the effective upgrade manifest
    Manifest,
    /// Show the node public key, generating the keypair on request
    Keypair {
        #[arg(long)]
        generate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = AgentConfig::load(cli.config.as_deref()).await;

    match cli.command {
        Some(Commands::Init { force }) => init_config(cli.config, force).await,
        Some(Commands::Serve { port }) => serve(config, port).await,
        Some(Commands::Dedicate { size, mount }) => dedicate(config, size, mount).await,
        Some(Commands::Upgrade) => upgrade(config).await,
        Some(Commands::Manifest) => manifest(&config),
        Some(Commands::Keypair { generate }) => keypair(config, generate).await,
        None => serve(config, None).await,
    }
}

async fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path
        .or_else(AgentConfig::default_path)
        .context("No home directory, pass --config")?;
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite",
            path.display()
        );
    }

    AgentConfig::default()
        .write(&path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn serve(mut config: AgentConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let port = config.server.port;

    tracing::info!(
        link_path = %config.dedication.link_path.display(),
        elevation = %config.elevation.program,
        "Starting agent"
    );

    let app = create_router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!();
    println!("pNode Agent");
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", port);
    println!("  WebSocket:   ws://localhost:{}/ws", port);
    println!("  Swagger UI:  http://localhost:{}/swagger-ui", port);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn dedicate(config: AgentConfig, size: u64, mount: PathBuf) -> Result<()> {
    let dedicator = Dedicator::host(config.dedication.link_path);
    let response = match dedicator.dedicate(size, &mount).await {
        Ok(dedication) => DedicationResponse::success(
            dedication.path.display().to_string(),
            dedication.symlink.display().to_string(),
        ),
        Err(err) => DedicationResponse::failure(err.to_string(), err.reason()),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.ok {
        anyhow::bail!("Dedication failed");
    }
    Ok(())
}

async fn upgrade(config: AgentConfig) -> Result<()> {
    let orchestrator = Orchestrator::new(
        Arc::new(HostProcessRunner::new()),
        config.elevation,
        config.upgrade,
    );
    println!(
        "{}",
        format!(
            "Upgrading: {} steps, then {} restart steps",
            orchestrator.manifest().streamed_step_count(),
            orchestrator.manifest().restart.len()
        )
        .dimmed()
    );

    let session_id = SessionId::new();
    let (tx, mut rx) = event_channel(session_id);
    let task = orchestrator.start_upgrade(tx)?;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    print_event(&event);
                    if event.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Interrupt received, cancelling".yellow());
                orchestrator.disconnect(&session_id);
            }
        }
    }

    let outcome = task.await.context("Upgrade task panicked")?;
    if let Some(restart) = outcome.restart {
        println!("{}", "Restarting services".dimmed());
        restart.await.context("Restart task panicked")?;
    }

    match outcome.state {
        UpgradeState::Completed => Ok(()),
        state => anyhow::bail!("Upgrade ended in state {}", state.as_str()),
    }
}

async fn keypair(config: AgentConfig, generate: bool) -> Result<()> {
    let store = KeypairStore::new(config.keypair.dir);
    let public_key = if generate {
        store.generate().await?
    } else {
        store.public_key().await?
    };

    println!("{}", public_key);
    Ok(())
}

fn manifest(config: &AgentConfig) -> Result<()> {
    let content = toml::to_string_pretty(&config.upgrade)?;
    print!("{}", content);
    Ok(())
}

fn print_event(event: &RunEvent) {
    match event.kind {
        EventKind::Stdout if event.data.starts_with("==> ") => {
            println!("{}", event.data.bold())
        }
        EventKind::Stdout => println!("{}", event.data),
        EventKind::Stderr => eprintln!("{}", event.data.dimmed()),
        EventKind::Error => eprintln!("{} {}", "error:".red().bold(), event.data),
        EventKind::Complete => println!("{}", event.data.green().bold()),
        EventKind::Cancelled => println!("{}", event.data.yellow().bold()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pnode_agent=info,server=info,orchestrator=info,tower_http=info".into()),
        )
        .init();
}
