//! Standalone render server over a pool of command-line engines.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use dotrender_core::{CmdLineEngine, Engine, PoolEngine};
use dotrender_server::{BoundPortPolicy, ServerConfig, ServerHandle, stop_server};

#[derive(Parser)]
#[command(name = "dotrender-server")]
#[command(about = "Serve graph render jobs over a local port")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "10234")]
    port: u16,

    /// Number of pooled engine instances
    #[arg(long, default_value = "4")]
    pool_size: usize,

    /// Base name of the layout executable
    #[arg(long, default_value = "dot")]
    executable: String,

    /// Fail instead of reusing an already-running server on the port
    #[arg(long)]
    exclusive: bool,

    /// Stop the server running on the port and exit
    #[arg(long)]
    stop: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    if cli.stop {
        stop_server(cli.port).context("failed to stop server")?;
        return Ok(());
    }

    let executable = cli.executable.clone();
    let pool = PoolEngine::start(cli.pool_size, move || {
        Ok(Box::new(CmdLineEngine::new(executable.clone())) as Box<dyn Engine>)
    })
    .context("failed to start engine pool")?;

    let policy = if cli.exclusive {
        BoundPortPolicy::Fail
    } else {
        BoundPortPolicy::Reuse
    };
    let config = ServerConfig::new(cli.port).with_bound_port_policy(policy);

    let handle = ServerHandle::spawn(config, Arc::new(pool))
        .context("failed to start render server")?;

    tracing::info!(port = handle.port(), "render server running, stop with --stop");

    // Block until the listener exits (via a Stop job from any client).
    handle.join();
    Ok(())
}
