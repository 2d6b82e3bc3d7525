//! Bridge worker - connects to a peer and serves it until STOP.
//!
//! The peer listens first and passes its endpoint on the command line:
//!
//! ```text
//! bridge-worker tcp 4000
//! bridge-worker unix /tmp/arraybridge-1234.sock --debug
//! ```
//!
//! SIGINT (sent by the peer to interrupt a running request) is routed to the
//! session's interrupt handle instead of terminating the process.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use arraybridge::session::{InterruptHandle, SessionBuilder};
use arraybridge::transport::{connect_tcp, Transport};

#[derive(Parser)]
#[command(name = "bridge-worker")]
#[command(about = "Serve a peer interpreter over the arraybridge protocol")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    endpoint: Endpoint,

    /// Log every message (same as RUST_LOG=debug)
    #[arg(long, global = true)]
    debug: bool,

    /// Do not announce our PID after connecting
    #[arg(long, global = true)]
    no_sign_on: bool,
}

#[derive(Subcommand)]
enum Endpoint {
    /// Connect to a TCP port
    Tcp {
        /// Port the peer listens on
        port: u16,

        /// Host the peer listens on
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Connect to a Unix domain socket
    #[cfg(unix)]
    Unix {
        /// Socket path the peer listens on
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let builder = SessionBuilder::new().sign_on(!cli.no_sign_on);

    match cli.endpoint {
        Endpoint::Tcp { port, host } => {
            let transport = connect_tcp(&host, port)
                .await
                .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
            info!("Connected to {}:{}", host, port);
            serve(builder, transport).await
        }
        #[cfg(unix)]
        Endpoint::Unix { path } => {
            let transport = arraybridge::transport::connect_unix(&path)
                .await
                .with_context(|| format!("Failed to connect to {}", path))?;
            info!("Connected to {}", path);
            serve(builder, transport).await
        }
    }
}

async fn serve<T: Transport>(builder: SessionBuilder, transport: T) -> Result<()> {
    let mut session = builder.build(transport);
    tokio::spawn(route_sigint(session.interrupt_handle()));

    session.start().await.context("Failed to sign on")?;
    session.run().await.context("Session ended with an error")?;
    debug!("Session stopped");
    Ok(())
}

async fn route_sigint(handle: InterruptHandle) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for SIGINT: {}", e);
            return;
        }
        debug!("SIGINT received");
        handle.trigger();
    }
}
