//! browser-remote native messaging host.
//!
//! Launched by the browser with the extension's stdin/stdout as the native
//! channel. Serves `POST /` on `--host:--port` (or the next free port) and
//! relays each query to the extension.

mod cli;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use browser_remote::transport::{ServerConfig, serve};
use browser_remote::{Bridge, CorrelationRegistry, PortScan, RelayService};

use cli::Args;

/// Grace period for blocking-pool work (the stdin read) once the host is done.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing(&args.log_file, args.log_stderr)?;

    for arg in &args.browser_args {
        tracing::debug!(%arg, "Browser argument");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    if let Err(e) = &result {
        tracing::error!(error = %e, "browser-remote exited with an error");
    }
    result
}

async fn run(args: Args) -> Result<()> {
    let port = PortScan::default()
        .find_free_port(&args.host, args.port, args.port_tries, true)
        .await
        .ok_or_else(|| anyhow::anyhow!("unable to open port {}:{}", args.host, args.port))?;

    let registry = CorrelationRegistry::new();
    let bridge = Bridge::start(
        tokio::io::stdin(),
        tokio::io::stdout(),
        Arc::clone(&registry),
    );
    let service = Arc::new(
        RelayService::new(registry, bridge.sender())
            .with_timeout(Duration::from_secs(args.timeout_secs)),
    );

    let config = ServerConfig {
        host: args.host,
        port,
    };
    let served = serve(config, service, bridge.closed()).await;

    match bridge.shutdown().await {
        Ok(exit) => info!(?exit, "Native bridge stopped"),
        Err(e) => tracing::error!(error = %e, "Native bridge stopped with an error"),
    }

    served
}
