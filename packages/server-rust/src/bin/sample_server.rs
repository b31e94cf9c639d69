//! Sample catalog server.
//!
//! Run with `RUST_LOG=info,sqltag::sql=info` to see every SQL statement with
//! its request tags, e.g.
//!
//! ```text
//! curl -H 'X-Demo-User: alice' localhost:8080/api/products/3
//! ```

use clap::Parser;
use sqltag_server::cli::ServerArgs;
use sqltag_server::NetworkModule;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_tracing(args.log_json);

    let mut module = NetworkModule::new(args.network_config(), args.tagging_config())?;
    let port = module.start().await?;
    info!(port, "sample server listening");

    module.serve(shutdown_signal()).await
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
