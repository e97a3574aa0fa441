use clap::Parser;
use std::net::TcpListener;
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::info;

use common::retry::Backoff;
use common::telemetry::init_telemetry;
use common::url_utils::parse_socket_addr;

use shard::routes::FRAGMENT_ROUTE;
use shard::server::{Registration, run};
use shard::state::ShardState;
use shard::store::init_dirs;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[arg(long, default_value = "./data")]
    data: PathBuf,
    /// Address to listen on
    #[arg(long, default_value = "http://127.0.0.1:43000")]
    listen: String,
    /// Address the coordinator should use for this node; defaults to `<listen>/file`
    #[arg(long)]
    advertise_url: Option<String>,
    /// Register with this coordinator on startup
    #[arg(long)]
    coordinator_url: Option<String>,
    /// Mount the /admin fault injection endpoints
    #[arg(long, default_value_t = false)]
    fault_injection: bool,
    #[arg(long, default_value_t = 5)]
    http_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("shard");

    let args = Args::parse();
    let removed = init_dirs(&args.data).await?;
    if removed > 0 {
        info!(removed, "cleared interrupted stores");
    }

    let state = ShardState::new(args.data.clone());

    let registration = args.coordinator_url.clone().map(|coordinator_url| Registration {
        coordinator_url,
        advertise_url: args.advertise_url.clone().unwrap_or_else(|| {
            format!("{}{}", args.listen.trim_end_matches('/'), FRAGMENT_ROUTE)
        }),
        http_timeout: Duration::from_secs(args.http_timeout_secs),
        backoff: Backoff::default(),
    });

    let listener = TcpListener::bind(parse_socket_addr(&args.listen)?)?;

    // Graceful shutdown: ctrl+c
    tokio::select! {
        res = run(listener, state, args.fault_injection, registration) => { res?; }
        _ = tokio::signal::ctrl_c() => {}
    }

    Ok(())
}
