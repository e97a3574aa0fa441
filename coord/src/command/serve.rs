use axum::{
    Router, middleware,
    routing::{get, post},
};
use axum_server::Server;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use common::trace_middleware::trace_context_middleware;
use common::url_utils::parse_socket_addr;

use crate::core::debug::debug_placement;
use crate::core::manager::FileManager;
use crate::core::meta::MetaDb;
use crate::core::routes::{delete, download, list_shards, register_shard, status, upload};
use crate::core::state::{CoordinatorConfig, CoordinatorState, DEFAULT_MAX_FRAGMENT_SIZE};
use crate::core::transport::ShardClient;

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// RocksDB directory holding the file table and shard roster
    #[arg(long, default_value = "./data/index")]
    index: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Fragment size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAGMENT_SIZE, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_fragment_size: usize,

    /// Deadline for storing one batch of fragments
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    batch_timeout: Duration,

    /// Age after which an uncommitted upload may be reclaimed
    #[arg(long, default_value = "20s", value_parser = humantime::parse_duration)]
    stale_after: Duration,

    /// Timeout for a single request to a shard node
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    http_timeout: Duration,
}

pub fn app(state: CoordinatorState) -> Router {
    Router::new()
        .route(
            "/api/v1/file",
            post(upload).get(download).head(status).delete(delete),
        )
        .route("/api/v1/fs-server", post(register_shard).get(list_shards))
        .route("/debug/placement", get(debug_placement))
        .layer(middleware::from_fn(trace_context_middleware))
        .with_state(state)
}

pub async fn serve(serve_args: ServeArgs) -> anyhow::Result<()> {
    let config = CoordinatorConfig {
        max_fragment_size: serve_args.max_fragment_size,
        batch_timeout: serve_args.batch_timeout,
        stale_after: serve_args.stale_after,
    };
    config.validate()?;

    let db = MetaDb::open(&serve_args.index)?;

    let state = CoordinatorState {
        manager: FileManager::new(db, config.stale_after),
        shards: ShardClient::new(serve_args.http_timeout)?,
        config,
    };

    let roster = state.manager.shard_nodes()?;
    info!(shards = roster.len(), "loaded shard roster");

    let socket_addr = parse_socket_addr(&serve_args.listen)?;
    let server = Server::bind(socket_addr).serve(app(state).into_make_service());

    info!("listening on {}", serve_args.listen);

    // Graceful shutdown: ctrl+c
    tokio::select! {
        res = server => { res?; }
        _ = tokio::signal::ctrl_c() => {}
    }

    Ok(())
}
