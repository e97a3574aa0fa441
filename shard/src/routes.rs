use anyhow::anyhow;
use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use tokio_util::io::ReaderStream;
use tracing::debug;

use common::api_error::ApiError;
use common::fragment::require_fragment_name;
use common::schemas::FilenameQuery;
use common::trace_middleware::trace_context_middleware;

use crate::fault_injection::{fail_fetch, fail_store, inject_latency, reset_faults};
use crate::state::ShardState;
use crate::store::{open_fragment, write_fragment};

pub const FRAGMENT_ROUTE: &str = "/file";

// POST /file?filename=
#[tracing::instrument(name = "shard.store", skip(ctx, body), fields(fragment = ?query.filename))]
pub async fn store_handler(
    State(ctx): State<ShardState>,
    Query(query): Query<FilenameQuery>,
    body: Body,
) -> Result<StatusCode, ApiError> {
    ctx.fault_injector.apply_latency().await;
    if ctx.fault_injector.should_fail_store() {
        return Err(ApiError::Any(anyhow!("fault injection: store failed")));
    }

    let name = require_fragment_name(query.filename)?;
    let size = write_fragment(&ctx.data_root, &name, body.into_data_stream()).await?;

    debug!(fragment = %name, size, "stored fragment");
    Ok(StatusCode::CREATED)
}

// GET /file?filename=
#[tracing::instrument(name = "shard.fetch", skip(ctx), fields(fragment = ?query.filename))]
pub async fn fetch_handler(
    State(ctx): State<ShardState>,
    Query(query): Query<FilenameQuery>,
) -> Result<Response, ApiError> {
    ctx.fault_injector.apply_latency().await;
    if ctx.fault_injector.should_fail_fetch() {
        return Err(ApiError::Any(anyhow!("fault injection: fetch failed")));
    }

    let name = require_fragment_name(query.filename)?;
    let (file, len) = open_fragment(&ctx.data_root, &name).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Shard node router. The `/admin` fault endpoints are only mounted when
/// `fault_injection` is set.
pub fn app(state: ShardState, fault_injection: bool) -> Router {
    let mut router = Router::new().route(FRAGMENT_ROUTE, post(store_handler).get(fetch_handler));

    if fault_injection {
        router = router
            .route("/admin/fail/store", post(fail_store))
            .route("/admin/fail/fetch", post(fail_fetch))
            .route("/admin/inject/latency", post(inject_latency))
            .route("/admin/reset", post(reset_faults));
    }

    router
        .layer(middleware::from_fn(trace_context_middleware))
        .with_state(state)
}
