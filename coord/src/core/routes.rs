use axum::{
    body::Body,
    extract::{Json, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use std::io;
use tokio_util::io::StreamReader;

use common::api_error::ApiError;
use common::constants::{EPOCH_HEADER, FILE_STATE_HEADER, FRAGMENT_COUNT_HEADER};
use common::fragment::require_filename;
use common::schemas::{FilenameQuery, RegisterShardRequest, ShardInfo};

use crate::core::download::download_file;
use crate::core::meta::ShardNode;
use crate::core::state::CoordinatorState;
use crate::core::upload::upload_file;

impl From<ShardNode> for ShardInfo {
    fn from(node: ShardNode) -> Self {
        ShardInfo {
            id: node.id,
            address: node.address,
        }
    }
}

// POST /api/v1/file?filename=
#[tracing::instrument(name = "coord.upload", skip(ctx, body), fields(filename = ?query.filename))]
pub async fn upload(
    State(ctx): State<CoordinatorState>,
    Query(query): Query<FilenameQuery>,
    body: Body,
) -> Result<(StatusCode, HeaderMap), ApiError> {
    let filename = require_filename(query.filename)?;

    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let count = upload_file(
        &ctx.manager,
        &ctx.shards,
        &filename,
        reader,
        ctx.config.max_fragment_size,
        ctx.config.batch_timeout,
    )
    .await?;

    let mut headers = HeaderMap::new();
    headers.insert(FRAGMENT_COUNT_HEADER, HeaderValue::from(count));

    Ok((StatusCode::CREATED, headers))
}

// GET /api/v1/file?filename=
#[tracing::instrument(name = "coord.download", skip(ctx), fields(filename = ?query.filename))]
pub async fn download(
    State(ctx): State<CoordinatorState>,
    Query(query): Query<FilenameQuery>,
) -> Result<Response, ApiError> {
    let filename = require_filename(query.filename)?;

    let stream = download_file(&ctx.manager, &ctx.shards, &filename).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(stream),
    )
        .into_response())
}

// HEAD /api/v1/file?filename=
#[tracing::instrument(name = "coord.status", skip(ctx), fields(filename = ?query.filename))]
pub async fn status(
    State(ctx): State<CoordinatorState>,
    Query(query): Query<FilenameQuery>,
) -> Result<(StatusCode, HeaderMap), ApiError> {
    let filename = require_filename(query.filename)?;
    let (record, state) = ctx.manager.file_status(&filename)?;

    let mut headers = HeaderMap::new();
    headers.insert(FILE_STATE_HEADER, HeaderValue::from_static(state.as_str()));
    headers.insert(EPOCH_HEADER, HeaderValue::from(record.epoch));
    if let Some(count) = record.fragment_count {
        headers.insert(FRAGMENT_COUNT_HEADER, HeaderValue::from(count));
    }

    Ok((StatusCode::OK, headers))
}

// DELETE /api/v1/file?filename=
#[tracing::instrument(name = "coord.delete", skip(ctx), fields(filename = ?query.filename))]
pub async fn delete(
    State(ctx): State<CoordinatorState>,
    Query(query): Query<FilenameQuery>,
) -> Result<StatusCode, ApiError> {
    let filename = require_filename(query.filename)?;
    ctx.manager.delete_file(&filename)?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/v1/fs-server
#[tracing::instrument(name = "coord.register_shard", skip(ctx), fields(address = %req.server_url))]
pub async fn register_shard(
    State(ctx): State<CoordinatorState>,
    Json(req): Json<RegisterShardRequest>,
) -> Result<Json<ShardInfo>, ApiError> {
    let node = ctx.manager.register_shard_node(&req.server_url)?;
    Ok(Json(node.into()))
}

// GET /api/v1/fs-server
#[tracing::instrument(name = "coord.list_shards", skip(ctx))]
pub async fn list_shards(
    State(ctx): State<CoordinatorState>,
) -> Result<Json<Vec<ShardInfo>>, ApiError> {
    let nodes = ctx.manager.shard_nodes()?;
    Ok(Json(nodes.into_iter().map(ShardInfo::from).collect()))
}
