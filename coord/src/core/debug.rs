use axum::extract::{Json, Query, State};

use common::api_error::ApiError;
use common::fragment::require_filename;
use common::schemas::{FilenameQuery, PlacementResponse};

use crate::core::state::CoordinatorState;

/// GET /debug/placement?filename= -> {"epoch": 3, "shards": [...]}
///
/// Shard order for the file: fragment `k` lives on `shards[k % len]`. Uses the
/// stored epoch when the file exists and the current roster otherwise.
#[tracing::instrument(name = "coord.debug.placement", skip(ctx), fields(filename = ?query.filename))]
pub async fn debug_placement(
    State(ctx): State<CoordinatorState>,
    Query(query): Query<FilenameQuery>,
) -> Result<Json<PlacementResponse>, ApiError> {
    let filename = require_filename(query.filename)?;
    let (epoch, shards) = ctx.manager.placement(&filename)?;

    Ok(Json(PlacementResponse { epoch, shards }))
}
