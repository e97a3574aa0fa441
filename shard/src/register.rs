use reqwest::{Client, StatusCode};
use tracing::{info, warn};

use common::api_error::ApiError;
use common::retry::{Backoff, classify_upstream, retry_with_backoff};
use common::schemas::{RegisterShardRequest, ShardInfo};
use common::trace_middleware::inject_trace_context_reqwest;

pub const REGISTER_PATH: &str = "/api/v1/fs-server";

async fn register_once(
    client: &Client,
    coordinator_url: &str,
    payload: &RegisterShardRequest,
) -> Result<Option<ShardInfo>, ApiError> {
    let url = format!("{}{}", coordinator_url.trim_end_matches('/'), REGISTER_PATH);
    let req = inject_trace_context_reqwest(client.post(url).json(payload));

    let resp = req.send().await.map_err(ApiError::UpstreamReq)?;
    match resp.status() {
        st if st.is_success() => {
            let info = resp.json::<ShardInfo>().await.map_err(ApiError::UpstreamReq)?;
            Ok(Some(info))
        }
        StatusCode::CONFLICT => Ok(None),
        st => Err(ApiError::UpstreamStatus(st)),
    }
}

/// Registers `advertise_url` with the coordinator, retrying while it is
/// unreachable. `None` means the address was already on the roster.
pub async fn register_with_coordinator(
    client: &Client,
    coordinator_url: &str,
    advertise_url: &str,
    backoff: &Backoff,
) -> Result<Option<ShardInfo>, ApiError> {
    let payload = RegisterShardRequest {
        server_url: advertise_url.to_string(),
    };

    let registered = retry_with_backoff(
        backoff,
        || register_once(client, coordinator_url, &payload),
        classify_upstream,
    )
    .await;

    match &registered {
        Ok(Some(info)) => info!(id = info.id, address = %info.address, "registered with coordinator"),
        Ok(None) => info!(address = advertise_url, "already registered with coordinator"),
        Err(e) => warn!(error = %e, "registration failed"),
    }

    registered
}
