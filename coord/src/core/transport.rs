use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt, stream::BoxStream};
use reqwest::Client;
use std::time::Duration;

use common::api_error::ApiError;
use common::trace_middleware::inject_trace_context_reqwest;
use common::url_utils::with_filename;

pub type FragmentStream = BoxStream<'static, Result<Bytes, ApiError>>;

/// Fragment transport: one store or fetch of one named fragment against one
/// shard node.
#[derive(Clone)]
pub struct ShardClient {
    http: Client,
}

impl ShardClient {
    pub fn new(http_timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(http_timeout).build()?;
        Ok(Self { http })
    }

    pub fn from_client(http: Client) -> Self {
        Self { http }
    }

    #[tracing::instrument(name = "shard.store", skip(self, data), fields(len = data.len()))]
    pub async fn store(&self, address: &str, fragment: &str, data: Bytes) -> Result<(), ApiError> {
        let url = with_filename(address, fragment)?;
        let req = inject_trace_context_reqwest(self.http.post(url).body(data));

        let resp = req.send().await.map_err(ApiError::UpstreamReq)?;
        if !resp.status().is_success() {
            return Err(ApiError::UpstreamStatus(resp.status()));
        }
        Ok(())
    }

    /// Opens the fragment for reading. The response is released when the
    /// returned stream is dropped, consumed or not.
    #[tracing::instrument(name = "shard.fetch", skip(self))]
    pub async fn fetch(&self, address: &str, fragment: &str) -> Result<FragmentStream, ApiError> {
        let url = with_filename(address, fragment)?;
        let req = inject_trace_context_reqwest(self.http.get(url));

        let resp = req.send().await.map_err(ApiError::UpstreamReq)?;
        if !resp.status().is_success() {
            return Err(ApiError::UpstreamStatus(resp.status()));
        }

        Ok(resp.bytes_stream().map_err(ApiError::UpstreamReq).boxed())
    }
}
