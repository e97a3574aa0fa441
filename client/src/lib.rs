//! Caller-side access to the coordinator's file API.

use futures_util::StreamExt;
use reqwest::{Response, StatusCode};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::warn;
use url::Url;

use common::constants::{FILENAME_PARAM, FRAGMENT_COUNT_HEADER};
use common::trace_middleware::inject_trace_context_reqwest;

pub const FILE_PATH: &str = "/api/v1/file";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid coordinator url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("coordinator answered {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("response has no valid {0} header")]
    MalformedResponse(&'static str),

    #[error("local file: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct Client {
    file_url: Url,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_http(base_url, reqwest::Client::new())
    }

    pub fn with_http(base_url: &str, http: reqwest::Client) -> Result<Self, ClientError> {
        let mut file_url = Url::parse(base_url)?;
        let path = format!("{}{}", file_url.path().trim_end_matches('/'), FILE_PATH);
        file_url.set_path(&path);
        file_url.set_query(None);
        Ok(Self { file_url, http })
    }

    pub fn file_url(&self, name: &str) -> Url {
        let mut url = self.file_url.clone();
        url.query_pairs_mut().append_pair(FILENAME_PARAM, name);
        url
    }

    /// Streams the local file at `path` up as `name` and returns the
    /// fragment count the coordinator committed.
    #[tracing::instrument(name = "client.save_file", skip(self, path), fields(path = %path.display()))]
    pub async fn save_file(&self, name: &str, path: &Path) -> Result<u64, ClientError> {
        let file = File::open(path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let req = inject_trace_context_reqwest(self.http.post(self.file_url(name)).body(body));
        let resp = check_status(req.send().await?).await?;

        resp.headers()
            .get(FRAGMENT_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or(ClientError::MalformedResponse(FRAGMENT_COUNT_HEADER))
    }

    /// Downloads `name` into `path` and returns the number of bytes written.
    ///
    /// The body goes to `<path>.part` first and replaces `path` only after
    /// the stream ended cleanly. A cut-off stream is an error and leaves
    /// `path` as it was.
    #[tracing::instrument(name = "client.get_file", skip(self, path), fields(path = %path.display()))]
    pub async fn get_file(&self, name: &str, path: &Path) -> Result<u64, ClientError> {
        let part = part_path(path)?;

        let req = inject_trace_context_reqwest(self.http.get(self.file_url(name)));
        let resp = check_status(req.send().await?).await?;

        let written: Result<u64, ClientError> = async {
            let total = write_body(resp, &part).await?;
            fs::rename(&part, path).await?;
            Ok(total)
        }
        .await;

        if let Err(e) = &written {
            warn!(error = %e, "download failed");
            let _ = fs::remove_file(&part).await;
        }
        written
    }
}

async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ClientError::Status { status, message })
}

fn part_path(path: &Path) -> Result<PathBuf, ClientError> {
    let mut name = path
        .file_name()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} does not name a file", path.display()),
            )
        })?
        .to_os_string();
    name.push(".part");
    Ok(path.with_file_name(name))
}

async fn write_body(resp: Response, part: &Path) -> Result<u64, ClientError> {
    let mut file = File::create(part).await?;
    let mut body = resp.bytes_stream();

    let mut total: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok(total)
}
