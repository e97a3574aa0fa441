#![allow(dead_code)]

use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use axum::Router;
use axum_server::Server;
use rand::Rng;
use reqwest::Client;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use common::schemas::{PlacementResponse, RegisterShardRequest, ShardInfo};
use coord::command::serve::app as coord_app;
use coord::core::manager::FileManager;
use coord::core::meta::MetaDb;
use coord::core::state::{CoordinatorConfig, CoordinatorState};
use coord::core::transport::ShardClient;
use shard::routes::app as shard_app;
use shard::state::ShardState;
use shard::store::{fragment_path, init_dirs};

pub const FRAGMENT_SIZE: usize = 1024;

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        max_fragment_size: FRAGMENT_SIZE,
        batch_timeout: Duration::from_secs(2),
        stale_after: Duration::from_secs(20),
    }
}

async fn spawn_server(app: Router) -> Result<(String, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    let std_listener = listener.into_std()?;

    let handle = tokio::spawn(async move {
        let _ = Server::from_tcp(std_listener)
            .serve(app.into_make_service())
            .await;
    });

    Ok((url, handle))
}

pub struct TestShard {
    pub url: String,
    pub address: String,
    pub state: ShardState,
    pub data_dir: TempDir,
    handle: JoinHandle<()>,
}

impl TestShard {
    pub async fn new() -> Result<Self> {
        let data_dir = TempDir::new()?;
        init_dirs(data_dir.path()).await?;

        let state = ShardState::new(data_dir.path().to_path_buf());
        let (url, handle) = spawn_server(shard_app(state.clone(), true)).await?;

        Ok(Self {
            address: format!("{}/file", url),
            url,
            state,
            data_dir,
            handle,
        })
    }

    pub fn has_fragment(&self, name: &str) -> bool {
        fragment_path(self.data_dir.path(), name).is_file()
    }

    pub async fn admin(&self, client: &Client, path_and_query: &str) -> Result<()> {
        let resp = client
            .post(format!("{}{}", self.url, path_and_query))
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("admin call {} failed: {}", path_and_query, resp.status());
        }
        Ok(())
    }
}

impl Drop for TestShard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct TestCoordinator {
    pub url: String,
    pub state: CoordinatorState,
    pub index_dir: TempDir,
    handle: JoinHandle<()>,
}

impl TestCoordinator {
    pub async fn new(config: CoordinatorConfig) -> Result<Self> {
        let index_dir = TempDir::new()?;
        let db = MetaDb::open(&index_dir.path().join("index"))?;

        let state = CoordinatorState {
            manager: FileManager::new(db, config.stale_after),
            shards: ShardClient::new(Duration::from_secs(10))?,
            config,
        };
        let (url, handle) = spawn_server(coord_app(state.clone())).await?;

        Ok(Self {
            url,
            state,
            index_dir,
            handle,
        })
    }

    pub fn db(&self) -> &MetaDb {
        self.state.manager.db()
    }
}

impl Drop for TestCoordinator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct Cluster {
    pub coord: TestCoordinator,
    pub shards: Vec<TestShard>,
    pub client: Client,
}

impl Cluster {
    pub async fn new(n_shards: usize) -> Result<Self> {
        Self::with_config(n_shards, test_config()).await
    }

    pub async fn with_config(n_shards: usize, config: CoordinatorConfig) -> Result<Self> {
        let mut cluster = Cluster {
            coord: TestCoordinator::new(config).await?,
            shards: Vec::new(),
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        };
        for _ in 0..n_shards {
            cluster.add_shard().await?;
        }
        Ok(cluster)
    }

    /// Starts a shard node and appends it to the roster.
    pub async fn add_shard(&mut self) -> Result<ShardInfo> {
        let shard = TestShard::new().await?;
        let resp = self.register(&shard.address).await?;
        if !resp.status().is_success() {
            bail!("registration failed: {}", resp.status());
        }
        let info = resp.json::<ShardInfo>().await?;
        self.shards.push(shard);
        Ok(info)
    }

    pub async fn register(&self, address: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}/api/v1/fs-server", self.coord.url))
            .json(&RegisterShardRequest {
                server_url: address.to_string(),
            })
            .send()
            .await?)
    }

    fn file_url(&self) -> String {
        format!("{}/api/v1/file", self.coord.url)
    }

    pub async fn upload(&self, filename: &str, data: Vec<u8>) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.file_url())
            .query(&[("filename", filename)])
            .body(data)
            .send()
            .await?)
    }

    pub async fn download(&self, filename: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(self.file_url())
            .query(&[("filename", filename)])
            .send()
            .await?)
    }

    pub async fn head(&self, filename: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .head(self.file_url())
            .query(&[("filename", filename)])
            .send()
            .await?)
    }

    pub async fn delete(&self, filename: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .delete(self.file_url())
            .query(&[("filename", filename)])
            .send()
            .await?)
    }

    pub async fn placement(&self, filename: &str) -> Result<PlacementResponse> {
        let resp = self
            .client
            .get(format!("{}/debug/placement", self.coord.url))
            .query(&[("filename", filename)])
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("placement failed: {}", resp.status());
        }
        Ok(resp.json().await?)
    }

    pub fn shard_at(&self, address: &str) -> &TestShard {
        self.shards
            .iter()
            .find(|s| s.address == address)
            .unwrap_or_else(|| panic!("no shard listens at {}", address))
    }

    /// Upload and expect 201, returning the reported fragment count.
    pub async fn upload_ok(&self, filename: &str, data: Vec<u8>) -> Result<u64> {
        let resp = self.upload(filename, data).await?;
        if resp.status() != reqwest::StatusCode::CREATED {
            bail!(
                "upload of {} failed: {} {}",
                filename,
                resp.status(),
                resp.text().await.unwrap_or_default()
            );
        }
        let count = resp
            .headers()
            .get("x-fragment-count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(u64::MAX);
        Ok(count)
    }

    pub async fn download_ok(&self, filename: &str) -> Result<Vec<u8>> {
        let resp = self.download(filename).await?;
        if resp.status() != reqwest::StatusCode::OK {
            bail!("download of {} failed: {}", filename, resp.status());
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

pub fn generate_random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    data
}

pub async fn wait_until<F>(timeout: Duration, mut f: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
