use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
pub struct FilenameQuery {
    pub filename: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterShardRequest {
    pub server_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub id: u64,
    pub address: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlacementResponse {
    pub epoch: u64,
    pub shards: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Uploading,
    Abandoned,
    Committed,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Uploading => "uploading",
            FileState::Abandoned => "abandoned",
            FileState::Committed => "committed",
        }
    }
}
