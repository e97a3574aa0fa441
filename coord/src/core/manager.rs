use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use common::api_error::ApiError;
use common::schemas::FileState;
use common::time_utils::utc_now_ms;
use common::url_utils::normalize_shard_address;

use crate::core::meta::{FileRecord, MetaDb, ShardNode};
use crate::core::placement::resolve_shards;

/// An upload that owns its file row. Every later mutation of that row is
/// scoped to `session`, so an upload whose row was reclaimed by a newer one
/// can no longer touch it.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub filename: String,
    pub session: String,
    pub epoch: u64,
    pub shards: Vec<String>,
}

/// Coordination service. All writes to the file table and the shard roster
/// go through here.
#[derive(Clone)]
pub struct FileManager {
    db: MetaDb,
    stale_after: Duration,
}

impl FileManager {
    pub fn new(db: MetaDb, stale_after: Duration) -> Self {
        Self { db, stale_after }
    }

    pub fn db(&self) -> &MetaDb {
        &self.db
    }

    /// Ordered shard addresses for `filename` on the roster prefix `id <= epoch`.
    pub fn resolve(&self, filename: &str, epoch: u64) -> Result<Vec<String>, ApiError> {
        let roster = self.db.shards(epoch)?;
        if roster.is_empty() {
            return Err(ApiError::EmptyRoster);
        }
        Ok(resolve_shards(filename, &roster))
    }

    pub fn start_upload(&self, filename: &str) -> Result<UploadSession, ApiError> {
        let session = Uuid::new_v4().to_string();
        let (record, reclaimed) =
            self.db
                .create_file(filename, session.clone(), utc_now_ms(), self.stale_after)?;

        if reclaimed {
            info!(filename, epoch = record.epoch, "reclaimed abandoned upload");
        }

        let upload = UploadSession {
            filename: filename.to_string(),
            session,
            epoch: record.epoch,
            shards: Vec::new(),
        };

        match self.resolve(filename, record.epoch) {
            Ok(shards) => Ok(UploadSession { shards, ..upload }),
            Err(e) => Err(e.with_cleanup(self.rollback_upload(&upload))),
        }
    }

    pub fn checkpoint_batch(&self, upload: &UploadSession) -> Result<(), ApiError> {
        self.db
            .checkpoint_file(&upload.filename, &upload.session, utc_now_ms())?;
        Ok(())
    }

    pub fn commit_upload(&self, upload: &UploadSession, fragment_count: u64) -> Result<(), ApiError> {
        self.db
            .commit_file(&upload.filename, &upload.session, fragment_count)?;
        Ok(())
    }

    /// Drops the row of this upload. `FileNotFound` means there was nothing
    /// left to drop.
    pub fn rollback_upload(&self, upload: &UploadSession) -> Result<(), ApiError> {
        self.db.delete_session(&upload.filename, &upload.session)?;
        Ok(())
    }

    /// Shard addresses and fragment count of a committed file.
    pub fn resolve_for_download(&self, filename: &str) -> Result<(Vec<String>, u64), ApiError> {
        let record = self.db.file(filename)?.ok_or(ApiError::FileNotFound)?;
        let count = record.fragment_count.ok_or(ApiError::NotReady)?;
        let shards = self.resolve(filename, record.epoch)?;
        Ok((shards, count))
    }

    pub fn register_shard_node(&self, address: &str) -> Result<ShardNode, ApiError> {
        let address = normalize_shard_address(address)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        let node = self.db.create_shard(&address)?;
        info!(id = node.id, address = %node.address, "registered shard node");
        Ok(node)
    }

    pub fn shard_nodes(&self) -> Result<Vec<ShardNode>, ApiError> {
        Ok(self.db.all_shards()?)
    }

    pub fn file_status(&self, filename: &str) -> Result<(FileRecord, FileState), ApiError> {
        let record = self.db.file(filename)?.ok_or(ApiError::FileNotFound)?;
        let state = record.state(utc_now_ms(), self.stale_after);
        Ok((record, state))
    }

    /// Removes a committed or abandoned file. Fragments stay on the shard nodes.
    pub fn delete_file(&self, filename: &str) -> Result<FileRecord, ApiError> {
        let record = self
            .db
            .delete_file(filename, utc_now_ms(), self.stale_after)?;
        if record.fragment_count.is_none() {
            warn!(filename, "deleted abandoned upload");
        }
        Ok(record)
    }

    /// Placement of `filename` at its stored epoch, or at the current one when
    /// the file does not exist.
    pub fn placement(&self, filename: &str) -> Result<(u64, Vec<String>), ApiError> {
        let epoch = match self.db.file(filename)? {
            Some(record) => record.epoch,
            None => self.db.last_shard_id()?,
        };
        Ok((epoch, self.resolve(filename, epoch)?))
    }
}
