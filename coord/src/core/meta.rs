use rocksdb::{
    DBCompressionType, Direction, IteratorMode, Options, Transaction, TransactionDB,
    TransactionDBOptions, TransactionOptions, WriteOptions,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{path::Path, sync::Arc, time::Duration};

use common::api_error::ApiError;
use common::constants::{FILE_KEY_PREFIX, SHARD_ADDR_KEY_PREFIX, SHARD_KEY_PREFIX, SHARD_SEQ_KEY};
use common::schemas::FileState;
use common::time_utils::older_than;

const MAX_OPEN_FILES: i32 = 512;
const TXN_LOCK_TIMEOUT_MS: i64 = 2_000;

#[derive(thiserror::Error, Debug)]
pub enum MetaError {
    #[error("file not found")]
    FileNotFound,
    #[error("file already exists")]
    FileAlreadyExists,
    #[error("upload already in progress")]
    UploadInProgress,
    #[error("shard node already registered")]
    ShardAlreadyRegistered,
    #[error("no shard nodes registered")]
    EmptyRoster,
    #[error("metadata storage: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("metadata codec: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<MetaError> for ApiError {
    fn from(e: MetaError) -> Self {
        match e {
            MetaError::FileNotFound => ApiError::FileNotFound,
            MetaError::FileAlreadyExists => ApiError::FileAlreadyExists,
            MetaError::UploadInProgress => ApiError::UploadInProgress,
            MetaError::ShardAlreadyRegistered => ApiError::ShardAlreadyRegistered,
            MetaError::EmptyRoster => ApiError::EmptyRoster,
            other => ApiError::Any(other.into()),
        }
    }
}

pub fn file_key(name: &str) -> String {
    format!("{}:{}", FILE_KEY_PREFIX, name)
}

// Zero padding keeps the byte order of keys equal to the id order.
fn shard_key(id: u64) -> String {
    format!("{}:{:020}", SHARD_KEY_PREFIX, id)
}

fn shard_addr_key(address: &str) -> String {
    format!("{}:{}", SHARD_ADDR_KEY_PREFIX, address)
}

/// One row of the file table.
///
/// Exactly one of `checkpoint_ms` / `fragment_count` is set for a row written
/// by the coordinator: the former while the upload runs, the latter once it
/// committed. `epoch` is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub epoch: u64,
    pub session: String,
    pub checkpoint_ms: Option<i128>,
    pub fragment_count: Option<u64>,
}

impl FileRecord {
    pub fn uploading(name: &str, epoch: u64, session: String, now_ms: i128) -> Self {
        Self {
            name: name.to_string(),
            epoch,
            session,
            checkpoint_ms: Some(now_ms),
            fragment_count: None,
        }
    }

    /// Lifecycle state as seen at `now_ms`. An uncommitted row whose last
    /// checkpoint is older than `stale_after` (or that never checkpointed)
    /// belongs to an abandoned session.
    pub fn state(&self, now_ms: i128, stale_after: Duration) -> FileState {
        if self.fragment_count.is_some() {
            return FileState::Committed;
        }
        match self.checkpoint_ms {
            Some(at) if !older_than(at, now_ms, stale_after) => FileState::Uploading,
            _ => FileState::Abandoned,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardNode {
    pub id: u64,
    pub address: String,
}

/// Metadata store: the file table and the append-only shard roster.
///
/// Every mutation runs in its own pessimistic transaction, locking the rows it
/// reads before deciding, so conditional writes are atomic across concurrent
/// requests without any lock in this process.
#[derive(Clone)]
pub struct MetaDb {
    inner: Arc<TransactionDB>,
}

impl MetaDb {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(MAX_OPEN_FILES);
        opts.set_compression_type(DBCompressionType::Zstd);
        opts.set_bytes_per_sync(1024 * 1024);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(TXN_LOCK_TIMEOUT_MS);

        let db = TransactionDB::open(&opts, &txn_db_opts, path)?;
        Ok(Self {
            inner: Arc::new(db),
        })
    }

    fn txn(&self, durable: bool) -> Transaction<'_, TransactionDB> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(durable);
        self.inner
            .transaction_opt(&write_opts, &TransactionOptions::default())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, MetaError> {
        match self.inner.get(key.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Unconditional overwrite, bypassing the lifecycle checks.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), MetaError> {
        let buf = serde_json::to_vec(value)?;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.inner.put_opt(key.as_bytes(), buf, &write_opts)?;
        Ok(())
    }

    fn scan_prefix<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, MetaError> {
        self.scan_range(prefix, None)
    }

    /// Scans `prefix` in key order, stopping after `last` when given.
    fn scan_range<T: DeserializeOwned>(
        &self,
        prefix: &str,
        last: Option<&str>,
    ) -> Result<Vec<T>, MetaError> {
        let prefix = format!("{}:", prefix);
        let mut out = Vec::new();
        for kv in self
            .inner
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (k, v) = kv?;
            if !k.starts_with(prefix.as_bytes()) {
                break;
            }
            if last.is_some_and(|last| &*k > last.as_bytes()) {
                break;
            }
            out.push(serde_json::from_slice(&v)?);
        }
        Ok(out)
    }

    fn locked_file(
        txn: &Transaction<'_, TransactionDB>,
        key: &str,
    ) -> Result<Option<FileRecord>, MetaError> {
        match txn.get_for_update(key.as_bytes(), true)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn read_seq(txn: &Transaction<'_, TransactionDB>, lock: bool) -> Result<u64, MetaError> {
        let raw = if lock {
            txn.get_for_update(SHARD_SEQ_KEY.as_bytes(), true)?
        } else {
            txn.get(SHARD_SEQ_KEY.as_bytes())?
        };
        match raw {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(0),
        }
    }

    // Files

    /// Inserts an uploading row for `name` at the current roster epoch.
    ///
    /// An existing row is replaced only when it belongs to an abandoned
    /// session; the second value reports whether that happened. Nothing is
    /// written when no shard node is registered.
    pub fn create_file(
        &self,
        name: &str,
        session: String,
        now_ms: i128,
        stale_after: Duration,
    ) -> Result<(FileRecord, bool), MetaError> {
        let key = file_key(name);
        let txn = self.txn(true);

        let reclaimed = match Self::locked_file(&txn, &key)? {
            None => false,
            Some(existing) => match existing.state(now_ms, stale_after) {
                FileState::Committed => return Err(MetaError::FileAlreadyExists),
                FileState::Uploading => return Err(MetaError::UploadInProgress),
                FileState::Abandoned => true,
            },
        };

        let epoch = Self::read_seq(&txn, false)?;
        if epoch == 0 {
            return Err(MetaError::EmptyRoster);
        }

        let record = FileRecord::uploading(name, epoch, session, now_ms);
        txn.put(key.as_bytes(), serde_json::to_vec(&record)?)?;
        txn.commit()?;

        Ok((record, reclaimed))
    }

    pub fn file(&self, name: &str) -> Result<Option<FileRecord>, MetaError> {
        self.get(&file_key(name))
    }

    pub fn files(&self) -> Result<Vec<FileRecord>, MetaError> {
        self.scan_prefix(FILE_KEY_PREFIX)
    }

    /// Applies `update` to the row of an ongoing session. A missing row, or one
    /// that now belongs to another session, reads as `FileNotFound`.
    fn update_session<F>(
        &self,
        name: &str,
        session: &str,
        durable: bool,
        update: F,
    ) -> Result<FileRecord, MetaError>
    where
        F: FnOnce(&mut FileRecord),
    {
        let key = file_key(name);
        let txn = self.txn(durable);

        let mut record = match Self::locked_file(&txn, &key)? {
            Some(r) if r.session == session => r,
            _ => return Err(MetaError::FileNotFound),
        };
        if record.fragment_count.is_some() {
            return Err(MetaError::FileAlreadyExists);
        }

        update(&mut record);
        txn.put(key.as_bytes(), serde_json::to_vec(&record)?)?;
        txn.commit()?;

        Ok(record)
    }

    pub fn checkpoint_file(
        &self,
        name: &str,
        session: &str,
        now_ms: i128,
    ) -> Result<FileRecord, MetaError> {
        self.update_session(name, session, false, |r| {
            r.checkpoint_ms = Some(now_ms);
        })
    }

    pub fn commit_file(
        &self,
        name: &str,
        session: &str,
        fragment_count: u64,
    ) -> Result<FileRecord, MetaError> {
        self.update_session(name, session, true, |r| {
            r.checkpoint_ms = None;
            r.fragment_count = Some(fragment_count);
        })
    }

    /// Deletes the row of `session`. Rows owned by any other session are left alone.
    pub fn delete_session(&self, name: &str, session: &str) -> Result<(), MetaError> {
        let key = file_key(name);
        let txn = self.txn(true);

        match Self::locked_file(&txn, &key)? {
            Some(r) if r.session == session && r.fragment_count.is_none() => {}
            _ => return Err(MetaError::FileNotFound),
        }

        txn.delete(key.as_bytes())?;
        txn.commit()?;
        Ok(())
    }

    /// Deletes a committed or abandoned row. A live upload is refused.
    pub fn delete_file(
        &self,
        name: &str,
        now_ms: i128,
        stale_after: Duration,
    ) -> Result<FileRecord, MetaError> {
        let key = file_key(name);
        let txn = self.txn(true);

        let record = Self::locked_file(&txn, &key)?.ok_or(MetaError::FileNotFound)?;
        if record.state(now_ms, stale_after) == FileState::Uploading {
            return Err(MetaError::UploadInProgress);
        }

        txn.delete(key.as_bytes())?;
        txn.commit()?;
        Ok(record)
    }

    /// Deletes the row only if it is abandoned at `now_ms`. Returns whether it did.
    pub fn delete_stale_file(
        &self,
        name: &str,
        now_ms: i128,
        stale_after: Duration,
    ) -> Result<bool, MetaError> {
        let key = file_key(name);
        let txn = self.txn(true);

        match Self::locked_file(&txn, &key)? {
            Some(r) if r.state(now_ms, stale_after) == FileState::Abandoned => {}
            _ => return Ok(false),
        }

        txn.delete(key.as_bytes())?;
        txn.commit()?;
        Ok(true)
    }

    // Shard roster

    /// Appends `address` to the roster with the next id.
    pub fn create_shard(&self, address: &str) -> Result<ShardNode, MetaError> {
        let addr_key = shard_addr_key(address);
        let txn = self.txn(true);

        if txn.get_for_update(addr_key.as_bytes(), true)?.is_some() {
            return Err(MetaError::ShardAlreadyRegistered);
        }

        let id = Self::read_seq(&txn, true)? + 1;
        let node = ShardNode {
            id,
            address: address.to_string(),
        };

        txn.put(shard_key(id).as_bytes(), serde_json::to_vec(&node)?)?;
        txn.put(addr_key.as_bytes(), serde_json::to_vec(&id)?)?;
        txn.put(SHARD_SEQ_KEY.as_bytes(), serde_json::to_vec(&id)?)?;
        txn.commit()?;

        Ok(node)
    }

    /// Shard nodes with `id <= epoch`, in registration order.
    pub fn shards(&self, epoch: u64) -> Result<Vec<ShardNode>, MetaError> {
        // Zero-padded ids keep key order equal to registration order.
        self.scan_range(SHARD_KEY_PREFIX, Some(&shard_key(epoch)))
    }

    pub fn all_shards(&self) -> Result<Vec<ShardNode>, MetaError> {
        self.scan_prefix(SHARD_KEY_PREFIX)
    }

    pub fn last_shard_id(&self) -> Result<u64, MetaError> {
        Ok(self.get::<u64>(SHARD_SEQ_KEY)?.unwrap_or(0))
    }
}
