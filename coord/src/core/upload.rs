use anyhow::anyhow;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use tracing::{Instrument, error, info_span, warn};

use common::api_error::ApiError;
use common::fragment::fragment_name;

use crate::core::manager::{FileManager, UploadSession};
use crate::core::placement::shard_for_fragment;
use crate::core::transport::ShardClient;

/// Reads until `max` bytes are buffered or the reader is exhausted. A result
/// shorter than `max` means end of input.
pub async fn read_fragment<R>(reader: &mut R, max: usize) -> Result<Bytes, ApiError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(max);
    let mut limited = (&mut *reader).take(max as u64);
    while limited.read_buf(&mut buf).await? > 0 {}
    Ok(buf.freeze())
}

/// Stores one batch concurrently, one task per fragment, under a single
/// deadline. Tasks still running when this returns are aborted.
async fn store_batch(
    client: &ShardClient,
    upload: &UploadSession,
    fragments: Vec<(u64, Bytes)>,
    deadline: Duration,
) -> Result<(), ApiError> {
    let mut tasks = JoinSet::new();

    for (index, data) in fragments {
        let name = fragment_name(&upload.filename, index);
        let address = shard_for_fragment(&upload.shards, index)
            .ok_or(ApiError::EmptyRoster)?
            .to_string();
        let client = client.clone();

        tasks.spawn(
            async move {
                client
                    .store(&address, &name, data)
                    .await
                    .map_err(|e| (name, address, e))
            }
            .in_current_span(),
        );
    }

    let drain = async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err((name, address, e))) => {
                    warn!(fragment = %name, shard = %address, error = %e, "fragment store failed");
                    return Err(e);
                }
                Err(e) => return Err(ApiError::Any(anyhow!("store task failed: {}", e))),
            }
        }
        Ok(())
    };

    match tokio::time::timeout(deadline, drain).await {
        Ok(res) => res,
        Err(_) => {
            warn!(filename = %upload.filename, ?deadline, "batch timed out");
            Err(ApiError::BatchTimeout(deadline))
        }
    }
}

/// Cuts `reader` into fragments and stores them batch by batch. Returns the
/// number of fragments once the upload is committed.
async fn run_batches<R>(
    manager: &FileManager,
    client: &ShardClient,
    upload: &UploadSession,
    reader: &mut R,
    max_fragment_size: usize,
    batch_timeout: Duration,
) -> Result<u64, ApiError>
where
    R: AsyncRead + Unpin,
{
    let n = upload.shards.len();
    let mut next_index: u64 = 0;
    let mut batch: u64 = 0;

    loop {
        let first_index = next_index;
        let mut fragments = Vec::with_capacity(n);
        let mut last = false;

        for _ in 0..n {
            let data = read_fragment(reader, max_fragment_size).await?;
            last = data.len() < max_fragment_size;
            if !data.is_empty() {
                fragments.push((next_index, data));
                next_index += 1;
            }
            if last {
                break;
            }
        }

        let span = info_span!(
            "upload.batch",
            batch,
            first_fragment = first_index,
            fragments = fragments.len()
        );
        store_batch(client, upload, fragments, batch_timeout)
            .instrument(span)
            .await?;

        if last {
            manager.commit_upload(upload, next_index)?;
            return Ok(next_index);
        }

        manager.checkpoint_batch(upload)?;
        batch += 1;
    }
}

/// Upload pipeline: reserves `filename`, streams `reader` into fragments on
/// the shard nodes, then commits. Any failure after the reservation rolls
/// the row back; a failed rollback is reported alongside the original error.
pub async fn upload_file<R>(
    manager: &FileManager,
    client: &ShardClient,
    filename: &str,
    mut reader: R,
    max_fragment_size: usize,
    batch_timeout: Duration,
) -> Result<u64, ApiError>
where
    R: AsyncRead + Unpin,
{
    let upload = manager.start_upload(filename)?;

    let outcome = run_batches(
        manager,
        client,
        &upload,
        &mut reader,
        max_fragment_size,
        batch_timeout,
    )
    .await;

    match outcome {
        Ok(count) => Ok(count),
        Err(e) => {
            warn!(filename, error = %e, "upload failed, rolling back");
            let cleanup = manager.rollback_upload(&upload);
            if let Err(ref cleanup_err) = cleanup
                && !matches!(cleanup_err, ApiError::FileNotFound)
            {
                error!(filename, error = %cleanup_err, "rollback failed");
            }
            Err(e.with_cleanup(cleanup))
        }
    }
}
