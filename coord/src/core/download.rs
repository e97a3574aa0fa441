use futures_util::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use tracing::warn;

use common::api_error::ApiError;
use common::fragment::fragment_name;

use crate::core::manager::FileManager;
use crate::core::placement::shard_for_fragment;
use crate::core::transport::{FragmentStream, ShardClient};

async fn open_fragment(
    client: &ShardClient,
    shards: &[String],
    filename: &str,
    index: u64,
) -> Result<FragmentStream, ApiError> {
    let name = fragment_name(filename, index);
    let address = shard_for_fragment(shards, index).ok_or(ApiError::EmptyRoster)?;

    client.fetch(address, &name).await.inspect_err(|e| {
        warn!(fragment = %name, shard = %address, error = %e, "fragment fetch failed");
    })
}

/// Download pipeline: the file's fragments, in index order, as one stream.
///
/// Resolution and the first fragment are checked before returning, so the
/// common failures surface as an error instead of a truncated body. A failure
/// on a later fragment ends the stream with an error.
pub async fn download_file(
    manager: &FileManager,
    client: &ShardClient,
    filename: &str,
) -> Result<FragmentStream, ApiError> {
    let (shards, count) = manager.resolve_for_download(filename)?;
    if count == 0 {
        return Ok(stream::empty().boxed());
    }

    let first = open_fragment(client, &shards, filename, 0).await?;

    let client = client.clone();
    let shards: Arc<[String]> = shards.into();
    let filename = filename.to_string();
    let rest = stream::iter(1..count)
        .then(move |index| {
            let client = client.clone();
            let shards = shards.clone();
            let filename = filename.clone();
            async move { open_fragment(&client, &shards, &filename, index).await }
        })
        .try_flatten();

    Ok(first.chain(rest).boxed())
}
