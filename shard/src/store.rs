use anyhow::anyhow;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use common::api_error::ApiError;
use common::constants::{FRAGMENT_DIR_NAME, TMP_DIR_NAME};
use common::fragment::fragment_file_name;

fn shard_dirs(name: &str) -> (String, String) {
    let hash = blake3::hash(name.as_bytes());
    let bytes = hash.as_bytes();
    (format!("{:02x}", bytes[0]), format!("{:02x}", bytes[1]))
}

pub fn fragment_path(root: &Path, name: &str) -> PathBuf {
    let (a, b) = shard_dirs(name);
    root.join(FRAGMENT_DIR_NAME)
        .join(a)
        .join(b)
        .join(fragment_file_name(name))
}

pub fn tmp_path(root: &Path, id: &str) -> PathBuf {
    root.join(TMP_DIR_NAME).join(id)
}

/// Creates the data layout and clears leftovers of interrupted stores.
/// Returns the number of temp files removed.
pub async fn init_dirs(root: &Path) -> anyhow::Result<usize> {
    fs::create_dir_all(root.join(FRAGMENT_DIR_NAME)).await?;
    fs::create_dir_all(root.join(TMP_DIR_NAME)).await?;

    let mut removed = 0;
    let mut entries = fs::read_dir(root.join(TMP_DIR_NAME)).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }

    Ok(removed)
}

async fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir).await?.sync_all().await
}

/// Streams `body` into a temp file, then renames it over the fragment.
/// Readers see either the previous blob or the complete new one.
pub async fn write_fragment<S, E>(root: &Path, name: &str, mut body: S) -> Result<u64, ApiError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let tmp = tmp_path(root, &Uuid::new_v4().to_string());

    let written: Result<u64, ApiError> = async {
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)
            .await?;

        let mut total: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ApiError::Any(anyhow!("body stream error: {}", e)))?;
            total += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        let final_path = fragment_path(root, name);
        let parent = final_path
            .parent()
            .ok_or_else(|| ApiError::Any(anyhow!("fragment path has no parent")))?;
        fs::create_dir_all(parent).await?;
        fs::rename(&tmp, &final_path).await?;
        fsync_dir(parent).await?;

        Ok(total)
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    written
}

pub async fn open_fragment(root: &Path, name: &str) -> Result<(File, u64), ApiError> {
    let path = fragment_path(root, name);
    let file = match File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ApiError::FragmentNotFound),
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata().await?.len();
    Ok((file, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn body(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, io::Error>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn read_all(root: &Path, name: &str) -> Vec<u8> {
        let (mut file, _) = open_fragment(root, name).await.unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        init_dirs(dir.path()).await.unwrap();

        let n = write_fragment(dir.path(), "a_0", body(&["hello ", "world"]))
            .await
            .unwrap();
        assert_eq!(n, 11);

        let (_, len) = open_fragment(dir.path(), "a_0").await.unwrap();
        assert_eq!(len, 11);
        assert_eq!(read_all(dir.path(), "a_0").await, b"hello world");
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let dir = TempDir::new().unwrap();
        init_dirs(dir.path()).await.unwrap();

        write_fragment(dir.path(), "a_0", body(&["first version"]))
            .await
            .unwrap();
        write_fragment(dir.path(), "a_0", body(&["v2"])).await.unwrap();

        assert_eq!(read_all(dir.path(), "a_0").await, b"v2");
    }

    #[tokio::test]
    async fn test_empty_fragment() {
        let dir = TempDir::new().unwrap();
        init_dirs(dir.path()).await.unwrap();

        let n = write_fragment(dir.path(), "e_0", body(&[])).await.unwrap();
        assert_eq!(n, 0);
        assert!(read_all(dir.path(), "e_0").await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_fragment() {
        let dir = TempDir::new().unwrap();
        init_dirs(dir.path()).await.unwrap();

        let err = open_fragment(dir.path(), "nope_0").await.unwrap_err();
        assert!(matches!(err, ApiError::FragmentNotFound));
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        init_dirs(dir.path()).await.unwrap();

        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("client went away")),
        ]);
        assert!(write_fragment(dir.path(), "b_0", broken).await.is_err());

        assert!(matches!(
            open_fragment(dir.path(), "b_0").await,
            Err(ApiError::FragmentNotFound)
        ));
        let mut tmp = fs::read_dir(dir.path().join(TMP_DIR_NAME)).await.unwrap();
        assert!(tmp.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_init_dirs_clears_tmp() {
        let dir = TempDir::new().unwrap();
        init_dirs(dir.path()).await.unwrap();

        fs::write(tmp_path(dir.path(), "leftover-1"), b"x").await.unwrap();
        fs::write(tmp_path(dir.path(), "leftover-2"), b"y").await.unwrap();

        assert_eq!(init_dirs(dir.path()).await.unwrap(), 2);
        assert_eq!(init_dirs(dir.path()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_names_differing_in_case_do_not_collide() {
        let dir = TempDir::new().unwrap();
        init_dirs(dir.path()).await.unwrap();

        write_fragment(dir.path(), "A_0", body(&["upper"])).await.unwrap();
        write_fragment(dir.path(), "a_0", body(&["lower"])).await.unwrap();

        assert_eq!(read_all(dir.path(), "A_0").await, b"upper");
        assert_eq!(read_all(dir.path(), "a_0").await, b"lower");
    }
}
