use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::table::TableFile;
use super::{VideoStore, VideoTable};
use crate::error::{StorageError, StorageResult};
use crate::models::{IndexKey, NewVideo, VideoId, VideoRecord};

/// Video collection file name in the cache directory
const VIDEOS_FILE: &str = "videos.json";

/// Metadata file name in the cache directory
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug)]
struct FileState {
    videos: VideoTable,
    metadata: BTreeMap<String, i64>,
}

/// JSON-file store rooted at a cache directory.
///
/// Both collections are loaded at open and kept in memory; every write
/// rewrites the affected file through a synced temp file and a rename, then
/// syncs the directory (on Unix). The in-memory copy is only updated once
/// the rename succeeded, and a failed write removes its temp file. A crash
/// mid-write therefore leaves the previous file intact.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    state: Mutex<Option<FileState>>,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let videos = read_json::<TableFile>(&dir.join(VIDEOS_FILE))
            .await?
            .map(VideoTable::from_file)
            .unwrap_or_default();
        let metadata = read_json::<BTreeMap<String, i64>>(&dir.join(METADATA_FILE))
            .await?
            .unwrap_or_default();

        debug!(dir = %dir.display(), videos = videos.len(), "Opened video store");

        Ok(Self {
            dir,
            state: Mutex::new(Some(FileState { videos, metadata })),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn videos_path(&self) -> PathBuf {
        self.dir.join(VIDEOS_FILE)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    async fn read<T>(&self, f: impl FnOnce(&FileState) -> T) -> StorageResult<T> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(StorageError::NotOpen)?;
        Ok(f(state))
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    let contents = match fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&contents)
        .map(Some)
        .map_err(|e| StorageError::Corrupt(format!("{}: {}", path.display(), e)))
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let contents = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");

    if let Err(e) = replace_file(&tmp, path, &contents).await {
        // The temp file may never have been created
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    // The new contents are already in place, so a failed directory sync only
    // weakens durability of the rename.
    if let Err(e) = sync_parent_dir(path).await {
        warn!(path = %path.display(), error = %e, "Failed to sync cache directory");
    }
    Ok(())
}

async fn replace_file(tmp: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp, path).await
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[async_trait]
impl VideoStore for FileStore {
    async fn upsert_videos(
        &self,
        videos: Vec<NewVideo>,
        last_updated: i64,
    ) -> StorageResult<Vec<VideoId>> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(StorageError::NotOpen)?;

        let mut next = state.videos.clone();
        let ids = next.upsert_all(videos, last_updated)?;
        write_json_atomic(&self.videos_path(), &next.to_file()).await?;
        state.videos = next;

        debug!(count = ids.len(), total = state.videos.len(), "Wrote videos");
        Ok(ids)
    }

    async fn all_videos(&self) -> StorageResult<Vec<VideoRecord>> {
        self.read(|s| s.videos.all()).await
    }

    async fn videos_updated_before(&self, cutoff: i64) -> StorageResult<Vec<VideoRecord>> {
        self.read(|s| s.videos.updated_before(cutoff)).await
    }

    async fn videos_by(&self, key: &IndexKey) -> StorageResult<Vec<VideoRecord>> {
        self.read(|s| s.videos.lookup(key)).await
    }

    async fn get_metadata(&self, key: &str) -> StorageResult<Option<i64>> {
        self.read(|s| s.metadata.get(key).copied()).await
    }

    async fn put_metadata(&self, key: &str, value: i64) -> StorageResult<()> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(StorageError::NotOpen)?;

        let mut next = state.metadata.clone();
        next.insert(key.to_string(), value);
        write_json_atomic(&self.metadata_path(), &next).await?;
        state.metadata = next;
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(StorageError::NotOpen)?;

        // Videos first, then metadata; a failure in between leaves the
        // refresh timestamp behind with an empty collection.
        let mut videos = state.videos.clone();
        videos.clear();
        write_json_atomic(&self.videos_path(), &videos.to_file()).await?;
        state.videos = videos;

        let metadata = BTreeMap::new();
        write_json_atomic(&self.metadata_path(), &metadata).await?;
        state.metadata = metadata;

        debug!(dir = %self.dir.display(), "Cleared video store");
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        if self.state.lock().await.take().is_some() {
            debug!(dir = %self.dir.display(), "Closed video store");
        }
        Ok(())
    }
}
