use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{VideoStore, VideoTable};
use crate::error::{StorageError, StorageResult};
use crate::models::{IndexKey, NewVideo, VideoId, VideoRecord};

#[derive(Debug, Default)]
struct MemoryState {
    videos: VideoTable,
    metadata: BTreeMap<String, i64>,
}

/// A store that lives only as long as the process.
///
/// `set_failing(true)` makes every subsequent operation fail with
/// `StorageError::Unavailable`. A store built with `with_capacity` rejects
/// any write that would leave more than that many records.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<Option<MemoryState>>,
    failing: AtomicBool,
    capacity: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Some(MemoryState::default())),
            failing: AtomicBool::new(false),
            capacity: None,
        }
    }

    pub fn with_capacity(max_videos: usize) -> Self {
        Self {
            capacity: Some(max_videos),
            ..Self::new()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    async fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> StorageResult<T> {
        self.check()?;
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(StorageError::NotOpen)?;
        Ok(f(state))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoStore for MemoryStore {
    async fn upsert_videos(
        &self,
        videos: Vec<NewVideo>,
        last_updated: i64,
    ) -> StorageResult<Vec<VideoId>> {
        let capacity = self.capacity;
        self.with_state(|s| -> StorageResult<Vec<VideoId>> {
            let mut next = s.videos.clone();
            let ids = next.upsert_all(videos, last_updated)?;
            if let Some(cap) = capacity.filter(|&cap| next.len() > cap) {
                return Err(StorageError::WriteRejected(format!(
                    "quota of {} records exceeded",
                    cap
                )));
            }
            s.videos = next;
            Ok(ids)
        })
        .await?
    }

    async fn all_videos(&self) -> StorageResult<Vec<VideoRecord>> {
        self.with_state(|s| s.videos.all()).await
    }

    async fn videos_updated_before(&self, cutoff: i64) -> StorageResult<Vec<VideoRecord>> {
        self.with_state(|s| s.videos.updated_before(cutoff)).await
    }

    async fn videos_by(&self, key: &IndexKey) -> StorageResult<Vec<VideoRecord>> {
        self.with_state(|s| s.videos.lookup(key)).await
    }

    async fn get_metadata(&self, key: &str) -> StorageResult<Option<i64>> {
        self.with_state(|s| s.metadata.get(key).copied()).await
    }

    async fn put_metadata(&self, key: &str, value: i64) -> StorageResult<()> {
        self.with_state(|s| {
            s.metadata.insert(key.to_string(), value);
        })
        .await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.with_state(|s| {
            s.videos.clear();
            s.metadata.clear();
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        self.state.lock().await.take();
        Ok(())
    }
}
