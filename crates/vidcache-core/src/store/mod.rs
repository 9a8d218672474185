//! Durable keyed storage behind the video cache.
//!
//! A store holds two collections: `videos`, keyed by [`VideoId`] with
//! secondary indexes on `last_updated` and the [`IndexKey`] lookups, and
//! `metadata`, a string-keyed map of epoch-millisecond scalars.
//!
//! Engines:
//! - [`FileStore`]: JSON files in a cache directory, replaced atomically
//! - [`MemoryStore`]: process-local, with switchable failure injection
//!
//! A store is opened once at startup, shared by reference with the cache, and
//! closed at shutdown. Every operation on a closed store fails with
//! [`StorageError::NotOpen`](crate::error::StorageError::NotOpen).

pub mod file;
pub mod memory;
pub mod table;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use table::VideoTable;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{IndexKey, NewVideo, VideoId, VideoRecord};

/// Metadata key holding the time of the most recent bulk refresh.
pub const LAST_UPDATED_KEY: &str = "lastUpdated";

#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Stamp every video with `last_updated` and upsert by id, assigning ids
    /// where none is given. Returns the ids in input order.
    async fn upsert_videos(
        &self,
        videos: Vec<NewVideo>,
        last_updated: i64,
    ) -> StorageResult<Vec<VideoId>>;

    async fn all_videos(&self) -> StorageResult<Vec<VideoRecord>>;

    /// Videos whose `last_updated` is strictly below `cutoff`.
    async fn videos_updated_before(&self, cutoff: i64) -> StorageResult<Vec<VideoRecord>>;

    async fn videos_by(&self, key: &IndexKey) -> StorageResult<Vec<VideoRecord>>;

    async fn get_metadata(&self, key: &str) -> StorageResult<Option<i64>>;

    async fn put_metadata(&self, key: &str, value: i64) -> StorageResult<()>;

    /// Remove every video and every metadata entry.
    async fn clear(&self) -> StorageResult<()>;

    /// Release the store. Later calls fail with `NotOpen`.
    async fn close(&self) -> StorageResult<()>;
}
