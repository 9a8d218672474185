//! In-memory indexed video collection shared by the store engines.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::models::{IndexKey, NewVideo, VideoId, VideoRecord};

/// Primary rows keyed by id, an ordered `(last_updated, id)` index for
/// range queries, and a multimap for the non-unique lookup keys.
#[derive(Debug, Clone, Default)]
pub struct VideoTable {
    last_id: u64,
    rows: BTreeMap<VideoId, VideoRecord>,
    by_updated: BTreeSet<(i64, VideoId)>,
    by_key: HashMap<IndexKey, BTreeSet<VideoId>>,
}

/// On-disk shape of a `VideoTable`. Indexes are rebuilt on load.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TableFile {
    #[serde(default)]
    pub last_id: u64,
    #[serde(default)]
    pub videos: Vec<VideoRecord>,
}

impl VideoTable {
    pub fn from_file(file: TableFile) -> Self {
        let mut table = Self {
            last_id: file.last_id,
            ..Default::default()
        };
        for record in file.videos {
            table.insert(record);
        }
        table
    }

    pub fn to_file(&self) -> TableFile {
        TableFile {
            last_id: self.last_id,
            videos: self.rows.values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stamp and upsert a batch. Records without an id get the next free one;
    /// an existing id is replaced wholesale.
    ///
    /// Fails with `WriteRejected` once the id sequence reaches `u64::MAX`.
    /// Records before the failing one stay applied; the engines work on a
    /// copy of the table and discard it on error.
    pub fn upsert_all(
        &mut self,
        videos: Vec<NewVideo>,
        last_updated: i64,
    ) -> StorageResult<Vec<VideoId>> {
        let mut ids = Vec::with_capacity(videos.len());
        for video in videos {
            let id = match video.id {
                Some(id) => id,
                None => self.next_id()?,
            };
            self.insert(video.into_record(id, last_updated));
            ids.push(id);
        }
        Ok(ids)
    }

    fn next_id(&self) -> StorageResult<VideoId> {
        self.last_id
            .checked_add(1)
            .map(VideoId)
            .ok_or_else(|| StorageError::WriteRejected("id sequence exhausted".to_string()))
    }

    fn insert(&mut self, record: VideoRecord) {
        let id = record.id;
        self.last_id = self.last_id.max(id.0);
        if let Some(old) = self.rows.remove(&id) {
            self.unindex(&old);
        }
        self.by_updated.insert((record.last_updated, id));
        for key in record.index_keys() {
            self.by_key.entry(key).or_default().insert(id);
        }
        self.rows.insert(id, record);
    }

    fn unindex(&mut self, record: &VideoRecord) {
        self.by_updated.remove(&(record.last_updated, record.id));
        for key in record.index_keys() {
            if let Some(ids) = self.by_key.get_mut(&key) {
                ids.remove(&record.id);
                if ids.is_empty() {
                    self.by_key.remove(&key);
                }
            }
        }
    }

    pub fn all(&self) -> Vec<VideoRecord> {
        self.rows.values().cloned().collect()
    }

    /// Records with `last_updated < cutoff`, oldest first.
    pub fn updated_before(&self, cutoff: i64) -> Vec<VideoRecord> {
        self.by_updated
            .range(..(cutoff, VideoId::MIN))
            .filter_map(|(_, id)| self.rows.get(id).cloned())
            .collect()
    }

    pub fn lookup(&self, key: &IndexKey) -> Vec<VideoRecord> {
        self.by_key
            .get(key)
            .map(|ids| ids.iter().filter_map(|id| self.rows.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Drop every row. The id sequence keeps counting so cleared ids are not
    /// handed out again.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.by_updated.clear();
        self.by_key.clear();
    }
}
