use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::RefreshAge;
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheResult, StorageResult};
use crate::models::{IndexKey, NewVideo, VideoId, VideoRecord};
use crate::store::{VideoStore, LAST_UPDATED_KEY};

/// Records older than this are reported by `find_stale_default`.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);

fn threshold_ms(threshold: Duration) -> i64 {
    i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX)
}

pub struct VideoCache<S: VideoStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: VideoStore + ?Sized> Clone for VideoCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: VideoStore + ?Sized> VideoCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // ===== Writes =====

    /// Bulk refresh stamped with the current time. See [`Self::store_all_at`].
    pub async fn store_all(&self, videos: Vec<NewVideo>) -> CacheResult<Vec<VideoId>> {
        self.store_all_at(videos, self.now_ms()).await
    }

    /// Bulk refresh: stamp every record with `timestamp`, upsert by id, then
    /// record `timestamp` as the collection's last refresh.
    ///
    /// The whole batch is validated before anything is written. Storage
    /// failures are not rolled back; some records (and not the refresh time)
    /// may have been written when an error comes back.
    pub async fn store_all_at(
        &self,
        videos: Vec<NewVideo>,
        timestamp: i64,
    ) -> CacheResult<Vec<VideoId>> {
        NewVideo::validate_all(&videos)?;

        let ids = self.store.upsert_videos(videos, timestamp).await?;
        self.store.put_metadata(LAST_UPDATED_KEY, timestamp).await?;

        debug!(count = ids.len(), timestamp, "Stored video refresh");
        Ok(ids)
    }

    /// Incremental update: re-stamp `videos` with the current time and upsert
    /// them. The last refresh time is left alone.
    ///
    /// Each record is written under its own embedded `id`; `ids` is not used
    /// for matching. It is only compared against the records to log a warning
    /// when the two disagree, so callers must keep `videos[i].id == ids[i]`
    /// themselves. A record with no id is inserted under a fresh one.
    pub async fn update_many(
        &self,
        ids: &[VideoId],
        videos: Vec<NewVideo>,
    ) -> CacheResult<Vec<VideoId>> {
        NewVideo::validate_all(&videos)?;

        if ids.len() != videos.len() {
            warn!(
                ids = ids.len(),
                records = videos.len(),
                "update_many: id list and record list differ in length"
            );
        } else {
            let mismatched = ids
                .iter()
                .zip(&videos)
                .filter(|(id, video)| video.id != Some(**id))
                .count();
            if mismatched > 0 {
                warn!(
                    mismatched,
                    "update_many: records will be written under their own ids, not the listed ones"
                );
            }
        }

        let written = self.store.upsert_videos(videos, self.now_ms()).await?;
        debug!(count = written.len(), "Updated videos");
        Ok(written)
    }

    /// Remove every record and the refresh time.
    pub async fn clear_all(&self) -> StorageResult<()> {
        self.store.clear().await?;
        debug!("Cleared video cache");
        Ok(())
    }

    // ===== Reads =====

    /// Every stored record, in no particular order.
    pub async fn fetch_all(&self) -> StorageResult<Vec<VideoRecord>> {
        self.store.all_videos().await
    }

    /// Records sharing a secondary key. Not used by the cache itself.
    pub async fn lookup(&self, key: &IndexKey) -> StorageResult<Vec<VideoRecord>> {
        self.store.videos_by(key).await
    }

    /// Epoch-ms time of the last bulk refresh, or `None` if there never was
    /// one or the store could not be read.
    pub async fn last_refreshed_at(&self) -> Option<i64> {
        match self.store.get_metadata(LAST_UPDATED_KEY).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to read last refresh time");
                None
            }
        }
    }

    pub async fn refresh_age(&self) -> RefreshAge {
        RefreshAge::new(self.last_refreshed_at().await, self.now_ms())
    }

    /// Records last written strictly before `now - threshold`. A store read
    /// failure is logged and reported as nothing stale.
    pub async fn find_stale(&self, threshold: Duration) -> Vec<VideoRecord> {
        let cutoff = self.now_ms().saturating_sub(threshold_ms(threshold));
        match self.store.videos_updated_before(cutoff).await {
            Ok(stale) => {
                debug!(cutoff, count = stale.len(), "Stale video check");
                stale
            }
            Err(e) => {
                warn!(error = %e, cutoff, "Failed to query stale videos");
                Vec::new()
            }
        }
    }

    pub async fn find_stale_default(&self) -> Vec<VideoRecord> {
        self.find_stale(DEFAULT_STALE_THRESHOLD).await
    }

    /// True when no bulk refresh is on record, or the last one is older than
    /// `threshold`. An unreadable store counts as never refreshed.
    pub async fn refresh_due(&self, threshold: Duration) -> bool {
        match self.last_refreshed_at().await {
            Some(at) => at < self.now_ms().saturating_sub(threshold_ms(threshold)),
            None => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{CacheError, StorageError, ValidationError};
    use crate::store::MemoryStore;

    fn cache_at(now: i64) -> (VideoCache<MemoryStore>, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let cache = VideoCache::with_clock(Arc::clone(&store), clock.clone());
        (cache, store, clock)
    }

    fn abc() -> Vec<NewVideo> {
        vec![
            NewVideo::new("a", "Alpha").with_id(1),
            NewVideo::new("b", "Bravo").with_id(2),
            NewVideo::new("c", "Charlie").with_id(3),
        ]
    }

    #[tokio::test]
    async fn test_store_all_stamps_and_sets_refresh_time() {
        let (cache, _, _) = cache_at(5000);
        let ids = cache.store_all(abc()).await.unwrap();
        assert_eq!(ids, vec![VideoId(1), VideoId(2), VideoId(3)]);

        let all = cache.fetch_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|r| r.last_updated == 5000));
        assert_eq!(cache.last_refreshed_at().await, Some(5000));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_one_row_with_latest_stamp() {
        let (cache, _, _) = cache_at(0);
        let video = NewVideo::new("a", "Alpha").with_id(1);
        cache.store_all_at(vec![video.clone()], 100).await.unwrap();
        cache.store_all_at(vec![video], 200).await.unwrap();

        let all = cache.fetch_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].last_updated, 200);
    }

    #[tokio::test]
    async fn test_stale_boundary() {
        let threshold = Duration::from_millis(500);
        let (cache, _, clock) = cache_at(0);
        cache.store_all_at(abc(), 1000).await.unwrap();

        clock.set(1500);
        assert!(cache.find_stale(threshold).await.is_empty());

        clock.set(1501);
        assert_eq!(cache.find_stale(threshold).await.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_scenario() {
        let threshold = Duration::from_millis(500);
        let (cache, _, clock) = cache_at(0);
        cache.store_all_at(abc(), 1000).await.unwrap();

        clock.set(1400);
        assert!(cache.find_stale(threshold).await.is_empty());

        clock.set(1600);
        let mut stale: Vec<_> = cache
            .find_stale(threshold)
            .await
            .into_iter()
            .map(|r| r.source_id)
            .collect();
        stale.sort();
        assert_eq!(stale, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_default_threshold_is_a_day() {
        let day = 24 * 60 * 60 * 1000;
        let (cache, _, clock) = cache_at(0);
        cache.store_all_at(abc(), 0).await.unwrap();

        clock.set(day);
        assert!(cache.find_stale_default().await.is_empty());
        clock.set(day + 1);
        assert_eq!(cache.find_stale_default().await.len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_time_follows_latest_bulk_store() {
        let (cache, _, clock) = cache_at(0);
        cache.store_all_at(abc(), 1000).await.unwrap();
        cache
            .store_all_at(vec![NewVideo::new("d", "Delta")], 2000)
            .await
            .unwrap();
        assert_eq!(cache.last_refreshed_at().await, Some(2000));

        clock.set(9000);
        cache
            .update_many(&[VideoId(1)], vec![NewVideo::new("a", "Alpha 2").with_id(1)])
            .await
            .unwrap();
        assert_eq!(cache.last_refreshed_at().await, Some(2000));
    }

    #[tokio::test]
    async fn test_update_many_restamps_with_now() {
        let (cache, _, clock) = cache_at(0);
        cache.store_all_at(abc(), 1000).await.unwrap();

        clock.set(3000);
        cache
            .update_many(&[VideoId(2)], vec![NewVideo::new("b", "Bravo 2").with_id(2)])
            .await
            .unwrap();

        let stale = cache.find_stale(Duration::from_millis(1000)).await;
        let mut ids: Vec<_> = stale.iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, vec![VideoId(1), VideoId(3)]);
    }

    #[tokio::test]
    async fn test_update_many_uses_embedded_ids() {
        let (cache, _, _) = cache_at(10);
        cache.store_all(abc()).await.unwrap();

        // Listed id 1 but the record says 3: record 3 is the one replaced
        let written = cache
            .update_many(&[VideoId(1)], vec![NewVideo::new("c", "Replaced").with_id(3)])
            .await
            .unwrap();
        assert_eq!(written, vec![VideoId(3)]);

        let all = cache.fetch_all().await.unwrap();
        let one = all.iter().find(|r| r.id == VideoId(1)).unwrap();
        let three = all.iter().find(|r| r.id == VideoId(3)).unwrap();
        assert_eq!(one.name, "Alpha");
        assert_eq!(three.name, "Replaced");
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let (cache, _, _) = cache_at(10);
        cache.store_all(abc()).await.unwrap();
        cache.clear_all().await.unwrap();

        assert!(cache.fetch_all().await.unwrap().is_empty());
        assert_eq!(cache.last_refreshed_at().await, None);
        assert_eq!(cache.refresh_age().await.to_string(), "never");
    }

    #[tokio::test]
    async fn test_read_failures_degrade_for_advisory_queries() {
        let (cache, store, clock) = cache_at(0);
        cache.store_all_at(abc(), 1000).await.unwrap();
        clock.set(10_000);

        store.set_failing(true);
        assert!(cache.find_stale(Duration::from_millis(1)).await.is_empty());
        assert_eq!(cache.last_refreshed_at().await, None);
        assert!(cache.refresh_due(Duration::from_secs(3600)).await);

        assert!(matches!(
            cache.fetch_all().await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(matches!(
            cache.store_all(abc()).await,
            Err(CacheError::Storage(_))
        ));
        assert!(matches!(
            cache.update_many(&[], abc()).await,
            Err(CacheError::Storage(_))
        ));
        assert!(cache.clear_all().await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_refresh_time_untouched() {
        let store = Arc::new(MemoryStore::with_capacity(3));
        let cache = VideoCache::with_clock(Arc::clone(&store), Arc::new(ManualClock::new(100)));
        cache.store_all(abc()).await.unwrap();

        let err = cache
            .store_all_at(vec![NewVideo::new("d", "Delta")], 200)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Storage(StorageError::WriteRejected(_))
        ));
        assert_eq!(cache.last_refreshed_at().await, Some(100));
    }

    #[tokio::test]
    async fn test_validation_rejects_batch_before_writing() {
        let (cache, _, _) = cache_at(10);
        let mut batch = abc();
        batch.push(NewVideo::new("d", ""));

        let err = cache.store_all(batch).await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::Validation(ValidationError::MissingField { index: 3, .. })
        ));
        assert!(cache.fetch_all().await.unwrap().is_empty());
        assert_eq!(cache.last_refreshed_at().await, None);
    }

    #[tokio::test]
    async fn test_refresh_due() {
        let hour = Duration::from_secs(3600);
        let (cache, _, clock) = cache_at(0);
        assert!(cache.refresh_due(hour).await);

        cache.store_all(abc()).await.unwrap();
        clock.set(3_600_000);
        assert!(!cache.refresh_due(hour).await);
        clock.set(3_600_001);
        assert!(cache.refresh_due(hour).await);
    }

    #[tokio::test]
    async fn test_lookup_by_source_id() {
        let (cache, _, _) = cache_at(10);
        cache
            .store_all(vec![
                NewVideo::new("77", "Cut A"),
                NewVideo::new("77", "Cut B"),
                NewVideo::new("78", "Other").with_year("1999"),
            ])
            .await
            .unwrap();

        assert_eq!(
            cache
                .lookup(&IndexKey::SourceId("77".into()))
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            cache.lookup(&IndexKey::Year("1999".into())).await.unwrap()[0].name,
            "Other"
        );
    }

    #[tokio::test]
    async fn test_works_behind_trait_object() {
        let store: Arc<dyn VideoStore> = Arc::new(MemoryStore::new());
        let cache = VideoCache::with_clock(store, Arc::new(ManualClock::new(42)));
        cache.store_all(abc()).await.unwrap();
        assert_eq!(cache.last_refreshed_at().await, Some(42));
    }
}
