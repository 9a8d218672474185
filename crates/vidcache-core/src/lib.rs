//! vidcache-core - local persistence for a catalog of video metadata.
//!
//! The crate keeps the latest known set of video records on disk, remembers
//! when the collection was last bulk-refreshed, and reports which records are
//! old enough to be fetched again. It never talks to the network; a fetch
//! orchestrator decides when to call it.
//!
//! - [`models`]: `NewVideo` (caller input) and `VideoRecord` (stored form)
//! - [`store`]: the `VideoStore` trait plus `FileStore` and `MemoryStore`
//! - [`cache`]: the `VideoCache` facade and its staleness policy
//! - [`config`]: on-disk configuration and cache directory resolution

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use cache::{RefreshAge, VideoCache, DEFAULT_STALE_THRESHOLD};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{CacheError, StorageError, ValidationError};
pub use models::{IndexKey, NewVideo, VideoId, VideoRecord};
pub use store::{FileStore, MemoryStore, VideoStore};
