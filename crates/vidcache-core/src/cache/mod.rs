//! The local video cache.
//!
//! `VideoCache` is a stateless facade over an injected [`VideoStore`]: it
//! stamps writes with the current time, tracks the last bulk refresh, and
//! reports which records are older than a staleness threshold (24 hours by
//! default).
//!
//! Writes and `fetch_all` propagate storage failures. The advisory reads,
//! `last_refreshed_at` and `find_stale`, log the failure and fall back to
//! "absent" and "nothing stale" so that a broken store never blocks startup.
//!
//! [`VideoStore`]: crate::store::VideoStore

pub mod age;
pub mod manager;

pub use age::RefreshAge;
pub use manager::{VideoCache, DEFAULT_STALE_THRESHOLD};
