//! Data models for cached videos.
//!
//! - `NewVideo`: a record as supplied by the caller, without a timestamp
//! - `VideoRecord`: a record as persisted, stamped with `last_updated`
//! - `VideoId`: the locally assigned primary key
//! - `IndexKey`: secondary lookup keys maintained by every store engine
//!
//! Field names on disk follow the remote catalog feed (`vod_id`, `vod_name`,
//! ...) so that feed payloads deserialize directly into `NewVideo`.

pub mod video;

pub use video::{IndexKey, NewVideo, VideoId, VideoRecord};
