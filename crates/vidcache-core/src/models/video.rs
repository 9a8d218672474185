use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Locally assigned primary key. `0` is reserved and never handed out.
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub u64);

impl VideoId {
    pub const MIN: VideoId = VideoId(0);

    pub fn is_reserved(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VideoId {
    fn from(value: u64) -> Self {
        VideoId(value)
    }
}

/// A video as handed to the cache for writing.
///
/// Carries no `last_updated`: the cache stamps every record itself, and a
/// `last_updated` key in an incoming payload is dropped on deserialization.
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVideo {
    /// Existing primary key to overwrite, or `None` to have one assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<VideoId>,
    #[serde(rename = "vod_id", default, deserialize_with = "string_or_number")]
    pub source_id: String,
    #[serde(rename = "vod_name", default)]
    pub name: String,
    #[serde(rename = "vod_pic", default)]
    pub picture_url: Option<String>,
    #[serde(rename = "vod_year", default, deserialize_with = "opt_string_or_number")]
    pub year: Option<String>,
    #[serde(rename = "vod_play_url", default)]
    pub play_url: Option<String>,
}

impl NewVideo {
    pub fn new(source_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<VideoId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_picture_url(mut self, url: impl Into<String>) -> Self {
        self.picture_url = Some(url.into());
        self
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    pub fn with_play_url(mut self, url: impl Into<String>) -> Self {
        self.play_url = Some(url.into());
        self
    }

    /// Check required and optional fields. `index` is the position in the
    /// batch and is echoed back in the error.
    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if let Some(id) = self.id {
            if id.is_reserved() {
                return Err(ValidationError::ReservedId { index, id });
            }
        }
        if self.source_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                index,
                field: "vod_id",
            });
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                index,
                field: "vod_name",
            });
        }
        if let Some(ref url) = self.picture_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ValidationError::InvalidField {
                    index,
                    field: "vod_pic",
                    reason: format!("expected an http(s) URL, got {:?}", url),
                });
            }
        }
        if let Some(ref year) = self.year {
            if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ValidationError::InvalidField {
                    index,
                    field: "vod_year",
                    reason: format!("expected four digits, got {:?}", year),
                });
            }
        }
        Ok(())
    }

    /// Validate a whole batch, stopping at the first bad record.
    pub fn validate_all(videos: &[NewVideo]) -> Result<(), ValidationError> {
        videos
            .iter()
            .enumerate()
            .try_for_each(|(index, video)| video.validate(index))
    }

    /// Attach the primary key and write timestamp, producing the stored form.
    pub fn into_record(self, id: VideoId, last_updated: i64) -> VideoRecord {
        VideoRecord {
            id,
            source_id: self.source_id,
            name: self.name,
            picture_url: self.picture_url,
            year: self.year,
            play_url: self.play_url,
            last_updated,
        }
    }
}

/// A video as persisted in the cache.
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: VideoId,
    #[serde(rename = "vod_id")]
    pub source_id: String,
    #[serde(rename = "vod_name")]
    pub name: String,
    #[serde(rename = "vod_pic", default)]
    pub picture_url: Option<String>,
    #[serde(rename = "vod_year", default)]
    pub year: Option<String>,
    #[serde(rename = "vod_play_url", default)]
    pub play_url: Option<String>,
    /// Epoch milliseconds of the write that produced this record.
    pub last_updated: i64,
}

impl VideoRecord {
    /// Secondary index entries for this record.
    pub fn index_keys(&self) -> Vec<IndexKey> {
        let mut keys = vec![
            IndexKey::SourceId(self.source_id.clone()),
            IndexKey::Name(self.name.clone()),
        ];
        if let Some(ref pic) = self.picture_url {
            keys.push(IndexKey::PictureUrl(pic.clone()));
        }
        if let Some(ref year) = self.year {
            keys.push(IndexKey::Year(year.clone()));
        }
        keys
    }
}

/// Non-unique secondary lookup keys.
///
/// `SourceId` is only ever a lookup: the remote catalog does not guarantee
/// its ids are unique, so the primary key stays the local `VideoId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    SourceId(String),
    Name(String),
    PictureUrl(String),
    Year(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
        }
    }
}

/// Catalog feeds send ids and years as either JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?
        .map(String::from)
        .filter(|s| !s.is_empty()))
}
