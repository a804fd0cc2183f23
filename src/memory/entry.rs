//! Store entry types

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::utils::truncate_chars;

/// Caller-supplied metadata, opaque to the engine
pub type Metadata = Map<String, Value>;

/// Characters of the text mixed into the id hash
const ID_PREFIX_CHARS: usize = 200;

/// A single embedded text in the flat store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreEntry {
    /// Content+time derived identifier
    pub id: String,
    /// Stored text, already truncated to the store limit
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Character length of the text before truncation
    #[serde(default)]
    pub text_length: usize,
}

impl StoreEntry {
    /// 16 hex chars of SHA-256 over the text prefix and the insertion instant.
    pub fn derive_id(text: &str, timestamp: &DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(truncate_chars(text, ID_PREFIX_CHARS).as_bytes());
        let nanos = timestamp
            .timestamp_nanos_opt()
            .unwrap_or_else(|| timestamp.timestamp_micros());
        hasher.update(nanos.to_le_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }
}

/// Timestamps are written as RFC 3339, but older store files carry float
/// epoch seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    EpochSeconds(f64),
    Rfc3339(DateTime<Utc>),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Rfc3339(ts) => Ok(ts),
        RawTimestamp::EpochSeconds(secs) => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::from_timestamp(whole as i64, nanos)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", secs)))
        }
    }
}

/// One ranked result of a store search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    /// Entry text cut for display
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the store for monitoring
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_entries: usize,
    pub max_entries: usize,
    pub embed_model: String,
    pub store_path: PathBuf,
    pub total_text_chars: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}
