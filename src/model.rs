// src/model.rs
//! Run-scoped value types shared across the pipeline stages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A listing as emitted by a feed reader or site crawler, before
/// normalization. Timestamps are whatever the source gave us (RFC 2822,
/// RFC 3339, or free text); the normalizer parses them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawListing {
    pub title: String,
    pub link: String,
    pub source: Option<String>,
    pub created_at: Option<String>,
    pub deadline: Option<String>,
    pub prize: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Canonical catalog entry. Field names serialize in camelCase so the
/// catalog JSON is directly consumable by the browsing UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub link: String,
    pub source: String,
    #[serde(default, with = "iso_millis_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "iso_millis_opt")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prize: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Listing {
    /// Stable identifier: the cleaned link when present, otherwise a
    /// content hash of (title, source).
    pub fn derive_id(link: &str, title: &str, source: &str) -> String {
        if !link.is_empty() {
            return link.to_string();
        }
        let mut hasher = Sha256::new();
        hasher.update(title.to_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(source.to_lowercase().as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("h:{}", &hex[..16])
    }
}

/// ISO-8601 with milliseconds and a `Z` suffix, `null` when absent.
pub mod iso_millis_opt {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        v: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match v {
            Some(dt) => s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Record counts after each pipeline stage. `upgraded` and `canonicalized`
/// count records whose link actually changed in that stage; the other
/// fields count surviving records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageCounts {
    pub raw: usize,
    pub normalized: usize,
    pub upgraded: usize,
    pub canonicalized: usize,
    pub deduped: usize,
    pub kept: usize,
}

/// Per-source yield and structural stats.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceStats {
    pub items: usize,
    pub pages_crawled: usize,
    pub links_indexed: usize,
}

/// Health summary for one run. Built fresh each run, written once at the
/// end, never merged across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHealth {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: StageCounts,
    pub sources: BTreeMap<String, SourceStats>,
}
