// src/listing.rs
use serde::{Deserialize, Deserializer, Serialize};

/// Job-type labels that are never surfaced (recruiting posts and competitions).
pub const EXCLUDED_KINDS: [&str; 2] = ["求人", "コンペ"];

/// Placeholder kind for sources that don't expose a per-listing job type.
pub const KIND_NOT_SPECIFIED: &str = "not_specified";

/// Timestamp layout shared by the seen file, Slack text and sheet rows.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn is_excluded_kind(kind: &str) -> bool {
    EXCLUDED_KINDS.contains(&kind.trim())
}

/// One job listing as extracted from a search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub source_tag: String, // e.g., "Lancers_web", "CW_AI"
    pub id: String,
    pub kind: String,
    pub title: String,
    pub price: String,
    pub url: String,
}

/// A listing plus the local time it was first observed.
///
/// Field names on disk follow the historical seen-file layout
/// (`dtype` for the source tag, `type` for the kind). Only `id` is
/// required when reading; other fields tolerate null or absence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeenRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub time: String,
    #[serde(rename = "dtype", default, deserialize_with = "lenient_string")]
    pub source_tag: String,
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price: String,
}

impl SeenRecord {
    pub fn from_listing(listing: &Listing, time: &str) -> Self {
        Self {
            time: time.to_string(),
            source_tag: listing.source_tag.clone(),
            id: listing.id.clone(),
            kind: listing.kind.clone(),
            title: listing.title.clone(),
            url: listing.url.clone(),
            price: listing.price.clone(),
        }
    }
}

/// Row appended to the spreadsheet: `[time, source_tag, url, price, title]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub time: String,
    pub source_tag: String,
    pub url: String,
    pub price: String,
    pub title: String,
}

impl ExportRow {
    pub fn from_listing(listing: &Listing, time: &str) -> Self {
        Self {
            time: time.to_string(),
            source_tag: listing.source_tag.clone(),
            url: listing.url.clone(),
            price: listing.price.clone(),
            title: listing.title.clone(),
        }
    }

    pub fn into_cells(self) -> Vec<String> {
        vec![self.time, self.source_tag, self.url, self.price, self.title]
    }
}

// Older seen files stored CrowdWorks ids as JSON numbers.
fn id_from_string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(de)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

// null -> "", numbers and other scalars -> their JSON text.
fn lenient_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(de)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
