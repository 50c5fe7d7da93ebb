use crate::identity::parse_follower_count;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// What is known about an author's relationship to the viewer.
///
/// Every field is optional: `None` means unknown, never false or zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustRecord {
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub following: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub followed_by: Option<bool>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub followers_count: Option<u64>,
}

impl TrustRecord {
    /// Field-wise overwrite with whatever `update` knows.
    pub fn merge(&mut self, update: &TrustRecord) {
        if update.following.is_some() {
            self.following = update.following;
        }
        if update.followed_by.is_some() {
            self.followed_by = update.followed_by;
        }
        if update.followers_count.is_some() {
            self.followers_count = update.followers_count;
        }
    }

    /// A record is complete once the follower count is known; that is the
    /// field lookups keep chasing.
    pub fn is_complete(&self) -> bool {
        self.followers_count.is_some()
    }
}

// The oracle reads another application's state; values of the wrong type are
// treated as unknown instead of failing the whole record.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_bool()))
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        v.as_u64()
            .or_else(|| {
                v.as_f64()
                    .filter(|n| n.is_finite() && *n >= 0.0)
                    .map(|n| n.floor() as u64)
            })
            // Some sources hand back the displayed label ("12.3K").
            .or_else(|| v.as_str().and_then(parse_follower_count))
    }))
}

/// Author id -> partial trust knowledge, for the lifetime of one page.
#[derive(Debug, Default)]
pub struct TrustCache {
    records: HashMap<String, TrustRecord>,
}

impl TrustCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, author_id: &str) -> Option<&TrustRecord> {
        self.records.get(&author_id.to_lowercase())
    }

    /// Merges `partial` into the record for `author_id`, creating it on first sight.
    pub fn merge(&mut self, author_id: &str, partial: &TrustRecord) {
        self.records
            .entry(author_id.to_lowercase())
            .or_default()
            .merge(partial);
    }

    /// Whether a lookup could still teach us something about `author_id`.
    pub fn needs_lookup(&self, author_id: &str) -> bool {
        self.get(author_id).map_or(true, |record| !record.is_complete())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
