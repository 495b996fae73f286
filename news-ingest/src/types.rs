use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder written in place of a missing article image. Downstream
/// consumers expect the literal string rather than a JSON or SQL null.
pub const MISSING_IMAGE: &str = "None";

/// Top-level decoded message from the raw topic: one page of articles as the
/// upstream crawler delivered them. Absent fields decode as empty rather
/// than failing the message; a type mismatch still fails the decode.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub news: Vec<Article>,
    #[serde(default)]
    pub page: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
}

/// One article-category pair, the unit everything downstream operates on.
/// Serializes to exactly the shape published on the cleaned topic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FlatRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub author: Option<String>,
    pub image: Option<String>,
    pub language: String,
    pub category: String,
    pub published: Option<DateTime<Utc>>,
}

impl FlatRecord {
    /// Kafka partition key of the cleaned record. Keyed on the article id
    /// alone, so the per-category expansions of one article share a key.
    pub fn key(&self) -> &str {
        &self.id
    }

    /// Composite key the latest-state table and batch dedup are keyed on.
    pub fn merge_key(&self) -> (&str, &str) {
        (&self.id, &self.category)
    }
}
