// Core structs: RawReview, ListingTarget, CanonicalReview, SubScore, ReconciliationReport
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One scraped review as the scraper handed it over: field name to raw value.
/// Missing keys and `null` values are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawReview(pub Map<String, Value>);

impl RawReview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by tests and fixtures.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the trimmed literal of a scalar field. Numbers are rendered the
    /// way the scraper serialized them, empty strings count as missing.
    pub fn text(&self, key: &str) -> Result<Option<String>, ExtractionError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(ExtractionError::InvalidField {
                field: key.to_string(),
                found: kind_of(other),
            }),
        }
    }

    /// First present literal among `keys`.
    pub fn first_text(&self, keys: &[&str]) -> Result<Option<String>, ExtractionError> {
        for key in keys {
            if let Some(value) = self.text(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Tag lists arrive either as one delimited string or as an array of strings.
    pub fn tags(&self, key: &str) -> Result<Option<TagsInput>, ExtractionError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(TagsInput::Delimited(s.clone()))),
            Some(Value::Array(items)) => {
                let mut tokens = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => tokens.push(s.clone()),
                        Value::Null => {}
                        other => {
                            return Err(ExtractionError::InvalidField {
                                field: key.to_string(),
                                found: kind_of(other),
                            });
                        }
                    }
                }
                Ok((!tokens.is_empty()).then_some(TagsInput::Tokens(tokens)))
            }
            Some(other) => Err(ExtractionError::InvalidField {
                field: key.to_string(),
                found: kind_of(other),
            }),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Raw tag blob handed to `TagNormalizer::normalize_from_tags`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagsInput {
    Delimited(String),
    Tokens(Vec<String>),
}

impl TagsInput {
    /// Source literal kept for audit in the `_original` columns.
    pub fn literal(&self) -> String {
        match self {
            TagsInput::Delimited(s) => s.trim().to_string(),
            TagsInput::Tokens(tokens) => tokens.join(", "),
        }
    }
}

/// One (hotel x OTA) listing being crawled. Owned by the crawl orchestration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingTarget {
    pub listing_id: i64,
    pub hotel_slug: String,
    pub ota_name: String,
}

/// Sub-score categories. Which ones apply depends on the OTA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubScoreCategory {
    Location,
    Service,
    Cleanliness,
    Facilities,
    Room,
    Bath,
    Food,
    Breakfast,
    Dinner,
}

impl SubScoreCategory {
    pub const ALL: [SubScoreCategory; 9] = [
        SubScoreCategory::Location,
        SubScoreCategory::Service,
        SubScoreCategory::Cleanliness,
        SubScoreCategory::Facilities,
        SubScoreCategory::Room,
        SubScoreCategory::Bath,
        SubScoreCategory::Food,
        SubScoreCategory::Breakfast,
        SubScoreCategory::Dinner,
    ];

    /// Raw field prefix used by scrapers, e.g. `bath` for `bath_score_original`.
    pub fn prefix(self) -> &'static str {
        match self {
            SubScoreCategory::Location => "location",
            SubScoreCategory::Service => "service",
            SubScoreCategory::Cleanliness => "cleanliness",
            SubScoreCategory::Facilities => "facilities",
            SubScoreCategory::Room => "room",
            SubScoreCategory::Bath => "bath",
            SubScoreCategory::Food => "food",
            SubScoreCategory::Breakfast => "breakfast",
            SubScoreCategory::Dinner => "dinner",
        }
    }

    /// Stored category key.
    pub fn as_str(self) -> &'static str {
        match self {
            SubScoreCategory::Location => "LOCATION",
            SubScoreCategory::Service => "SERVICE",
            SubScoreCategory::Cleanliness => "CLEANLINESS",
            SubScoreCategory::Facilities => "FACILITIES",
            SubScoreCategory::Room => "ROOM",
            SubScoreCategory::Bath => "BATH",
            SubScoreCategory::Food => "FOOD",
            SubScoreCategory::Breakfast => "BREAKFAST",
            SubScoreCategory::Dinner => "DINNER",
        }
    }
}

impl fmt::Display for SubScoreCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubScoreCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubScoreCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown score category '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubScore {
    pub category: SubScoreCategory,
    /// On the 10-point target scale; `None` when the literal was not numeric.
    pub score: Option<Decimal>,
    pub score_original: String,
}

/// The reconciled review. Normalized fields sit next to their `_original` literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalReview {
    pub review_hash: String,
    pub listing_id: i64,
    pub ota_name: String,
    pub hotel_slug: String,
    pub review_id_in_ota: Option<String>,
    pub reviewer_name: Option<String>,
    pub review_title: Option<String>,

    pub overall_score: Option<Decimal>,
    pub overall_score_original: Option<String>,
    pub original_score_scale: Option<Decimal>,
    pub sub_scores: Vec<SubScore>,

    pub traveler_type: Option<String>,
    pub traveler_type_original: Option<String>,
    pub purpose_of_visit: Option<String>,
    pub purpose_of_visit_original: Option<String>,
    pub room_type: Option<String>,
    pub room_type_original: Option<String>,
    pub gender: Option<String>,
    pub age_group: Option<String>,

    pub review_date: Option<NaiveDate>,
    pub review_date_original: Option<String>,
    pub stay_date: Option<NaiveDate>,
    pub stay_date_original: Option<String>,

    pub review_comment: Option<String>,
    pub translated_review_comment: Option<String>,
    pub language_code: Option<String>,
    pub review_language: Option<String>,

    pub crawled_at: DateTime<Utc>,
}

impl CanonicalReview {
    pub fn sub_score(&self, category: SubScoreCategory) -> Option<&SubScore> {
        self.sub_scores.iter().find(|s| s.category == category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Where a record was in RECEIVED -> NORMALIZED -> HASHED when it was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStage {
    Received,
    Normalized,
    Hashed,
}

impl fmt::Display for RecordStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordStage::Received => "received",
            RecordStage::Normalized => "normalized",
            RecordStage::Hashed => "hashed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct SkippedRecord {
    pub index: usize,
    pub stage: RecordStage,
    pub reason: RecordError,
    pub raw: RawReview,
}

#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failures: Vec<SkippedRecord>,
    /// Set when the batch stopped early on the cancellation flag.
    pub cancelled: bool,
}

impl ReconciliationReport {
    pub fn processed(&self) -> usize {
        self.created + self.updated + self.skipped
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid category mapping: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid category mapping: {0}")]
    Mapping(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("record has neither reviewer_name nor review_date; identity cannot be computed")]
    MissingIdentity,
    #[error("field '{field}' holds a {found}, expected a scalar")]
    InvalidField { field: String, found: &'static str },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

/// Why a single record was skipped.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Persistence(#[from] StorageError),
}
