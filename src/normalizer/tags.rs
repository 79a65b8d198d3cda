use crate::model::{ConfigError, TagsInput};
use crate::normalizer::mapping::{CategoryMapping, ReverseMap, RoomSynonym};
use crate::utils::split_tags;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Bucket for a non-empty value that matches no synonym (exact-match domains only).
pub const OTHER: &str = "other";
pub const BUSINESS: &str = "business";
pub const LEISURE: &str = "leisure";

/// Winner order when one tag blob yields several traveler types. Every entry
/// also implies a leisure purpose when no purpose tag was found.
pub const TRAVELER_PRIORITY: [&str; 4] = ["family", "couple", "friends", "solo"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagResolution {
    pub traveler_type: Option<String>,
    pub purpose_of_visit: Option<String>,
}

/// Resolves raw categorical values to canonical ones. Cheap to clone; the
/// mapping behind it is shared and never mutated.
#[derive(Debug, Clone)]
pub struct TagNormalizer {
    mapping: Arc<CategoryMapping>,
}

impl TagNormalizer {
    pub fn new(mapping: CategoryMapping) -> Self {
        Self {
            mapping: Arc::new(mapping),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        CategoryMapping::load(path).map(Self::new)
    }

    pub fn mapping(&self) -> &CategoryMapping {
        &self.mapping
    }

    /// Resolves the OTA (and hotel) specific tables once, for a whole batch.
    pub fn scope<'a>(&'a self, ota_name: &'a str, hotel: Option<&str>) -> OtaScope<'a> {
        let rooms: &[RoomSynonym] = match hotel {
            Some(hotel) if !hotel.is_empty() && !ota_name.is_empty() => {
                self.mapping.room_type.synonyms(hotel, ota_name)
            }
            _ => &[],
        };
        OtaScope {
            ota_name,
            traveler_ota: self.mapping.traveler_type.ota(ota_name),
            traveler_common: &self.mapping.traveler_type.common,
            purpose_common: &self.mapping.purpose_of_visit.common,
            rooms,
        }
    }

    pub fn normalize_traveler_type(&self, raw_value: Option<&str>, ota_name: &str) -> Option<String> {
        self.scope(ota_name, None).normalize_traveler_type(raw_value)
    }

    pub fn normalize_purpose_of_visit(
        &self,
        raw_value: Option<&str>,
        traveler_type_hint: Option<&str>,
        ota_name: &str,
    ) -> Option<String> {
        self.scope(ota_name, None)
            .normalize_purpose_of_visit(raw_value, traveler_type_hint)
    }

    pub fn normalize_room_type(
        &self,
        raw_value: Option<&str>,
        hotel: Option<&str>,
        ota_name: &str,
    ) -> Option<String> {
        self.scope(ota_name, hotel).normalize_room_type(raw_value)
    }

    pub fn normalize_from_tags(&self, tags: &TagsInput, ota_name: &str) -> TagResolution {
        self.scope(ota_name, None).normalize_from_tags(tags)
    }
}

/// Lookup tables of one OTA (and optionally one hotel), borrowed from the mapping.
#[derive(Debug, Clone, Copy)]
pub struct OtaScope<'a> {
    ota_name: &'a str,
    traveler_ota: Option<&'a ReverseMap>,
    traveler_common: &'a ReverseMap,
    purpose_common: &'a ReverseMap,
    rooms: &'a [RoomSynonym],
}

impl<'a> OtaScope<'a> {
    pub fn ota_name(&self) -> &str {
        self.ota_name
    }

    /// OTA override first, then the common table. No bucketing.
    fn lookup_traveler(&self, value: &str) -> Option<&'a str> {
        self.traveler_ota
            .and_then(|map| map.get(value))
            .or_else(|| self.traveler_common.get(value))
            .map(String::as_str)
    }

    fn lookup_purpose(&self, value: &str) -> Option<&'a str> {
        self.purpose_common.get(value).map(String::as_str)
    }

    /// Exact match; unmatched non-empty values land in `"other"`.
    pub fn normalize_traveler_type(&self, raw_value: Option<&str>) -> Option<String> {
        let value = non_empty(raw_value)?;
        match self.lookup_traveler(value) {
            Some(normalized) => Some(normalized.to_string()),
            None => {
                debug!("[{}] unmapped traveler type '{}'", self.ota_name, value);
                Some(OTHER.to_string())
            }
        }
    }

    /// Exact match against the common purpose table only. Sites that fold
    /// purpose into the traveler tag get that tag as fallback input.
    pub fn normalize_purpose_of_visit(
        &self,
        raw_value: Option<&str>,
        traveler_type_hint: Option<&str>,
    ) -> Option<String> {
        let value = non_empty(raw_value).or_else(|| non_empty(traveler_type_hint))?;
        match self.lookup_purpose(value) {
            Some(normalized) => Some(normalized.to_string()),
            None => {
                debug!("[{}] unmapped purpose '{}'", self.ota_name, value);
                Some(OTHER.to_string())
            }
        }
    }

    /// Substring match, longest synonym first. Unmatched names pass through
    /// untouched so they stay traceable to the listing; there is no bucket here.
    pub fn normalize_room_type(&self, raw_value: Option<&str>) -> Option<String> {
        let value = non_empty(raw_value)?;
        let hit = self
            .rooms
            .iter()
            .find(|room| value.contains(room.synonym.as_str()));
        match hit {
            Some(room) => Some(room.normalized.clone()),
            None => Some(value.to_string()),
        }
    }

    /// Normalizes every token of a tag blob and votes. Never yields `"other"`.
    pub fn normalize_from_tags(&self, tags: &TagsInput) -> TagResolution {
        let tokens = match tags {
            TagsInput::Delimited(blob) => split_tags(blob),
            TagsInput::Tokens(tokens) => tokens
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        };

        let mut traveler_hits = BTreeSet::new();
        let mut purpose_hits: Vec<&str> = Vec::new();
        for token in &tokens {
            if let Some(traveler) = self.lookup_traveler(token) {
                traveler_hits.insert(traveler);
            }
            if let Some(purpose) = self.lookup_purpose(token) {
                if !purpose_hits.contains(&purpose) {
                    purpose_hits.push(purpose);
                }
            }
        }

        let traveler_type = TRAVELER_PRIORITY
            .iter()
            .find(|candidate| traveler_hits.contains(**candidate))
            .map(|winner| winner.to_string());

        let purpose_of_visit = if purpose_hits.contains(&BUSINESS) {
            Some(BUSINESS.to_string())
        } else if let Some(first) = purpose_hits.first() {
            Some(first.to_string())
        } else if traveler_type.is_some() {
            Some(LEISURE.to_string())
        } else {
            None
        };

        TagResolution {
            traveler_type,
            purpose_of_visit,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
