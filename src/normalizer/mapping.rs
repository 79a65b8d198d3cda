//! Category mapping resource: parsed once, inverted into lookup indices, then
//! read-only for the rest of the process.
//!
//! ```yaml
//! traveler_type:
//!   common: { couple: [カップル, 夫婦] }
//!   ota_specific:
//!     Expedia: { couple: [Traveled as a couple] }
//! purpose_of_visit:
//!   common: { business: [出張] }
//! room_type:
//!   novotel-nara:
//!     楽天トラベル: { DeluxeSuite: [デラックススイート] }
//! ```

use crate::model::ConfigError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Resource location next to the crate manifest.
pub fn default_mapping_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config/mapping_config.yaml")
}

/// normalized name -> raw synonyms. `null` lists are allowed and ignored.
type SynonymTable = BTreeMap<String, Option<Vec<String>>>;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingDocument {
    #[serde(default)]
    traveler_type: Option<DomainSection>,
    #[serde(default)]
    purpose_of_visit: Option<DomainSection>,
    /// hotel -> OTA -> table
    #[serde(default)]
    room_type: Option<BTreeMap<String, Option<BTreeMap<String, Option<SynonymTable>>>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DomainSection {
    #[serde(default)]
    common: Option<SynonymTable>,
    #[serde(default)]
    ota_specific: Option<BTreeMap<String, Option<SynonymTable>>>,
}

/// raw synonym -> normalized name
pub type ReverseMap = HashMap<String, String>;

/// Exact-match domain (traveler type, purpose of visit).
#[derive(Debug, Default, Clone)]
pub struct ExactDomain {
    pub common: ReverseMap,
    pub ota_specific: HashMap<String, ReverseMap>,
}

impl ExactDomain {
    pub fn ota(&self, ota_name: &str) -> Option<&ReverseMap> {
        self.ota_specific.get(ota_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSynonym {
    pub synonym: String,
    pub normalized: String,
}

/// Substring-match domain, scoped per hotel and OTA. Each list is sorted by
/// synonym length, longest first, so "Executive Twin" is tried before "Twin".
#[derive(Debug, Default, Clone)]
pub struct RoomDomain {
    hotels: HashMap<String, HashMap<String, Vec<RoomSynonym>>>,
}

impl RoomDomain {
    pub fn synonyms(&self, hotel: &str, ota_name: &str) -> &[RoomSynonym] {
        self.hotels
            .get(hotel)
            .and_then(|otas| otas.get(ota_name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone)]
pub struct CategoryMapping {
    pub traveler_type: ExactDomain,
    pub purpose_of_visit: ExactDomain,
    pub room_type: RoomDomain,
}

impl CategoryMapping {
    /// Reads and inverts the mapping resource. Any failure is fatal for startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mapping = Self::from_yaml_str(&content)?;
        info!(
            "Loaded category mapping from {} ({} OTA traveler overrides, {} hotels with room rules)",
            path.display(),
            mapping.traveler_type.ota_specific.len(),
            mapping.room_type.hotels.len()
        );
        Ok(mapping)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let document: Option<MappingDocument> = serde_yaml::from_str(content)?;
        let document = document
            .ok_or_else(|| ConfigError::Mapping("mapping document is empty".to_string()))?;

        Ok(Self {
            traveler_type: build_exact_domain("traveler_type", document.traveler_type),
            purpose_of_visit: build_exact_domain("purpose_of_visit", document.purpose_of_visit),
            room_type: build_room_domain(document.room_type.unwrap_or_default()),
        })
    }
}

fn build_exact_domain(domain: &str, section: Option<DomainSection>) -> ExactDomain {
    let section = section.unwrap_or_default();
    let common = reverse_map(domain, "common", section.common.unwrap_or_default());
    let ota_specific = section
        .ota_specific
        .unwrap_or_default()
        .into_iter()
        .map(|(ota, table)| {
            let reversed = reverse_map(domain, &ota, table.unwrap_or_default());
            (ota, reversed)
        })
        .collect();
    ExactDomain { common, ota_specific }
}

/// Inverts one table. Within a scope the first normalized name (in key order)
/// claiming a synonym keeps it.
fn reverse_map(domain: &str, scope: &str, table: SynonymTable) -> ReverseMap {
    let mut reversed = ReverseMap::new();
    for (normalized, synonyms) in table {
        for synonym in synonyms.unwrap_or_default() {
            if let Some(existing) = reversed.get(&synonym) {
                if *existing != normalized {
                    warn!(
                        "{}/{}: synonym '{}' already maps to '{}', ignoring '{}'",
                        domain, scope, synonym, existing, normalized
                    );
                }
                continue;
            }
            reversed.insert(synonym, normalized.clone());
        }
    }
    reversed
}

fn build_room_domain(
    hotels: BTreeMap<String, Option<BTreeMap<String, Option<SynonymTable>>>>,
) -> RoomDomain {
    let hotels = hotels
        .into_iter()
        .map(|(hotel, otas)| {
            let otas = otas
                .unwrap_or_default()
                .into_iter()
                .map(|(ota, table)| {
                    let scope = format!("{}/{}", hotel, ota);
                    let mut synonyms: Vec<RoomSynonym> =
                        reverse_map("room_type", &scope, table.unwrap_or_default())
                            .into_iter()
                            .map(|(synonym, normalized)| RoomSynonym { synonym, normalized })
                            .collect();
                    synonyms.sort_by(|a, b| {
                        b.synonym
                            .chars()
                            .count()
                            .cmp(&a.synonym.chars().count())
                            .then_with(|| a.synonym.cmp(&b.synonym))
                    });
                    (ota, synonyms)
                })
                .collect();
            (hotel, otas)
        })
        .collect();
    RoomDomain { hotels }
}
