use crate::model::{ConfigError, ListingTarget};
use crate::normalizer::{TARGET_SCALE, default_mapping_path};
use crate::reconciler::ScoreScales;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One listing to reconcile: where it lives and which scraper dump to read.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    pub listing_id: i64,
    pub hotel_slug: String,
    pub ota_name: String,
    /// JSON file holding the scraper's raw review array.
    pub input: PathBuf,
}

impl ListingConfig {
    pub fn target(&self) -> ListingTarget {
        ListingTarget {
            listing_id: self.listing_id,
            hotel_slug: self.hotel_slug.clone(),
            ota_name: self.ota_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_path: PathBuf,
    #[serde(default)]
    pub mapping_path: Option<PathBuf>,
    #[serde(default = "default_score_scale")]
    pub default_score_scale: Decimal,
    /// Rating scale per OTA name, e.g. `{"じゃらん": 5, "Expedia": 10}`.
    #[serde(default)]
    pub score_scales: HashMap<String, Decimal>,
    #[serde(default)]
    pub listings: Vec<ListingConfig>,
}

fn default_score_scale() -> Decimal {
    TARGET_SCALE
}

impl AppConfig {
    pub fn mapping_path(&self) -> PathBuf {
        self.mapping_path.clone().unwrap_or_else(default_mapping_path)
    }

    pub fn score_scales(&self) -> ScoreScales {
        self.score_scales
            .iter()
            .fold(ScoreScales::new(self.default_score_scale), |scales, (ota, scale)| {
                scales.with_ota(ota.clone(), *scale)
            })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_score_scale <= Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "default_score_scale must be positive, got {}",
                self.default_score_scale
            )));
        }
        if let Some((ota, scale)) = self.score_scales.iter().find(|(_, s)| **s <= Decimal::ZERO) {
            return Err(ConfigError::Invalid(format!(
                "score scale for '{}' must be positive, got {}",
                ota, scale
            )));
        }
        Ok(())
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
