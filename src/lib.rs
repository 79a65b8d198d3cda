//! Reconciles scraped OTA hotel reviews into one canonical, deduplicated store.
//!
//! Raw records are normalized (scores onto a 10-point scale, categorical tags
//! through the YAML mapping, language detection), given a content identity and
//! upserted, so reruns of the same crawl never create duplicates.

pub mod config;
pub mod identity;
pub mod model;
pub mod normalizer;
pub mod reconciler;
pub mod storage;
pub mod utils;

pub use config::{AppConfig, ListingConfig, load_config};
pub use identity::compute_identity;
pub use model::{
    CanonicalReview, ConfigError, ExtractionError, ListingTarget, RawReview, ReconciliationReport,
    RecordError, RecordStage, StorageError, SubScore, SubScoreCategory, UpsertOutcome,
};
pub use normalizer::{CategoryMapping, TagNormalizer};
pub use reconciler::{Reconciler, ScoreScales};
pub use storage::{ReviewStore, SqliteStorage};
