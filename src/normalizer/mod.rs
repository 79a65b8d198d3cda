// Normalizer module: score rescaling, language detection and table-driven tag mapping.

pub mod language;
pub mod mapping;
pub mod score;
pub mod tags;

pub use language::{detect_language, language_name};
pub use mapping::{CategoryMapping, default_mapping_path};
pub use score::{TARGET_SCALE, normalize_score, normalize_to_target};
pub use tags::{OtaScope, TagNormalizer, TagResolution};
