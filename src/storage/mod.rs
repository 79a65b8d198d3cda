pub mod sqlite;

pub use sqlite::{DuplicateGroup, SqliteStorage};

use crate::model::{CanonicalReview, StorageError, UpsertOutcome};

/// Persistence boundary of the reconciler. Implementations upsert by
/// `review_hash` (insert if absent, otherwise overwrite the review and its
/// sub-score set) atomically per call.
pub trait ReviewStore {
    fn upsert_review(&mut self, review: &CanonicalReview) -> Result<UpsertOutcome, StorageError>;
}
