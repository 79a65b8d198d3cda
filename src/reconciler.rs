use crate::identity::IdentityFields;
use crate::model::{
    CanonicalReview, ExtractionError, ListingTarget, RawReview, ReconciliationReport, RecordError,
    RecordStage, SkippedRecord, SubScore, SubScoreCategory, UpsertOutcome,
};
use crate::normalizer::{
    OtaScope, TARGET_SCALE, TagNormalizer, detect_language, language_name, normalize_to_target,
};
use crate::storage::ReviewStore;
use crate::utils::parse_review_date;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Original rating scale per OTA, used when a record does not carry
/// `original_score_scale` itself.
#[derive(Debug, Clone)]
pub struct ScoreScales {
    default_scale: Decimal,
    per_ota: HashMap<String, Decimal>,
}

impl Default for ScoreScales {
    fn default() -> Self {
        Self::new(TARGET_SCALE)
    }
}

impl ScoreScales {
    pub fn new(default_scale: Decimal) -> Self {
        Self {
            default_scale,
            per_ota: HashMap::new(),
        }
    }

    pub fn with_ota(mut self, ota_name: impl Into<String>, scale: Decimal) -> Self {
        self.per_ota.insert(ota_name.into(), scale);
        self
    }

    pub fn for_ota(&self, ota_name: &str) -> Decimal {
        self.per_ota.get(ota_name).copied().unwrap_or(self.default_scale)
    }
}

struct CategoricalFields {
    traveler_type: Option<String>,
    traveler_type_original: Option<String>,
    purpose_of_visit: Option<String>,
    purpose_of_visit_original: Option<String>,
}

/// Turns raw scraper records into canonical reviews and upserts them by identity.
/// Stateless apart from the shared, read-only mapping; safe to share across listings.
#[derive(Debug, Clone)]
pub struct Reconciler {
    tags: TagNormalizer,
    scales: ScoreScales,
}

impl Reconciler {
    pub fn new(tags: TagNormalizer, scales: ScoreScales) -> Self {
        Self { tags, scales }
    }

    pub fn tags(&self) -> &TagNormalizer {
        &self.tags
    }

    /// Normalizes one record and computes its identity, without touching storage.
    pub fn canonicalize(
        &self,
        raw: &RawReview,
        listing: &ListingTarget,
    ) -> Result<CanonicalReview, ExtractionError> {
        let scope = self.tags.scope(&listing.ota_name, Some(&listing.hotel_slug));
        let mut review = self.normalize(0, raw, listing, &scope)?;
        review.review_hash = identity_of(&review)?;
        Ok(review)
    }

    pub fn reconcile_and_upsert<S: ReviewStore + ?Sized>(
        &self,
        raw_reviews: &[RawReview],
        listing: &ListingTarget,
        store: &mut S,
    ) -> ReconciliationReport {
        let never = AtomicBool::new(false);
        self.reconcile_with_cancel(raw_reviews, listing, store, &never)
    }

    /// Processes the batch in order. `cancel` is checked before every record;
    /// an interrupted batch can simply be rerun since upserts are idempotent.
    pub fn reconcile_with_cancel<S: ReviewStore + ?Sized>(
        &self,
        raw_reviews: &[RawReview],
        listing: &ListingTarget,
        store: &mut S,
        cancel: &AtomicBool,
    ) -> ReconciliationReport {
        info!(
            "[listing {}] Reconciling {} raw reviews ({} / {})",
            listing.listing_id,
            raw_reviews.len(),
            listing.hotel_slug,
            listing.ota_name
        );
        let scope = self.tags.scope(&listing.ota_name, Some(&listing.hotel_slug));
        let mut report = ReconciliationReport::default();

        for (index, raw) in raw_reviews.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                warn!(
                    "[listing {}] Cancelled before record #{}; {} records left unprocessed",
                    listing.listing_id,
                    index,
                    raw_reviews.len() - index
                );
                report.cancelled = true;
                break;
            }

            match self.reconcile_one(index, raw, listing, &scope, store) {
                Ok(UpsertOutcome::Created) => report.created += 1,
                Ok(UpsertOutcome::Updated) => report.updated += 1,
                Err((stage, reason)) => {
                    error!(
                        "[listing {}] Skipping record #{} ({}): {}. Data: {}",
                        listing.listing_id,
                        index,
                        stage,
                        reason,
                        serde_json::to_string(raw).unwrap_or_default()
                    );
                    report.skipped += 1;
                    report.failures.push(SkippedRecord {
                        index,
                        stage,
                        reason,
                        raw: raw.clone(),
                    });
                }
            }
        }

        info!(
            "[listing {}] Saved: created {}, updated {}, skipped {}",
            listing.listing_id, report.created, report.updated, report.skipped
        );
        report
    }

    fn reconcile_one<S: ReviewStore + ?Sized>(
        &self,
        index: usize,
        raw: &RawReview,
        listing: &ListingTarget,
        scope: &OtaScope<'_>,
        store: &mut S,
    ) -> Result<UpsertOutcome, (RecordStage, RecordError)> {
        let mut review = self
            .normalize(index, raw, listing, scope)
            .map_err(|e| (RecordStage::Received, e.into()))?;
        review.review_hash = identity_of(&review).map_err(|e| (RecordStage::Normalized, e.into()))?;
        store
            .upsert_review(&review)
            .map_err(|e| (RecordStage::Hashed, e.into()))
    }

    /// Builds every canonical field. The hash is left empty.
    fn normalize(
        &self,
        index: usize,
        raw: &RawReview,
        listing: &ListingTarget,
        scope: &OtaScope<'_>,
    ) -> Result<CanonicalReview, ExtractionError> {
        let scale = self.resolve_scale(index, raw, listing)?;

        let overall_score_original = raw.first_text(&["overall_score_original", "overall_score"])?;
        let overall_score = score_or_warn(index, "overall", overall_score_original.as_deref(), scale);

        let mut sub_scores = Vec::new();
        for category in SubScoreCategory::ALL {
            let original_key = format!("{}_score_original", category.prefix());
            let plain_key = format!("{}_score", category.prefix());
            if let Some(original) = raw.first_text(&[original_key.as_str(), plain_key.as_str()])? {
                sub_scores.push(SubScore {
                    category,
                    score: score_or_warn(index, category.prefix(), Some(&original), scale),
                    score_original: original,
                });
            }
        }

        let categorical = categorical_fields(raw, scope)?;
        let room_type_original = raw.text("room_type")?;
        let room_type = scope.normalize_room_type(room_type_original.as_deref());

        let review_comment = raw.text("review_comment")?;
        let language_code = review_comment.as_deref().and_then(detect_language);
        let review_language = language_code.as_deref().and_then(language_name);

        let review_date_original = raw.text("review_date")?;
        let stay_date_original = raw.text("stay_date")?;

        Ok(CanonicalReview {
            review_hash: String::new(),
            listing_id: listing.listing_id,
            ota_name: listing.ota_name.clone(),
            hotel_slug: listing.hotel_slug.clone(),
            review_id_in_ota: raw.text("review_id_in_ota")?,
            reviewer_name: raw.text("reviewer_name")?,
            review_title: raw.text("review_title")?,
            overall_score,
            overall_score_original,
            original_score_scale: Some(scale),
            sub_scores,
            traveler_type: categorical.traveler_type,
            traveler_type_original: categorical.traveler_type_original,
            purpose_of_visit: categorical.purpose_of_visit,
            purpose_of_visit_original: categorical.purpose_of_visit_original,
            room_type,
            room_type_original,
            gender: raw.text("gender")?,
            age_group: raw.text("age_group")?,
            review_date: date_or_warn(index, "review_date", review_date_original.as_deref()),
            review_date_original,
            stay_date: date_or_warn(index, "stay_date", stay_date_original.as_deref()),
            stay_date_original,
            review_comment,
            translated_review_comment: raw.text("translated_review_comment")?,
            language_code,
            review_language,
            crawled_at: Utc::now(),
        })
    }

    /// Record's own `original_score_scale`, else the OTA's configured scale.
    fn resolve_scale(
        &self,
        index: usize,
        raw: &RawReview,
        listing: &ListingTarget,
    ) -> Result<Decimal, ExtractionError> {
        let fallback = self.scales.for_ota(&listing.ota_name);
        let Some(literal) = raw.text("original_score_scale")? else {
            return Ok(fallback);
        };
        match Decimal::from_str(&literal) {
            Ok(scale) if scale > Decimal::ZERO => Ok(scale),
            _ => {
                warn!(
                    "Record #{}: unusable original_score_scale '{}', using {}",
                    index, literal, fallback
                );
                Ok(fallback)
            }
        }
    }
}

/// Traveler type and purpose, from dedicated fields or, when both are absent, from a tag blob.
fn categorical_fields(
    raw: &RawReview,
    scope: &OtaScope<'_>,
) -> Result<CategoricalFields, ExtractionError> {
    let traveler_raw = raw.text("traveler_type")?;
    let purpose_raw = raw.text("purpose_of_visit")?;

    if traveler_raw.is_none() && purpose_raw.is_none() {
        let Some(tags) = raw.tags("tags")? else {
            return Ok(CategoricalFields {
                traveler_type: None,
                traveler_type_original: None,
                purpose_of_visit: None,
                purpose_of_visit_original: None,
            });
        };
        let resolved = scope.normalize_from_tags(&tags);
        let literal = tags.literal();
        return Ok(CategoricalFields {
            traveler_type: resolved.traveler_type,
            traveler_type_original: Some(literal.clone()),
            purpose_of_visit: resolved.purpose_of_visit,
            purpose_of_visit_original: Some(literal),
        });
    }

    Ok(CategoricalFields {
        traveler_type: scope.normalize_traveler_type(traveler_raw.as_deref()),
        purpose_of_visit: scope
            .normalize_purpose_of_visit(purpose_raw.as_deref(), traveler_raw.as_deref()),
        purpose_of_visit_original: purpose_raw.or_else(|| traveler_raw.clone()),
        traveler_type_original: traveler_raw,
    })
}

/// Identity from source literals only, never from normalized values.
fn identity_of(review: &CanonicalReview) -> Result<String, ExtractionError> {
    if review.reviewer_name.is_none() && review.review_date_original.is_none() {
        return Err(ExtractionError::MissingIdentity);
    }
    Ok(IdentityFields {
        listing_id: review.listing_id,
        reviewer_name: review.reviewer_name.as_deref(),
        review_date: review.review_date_original.as_deref(),
        overall_score_original: review.overall_score_original.as_deref(),
        review_comment: review.review_comment.as_deref(),
    }
    .digest())
}

fn score_or_warn(index: usize, field: &str, literal: Option<&str>, scale: Decimal) -> Option<Decimal> {
    let literal = literal?;
    let normalized = normalize_to_target(Some(literal), Some(scale));
    if normalized.is_none() {
        warn!(
            "Record #{}: {} score '{}' is not a number on a {} scale",
            index, field, literal, scale
        );
    }
    normalized
}

fn date_or_warn(index: usize, field: &str, literal: Option<&str>) -> Option<NaiveDate> {
    let literal = literal?;
    let parsed = parse_review_date(literal);
    if parsed.is_none() {
        warn!("Record #{}: unparseable {} '{}'", index, field, literal);
    }
    parsed
}
