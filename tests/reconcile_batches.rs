use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use review_reconciler::normalizer::default_mapping_path;
use review_reconciler::{
    CanonicalReview, ListingTarget, RawReview, Reconciler, RecordError, ScoreScales, SqliteStorage,
    StorageError, SubScoreCategory, TagNormalizer, UpsertOutcome, load_config,
};
use review_reconciler::storage::ReviewStore;
use rust_decimal::Decimal;
use serde_json::json;

fn reconciler() -> Reconciler {
    let tags = TagNormalizer::from_path(default_mapping_path()).unwrap();
    let scales = ScoreScales::default()
        .with_ota("じゃらん", Decimal::from(5u32))
        .with_ota("Expedia", Decimal::TEN);
    Reconciler::new(tags, scales)
}

fn expedia_listing() -> ListingTarget {
    ListingTarget {
        listing_id: 2,
        hotel_slug: "novotel-nara".to_string(),
        ota_name: "Expedia".to_string(),
    }
}

fn jalan_listing() -> ListingTarget {
    ListingTarget {
        listing_id: 1,
        hotel_slug: "novotel-nara".to_string(),
        ota_name: "じゃらん".to_string(),
    }
}

fn taro() -> RawReview {
    RawReview::new()
        .with("reviewer_name", "Taro")
        .with("review_date", "2024-05-01")
        .with("overall_score_original", "8")
        .with("review_comment", "部屋が広くて快適でした")
        .with("traveler_type", "カップル")
}

fn jalan_batch(n: usize) -> Vec<RawReview> {
    (0..n)
        .map(|i| {
            RawReview::new()
                .with("reviewer_name", format!("guest-{i}"))
                .with("review_date", format!("2024/06/{:02}", i + 1))
                .with("overall_score_original", "4")
                .with("bath_score_original", "5")
                .with("traveler_type", "家族")
                .with("room_type", "スーペリアツイン（禁煙）")
                .with("review_comment", "朝食がとても美味しかったです。")
        })
        .collect()
}

fn open(path: &Path) -> SqliteStorage {
    SqliteStorage::new(path).unwrap()
}

#[test]
fn expedia_record_reconciles_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = open(&dir.path().join("reviews.db"));

    let report = reconciler().reconcile_and_upsert(&[taro()], &expedia_listing(), &mut storage);
    assert_eq!((report.created, report.updated, report.skipped), (1, 0, 0));

    let expected = reconciler().canonicalize(&taro(), &expedia_listing()).unwrap();
    assert!(!expected.review_hash.is_empty());

    let stored = storage.get_review(&expected.review_hash).unwrap().unwrap();
    assert_eq!(stored.traveler_type.as_deref(), Some("couple"));
    assert_eq!(stored.traveler_type_original.as_deref(), Some("カップル"));
    assert_eq!(stored.language_code.as_deref(), Some("ja"));
    assert_eq!(stored.overall_score.map(|d| d.to_string()).as_deref(), Some("8.0"));
    assert_eq!(stored.overall_score_original.as_deref(), Some("8"));
    assert_eq!(stored.listing_id, 2);
}

#[test]
fn rerun_after_restart_updates_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reviews.db");
    let batch = jalan_batch(5);

    {
        let mut storage = open(&db);
        let report = reconciler().reconcile_and_upsert(&batch, &jalan_listing(), &mut storage);
        assert_eq!((report.created, report.updated, report.skipped), (5, 0, 0));
    }

    let mut storage = open(&db);
    let report = reconciler().reconcile_and_upsert(&batch, &jalan_listing(), &mut storage);
    assert_eq!((report.created, report.updated, report.skipped), (0, 5, 0));
    assert_eq!(storage.count_reviews().unwrap(), 5);
    assert_eq!(storage.count_reviews_for_listing(1).unwrap(), 5);
    assert!(storage.find_duplicate_groups().unwrap().is_empty());
}

#[test]
fn normalized_fields_follow_latest_mapping_on_update() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = open(&dir.path().join("reviews.db"));
    let listing = jalan_listing();

    let first = RawReview::new()
        .with("reviewer_name", "Hanako")
        .with("review_date", "2024/05/12")
        .with("overall_score_original", "5")
        .with("bath_score_original", "3")
        .with("dinner_score_original", "4")
        .with("traveler_type", "ペット連れ")
        .with("review_comment", "温泉が最高でした");
    reconciler().reconcile_and_upsert(&[first.clone()], &listing, &mut storage);

    // same identity fields, different categorical tag and sub-score set
    let second = first
        .with("traveler_type", "夫婦")
        .with("dinner_score_original", serde_json::Value::Null);
    let report = reconciler().reconcile_and_upsert(&[second.clone()], &listing, &mut storage);
    assert_eq!(report.updated, 1);

    let hash = reconciler().canonicalize(&second, &listing).unwrap().review_hash;
    let stored = storage.get_review(&hash).unwrap().unwrap();
    assert_eq!(stored.traveler_type.as_deref(), Some("couple"));
    assert!(stored.sub_score(SubScoreCategory::Dinner).is_none());
    let bath = stored.sub_score(SubScoreCategory::Bath).unwrap();
    assert_eq!(bath.score.map(|d| d.to_string()).as_deref(), Some("6.0"));
    assert_eq!(storage.count_reviews().unwrap(), 1);
}

#[test]
fn one_malformed_record_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = open(&dir.path().join("reviews.db"));

    let mut batch = jalan_batch(4);
    batch.insert(2, RawReview::new().with("review_comment", json!({"html": "<p>broken</p>"})));

    let report = reconciler().reconcile_and_upsert(&batch, &jalan_listing(), &mut storage);
    assert_eq!((report.created, report.skipped), (4, 1));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 2);
    assert!(matches!(report.failures[0].reason, RecordError::Extraction(_)));
    assert_eq!(storage.count_reviews_for_listing(1).unwrap(), 4);
}

#[test]
fn same_review_on_two_listings_is_two_reviews() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = open(&dir.path().join("reviews.db"));
    let r = reconciler();

    r.reconcile_and_upsert(&[taro()], &expedia_listing(), &mut storage);
    r.reconcile_and_upsert(&[taro()], &jalan_listing(), &mut storage);

    assert_eq!(storage.count_reviews().unwrap(), 2);
    assert_eq!(storage.count_reviews_for_listing(2).unwrap(), 1);
}

struct FlakyStore {
    inner: SqliteStorage,
    fail_on: usize,
    calls: usize,
}

impl ReviewStore for FlakyStore {
    fn upsert_review(&mut self, review: &CanonicalReview) -> Result<UpsertOutcome, StorageError> {
        self.calls += 1;
        if self.calls == self.fail_on {
            return Err(StorageError::Corrupt("simulated write failure".to_string()));
        }
        self.inner.upsert_review(review)
    }
}

#[test]
fn persistence_failure_skips_only_that_record() {
    let mut store = FlakyStore {
        inner: SqliteStorage::open_in_memory().unwrap(),
        fail_on: 2,
        calls: 0,
    };

    let report = reconciler().reconcile_and_upsert(&jalan_batch(3), &jalan_listing(), &mut store);
    assert_eq!((report.created, report.skipped), (2, 1));
    assert!(matches!(report.failures[0].reason, RecordError::Persistence(_)));
    assert_eq!(store.inner.count_reviews().unwrap(), 2);
}

#[test]
fn cancelled_batch_can_be_rerun() {
    let mut storage = SqliteStorage::open_in_memory().unwrap();
    let cancel = AtomicBool::new(true);

    let report = reconciler().reconcile_with_cancel(&jalan_batch(3), &jalan_listing(), &mut storage, &cancel);
    assert!(report.cancelled);
    assert_eq!(storage.count_reviews().unwrap(), 0);

    let report = reconciler().reconcile_and_upsert(&jalan_batch(3), &jalan_listing(), &mut storage);
    assert_eq!(report.created, 3);
}

#[test]
fn bundled_sample_config_and_inputs_reconcile() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let config = load_config(root.join("config.json")).unwrap();
    let r = Reconciler::new(
        TagNormalizer::from_path(config.mapping_path()).unwrap(),
        config.score_scales(),
    );
    let mut storage = SqliteStorage::open_in_memory().unwrap();

    let mut created = 0;
    let mut skipped = 0;
    let mut expedia_taro = None;
    for listing in &config.listings {
        let content = fs::read_to_string(root.join(&listing.input)).unwrap();
        let raws: Vec<RawReview> = serde_json::from_str(&content).unwrap();
        let report = r.reconcile_and_upsert(&raws, &listing.target(), &mut storage);
        created += report.created;
        skipped += report.skipped;
        if listing.ota_name == "Expedia" {
            expedia_taro = Some(r.canonicalize(&raws[0], &listing.target()).unwrap());
        }
    }

    // phrase tags arrive as an array so multi-word synonyms survive
    let taro = expedia_taro.unwrap();
    assert_eq!(taro.traveler_type.as_deref(), Some("couple"));
    assert_eq!(taro.purpose_of_visit.as_deref(), Some("leisure"));

    // the jalan dump carries one record with neither reviewer nor date
    assert_eq!((created, skipped), (4, 1));
    assert_eq!(storage.count_reviews().unwrap(), 4);
}
