use crate::model::{CanonicalReview, StorageError, SubScore, SubScoreCategory, UpsertOutcome};
use crate::storage::ReviewStore;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Column order shared by the upsert and every `SELECT` that maps a review.
const REVIEW_COLUMNS: [&str; 27] = [
    "review_hash",
    "listing_id",
    "ota_name",
    "hotel_slug",
    "review_id_in_ota",
    "reviewer_name",
    "review_title",
    "overall_score",
    "overall_score_original",
    "original_score_scale",
    "traveler_type",
    "traveler_type_original",
    "purpose_of_visit",
    "purpose_of_visit_original",
    "room_type",
    "room_type_original",
    "gender",
    "age_group",
    "review_date",
    "review_date_original",
    "stay_date",
    "stay_date_original",
    "review_comment",
    "translated_review_comment",
    "language_code",
    "review_language",
    "crawled_at",
];

pub struct SqliteStorage {
    conn: Connection,
}

/// Stored reviews that look like the same review under different hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub listing_id: i64,
    pub reviewer_name: String,
    /// Date literal as scraped, the same value the identity hash covers.
    pub review_date: String,
    pub overall_score_original: Option<String>,
    /// Most recently updated first; the first entry is the one kept on purge.
    pub hashes: Vec<String>,
}

impl SqliteStorage {
    /// Opens (or creates) the database file and runs migrations.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path.as_ref())?;
        info!("Opened review database at {}", db_path.as_ref().display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS reviews (
                review_hash TEXT PRIMARY KEY,
                listing_id INTEGER NOT NULL,
                ota_name TEXT NOT NULL,
                hotel_slug TEXT NOT NULL,
                review_id_in_ota TEXT,
                reviewer_name TEXT,
                review_title TEXT,
                overall_score TEXT,
                overall_score_original TEXT,
                original_score_scale TEXT,
                traveler_type TEXT,
                traveler_type_original TEXT,
                purpose_of_visit TEXT,
                purpose_of_visit_original TEXT,
                room_type TEXT,
                room_type_original TEXT,
                review_date TEXT,
                review_date_original TEXT,
                stay_date TEXT,
                stay_date_original TEXT,
                review_comment TEXT,
                translated_review_comment TEXT,
                language_code TEXT,
                review_language TEXT,
                crawled_at TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_reviews_listing_date
                ON reviews (listing_id, review_date);

            CREATE TABLE IF NOT EXISTS review_scores (
                review_hash TEXT NOT NULL REFERENCES reviews (review_hash) ON DELETE CASCADE,
                category TEXT NOT NULL,
                score TEXT,
                score_original TEXT NOT NULL,
                PRIMARY KEY (review_hash, category)
            );
            ",
        )?;

        // Files created without the demographic columns get them added in place.
        Self::migrate_add_column_if_missing(&conn, "reviews", "gender", "TEXT")?;
        Self::migrate_add_column_if_missing(&conn, "reviews", "age_group", "TEXT")?;

        Ok(Self { conn })
    }

    /// Adds the column when the table does not have it yet.
    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            let alter_sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def);
            conn.execute(&alter_sql, [])?;
            debug!("Added column {}.{}", table, column);
        }

        Ok(())
    }

    fn upsert_sql() -> String {
        let columns = REVIEW_COLUMNS.join(", ");
        let placeholders = (1..=REVIEW_COLUMNS.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = REVIEW_COLUMNS[1..]
            .iter()
            .map(|c| format!("{} = excluded.{}", c, c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO reviews ({}, created_at, updated_at)
             VALUES ({}, datetime('now'), datetime('now'))
             ON CONFLICT (review_hash) DO UPDATE SET {}, updated_at = datetime('now')",
            columns, placeholders, updates
        )
    }

    /// Fetches one review with its sub-scores.
    pub fn get_review(&self, review_hash: &str) -> Result<Option<CanonicalReview>, StorageError> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE review_hash = ?1",
            REVIEW_COLUMNS.join(", ")
        );
        let review = self
            .conn
            .query_row(&sql, params![review_hash], Self::map_review)
            .optional()?;

        match review {
            Some(mut review) => {
                review.sub_scores = self.get_sub_scores(review_hash)?;
                Ok(Some(review))
            }
            None => Ok(None),
        }
    }

    pub fn get_sub_scores(&self, review_hash: &str) -> Result<Vec<SubScore>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT category, score, score_original FROM review_scores
             WHERE review_hash = ?1 ORDER BY category",
        )?;
        let rows = stmt.query_map(params![review_hash], |row| {
            let category: String = row.get(0)?;
            let category = SubScoreCategory::from_str(&category).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.into())
            })?;
            Ok(SubScore {
                category,
                score: decimal_column(row, 1)?,
                score_original: row.get(2)?,
            })
        })?;

        let mut scores = Vec::new();
        for score in rows {
            scores.push(score?);
        }
        scores.sort_by_key(|s| s.category);
        Ok(scores)
    }

    pub fn count_reviews(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    pub fn count_reviews_for_listing(&self, listing_id: i64) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reviews WHERE listing_id = ?1",
            params![listing_id],
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    /// Groups stored reviews sharing listing, reviewer, date literal and
    /// original overall score under more than one hash (rows written before
    /// the identity contract was pinned, or by an older hash field set).
    /// Rows without a reviewer name or date literal are never grouped, since
    /// nothing ties them to each other.
    pub fn find_duplicate_groups(&self) -> Result<Vec<DuplicateGroup>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT listing_id, reviewer_name, review_date_original, overall_score_original
             FROM reviews
             WHERE reviewer_name IS NOT NULL AND review_date_original IS NOT NULL
             GROUP BY listing_id, reviewer_name, review_date_original, overall_score_original
             HAVING COUNT(*) > 1
             ORDER BY COUNT(*) DESC, listing_id",
        )?;
        let keys = stmt
            .query_map([], |row| {
                Ok(DuplicateGroup {
                    listing_id: row.get(0)?,
                    reviewer_name: row.get(1)?,
                    review_date: row.get(2)?,
                    overall_score_original: row.get(3)?,
                    hashes: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut members = self.conn.prepare(
            "SELECT review_hash FROM reviews
             WHERE listing_id = ?1 AND reviewer_name = ?2
               AND review_date_original = ?3 AND overall_score_original IS ?4
             ORDER BY updated_at DESC, rowid DESC",
        )?;

        let mut groups = Vec::with_capacity(keys.len());
        for mut group in keys {
            group.hashes = members
                .query_map(
                    params![
                        group.listing_id,
                        group.reviewer_name,
                        group.review_date,
                        group.overall_score_original
                    ],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<Result<_, _>>()?;
            groups.push(group);
        }
        Ok(groups)
    }

    /// Deletes every hash but the first of each group. Returns the number of rows removed.
    pub fn purge_duplicates(&mut self, groups: &[DuplicateGroup]) -> Result<usize, StorageError> {
        let doomed: Vec<&String> = groups.iter().flat_map(|g| g.hashes.iter().skip(1)).collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        for chunk in doomed.chunks(500) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("DELETE FROM reviews WHERE review_hash IN ({})", placeholders);
            deleted += tx.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Maps a row selected with `REVIEW_COLUMNS`. Sub-scores are loaded separately.
    fn map_review(row: &Row) -> Result<CanonicalReview, rusqlite::Error> {
        Ok(CanonicalReview {
            review_hash: row.get(0)?,
            listing_id: row.get(1)?,
            ota_name: row.get(2)?,
            hotel_slug: row.get(3)?,
            review_id_in_ota: row.get(4)?,
            reviewer_name: row.get(5)?,
            review_title: row.get(6)?,
            overall_score: decimal_column(row, 7)?,
            overall_score_original: row.get(8)?,
            original_score_scale: decimal_column(row, 9)?,
            sub_scores: Vec::new(),
            traveler_type: row.get(10)?,
            traveler_type_original: row.get(11)?,
            purpose_of_visit: row.get(12)?,
            purpose_of_visit_original: row.get(13)?,
            room_type: row.get(14)?,
            room_type_original: row.get(15)?,
            gender: row.get(16)?,
            age_group: row.get(17)?,
            review_date: row.get(18)?,
            review_date_original: row.get(19)?,
            stay_date: row.get(20)?,
            stay_date_original: row.get(21)?,
            review_comment: row.get(22)?,
            translated_review_comment: row.get(23)?,
            language_code: row.get(24)?,
            review_language: row.get(25)?,
            crawled_at: row.get(26)?,
        })
    }
}

impl ReviewStore for SqliteStorage {
    /// One transaction per review: a failure here never touches other reviews.
    fn upsert_review(&mut self, review: &CanonicalReview) -> Result<UpsertOutcome, StorageError> {
        let tx = self.conn.transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM reviews WHERE review_hash = ?1",
                params![review.review_hash],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        tx.execute(
            &Self::upsert_sql(),
            params![
                review.review_hash,
                review.listing_id,
                review.ota_name,
                review.hotel_slug,
                review.review_id_in_ota,
                review.reviewer_name,
                review.review_title,
                review.overall_score.map(|d| d.to_string()),
                review.overall_score_original,
                review.original_score_scale.map(|d| d.to_string()),
                review.traveler_type,
                review.traveler_type_original,
                review.purpose_of_visit,
                review.purpose_of_visit_original,
                review.room_type,
                review.room_type_original,
                review.gender,
                review.age_group,
                review.review_date,
                review.review_date_original,
                review.stay_date,
                review.stay_date_original,
                review.review_comment,
                review.translated_review_comment,
                review.language_code,
                review.review_language,
                review.crawled_at,
            ],
        )?;

        // Last crawl wins for sub-scores too.
        tx.execute(
            "DELETE FROM review_scores WHERE review_hash = ?1",
            params![review.review_hash],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO review_scores (review_hash, category, score, score_original)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for sub in &review.sub_scores {
                stmt.execute(params![
                    review.review_hash,
                    sub.category.as_str(),
                    sub.score.map(|d| d.to_string()),
                    sub.score_original,
                ])?;
            }
        }

        tx.commit()?;
        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }
}

fn decimal_column(row: &Row, idx: usize) -> Result<Option<Decimal>, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}
