//! Review identity: the natural key every upsert goes through.
//!
//! The key covers exactly `listing_id, reviewer_name, review_date,
//! overall_score_original, review_comment`, as source literals, in that order.
//! Normalized fields stay out so that a mapping-table change never turns a
//! stored review into a "new" one. Changing this field set or the separator
//! invalidates every stored hash and needs a backfill.

use sha2::{Digest, Sha256};

/// ASCII unit separator; never present in scraped text.
pub const IDENTITY_SEPARATOR: u8 = 0x1f;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityFields<'a> {
    pub listing_id: i64,
    pub reviewer_name: Option<&'a str>,
    pub review_date: Option<&'a str>,
    pub overall_score_original: Option<&'a str>,
    pub review_comment: Option<&'a str>,
}

impl IdentityFields<'_> {
    /// SHA-256 over the five fields, lowercase hex. Missing fields hash as "".
    pub fn digest(&self) -> String {
        let listing_id = self.listing_id.to_string();
        let parts = [
            listing_id.as_str(),
            self.reviewer_name.unwrap_or_default(),
            self.review_date.unwrap_or_default(),
            self.overall_score_original.unwrap_or_default(),
            self.review_comment.unwrap_or_default(),
        ];

        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([IDENTITY_SEPARATOR]);
            }
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

pub fn compute_identity(
    listing_id: i64,
    reviewer_name: Option<&str>,
    review_date: Option<&str>,
    overall_score_original: Option<&str>,
    review_comment: Option<&str>,
) -> String {
    IdentityFields {
        listing_id,
        reviewer_name,
        review_date,
        overall_score_original,
        review_comment,
    }
    .digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex_sha256() {
        let hash = compute_identity(
            7,
            Some("Taro"),
            Some("2024-05-01"),
            Some("8"),
            Some("部屋が広くて快適でした"),
        );
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(
            hash,
            compute_identity(7, Some("Taro"), Some("2024-05-01"), Some("8"), Some("部屋が広くて快適でした"))
        );
    }

    #[test]
    fn missing_field_hashes_as_empty_string() {
        assert_eq!(
            compute_identity(1, None, Some("2024-05-01"), None, None),
            compute_identity(1, Some(""), Some("2024-05-01"), Some(""), Some(""))
        );
    }

    #[test]
    fn digests_are_pinned() {
        assert_eq!(
            compute_identity(7, Some("Taro"), Some("2024-05-01"), Some("8"), Some("部屋が広くて快適でした")),
            "ff43c425fb1e2151f76d969d1627781e2c26186ef896b35c5551d2999ece5dfc"
        );
        assert_eq!(
            compute_identity(1, None, None, None, None),
            "045be8b6184b42e11c4d8f4e2d6d12fc0c2259c17d1013cb6fb2b5bf6eae71f0"
        );
    }

    #[test]
    fn every_field_participates() {
        let base = compute_identity(1, Some("a"), Some("b"), Some("c"), Some("d"));
        assert_ne!(base, compute_identity(2, Some("a"), Some("b"), Some("c"), Some("d")));
        assert_ne!(base, compute_identity(1, Some("x"), Some("b"), Some("c"), Some("d")));
        assert_ne!(base, compute_identity(1, Some("a"), Some("x"), Some("c"), Some("d")));
        assert_ne!(base, compute_identity(1, Some("a"), Some("b"), Some("x"), Some("d")));
        assert_ne!(base, compute_identity(1, Some("a"), Some("b"), Some("c"), Some("x")));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        assert_ne!(
            compute_identity(1, Some("ab"), Some("c"), None, None),
            compute_identity(1, Some("a"), Some("bc"), None, None)
        );
    }
}
