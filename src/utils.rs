// Utility functions
use chrono::{DateTime, NaiveDate, Utc};

const DAY_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"];

/// Month-only formats, paired with the suffix that pins them to the 1st.
const MONTH_FORMATS: [(&str, &str); 3] = [
    ("%Y-%m-%d", "-01"),
    ("%Y/%m/%d", "/01"),
    ("%Y年%m月%d日", "1日"),
];

/// Converts a string into `DateTime<Utc>` when it is RFC 3339.
pub fn parse_datetime(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses the date shapes scrapers emit. Month-only dates resolve to the 1st.
pub fn parse_review_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(dt) = parse_datetime(raw) {
        return Some(dt.date_naive());
    }

    for format in DAY_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    MONTH_FORMATS.iter().find_map(|(format, suffix)| {
        NaiveDate::parse_from_str(&format!("{}{}", raw, suffix), format).ok()
    })
}

fn is_tag_delimiter(c: char) -> bool {
    matches!(c, ',' | '，' | '、' | '・' | '･' | '·') || c.is_whitespace()
}

/// Splits a tag blob on commas (ASCII, full-width, ideographic), middle dots and whitespace.
pub fn split_tags(blob: &str) -> Vec<String> {
    blob.split(is_tag_delimiter)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_day_precision_dates() {
        assert_eq!(parse_review_date("2024-05-01"), Some(ymd(2024, 5, 1)));
        assert_eq!(parse_review_date("2024/5/1"), Some(ymd(2024, 5, 1)));
        assert_eq!(parse_review_date("2024年5月1日"), Some(ymd(2024, 5, 1)));
        assert_eq!(parse_review_date(" 2024.12.31 "), Some(ymd(2024, 12, 31)));
        assert_eq!(
            parse_review_date("2024-05-01T09:30:00+09:00"),
            Some(ymd(2024, 5, 1))
        );
    }

    #[test]
    fn month_only_dates_pin_to_first_day() {
        assert_eq!(parse_review_date("2024年08月"), Some(ymd(2024, 8, 1)));
        assert_eq!(parse_review_date("2024-08"), Some(ymd(2024, 8, 1)));
        assert_eq!(parse_review_date("2024/8"), Some(ymd(2024, 8, 1)));
    }

    #[test]
    fn garbage_dates_are_none() {
        assert_eq!(parse_review_date(""), None);
        assert_eq!(parse_review_date("先月"), None);
        assert_eq!(parse_review_date("2024-13-01"), None);
    }

    #[test]
    fn split_tags_on_every_delimiter() {
        assert_eq!(
            split_tags("家族，レジャー・観光, Business　Solo"),
            vec!["家族", "レジャー", "観光", "Business", "Solo"]
        );
        assert!(split_tags(" , ・ ").is_empty());
    }
}
