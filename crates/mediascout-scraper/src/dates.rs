//! Publication-date resolution with confidence levels.
//!
//! Dates come from feeds, meta attributes, configured selectors, or free
//! text — in that order of trust. A date we cannot place confidently is
//! never substituted with "now"; the candidate keeps a null date and a
//! low confidence marker instead.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::types::DateConfidence;

/// Matches explicit machine-ish date shapes: ISO dates, numeric
/// d/m/y variants, or at least a plausible year.
fn certainty_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}[./-]\d{1,2}[./-]\d{2,4}\b|\b(19|20)\d{2}\b")
            .expect("valid date certainty regex")
    })
}

/// Parse a free-form date string into UTC.
///
/// Returns `None` for empty or unparseable input. Never errors.
#[must_use]
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    dateparser::parse(trimmed).ok()
}

/// Resolve a raw date string into `(parsed, confidence)`.
///
/// `from_attribute` marks values read from machine-readable sources
/// (`datetime=`/`content=` attributes, feed fields) — those parse at
/// [`DateConfidence::High`]. Free-text dates get [`DateConfidence::Medium`]
/// when they contain an explicit date shape, otherwise
/// [`DateConfidence::Low`]. Unparseable input resolves to
/// `(None, DateConfidence::None)`.
#[must_use]
pub fn resolve_date(raw: Option<&str>, from_attribute: bool) -> (Option<DateTime<Utc>>, DateConfidence) {
    let Some(raw) = raw else {
        return (None, DateConfidence::None);
    };

    let Some(parsed) = parse_date(raw) else {
        return (None, DateConfidence::None);
    };

    if from_attribute {
        return (Some(parsed), DateConfidence::High);
    }

    if certainty_pattern().is_match(raw) {
        (Some(parsed), DateConfidence::Medium)
    } else {
        // Parseable but vague ("yesterday", "2 hours ago"): the parse is a
        // guess, so the date is withheld and only the confidence recorded.
        (None, DateConfidence::Low)
    }
}

/// Cutoff rule for run windows.
///
/// - A dated candidate older than `from_date` is dropped — unless the
///   date confidence is low and the source is not authoritative, in
///   which case the date itself is distrusted and the candidate kept.
/// - Candidates without a date always pass (scoring de-prioritizes them).
#[must_use]
pub fn passes_cutoff(
    published_at: Option<DateTime<Utc>>,
    confidence: DateConfidence,
    authoritative: bool,
    from_date: DateTime<Utc>,
) -> bool {
    let Some(published) = published_at else {
        return true;
    };

    if published >= from_date {
        return true;
    }

    // Older than the window: trust the verdict only when the date itself
    // is trustworthy.
    if authoritative || confidence >= DateConfidence::Medium {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_date_handles_rfc3339() {
        let parsed = parse_date("2024-05-01T12:30:00Z").expect("should parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn parse_date_handles_rfc2822() {
        let parsed = parse_date("Mon, 01 Jan 2024 12:00:00 GMT").expect("should parse");
        assert_eq!(parsed.date_naive().to_string(), "2024-01-01");
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date("").is_none());
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn attribute_dates_resolve_high() {
        let (parsed, confidence) = resolve_date(Some("2024-05-01T10:00:00Z"), true);
        assert!(parsed.is_some());
        assert_eq!(confidence, DateConfidence::High);
    }

    #[test]
    fn explicit_text_dates_resolve_medium() {
        let (parsed, confidence) = resolve_date(Some("2024-05-01"), false);
        assert!(parsed.is_some());
        assert_eq!(confidence, DateConfidence::Medium);
    }

    #[test]
    fn missing_dates_resolve_none() {
        let (parsed, confidence) = resolve_date(None, false);
        assert!(parsed.is_none());
        assert_eq!(confidence, DateConfidence::None);

        let (parsed, confidence) = resolve_date(Some("no date here"), true);
        assert!(parsed.is_none());
        assert_eq!(confidence, DateConfidence::None);
    }

    #[test]
    fn cutoff_drops_old_confident_dates() {
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let fresh = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();

        assert!(!passes_cutoff(Some(old), DateConfidence::High, false, from));
        assert!(!passes_cutoff(Some(old), DateConfidence::Medium, false, from));
        assert!(passes_cutoff(Some(fresh), DateConfidence::High, false, from));
    }

    #[test]
    fn cutoff_keeps_old_low_confidence_unless_authoritative() {
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();

        assert!(passes_cutoff(Some(old), DateConfidence::Low, false, from));
        assert!(!passes_cutoff(Some(old), DateConfidence::Low, true, from));
    }

    #[test]
    fn cutoff_keeps_dateless_candidates() {
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert!(passes_cutoff(None, DateConfidence::None, false, from));
    }
}
