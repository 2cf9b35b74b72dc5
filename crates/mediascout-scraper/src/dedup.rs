//! Two-stage deduplication plus historical filtering.
//!
//! Stage 1 removes exact duplicates by normalized URL across providers.
//! Stage 2 removes near-duplicates with blocking (same eTLD+1, dates
//! within a day window) and a token-set ratio over normalized titles.
//! The historical filter applies the same fuzzy comparison against a
//! brand's recently persisted mentions.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::etld_plus_one;
use crate::text::{normalize_title, normalize_url};
use crate::types::RawCandidate;

/// Dateless candidates all share one catch-all comparison block; beyond
/// this size further comparisons are skipped with a warning.
const CATCH_ALL_BLOCK_CAP: usize = 1000;

/// A previously persisted mention, reduced to what fuzzy comparison needs.
#[derive(Debug, Clone)]
pub struct HistoricalMention {
    pub title: String,
    pub teaser: Option<String>,
    pub normalized_url: String,
    pub published_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Token-set ratio
// ---------------------------------------------------------------------------

/// Collapse simple plural forms so "cuts"/"cut" and "jobs"/"job" compare
/// equal. Tokens of 3 chars or fewer are left alone.
fn stem(token: &str) -> &str {
    if token.len() > 3 {
        token.strip_suffix('s').unwrap_or(token)
    } else {
        token
    }
}

/// Token-set similarity between two normalized strings, on a 0–100 scale.
///
/// Splits both sides into plural-insensitive token sets and compares the
/// sorted intersection against each side's sorted union, taking the best
/// pairwise similarity. Word order and repeated words do not matter:
/// "lego cuts 500 jobs" and "500 jobs cut at lego" score 100.
#[must_use]
pub fn token_set_ratio(left: &str, right: &str) -> f64 {
    if left == right {
        return 100.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let tokens_left: BTreeSet<&str> = left.split_whitespace().map(stem).collect();
    let tokens_right: BTreeSet<&str> = right.split_whitespace().map(stem).collect();

    let intersection: Vec<&str> = tokens_left.intersection(&tokens_right).copied().collect();
    let only_left: Vec<&str> = tokens_left.difference(&tokens_right).copied().collect();
    let only_right: Vec<&str> = tokens_right.difference(&tokens_left).copied().collect();

    let base = intersection.join(" ");
    let combined_left = join_parts(&base, &only_left);
    let combined_right = join_parts(&base, &only_right);

    let scores = [
        similarity(&base, &combined_left),
        similarity(&base, &combined_right),
        similarity(&combined_left, &combined_right),
    ];
    scores.into_iter().fold(0.0, f64::max) * 100.0
}

fn join_parts(base: &str, rest: &[&str]) -> String {
    if rest.is_empty() {
        base.to_string()
    } else if base.is_empty() {
        rest.join(" ")
    } else {
        format!("{base} {}", rest.join(" "))
    }
}

fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    strsim::normalized_levenshtein(a, b)
}

// ---------------------------------------------------------------------------
// Stage 1 — exact URL
// ---------------------------------------------------------------------------

/// Drop candidates whose normalized URL was already seen; first
/// occurrence wins, across providers.
#[must_use]
pub fn dedup_exact_url(candidates: Vec<RawCandidate>) -> (Vec<RawCandidate>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let total = candidates.len();

    let unique: Vec<RawCandidate> = candidates
        .into_iter()
        .filter(|candidate| seen.insert(normalize_url(&candidate.url)))
        .collect();

    let removed = total - unique.len();
    (unique, removed)
}

// ---------------------------------------------------------------------------
// Stage 2 — near-duplicate blocking + fuzzy titles
// ---------------------------------------------------------------------------

/// Text used for fuzzy comparison: the normalized title, widened with the
/// teaser when the title alone is too short to be discriminative.
fn comparison_text(title: &str, teaser: &str) -> String {
    let normalized = normalize_title(title);
    if normalized.chars().count() >= 20 {
        return normalized;
    }
    normalize_title(&format!("{title} {teaser}"))
}

fn within_window(
    left: Option<DateTime<Utc>>,
    right: Option<DateTime<Utc>>,
    day_window: i64,
) -> bool {
    match (left, right) {
        (Some(l), Some(r)) => (l - r).num_days().abs() <= day_window,
        // One or both sides undated: the date cannot disprove a match.
        _ => true,
    }
}

/// Decide which of two near-duplicates to keep: higher date confidence
/// wins, ties broken by the longer teaser.
fn incoming_wins(kept: &RawCandidate, incoming: &RawCandidate) -> bool {
    if incoming.date_confidence != kept.date_confidence {
        return incoming.date_confidence > kept.date_confidence;
    }
    incoming.teaser.chars().count() > kept.teaser.chars().count()
}

/// Remove near-duplicates within one run's candidate set.
///
/// Returns the surviving candidates and the number removed. Stable:
/// survivors keep first-seen positions even when a later duplicate
/// replaces the kept representative.
#[must_use]
pub fn near_deduplicate(
    candidates: Vec<RawCandidate>,
    threshold: u32,
    day_window: i64,
) -> (Vec<RawCandidate>, usize) {
    if candidates.len() <= 1 {
        return (candidates, 0);
    }

    let threshold = f64::from(threshold.clamp(1, 100));
    let mut kept: Vec<RawCandidate> = Vec::new();
    let mut kept_texts: Vec<String> = Vec::new();
    // Blocking: dated candidates compare within their eTLD+1; dateless
    // candidates share one capped catch-all block.
    let mut domain_blocks: HashMap<String, Vec<usize>> = HashMap::new();
    let mut catch_all: Vec<usize> = Vec::new();
    let mut warned_overflow = false;
    let mut removed = 0usize;

    for candidate in candidates {
        let text = comparison_text(&candidate.title, &candidate.teaser);
        if text.is_empty() {
            kept_texts.push(text);
            kept.push(candidate);
            continue;
        }

        let domain = etld_plus_one(&candidate.url);
        let block: &[usize] = if candidate.published_at.is_some() {
            domain_blocks.get(&domain).map_or(&[], Vec::as_slice)
        } else {
            if catch_all.len() >= CATCH_ALL_BLOCK_CAP && !warned_overflow {
                tracing::warn!(
                    cap = CATCH_ALL_BLOCK_CAP,
                    "dateless dedup block overflowed; skipping further comparisons"
                );
                warned_overflow = true;
            }
            &catch_all[..catch_all.len().min(CATCH_ALL_BLOCK_CAP)]
        };

        let duplicate_of = block.iter().copied().find(|&idx| {
            !kept_texts[idx].is_empty()
                && within_window(candidate.published_at, kept[idx].published_at, day_window)
                && token_set_ratio(&text, &kept_texts[idx]) >= threshold
        });

        if let Some(idx) = duplicate_of {
            removed += 1;
            if incoming_wins(&kept[idx], &candidate) {
                kept_texts[idx] = text;
                kept[idx] = candidate;
            }
            continue;
        }

        let new_idx = kept.len();
        if candidate.published_at.is_some() {
            domain_blocks.entry(domain).or_default().push(new_idx);
        } else {
            catch_all.push(new_idx);
        }
        kept_texts.push(text);
        kept.push(candidate);
    }

    (kept, removed)
}

// ---------------------------------------------------------------------------
// Historical filter
// ---------------------------------------------------------------------------

/// Drop candidates that exactly or fuzzily match recently persisted
/// mentions for the same brand.
#[must_use]
pub fn filter_against_historical(
    candidates: Vec<RawCandidate>,
    historical: &[HistoricalMention],
    threshold: u32,
    day_window: i64,
) -> (Vec<RawCandidate>, usize) {
    if candidates.is_empty() || historical.is_empty() {
        return (candidates, 0);
    }

    let threshold = f64::from(threshold.clamp(1, 100));
    let known_urls: HashSet<&str> = historical
        .iter()
        .map(|m| m.normalized_url.as_str())
        .collect();

    struct Entry {
        text: String,
        published_at: Option<DateTime<Utc>>,
    }

    let mut entries_by_domain: HashMap<String, Vec<Entry>> = HashMap::new();
    for mention in historical {
        let text = comparison_text(&mention.title, mention.teaser.as_deref().unwrap_or(""));
        if text.is_empty() {
            continue;
        }
        entries_by_domain
            .entry(etld_plus_one(&mention.normalized_url))
            .or_default()
            .push(Entry {
                text,
                published_at: mention.published_at,
            });
    }

    let total = candidates.len();
    let filtered: Vec<RawCandidate> = candidates
        .into_iter()
        .filter(|candidate| {
            if known_urls.contains(normalize_url(&candidate.url).as_str()) {
                return false;
            }

            let text = comparison_text(&candidate.title, &candidate.teaser);
            if text.is_empty() {
                return true;
            }

            let Some(entries) = entries_by_domain.get(&etld_plus_one(&candidate.url)) else {
                return true;
            };

            !entries.iter().any(|entry| {
                within_window(candidate.published_at, entry.published_at, day_window)
                    && token_set_ratio(&text, &entry.text) >= threshold
            })
        })
        .collect();

    let removed = total - filtered.len();
    (filtered, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DateConfidence;
    use chrono::TimeZone;

    fn candidate(title: &str, url: &str) -> RawCandidate {
        RawCandidate {
            title: title.to_string(),
            teaser: String::new(),
            url: url.to_string(),
            published_at: None,
            date_confidence: DateConfidence::None,
            source_name: "example.com".to_string(),
            provider: "gnews",
            matched_keyword: None,
        }
    }

    fn dated(title: &str, url: &str, day: u32, confidence: DateConfidence) -> RawCandidate {
        let mut c = candidate(title, url);
        c.published_at = Some(Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap());
        c.date_confidence = confidence;
        c
    }

    // -- token_set_ratio ------------------------------------------------

    #[test]
    fn identical_strings_score_100() {
        assert!((token_set_ratio("lego cuts jobs", "lego cuts jobs") - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reordered_tokens_score_100() {
        let score = token_set_ratio(
            &normalize_title("Lego cuts 500 jobs"),
            &normalize_title("500 jobs: Lego cuts"),
        );
        assert!(score >= 99.0, "reordered tokens should score ~100, got {score}");
    }

    #[test]
    fn subset_with_plural_variation_scores_100() {
        let score = token_set_ratio(
            &normalize_title("Lego cuts 500 jobs"),
            &normalize_title("500 jobs cut at Lego"),
        );
        assert!(score >= 92.0, "near-duplicate headlines scored {score}");
    }

    #[test]
    fn unrelated_titles_score_low() {
        let score = token_set_ratio(
            &normalize_title("Lego cuts 500 jobs"),
            &normalize_title("Weather warning issued for Jutland"),
        );
        assert!(score < 60.0, "unrelated titles scored {score}");
    }

    #[test]
    fn empty_side_scores_zero() {
        assert!((token_set_ratio("", "anything") - 0.0).abs() < f64::EPSILON);
    }

    // -- stage 1 --------------------------------------------------------

    #[test]
    fn exact_dedup_collapses_tracking_variants_across_providers() {
        let a = candidate("Store rabat hos Netto", "https://ex.com/a?utm_source=foo");
        let b = candidate("Store rabat hos Netto", "https://ex.com/a");
        let (unique, removed) = dedup_exact_url(vec![a, b]);
        assert_eq!(unique.len(), 1);
        assert_eq!(removed, 1);
        assert_eq!(normalize_url(&unique[0].url), "https://ex.com/a");
    }

    #[test]
    fn exact_dedup_keeps_first_occurrence() {
        let a = candidate("First", "https://ex.com/a");
        let b = candidate("Second", "https://ex.com/a/");
        let (unique, _) = dedup_exact_url(vec![a, b]);
        assert_eq!(unique[0].title, "First");
    }

    // -- stage 2 --------------------------------------------------------

    #[test]
    fn near_duplicates_merge_keeping_higher_confidence() {
        let a = dated(
            "Lego cuts 500 jobs",
            "https://reuters.com/a",
            1,
            DateConfidence::Medium,
        );
        let b = dated(
            "500 jobs cut at Lego",
            "https://reuters.com/b",
            2,
            DateConfidence::High,
        );
        let (kept, removed) = near_deduplicate(vec![a, b], 92, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed, 1);
        assert_eq!(kept[0].date_confidence, DateConfidence::High);
    }

    #[test]
    fn equal_confidence_ties_break_on_longer_teaser() {
        let a = dated("Lego cuts 500 jobs", "https://reuters.com/a", 1, DateConfidence::High);
        let mut b = dated(
            "Lego cuts 500 jobs",
            "https://reuters.com/b",
            1,
            DateConfidence::High,
        );
        b.teaser = "a much longer teaser with detail".to_string();
        let (kept, removed) = near_deduplicate(vec![a, b], 92, 2);
        assert_eq!(removed, 1);
        assert_eq!(kept[0].teaser, "a much longer teaser with detail");
    }

    #[test]
    fn different_domains_are_not_blocked_together() {
        let a = dated("Lego cuts 500 jobs", "https://reuters.com/a", 1, DateConfidence::High);
        let b = dated("Lego cuts 500 jobs", "https://dr.dk/b", 1, DateConfidence::High);
        let (kept, removed) = near_deduplicate(vec![a, b], 92, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 0);
    }

    #[test]
    fn dates_outside_the_window_are_not_duplicates() {
        let a = dated("Lego cuts 500 jobs", "https://reuters.com/a", 1, DateConfidence::High);
        let b = dated("Lego cuts 500 jobs", "https://reuters.com/b", 10, DateConfidence::High);
        let (kept, removed) = near_deduplicate(vec![a, b], 92, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 0);
    }

    #[test]
    fn dissimilar_titles_survive_within_a_block() {
        let a = dated("Lego cuts 500 jobs", "https://reuters.com/a", 1, DateConfidence::High);
        let b = dated(
            "Novo Nordisk opens new plant",
            "https://reuters.com/b",
            1,
            DateConfidence::High,
        );
        let (kept, removed) = near_deduplicate(vec![a, b], 92, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 0);
    }

    #[test]
    fn dateless_candidates_share_the_catch_all_block() {
        let a = candidate("Lego cuts 500 jobs today worldwide", "https://reuters.com/a");
        let b = candidate("Lego cuts 500 jobs today worldwide", "https://dr.dk/b");
        let (kept, removed) = near_deduplicate(vec![a, b], 92, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed, 1);
    }

    // -- historical -----------------------------------------------------

    #[test]
    fn historical_filter_drops_known_urls() {
        let fresh = candidate("Anything at all", "https://ex.com/seen");
        let historical = vec![HistoricalMention {
            title: "Other title".to_string(),
            teaser: None,
            normalized_url: "https://ex.com/seen".to_string(),
            published_at: None,
        }];
        let (kept, removed) = filter_against_historical(vec![fresh], &historical, 92, 2);
        assert!(kept.is_empty());
        assert_eq!(removed, 1);
    }

    #[test]
    fn historical_filter_drops_fuzzy_matches_same_domain() {
        let fresh = dated(
            "Lego cuts 500 jobs",
            "https://reuters.com/new",
            2,
            DateConfidence::High,
        );
        let historical = vec![HistoricalMention {
            title: "500 jobs cut at Lego".to_string(),
            teaser: None,
            normalized_url: "https://reuters.com/old".to_string(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
        }];
        let (kept, removed) = filter_against_historical(vec![fresh], &historical, 92, 2);
        assert!(kept.is_empty());
        assert_eq!(removed, 1);
    }

    #[test]
    fn historical_filter_keeps_new_stories() {
        let fresh = dated(
            "Novo Nordisk opens new plant",
            "https://reuters.com/new",
            2,
            DateConfidence::High,
        );
        let historical = vec![HistoricalMention {
            title: "Lego cuts 500 jobs".to_string(),
            teaser: None,
            normalized_url: "https://reuters.com/old".to_string(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
        }];
        let (kept, removed) = filter_against_historical(vec![fresh], &historical, 92, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed, 0);
    }
}
