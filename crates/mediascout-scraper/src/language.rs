//! Title-language filtering.
//!
//! Keeps candidates whose detected title language is in the allowed set.
//! Detection is best-effort: short titles and unreliable detections are
//! always kept, so the filter only ever removes confident mismatches.

use whatlang::{detect, Lang};

use crate::types::RawCandidate;

/// Titles shorter than this are too short to detect reliably.
const MIN_DETECTABLE_CHARS: usize = 15;

/// Map a two-letter ISO 639-1 code to the detector's three-letter code.
/// Unknown inputs pass through unchanged (three-letter codes already work).
fn normalize_lang_code(code: &str) -> String {
    let code = code.trim().to_ascii_lowercase();
    let mapped = match code.as_str() {
        "da" => "dan",
        "de" => "deu",
        "en" => "eng",
        "es" => "spa",
        "fi" => "fin",
        "fr" => "fra",
        "it" => "ita",
        "nb" | "no" => "nob",
        "nl" => "nld",
        "pl" => "pol",
        "pt" => "por",
        "ru" => "rus",
        "sv" => "swe",
        "tr" => "tur",
        _ => return code,
    };
    mapped.to_string()
}

/// Filter candidates by detected title language.
///
/// `allowed` holds ISO 639-1 or 639-3 codes. An empty allow-list disables
/// filtering. Returns the kept candidates and the number removed.
#[must_use]
pub fn filter_by_language(
    candidates: Vec<RawCandidate>,
    allowed: &[String],
) -> (Vec<RawCandidate>, usize) {
    if allowed.is_empty() {
        return (candidates, 0);
    }

    let allowed: Vec<String> = allowed.iter().map(|c| normalize_lang_code(c)).collect();
    let total = candidates.len();

    let kept: Vec<RawCandidate> = candidates
        .into_iter()
        .filter(|candidate| {
            let title = candidate.title.trim();
            if title.chars().count() < MIN_DETECTABLE_CHARS {
                return true;
            }
            match detect(title) {
                Some(info) if info.is_reliable() => {
                    let code = lang_code(info.lang());
                    let keep = allowed.iter().any(|a| a == code);
                    if !keep {
                        tracing::debug!(
                            title = %candidate.title,
                            detected = code,
                            "language filter removed candidate"
                        );
                    }
                    keep
                }
                // Unreliable or failed detection: keep.
                _ => true,
            }
        })
        .collect();

    let removed = total - kept.len();
    (kept, removed)
}

fn lang_code(lang: Lang) -> &'static str {
    lang.code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DateConfidence;

    fn candidate(title: &str) -> RawCandidate {
        RawCandidate {
            title: title.to_string(),
            teaser: String::new(),
            url: "https://example.com/a".to_string(),
            published_at: None,
            date_confidence: DateConfidence::None,
            source_name: "example.com".to_string(),
            provider: "rss",
            matched_keyword: None,
        }
    }

    #[test]
    fn empty_allow_list_disables_filtering() {
        let (kept, removed) = filter_by_language(vec![candidate("Any title at all here")], &[]);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed, 0);
    }

    #[test]
    fn short_titles_are_always_kept() {
        let (kept, _) = filter_by_language(
            vec![candidate("Kort titel")],
            &["eng".to_string()],
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn matching_language_is_kept() {
        let (kept, removed) = filter_by_language(
            vec![candidate(
                "The government announced a comprehensive new policy on renewable energy today",
            )],
            &["en".to_string()],
        );
        assert_eq!(kept.len(), 1, "English title should pass an 'en' filter");
        assert_eq!(removed, 0);
    }

    #[test]
    fn iso1_codes_are_normalized() {
        assert_eq!(normalize_lang_code("da"), "dan");
        assert_eq!(normalize_lang_code("EN"), "eng");
        assert_eq!(normalize_lang_code("dan"), "dan");
        assert_eq!(normalize_lang_code("xx"), "xx");
    }
}
