//! Text and URL processing: normalization, keyword cleaning, and
//! word-boundary keyword matching.

use regex::Regex;
use url::Url;

use crate::domain::normalize_host;

/// Tracking/session query parameters stripped during URL normalization.
const TRACKING_PARAMS: &[&str] = &["utm", "fbclid", "gclid", "mc_eid", "ref", "source"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Normalize a URL for deduplication and storage.
///
/// - Lowercases the host and strips a leading `www.`
/// - Drops the fragment and the default port
/// - Removes tracking parameters (`utm_*`, `fbclid`, `gclid`, `mc_eid`,
///   `ref`, `source`) and sorts the remaining query parameters
/// - Collapses duplicate path slashes and strips a trailing slash
///
/// Idempotent: normalizing an already-normalized URL is a no-op.
/// Unparseable input is returned trimmed but otherwise untouched.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    if let Some(host) = url.host_str().map(str::to_ascii_lowercase) {
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        // set_host only fails for cannot-be-a-base URLs, which parse with
        // no host in the first place.
        let _ = url.set_host(Some(&host));
    }

    let path = url.path().to_string();
    let mut collapsed = String::with_capacity(path.len());
    let mut prev_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(ch);
    }
    if collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
    }
    if collapsed.is_empty() {
        collapsed.push('/');
    }
    url.set_path(&collapsed);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if params.is_empty() {
        url.set_query(None);
    } else {
        params.sort();
        url.query_pairs_mut().clear().extend_pairs(params).finish();
    }

    url.to_string()
}

/// Normalize typographic quote characters to their ASCII forms.
fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{201C}', '\u{201D}', '\u{201E}', '\u{201F}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}', '`', '\u{00B4}'], "'")
}

/// Clean a raw keyword for provider queries.
///
/// Strips quote characters (they produce malformed provider query syntax),
/// replaces sentence punctuation with spaces, and collapses whitespace.
/// Returns `None` when nothing survives cleaning.
#[must_use]
pub fn clean_keyword(raw: &str) -> Option<String> {
    let candidate = normalize_quotes(raw)
        .replace(['"', '\''], " ")
        .replace(['.', ','], " ");

    let cleaned = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Clean a batch of keywords, dropping empties and preserving order.
#[must_use]
pub fn clean_keywords(keywords: &[String]) -> Vec<String> {
    keywords.iter().filter_map(|kw| clean_keyword(kw)).collect()
}

/// Compiled word-boundary patterns for one keyword: one regex per term.
#[derive(Debug)]
pub struct KeywordPattern {
    pub keyword: String,
    terms: Vec<Regex>,
}

impl KeywordPattern {
    /// Number of distinct terms that match in `text`.
    #[must_use]
    pub fn matched_terms(&self, text: &str) -> usize {
        self.terms.iter().filter(|re| re.is_match(text)).count()
    }
}

/// Compile keyword groups into word-boundary term patterns.
///
/// Each keyword becomes one group of per-term regexes; 1-character tokens
/// are dropped to avoid noisy matches.
#[must_use]
pub fn compile_keyword_patterns(keywords: &[String]) -> Vec<KeywordPattern> {
    keywords
        .iter()
        .filter_map(|keyword| {
            let cleaned = clean_keyword(keyword)?;
            let terms: Vec<Regex> = cleaned
                .split_whitespace()
                .filter(|term| term.chars().count() >= 2)
                .filter_map(|term| {
                    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term))).ok()
                })
                .collect();
            if terms.is_empty() {
                None
            } else {
                Some(KeywordPattern {
                    keyword: cleaned,
                    terms,
                })
            }
        })
        .collect()
}

/// Max matched-term count of any keyword group in `text`.
#[must_use]
pub fn keyword_match_score(patterns: &[KeywordPattern], text: &str) -> usize {
    patterns
        .iter()
        .map(|group| group.matched_terms(text))
        .max()
        .unwrap_or(0)
}

/// `true` when any keyword group matches at least `min_terms` terms.
#[must_use]
pub fn keyword_matches_text(patterns: &[KeywordPattern], text: &str, min_terms: usize) -> bool {
    keyword_match_score(patterns, text) >= min_terms.max(1)
}

/// Normalize a title for fuzzy comparison: lowercase alphanumeric tokens
/// joined by single spaces.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    for ch in title.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens.join(" ")
}

/// Strip HTML tags from a string, returning collapsed plain text.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract a display source name (normalized host) from a URL.
#[must_use]
pub fn source_name_from_url(url: &str) -> String {
    let host = normalize_host(url);
    if host.is_empty() {
        "unknown".to_string()
    } else {
        host
    }
}

/// Truncate a string to at most `max` characters on a char boundary.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
