//! Strategy-chained article extraction.
//!
//! Three strategies are evaluated against the fetched HTML: configured
//! recipe selectors, readability-style main-text aggregation, and the
//! bundled generic selector lists. Each result passes a deterministic
//! 0–100 quality gate; the best passing strategy wins in the fixed
//! preference order recipe → readability → generic. When nothing passes
//! the gate the extraction is `EmptyContent` — the signal the circuit
//! breaker counts.

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};

use crate::dates::resolve_date;
use crate::error::ScrapeError;
use crate::selectors::{
    GENERIC_CONTENT_SELECTORS, GENERIC_DATE_SELECTORS, GENERIC_TITLE_SELECTORS,
};
use crate::text::truncate_chars;
use crate::types::{DateConfidence, SourceRecipe};

/// Minimum quality-gate score for a strategy result to be used.
const MIN_QUALITY_SCORE: u32 = 40;
/// Minimum meaningful content length in characters.
const MIN_CONTENT_CHARS: usize = 80;
/// Content length granting full length points.
const PREFERRED_CONTENT_CHARS: usize = 500;
/// Stored content cap (raw text, not markup).
const MAX_CONTENT_CHARS: usize = 50_000;
/// Teaser cap, matching the persisted column contract.
const MAX_TEASER_CHARS: usize = 600;

/// Boilerplate markers that disqualify the leading content from scoring.
const BOILERPLATE_MARKERS: &[&str] = &[
    "enable javascript",
    "javascript is disabled",
    "accept cookies",
    "cookie policy",
    "page not found",
    "404",
];

/// Which strategy produced the accepted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Recipe,
    Readability,
    Generic,
}

impl Strategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Recipe => "recipe",
            Strategy::Readability => "readability",
            Strategy::Generic => "generic",
        }
    }
}

/// Extraction output for one article page.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub title: String,
    pub content: String,
    pub teaser: String,
    pub date_raw: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub date_confidence: DateConfidence,
    pub strategy: Strategy,
    pub quality_score: u32,
}

#[derive(Debug, Default, Clone)]
struct Candidate {
    title: String,
    content: String,
    date_raw: Option<String>,
    date_from_attribute: bool,
}

/// Extract article content from an HTML document.
///
/// # Errors
///
/// Returns [`ScrapeError::EmptyContent`] when no strategy clears the
/// quality gate.
pub fn extract(html: &str, recipe: Option<&SourceRecipe>, url: &str) -> Result<Extracted, ScrapeError> {
    let document = Html::parse_document(html);
    let link_text_len = total_link_text_len(&document);

    let recipe_candidate = recipe.map(|r| candidate_from_recipe(&document, r));
    let readability_candidate = candidate_from_readability(&document);
    let generic_candidate = candidate_from_generics(&document);

    let mut scored: Vec<(Strategy, Candidate, u32)> = Vec::new();
    if let Some(candidate) = recipe_candidate.clone() {
        let score = quality_score(&candidate, link_text_len);
        scored.push((Strategy::Recipe, candidate, score));
    }
    {
        let score = quality_score(&readability_candidate, link_text_len);
        scored.push((Strategy::Readability, readability_candidate.clone(), score));
    }
    {
        let score = quality_score(&generic_candidate, link_text_len);
        scored.push((Strategy::Generic, generic_candidate.clone(), score));
    }

    // Fixed preference among passing strategies: recipe, readability,
    // generic. The vec is already pushed in that order.
    let Some((strategy, candidate, score)) = scored
        .into_iter()
        .find(|(_, _, score)| *score >= MIN_QUALITY_SCORE)
    else {
        return Err(ScrapeError::EmptyContent {
            url: url.to_string(),
        });
    };

    // Fill gaps from the other strategies: a passing content strategy may
    // still lack a title or date that another one found.
    let mut title = candidate.title.clone();
    let mut date_raw = candidate.date_raw.clone();
    let mut date_from_attribute = candidate.date_from_attribute;
    for other in [
        recipe_candidate.as_ref(),
        Some(&readability_candidate),
        Some(&generic_candidate),
    ]
    .into_iter()
    .flatten()
    {
        if title.is_empty() && !other.title.is_empty() {
            title = other.title.clone();
        }
        if date_raw.is_none() && other.date_raw.is_some() {
            date_raw = other.date_raw.clone();
            date_from_attribute = other.date_from_attribute;
        }
    }

    let (published_at, date_confidence) = resolve_date(date_raw.as_deref(), date_from_attribute);

    let content = truncate_chars(&candidate.content, MAX_CONTENT_CHARS);
    let teaser = truncate_chars(&content, MAX_TEASER_CHARS);

    Ok(Extracted {
        title,
        content,
        teaser,
        date_raw,
        published_at,
        date_confidence,
        strategy,
        quality_score: score,
    })
}

// ---------------------------------------------------------------------------
// Strategy candidates
// ---------------------------------------------------------------------------

fn candidate_from_recipe(document: &Html, recipe: &SourceRecipe) -> Candidate {
    let title = recipe
        .title_selector
        .as_deref()
        .and_then(|s| select_text(document, s))
        .unwrap_or_default();
    let content = recipe
        .content_selector
        .as_deref()
        .and_then(|s| select_text(document, s))
        .unwrap_or_default();
    let (date_raw, date_from_attribute) = recipe
        .date_selector
        .as_deref()
        .and_then(|s| select_date(document, s))
        .map_or((None, false), |(raw, attr)| (Some(raw), attr));

    Candidate {
        title,
        content,
        date_raw,
        date_from_attribute,
    }
}

fn candidate_from_generics(document: &Html) -> Candidate {
    let title = first_selector_text(document, GENERIC_TITLE_SELECTORS).unwrap_or_default();
    let content = first_selector_text(document, GENERIC_CONTENT_SELECTORS).unwrap_or_default();
    let (date_raw, date_from_attribute) = GENERIC_DATE_SELECTORS
        .iter()
        .find_map(|s| select_date(document, s))
        .map_or((None, false), |(raw, attr)| (Some(raw), attr));

    Candidate {
        title,
        content,
        date_raw,
        date_from_attribute,
    }
}

/// Readability-style fallback: aggregate substantial paragraphs and read
/// the title/date from document metadata.
fn candidate_from_readability(document: &Html) -> Candidate {
    let title = meta_content(document, "meta[property=\"og:title\"]")
        .or_else(|| select_text(document, "title"))
        .unwrap_or_default();

    let paragraph_selector = Selector::parse("p").expect("valid p selector");
    let paragraphs: Vec<String> = document
        .select(&paragraph_selector)
        .map(|p| clean_fragment_text(&p.text().collect::<String>()))
        .filter(|text| text.chars().count() >= 40)
        .collect();
    let content = paragraphs.join(" ");

    let (date_raw, date_from_attribute) =
        meta_content(document, "meta[property=\"article:published_time\"]")
            .map(|raw| (Some(raw), true))
            .or_else(|| {
                select_date(document, "time[datetime]").map(|(raw, attr)| (Some(raw), attr))
            })
            .unwrap_or((None, false));

    Candidate {
        title,
        content,
        date_raw,
        date_from_attribute,
    }
}

// ---------------------------------------------------------------------------
// Quality gate
// ---------------------------------------------------------------------------

/// Deterministic 0–100 extraction quality score.
///
/// - up to 40 points for content length (zero below the 80-char floor,
///   full credit at 500+ chars)
/// - up to 25 points for a low link-text share
/// - 15 points for a usable title, 10 for a date
/// - 10 points when the leading content is free of boilerplate markers
fn quality_score(candidate: &Candidate, link_text_len: usize) -> u32 {
    let content_len = candidate.content.chars().count();

    let length_points = if content_len < MIN_CONTENT_CHARS {
        0
    } else if content_len >= PREFERRED_CONTENT_CHARS {
        40
    } else {
        let span = (PREFERRED_CONTENT_CHARS - MIN_CONTENT_CHARS) as f64;
        let above = (content_len - MIN_CONTENT_CHARS) as f64;
        20 + (above / span * 20.0).round() as u32
    };

    let link_points = if content_len == 0 {
        0
    } else {
        let ratio = (link_text_len as f64 / content_len as f64).min(1.0);
        if ratio <= 0.10 {
            25
        } else if ratio >= 0.60 {
            0
        } else {
            (25.0 * (0.60 - ratio) / 0.50).round() as u32
        }
    };

    let title_points = if candidate.title.chars().count() >= 5 { 15 } else { 0 };
    let date_points = if candidate.date_raw.is_some() { 10 } else { 0 };

    let lead: String = candidate.content.chars().take(300).collect::<String>().to_lowercase();
    let boilerplate_points = if BOILERPLATE_MARKERS.iter().any(|m| lead.contains(m)) {
        0
    } else {
        10
    };

    length_points + link_points + title_points + date_points + boilerplate_points
}

// ---------------------------------------------------------------------------
// Selector helpers
// ---------------------------------------------------------------------------

fn clean_fragment_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let parsed = Selector::parse(selector).ok()?;
    let element = document.select(&parsed).next()?;
    let text = clean_fragment_text(&element.text().collect::<String>());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn first_selector_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| select_text(document, s))
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let parsed = Selector::parse(selector).ok()?;
    let element = document.select(&parsed).next()?;
    let content = element.value().attr("content")?.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

/// Extract a date value from the first element matching `selector`.
///
/// Returns `(raw_value, from_attribute)`: machine-readable `datetime=` or
/// `content=` attributes are marked as attribute-grade for the confidence
/// scale; visible element text is not.
fn select_date(document: &Html, selector: &str) -> Option<(String, bool)> {
    let parsed = Selector::parse(selector).ok()?;
    let element = document.select(&parsed).next()?;

    for attr in ["datetime", "content"] {
        if let Some(value) = element.value().attr(attr) {
            let value = value.trim();
            if !value.is_empty() {
                return Some((value.to_string(), true));
            }
        }
    }

    let text = clean_fragment_text(&element.text().collect::<String>());
    if text.is_empty() {
        None
    } else {
        Some((text, false))
    }
}

fn total_link_text_len(document: &Html) -> usize {
    let selector = Selector::parse("a[href]").expect("valid link selector");
    document
        .select(&selector)
        .map(|a| clean_fragment_text(&a.text().collect::<String>()).chars().count())
        .sum()
}
