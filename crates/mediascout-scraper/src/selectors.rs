//! Bundled generic CSS selectors.
//!
//! Used as a best-guess fallback when no recipe exists for a domain or a
//! configured selector finds nothing. Ordered most-specific first; the
//! first selector yielding meaningful text wins.

pub const GENERIC_TITLE_SELECTORS: &[&str] = &[
    "h1[itemprop=\"headline\"]",
    "h1.article-title",
    "article h1",
    "h1.entry-title",
    "h1.post-title",
    "h1.headline",
    "header h1",
    ".post-title h1",
    "main h1",
    "h1",
    "title",
];

pub const GENERIC_CONTENT_SELECTORS: &[&str] = &[
    "div[itemprop=\"articleBody\"]",
    "section[itemprop=\"articleBody\"]",
    "[itemprop=\"articleBody\"]",
    "div.article-body",
    "div.post-content",
    "div.entry-content",
    "article .article-content",
    ".article-body",
    "div[class*=\"article-body\"]",
    "div[class*=\"rich-text\"]",
    "div[class*=\"post-body\"]",
    "div[class*=\"entry-content\"]",
    "[role=\"article\"]",
    "main article",
    "article",
    "main",
];

pub const GENERIC_DATE_SELECTORS: &[&str] = &[
    "meta[property=\"article:published_time\"]",
    "meta[itemprop=\"datePublished\"]",
    "meta[name=\"publish-date\"]",
    "time[datetime]",
    "[itemprop=\"datePublished\"]",
    "time.published",
    ".publish-date",
    ".article-date",
    ".published-date",
    "article time",
    ".timestamp",
];
