//! Metric emission helpers.
//!
//! All scrape metrics go through these wrappers so label values stay
//! normalized and low-cardinality. The `metrics` facade records into
//! whatever exporter the binary installed (the server installs the
//! Prometheus recorder behind `GET /metrics`).

use metrics::{counter, histogram};

/// Normalize a label value: lowercase, trimmed, length-capped, with an
/// `unknown` fallback for empty input.
#[must_use]
pub fn label(value: &str) -> String {
    let cleaned = value.trim().to_lowercase();
    if cleaned.is_empty() {
        return "unknown".to_string();
    }
    cleaned.chars().take(120).collect()
}

/// One scrape run finished (any status, including locked/no-topics).
pub fn observe_scrape_run(status: &str, duration_seconds: f64) {
    let status = label(status);
    counter!("scrape_runs_total", "status" => status.clone()).increment(1);
    histogram!("scrape_run_duration_seconds", "status" => status)
        .record(duration_seconds.max(0.0));
}

/// One provider finished inside a run.
pub fn observe_provider_run(provider: &str, status: &str, duration_seconds: f64) {
    histogram!(
        "scrape_provider_duration_seconds",
        "provider" => label(provider),
        "status" => label(status),
    )
    .record(duration_seconds.max(0.0));
}

/// One HTTP request completed (any status).
pub fn observe_http_request(provider: &str, domain: &str, duration_seconds: f64) {
    histogram!(
        "scrape_request_duration_seconds",
        "provider" => label(provider),
        "domain" => label(domain),
    )
    .record(duration_seconds.max(0.0));
}

/// One HTTP request failed after retries.
pub fn observe_http_error(provider: &str, error_type: &str) {
    counter!(
        "scrape_http_errors_total",
        "provider" => label(provider),
        "error_type" => label(error_type),
    )
    .increment(1);
}

/// One extraction attempt finished with the given result
/// (`success`, `empty_content`, `http_error`, `timeout`, `circuit_open_skip`).
pub fn observe_extraction(domain: &str, result: &str, content_length: usize) {
    counter!(
        "scrape_extractions_total",
        "domain" => label(domain),
        "result" => label(result),
    )
    .increment(1);
    if content_length > 0 {
        histogram!("scrape_extraction_content_length", "domain" => label(domain))
            .record(content_length as f64);
    }
}

/// Duplicates removed by a dedup stage (`exact_url`, `fuzzy`, `historical_fuzzy`).
pub fn observe_duplicates_removed(stage: &str, count: usize) {
    if count > 0 {
        counter!("scrape_duplicates_removed_total", "stage" => label(stage))
            .increment(count as u64);
    }
}

/// A guardrail truncated input (keyword cap, URL budget, etc.).
pub fn observe_guardrail_event(guardrail: &str, provider: &str, reason: &str, count: usize) {
    if count > 0 {
        counter!(
            "scrape_guardrail_events_total",
            "guardrail" => label(guardrail),
            "provider" => label(provider),
            "reason" => label(reason),
        )
        .increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_normalizes_case_and_whitespace() {
        assert_eq!(label("  GNews "), "gnews");
    }

    #[test]
    fn label_falls_back_to_unknown() {
        assert_eq!(label(""), "unknown");
        assert_eq!(label("   "), "unknown");
    }

    #[test]
    fn label_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(label(&long).len(), 120);
    }
}
