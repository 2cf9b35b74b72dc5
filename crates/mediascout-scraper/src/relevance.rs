//! AI relevance filter.
//!
//! Asks an OpenAI-compatible chat endpoint for a strict YES/NO verdict on
//! whether a candidate is primarily about the brand's keywords. Built
//! fail-open: any API error, timeout, or missing credential keeps the
//! candidate — the filter only ever removes confident negatives.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::types::RawCandidate;

const DEFAULT_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Input truncation keeps the prompt around the ~300-token budget.
const MAX_INPUT_CHARS: usize = 600;
/// Keywords included in the prompt context.
const MAX_CONTEXT_KEYWORDS: usize = 20;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct RelevanceFilter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl RelevanceFilter {
    /// Build a filter when a credential is configured; `None` disables it.
    #[must_use]
    pub fn from_config(api_key: Option<&str>, model: &str) -> Option<Self> {
        let api_key = api_key?.to_string();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .ok()?;
        Some(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    /// Test constructor pointing at a mock endpoint.
    #[must_use]
    pub fn with_endpoint(api_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Filter candidates in parallel, keeping relevant ones.
    ///
    /// Returns the kept candidates and the number removed.
    pub async fn filter(
        &self,
        candidates: Vec<RawCandidate>,
        keywords: &[String],
        run_id: &str,
    ) -> (Vec<RawCandidate>, usize) {
        if candidates.is_empty() || keywords.is_empty() {
            return (candidates, 0);
        }

        let mut context = keywords
            .iter()
            .take(MAX_CONTEXT_KEYWORDS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if keywords.len() > MAX_CONTEXT_KEYWORDS {
            context.push_str(", ...");
        }

        let total = candidates.len();
        let checks = candidates.iter().map(|candidate| {
            let text = format!("{}. {}", candidate.title, candidate.teaser);
            self.check_one(text, &context, run_id)
        });
        let verdicts = futures::future::join_all(checks).await;

        let kept: Vec<RawCandidate> = candidates
            .into_iter()
            .zip(verdicts)
            .filter_map(|(candidate, keep)| keep.then_some(candidate))
            .collect();

        let removed = total - kept.len();
        if removed > 0 {
            tracing::info!(
                run_id,
                kept = kept.len(),
                removed,
                "relevance filter removed candidates"
            );
        }
        (kept, removed)
    }

    /// One YES/NO check. Fail-open: errors resolve to `true`.
    async fn check_one(&self, text: String, context: &str, run_id: &str) -> bool {
        let truncated: String = text.chars().take(MAX_INPUT_CHARS).collect();

        let prompt = format!(
            "You are a strict media analyst. Is the following article PRIMARILY about \
             these topics: '{context}'?\n\nArticle: '{truncated}'\n\nRules:\n\
             - YES only if the article's main subject directly concerns the topics above\n\
             - NO if the topics appear only in sidebars, related links, ads, or as brief \
             passing references\n\
             - NO if the article is primarily about something unrelated\n\
             - When in doubt, reply NO\n\nReply ONLY with YES or NO."
        );

        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a strict relevance classifier. Reply ONLY with YES or NO.",
                },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": 5,
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<ChatResponse>().await {
                    Ok(parsed) => parsed
                        .choices
                        .first()
                        .map(|choice| choice.message.content.to_uppercase().contains("YES"))
                        .unwrap_or(true),
                    Err(e) => {
                        tracing::warn!(run_id, error = %e, "relevance response unparseable, keeping candidate");
                        true
                    }
                }
            }
            Ok(response) => {
                tracing::warn!(
                    run_id,
                    status = response.status().as_u16(),
                    "relevance check failed, keeping candidate"
                );
                true
            }
            Err(e) => {
                tracing::warn!(run_id, error = %e, "relevance check errored, keeping candidate");
                true
            }
        }
    }
}
