//! Web research
//!
//! Deep research mode augments a prompt with a few web snippets. Search is a
//! capability: [`DuckDuckGoSearch`] in production, [`DisabledSearch`] when
//! research is switched off. Failures never propagate; they yield no results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Fixed timeout for the outbound search call
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Results requested per chat message
pub const DEFAULT_MAX_RESULTS: usize = 3;

/// A single search snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub content: String,
    pub url: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web. Returns an empty vector on any failure.
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult>;
}

/// Search capability used when deep research is disabled
pub struct DisabledSearch;

#[async_trait]
impl WebSearch for DisabledSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Vec<SearchResult> {
        Vec::new()
    }
}

/// DuckDuckGo instant answer client
pub struct DuckDuckGoSearch {
    url: String,
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(SEARCH_TIMEOUT)
                .user_agent("aichat/0.2.0")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    async fn fetch(&self, query: &str) -> Result<Value, reqwest::Error> {
        self.client
            .get(&self.url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        tracing::debug!("Web search: {}", query);
        match self.fetch(query).await {
            Ok(data) => parse_instant_answer(&data, max_results),
            Err(e) => {
                tracing::error!("Web search error: {}", e);
                Vec::new()
            }
        }
    }
}

/// Build results from an instant answer payload: the abstract first (when
/// present), then up to `max_results - 1` related topics with text.
pub fn parse_instant_answer(data: &Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let abstract_text = data.get("Abstract").and_then(|v| v.as_str()).unwrap_or("");
    if !abstract_text.is_empty() {
        results.push(SearchResult {
            title: non_empty_str(data.get("AbstractSource"))
                .unwrap_or("Web Search")
                .to_string(),
            content: abstract_text.to_string(),
            url: data
                .get("AbstractURL")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        });
    }

    let topics = data
        .get("RelatedTopics")
        .and_then(|v| v.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[]);

    for topic in topics.iter().take(max_results.saturating_sub(1)) {
        let Some(text) = non_empty_str(topic.get("Text")) else {
            continue;
        };
        let url = topic.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        let title = url
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("Related");

        results.push(SearchResult {
            title: title.to_string(),
            content: text.to_string(),
            url: url.to_string(),
        });
    }

    results
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Value {
        serde_json::json!({
            "Abstract": "Rust is a systems programming language.",
            "AbstractSource": "Wikipedia",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "RelatedTopics": [
                {"Text": "Cargo - the Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                {"Name": "Category group without text", "Topics": []},
                {"Text": "Ferris - the mascot", "FirstURL": "https://duckduckgo.com/Ferris"},
                {"Text": "Never reached", "FirstURL": "https://duckduckgo.com/Later"}
            ]
        })
    }

    #[test]
    fn test_abstract_comes_first() {
        let results = parse_instant_answer(&sample_payload(), 3);
        assert_eq!(results[0].title, "Wikipedia");
        assert_eq!(results[0].url, "https://en.wikipedia.org/wiki/Rust");
    }

    #[test]
    fn test_related_topics_window() {
        // max_results - 1 topics are considered; the one without text is skipped
        let results = parse_instant_answer(&sample_payload(), 3);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].title, "Cargo");
        assert_eq!(results[1].content, "Cargo - the Rust package manager");
    }

    #[test]
    fn test_empty_payload() {
        assert!(parse_instant_answer(&serde_json::json!({}), 3).is_empty());
        assert!(parse_instant_answer(&serde_json::json!({"Abstract": ""}), 3).is_empty());
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let payload = serde_json::json!({
            "Abstract": "Something",
            "RelatedTopics": [{"Text": "No url"}]
        });
        let results = parse_instant_answer(&payload, 3);
        assert_eq!(results[0].title, "Web Search");
        assert_eq!(results[1].title, "Related");
        assert_eq!(results[1].url, "");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_nothing() {
        let search = DuckDuckGoSearch::new("http://127.0.0.1:9/");
        assert!(search.search("rust", 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_search() {
        assert!(DisabledSearch.search("rust", 3).await.is_empty());
    }
}
