//! Offline web search.
//!
//! Ranks a small built-in corpus by term overlap with the query, so agent
//! runs are reproducible without network access. Queries that match
//! nothing get a generic result pointing at a search page.

use async_trait::async_trait;
use ferroact_core::error::ToolError;
use ferroact_core::tool::{ParameterDefinition, ParameterType, Tool, ToolArgs};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub struct WebSearchTool {
    latency: Duration,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(50),
        }
    }

    /// Simulated network latency per query.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

struct Document {
    title: &'static str,
    url: &'static str,
    snippet: &'static str,
    keywords: &'static [&'static str],
}

const CORPUS: &[Document] = &[
    Document {
        title: "The Rust Programming Language",
        url: "https://doc.rust-lang.org/book/",
        snippet: "Rust is a systems programming language focused on safety, speed, and concurrency.",
        keywords: &["rust", "language", "programming", "ownership", "borrow"],
    },
    Document {
        title: "Tokio: an asynchronous runtime for Rust",
        url: "https://tokio.rs/",
        snippet: "Tokio provides the building blocks for writing reliable network applications.",
        keywords: &["tokio", "async", "runtime", "rust", "network"],
    },
    Document {
        title: "Circuit Breaker pattern",
        url: "https://martinfowler.com/bliki/CircuitBreaker.html",
        snippet: "Wrap a protected call in a breaker object that trips once failures reach a threshold.",
        keywords: &["circuit", "breaker", "resilience", "failure", "pattern"],
    },
    Document {
        title: "ReAct: Synergizing Reasoning and Acting in Language Models",
        url: "https://arxiv.org/abs/2210.03629",
        snippet: "Interleaving reasoning traces and task-specific actions improves language model agents.",
        keywords: &["react", "reasoning", "acting", "agent", "llm", "language"],
    },
    Document {
        title: "Paris - Wikipedia",
        url: "https://en.wikipedia.org/wiki/Paris",
        snippet: "Paris is the capital and most populous city of France.",
        keywords: &["paris", "france", "capital", "city"],
    },
    Document {
        title: "Retry with exponential backoff",
        url: "https://aws.amazon.com/builders-library/timeouts-retries-and-backoff-with-jitter/",
        snippet: "Back off exponentially between retries and cap the delay to avoid overload.",
        keywords: &["retry", "backoff", "exponential", "timeout", "resilience"],
    },
    Document {
        title: "Token usage and rate limits",
        url: "https://platform.openai.com/docs/guides/rate-limits",
        snippet: "Rate limits are measured in requests and tokens per minute and per day.",
        keywords: &["token", "tokens", "rate", "limit", "budget", "usage"],
    },
];

/// Rank the corpus against `query`, returning at most `limit` hits.
pub fn search(query: &str, limit: usize) -> Vec<SearchHit> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();

    let mut scored: Vec<(usize, usize)> = CORPUS
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let score = terms
                .iter()
                .filter(|t| doc.keywords.contains(&t.as_str()))
                .count();
            (i, score)
        })
        .filter(|(_, score)| *score > 0)
        .collect();
    // Stable sort keeps corpus order among equal scores.
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let mut hits: Vec<SearchHit> = scored
        .into_iter()
        .take(limit)
        .map(|(i, _)| {
            let doc = &CORPUS[i];
            SearchHit {
                title: doc.title.to_string(),
                url: doc.url.to_string(),
                snippet: doc.snippet.to_string(),
            }
        })
        .collect();

    if hits.is_empty() && limit > 0 {
        hits.push(SearchHit {
            title: format!("Search results for \"{query}\""),
            url: format!("https://duckduckgo.com/?q={}", terms.join("+")),
            snippet: format!("No offline results matched \"{query}\"."),
        });
    }
    hits
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns titles, URLs and snippets of relevant pages."
    }

    fn parameters(&self) -> BTreeMap<String, ParameterDefinition> {
        BTreeMap::from([
            (
                "query".to_string(),
                ParameterDefinition::new(ParameterType::String, "Search query")
                    .required()
                    .with_range(Some(1.0), Some(500.0)),
            ),
            (
                "num_results".to_string(),
                ParameterDefinition::new(ParameterType::Integer, "Number of results to return")
                    .with_default(serde_json::json!(3))
                    .with_range(Some(1.0), Some(5.0)),
            ),
        ])
    }

    fn is_async(&self) -> bool {
        true
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(10))
    }

    async fn execute(&self, args: ToolArgs) -> Result<serde_json::Value, ToolError> {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or_default();
        let limit = args.get("num_results").and_then(|v| v.as_u64()).unwrap_or(3) as usize;

        tokio::time::sleep(self.latency).await;
        let hits = search(query, limit);
        tracing::debug!(query, hits = hits.len(), "Web search");

        serde_json::to_value(hits).map_err(|e| ToolError::failed(self.name(), e.to_string()))
    }
}
