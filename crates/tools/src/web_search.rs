//! Web search tool backed by an ordered chain of search providers.
//!
//! Providers are tried in order and the first one returning results wins.
//! When every provider fails, the tool reports a failure that points the
//! model at the browser tool instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Serialize;
use taskwright_config::ToolsConfig;
use taskwright_core::error::ToolError;
use taskwright_core::tool::{Tool, ToolResult};
use tracing::{debug, warn};

pub const WEB_SEARCH_TOOL: &str = "web_search";

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError>;
}

/// Providers tried in order until one returns results.
#[derive(Clone, Default)]
pub struct SearchChain {
    providers: Vec<Arc<dyn SearchProvider>>,
}

/// Every provider failed; one `(provider, reason)` entry each.
#[derive(Debug, Clone)]
pub struct SearchExhausted(pub Vec<(String, String)>);

impl std::fmt::Display for SearchExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no search providers configured");
        }
        let parts: Vec<String> = self.0.iter().map(|(p, e)| format!("{p}: {e}")).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl SearchChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Build the chain named in `[tools].search_providers`. Unknown names are skipped.
    pub fn from_config(config: &ToolsConfig) -> Self {
        let mut chain = Self::new();
        for name in &config.search_providers {
            match name.as_str() {
                "duckduckgo" => {
                    chain = chain.with_provider(Arc::new(DuckDuckGoSearch::new(Duration::from_secs(
                        config.request_timeout_secs,
                    ))));
                }
                "mock" => chain = chain.with_provider(Arc::new(StaticSearch)),
                other => warn!(provider = %other, "Unknown search provider, skipping"),
            }
        }
        chain
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run `query` against each provider in turn.
    pub async fn search(&self, query: &str, limit: usize) -> Result<(String, Vec<SearchHit>), SearchExhausted> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.search(query, limit).await {
                Ok(hits) if !hits.is_empty() => {
                    debug!(provider = provider.name(), hits = hits.len(), "Search succeeded");
                    return Ok((provider.name().to_string(), hits));
                }
                Ok(_) => failures.push((provider.name().to_string(), "no results".to_string())),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Search provider failed");
                    failures.push((provider.name().to_string(), e.to_string()));
                }
            }
        }
        Err(SearchExhausted(failures))
    }
}

pub struct WebSearchTool {
    chain: Arc<SearchChain>,
    default_results: usize,
}

impl WebSearchTool {
    pub fn new(chain: Arc<SearchChain>, default_results: usize) -> Self {
        Self {
            chain,
            default_results: default_results.max(1),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns a list of relevant results with titles, URLs, and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'query' must not be empty".into()))?;

        let limit = arguments["num_results"]
            .as_u64()
            .map(|n| n.clamp(1, 10) as usize)
            .unwrap_or(self.default_results);

        match self.chain.search(query, limit).await {
            Ok((provider, hits)) => {
                let data = serde_json::to_value(&hits).map_err(|e| ToolError::ExecutionFailed {
                    tool_name: WEB_SEARCH_TOOL.into(),
                    reason: e.to_string(),
                })?;
                Ok(ToolResult::success(format_hits(query, &hits)).with_data(serde_json::json!({
                    "provider": provider,
                    "results": data,
                })))
            }
            Err(exhausted) => Ok(ToolResult::failure(format!(
                "All search providers failed ({exhausted}). Try the browser tool instead: \
                 use action 'go_to_url' with a site that can answer the question."
            ))),
        }
    }
}

fn format_hits(query: &str, hits: &[SearchHit]) -> String {
    let mut output = format!("Search results for '{query}':\n");
    for (i, hit) in hits.iter().enumerate() {
        output.push_str(&format!("\n{}. {}\n   {}\n", i + 1, hit.title, hit.url));
        if !hit.snippet.is_empty() {
            output.push_str(&format!("   {}\n", hit.snippet));
        }
    }
    output
}

/// Scrapes DuckDuckGo's HTML endpoint.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; Taskwright/0.1)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: "https://html.duckduckgo.com/html/".into(),
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError> {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        let response = self.client.get(&url).send().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: WEB_SEARCH_TOOL.into(),
            reason: format!("request failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed {
                tool_name: WEB_SEARCH_TOOL.into(),
                reason: format!("HTTP {status}"),
            });
        }

        let html = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: WEB_SEARCH_TOOL.into(),
            reason: format!("failed to read response: {e}"),
        })?;

        Ok(parse_duckduckgo_results(&html, limit))
    }
}

fn parse_duckduckgo_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse(".result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let collect_text = |el: scraper::ElementRef| el.text().collect::<Vec<_>>().join(" ").trim().to_string();

    let mut hits = Vec::new();
    for result in document.select(&result_sel) {
        if hits.len() >= limit {
            break;
        }
        let Some(anchor) = result.select(&title_sel).next() else {
            continue;
        };
        let title = collect_text(anchor);
        let url = anchor.value().attr("href").map(unwrap_redirect).unwrap_or_default();
        let snippet = result.select(&snippet_sel).next().map(collect_text).unwrap_or_default();

        if !title.is_empty() && !url.is_empty() {
            hits.push(SearchHit { title, url, snippet });
        }
    }
    hits
}

/// DuckDuckGo wraps target URLs as `/l/?uddg=<encoded>&...`.
fn unwrap_redirect(href: &str) -> String {
    href.split("uddg=")
        .nth(1)
        .map(|rest| rest.split('&').next().unwrap_or(rest))
        .and_then(|encoded| urlencoding::decode(encoded).ok())
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|| href.to_string())
}

/// Deterministic offline results, for tests and air-gapped runs.
pub struct StaticSearch;

#[async_trait]
impl SearchProvider for StaticSearch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError> {
        let encoded = urlencoding::encode(query);
        Ok((1..=limit)
            .map(|i| SearchHit {
                title: format!("Result {i} for: {query}"),
                url: format!("https://example.com/search?q={encoded}&p={i}"),
                snippet: format!("Offline result {i} for the query '{query}'."),
            })
            .collect())
    }
}
