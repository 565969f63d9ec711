//! Browser tool: a stateful, text-mode browsing session.
//!
//! The session keeps tabs, per-tab history and a reading position. Pages
//! are fetched through a [`PageFetcher`] and reduced to visible text plus
//! links. The tool is exclusive: the registry lets only one call touch the
//! session at a time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Node, Selector};
use serde::Serialize;
use taskwright_core::error::ToolError;
use taskwright_core::tool::{Tool, ToolResult};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::web_search::SearchChain;

pub const BROWSER_TOOL: &str = "browser";

const VIEWPORT_CHARS: usize = 2000;
const MAX_LINKS: usize = 20;
const MAX_WAIT_SECS: u64 = 10;

/// Argument each action cannot do without.
const ACTION_REQUIREMENTS: &[(&str, &str)] = &[
    ("go_to_url", "url"),
    ("open_tab", "url"),
    ("web_search", "query"),
    ("switch_tab", "tab_id"),
    ("scroll_to_text", "text"),
    ("extract_content", "goal"),
    ("wait", "seconds"),
];

/// A fetched page reduced to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub text: String,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub text: String,
    pub href: String,
}

/// Loads pages for the browser session.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page, ToolError>;
}

/// Fetches pages over HTTP and extracts their visible text.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration, max_chars: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; Taskwright/0.1)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, max_chars }
    }
}

fn fetch_error(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: BROWSER_TOOL.into(),
        reason,
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, ToolError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(format!("failed to load {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("{url} returned HTTP {status}")));
        }

        let final_url = response.url().to_string();
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|ct| ct.contains("html"));
        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(format!("failed to read {url}: {e}")))?;

        let mut page = if is_html {
            parse_page(&final_url, &body)
        } else {
            Page {
                url: final_url,
                title: String::new(),
                text: body,
                links: Vec::new(),
            }
        };
        page.text = truncate_chars(&page.text, self.max_chars);
        Ok(page)
    }
}

/// Reduce an HTML document to its title, visible text and links.
pub fn parse_page(url: &str, html: &str) -> Page {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next().map(|t| t.text().collect::<String>()))
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let mut lines = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            matches!(a.value(), Node::Element(e) if matches!(e.name(), "script" | "style" | "noscript" | "head"))
        });
        if hidden {
            continue;
        }
        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }

    let base = url::Url::parse(url).ok();
    let mut links = Vec::new();
    if let Ok(sel) = Selector::parse("a[href]") {
        for anchor in document.select(&sel) {
            if links.len() >= MAX_LINKS {
                break;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let resolved = match &base {
                Some(b) => b.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
                None => href.to_string(),
            };
            if !resolved.starts_with("http") {
                continue;
            }
            let text = anchor.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
            links.push(Link { text, href: resolved });
        }
    }

    Page {
        url: url.to_string(),
        title,
        text: lines.join("\n"),
        links,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n[Content truncated at {max} characters]", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone)]
struct Tab {
    id: u32,
    history: Vec<Page>,
    /// Reading position in the current page, in characters.
    offset: usize,
}

impl Tab {
    fn page(&self) -> Option<&Page> {
        self.history.last()
    }
}

/// Tabs and the active tab. Created on first navigation.
#[derive(Debug, Default)]
struct Session {
    tabs: Vec<Tab>,
    active: usize,
    next_id: u32,
}

impl Session {
    fn active_tab(&mut self) -> Option<&mut Tab> {
        self.tabs.get_mut(self.active)
    }

    fn open(&mut self, page: Page) -> u32 {
        self.next_id += 1;
        self.tabs.push(Tab {
            id: self.next_id,
            history: vec![page],
            offset: 0,
        });
        self.active = self.tabs.len() - 1;
        self.next_id
    }

    fn navigate(&mut self, page: Page) {
        match self.active_tab() {
            Some(tab) => {
                tab.history.push(page);
                tab.offset = 0;
            }
            None => {
                self.open(page);
            }
        }
    }

    fn summary(&self) -> Option<String> {
        let tab = self.tabs.get(self.active)?;
        let page = tab.page()?;
        let mut out = format!("Current URL: {}\nTitle: {}\nOpen tabs:", page.url, page.title);
        for (i, t) in self.tabs.iter().enumerate() {
            let marker = if i == self.active { "*" } else { " " };
            let (title, url) = t.page().map(|p| (p.title.as_str(), p.url.as_str())).unwrap_or(("", ""));
            out.push_str(&format!("\n{marker}[{}] {title} ({url})", t.id));
        }
        Some(out)
    }
}

/// The browser tool.
pub struct BrowserTool {
    fetcher: Arc<dyn PageFetcher>,
    search: Arc<SearchChain>,
    session: Mutex<Session>,
}

impl BrowserTool {
    pub fn new(fetcher: Arc<dyn PageFetcher>, search: Arc<SearchChain>) -> Self {
        Self {
            fetcher,
            search,
            session: Mutex::new(Session::default()),
        }
    }

    async fn load(&self, url: &str) -> Result<Page, ToolError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ToolError::InvalidArguments(
                "Only http:// and https:// URLs are supported".into(),
            ));
        }
        debug!(url = %parsed, "Loading page");
        self.fetcher.fetch(parsed.as_str()).await
    }

    fn view(tab: &Tab) -> String {
        let Some(page) = tab.page() else {
            return "Tab is empty".into();
        };
        let total = page.text.chars().count();
        let window: String = page.text.chars().skip(tab.offset).take(VIEWPORT_CHARS).collect();
        let end = (tab.offset + VIEWPORT_CHARS).min(total);

        let mut out = format!(
            "URL: {}\nTitle: {}\nShowing characters {}-{} of {}\n\n{}",
            page.url, page.title, tab.offset, end, total, window
        );
        if !page.links.is_empty() {
            out.push_str("\n\nLinks:");
            for (i, link) in page.links.iter().enumerate() {
                out.push_str(&format!("\n[{i}] {} -> {}", link.text, link.href));
            }
        }
        out
    }

    async fn run(&self, action: &str, args: &serde_json::Value) -> Result<ToolResult, ToolError> {
        let no_page = || ToolError::ExecutionFailed {
            tool_name: BROWSER_TOOL.into(),
            reason: "No page is open. Use 'go_to_url' or 'web_search' first.".into(),
        };

        match action {
            "go_to_url" => {
                let url = required_str(args, "url")?;
                let page = self.load(url).await?;
                let mut session = self.session.lock().await;
                session.navigate(page);
                let tab = session.active_tab().ok_or_else(no_page)?;
                Ok(ToolResult::success(Self::view(tab)))
            }
            "open_tab" => {
                let url = required_str(args, "url")?;
                let page = self.load(url).await?;
                let mut session = self.session.lock().await;
                let id = session.open(page);
                let tab = session.active_tab().ok_or_else(no_page)?;
                Ok(ToolResult::success(format!("Opened tab {id}\n{}", Self::view(tab))))
            }
            "web_search" => {
                let query = required_str(args, "query")?;
                let (_, hits) = self.search.search(query, 1).await.map_err(|e| ToolError::ExecutionFailed {
                    tool_name: BROWSER_TOOL.into(),
                    reason: format!("search failed ({e})"),
                })?;
                let first = hits.into_iter().next().ok_or_else(|| ToolError::ExecutionFailed {
                    tool_name: BROWSER_TOOL.into(),
                    reason: format!("no results for '{query}'"),
                })?;
                let page = self.load(&first.url).await?;
                let mut session = self.session.lock().await;
                session.navigate(page);
                let tab = session.active_tab().ok_or_else(no_page)?;
                Ok(ToolResult::success(format!(
                    "Searched for '{query}' and opened the first result\n{}",
                    Self::view(tab)
                )))
            }
            "go_back" => {
                let mut session = self.session.lock().await;
                let tab = session.active_tab().ok_or_else(no_page)?;
                if tab.history.len() < 2 {
                    return Ok(ToolResult::failure("No previous page in this tab"));
                }
                tab.history.pop();
                tab.offset = 0;
                Ok(ToolResult::success(Self::view(tab)))
            }
            "switch_tab" => {
                let id = required_u64(args, "tab_id")?;
                let mut session = self.session.lock().await;
                let Some(idx) = session.tabs.iter().position(|t| u64::from(t.id) == id) else {
                    return Ok(ToolResult::failure(format!("No tab with id {id}")));
                };
                session.active = idx;
                let tab = session.active_tab().ok_or_else(no_page)?;
                Ok(ToolResult::success(Self::view(tab)))
            }
            "close_tab" => {
                let mut session = self.session.lock().await;
                if session.tabs.is_empty() {
                    return Err(no_page());
                }
                let active = session.active;
                let closed = session.tabs.remove(active);
                session.active = active.min(session.tabs.len().saturating_sub(1));
                let remaining = session
                    .summary()
                    .unwrap_or_else(|| "No tabs remain open".into());
                Ok(ToolResult::success(format!("Closed tab {}\n{remaining}", closed.id)))
            }
            "scroll_down" | "scroll_up" => {
                let amount = args["scroll_amount"].as_i64().unwrap_or(VIEWPORT_CHARS as i64).unsigned_abs() as usize;
                let mut session = self.session.lock().await;
                let tab = session.active_tab().ok_or_else(no_page)?;
                let total = tab.page().map(|p| p.text.chars().count()).unwrap_or(0);
                tab.offset = if action == "scroll_down" {
                    (tab.offset + amount).min(total.saturating_sub(1))
                } else {
                    tab.offset.saturating_sub(amount)
                };
                Ok(ToolResult::success(Self::view(tab)))
            }
            "scroll_to_text" => {
                let needle = required_str(args, "text")?;
                let mut session = self.session.lock().await;
                let tab = session.active_tab().ok_or_else(no_page)?;
                let found = tab.page().and_then(|p| find_ignore_case(&p.text, needle));
                match found {
                    Some(offset) => {
                        tab.offset = offset;
                        Ok(ToolResult::success(Self::view(tab)))
                    }
                    None => Ok(ToolResult::failure(format!("Text '{needle}' not found on the page"))),
                }
            }
            "extract_content" => {
                let goal = required_str(args, "goal")?;
                let mut session = self.session.lock().await;
                let tab = session.active_tab().ok_or_else(no_page)?;
                let page = tab.page().ok_or_else(no_page)?;
                Ok(ToolResult::success(format!(
                    "Extraction goal: {goal}\nSource: {} ({})\n\n{}",
                    page.title, page.url, page.text
                ))
                .with_data(serde_json::to_value(page).unwrap_or_default()))
            }
            "wait" => {
                let seconds = required_u64(args, "seconds")?.min(MAX_WAIT_SECS);
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                Ok(ToolResult::success(format!("Waited {seconds} seconds")))
            }
            other => Err(ToolError::InvalidArguments(format!("Unknown browser action: {other}"))),
        }
    }
}

/// Character offset of the first case-insensitive match of `needle` in `haystack`.
///
/// Characters are compared by their lowercase forms, so the offset always
/// counts characters of the original text.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let folded: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if folded.is_empty() {
        return None;
    }
    haystack.char_indices().enumerate().find_map(|(offset, (byte_idx, _))| {
        let mut rest = haystack[byte_idx..].chars().flat_map(char::to_lowercase);
        folded
            .iter()
            .all(|c| rest.next() == Some(*c))
            .then_some(offset)
    })
}

fn required_str<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    args[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must not be empty")))
}

fn required_u64(args: &serde_json::Value, key: &str) -> Result<u64, ToolError> {
    args[key]
        .as_u64()
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a non-negative integer")))
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        BROWSER_TOOL
    }

    fn description(&self) -> &str {
        "Browse the web in a persistent session. Navigate to URLs, search, go back, manage tabs, \
         scroll through long pages and extract page content. Each action requires the parameters \
         named in its parameter description."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let conditions: Vec<serde_json::Value> = ACTION_REQUIREMENTS
            .iter()
            .map(|(action, field)| {
                serde_json::json!({
                    "if": { "properties": { "action": { "const": action } } },
                    "then": { "required": [field] }
                })
            })
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "The browser action to perform",
                    "enum": [
                        "go_to_url", "go_back", "web_search",
                        "open_tab", "switch_tab", "close_tab",
                        "scroll_down", "scroll_up", "scroll_to_text",
                        "extract_content", "wait"
                    ]
                },
                "url": { "type": "string", "description": "URL for 'go_to_url' or 'open_tab'" },
                "query": { "type": "string", "description": "Search query for 'web_search'" },
                "tab_id": { "type": "integer", "description": "Tab ID for 'switch_tab'" },
                "scroll_amount": { "type": "integer", "description": "Characters to scroll for 'scroll_down' or 'scroll_up'" },
                "text": { "type": "string", "description": "Text to find for 'scroll_to_text'" },
                "goal": { "type": "string", "description": "What to extract for 'extract_content'" },
                "seconds": { "type": "integer", "description": "Seconds to wait for 'wait'" }
            },
            "required": ["action"],
            "allOf": conditions
        })
    }

    fn is_exclusive(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let action = required_str(&arguments, "action")?;
        self.run(action, &arguments).await
    }

    async fn context(&self) -> Option<String> {
        self.session.lock().await.summary()
    }

    async fn shutdown(&self) -> Result<(), ToolError> {
        let mut session = self.session.lock().await;
        if !session.tabs.is_empty() {
            info!(tabs = session.tabs.len(), "Closing browser session");
        }
        *session = Session::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web_search::StaticSearch;
    use std::collections::HashMap;
    use taskwright_core::tool::ToolRegistry;

    /// Serves canned pages keyed by URL.
    struct FakeFetcher {
        pages: HashMap<String, Page>,
    }

    impl FakeFetcher {
        fn new(urls: &[(&str, &str, &str)]) -> Self {
            let pages = urls
                .iter()
                .map(|(url, title, text)| {
                    (
                        url.to_string(),
                        Page {
                            url: url.to_string(),
                            title: title.to_string(),
                            text: text.to_string(),
                            links: Vec::new(),
                        },
                    )
                })
                .collect();
            Self { pages }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Page, ToolError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| fetch_error(format!("{url} returned HTTP 404 Not Found")))
        }
    }

    fn browser() -> BrowserTool {
        let fetcher = FakeFetcher::new(&[
            ("https://a.test/", "Page A", "Alpha page about cats and dogs."),
            ("https://b.test/", "Page B", "Bravo page. The answer is 42."),
            ("https://c.test/", "Page C", "İSTANBUL İİ Target here"),
            ("https://example.com/search?q=cats&p=1", "Cats result", "Cats are small mammals."),
        ]);
        BrowserTool::new(
            Arc::new(fetcher),
            Arc::new(SearchChain::new().with_provider(Arc::new(StaticSearch))),
        )
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(browser()));
        registry
    }

    #[tokio::test]
    async fn go_to_url_requires_url() {
        let result = registry()
            .dispatch("browser", serde_json::json!({"action": "go_to_url"}))
            .await;
        assert!(result.error.unwrap().contains("\"url\" is a required property"));
    }

    #[tokio::test]
    async fn navigate_and_go_back() {
        let tool = browser();
        let a = tool.execute(serde_json::json!({"action": "go_to_url", "url": "https://a.test/"})).await.unwrap();
        assert!(a.output.unwrap().contains("Alpha page"));
        tool.execute(serde_json::json!({"action": "go_to_url", "url": "https://b.test/"})).await.unwrap();

        let ctx = tool.context().await.unwrap();
        assert!(ctx.contains("Current URL: https://b.test/"));

        let back = tool.execute(serde_json::json!({"action": "go_back"})).await.unwrap();
        assert!(back.output.unwrap().contains("Page A"));

        let again = tool.execute(serde_json::json!({"action": "go_back"})).await.unwrap();
        assert!(!again.is_success());
    }

    #[tokio::test]
    async fn tabs_open_switch_close() {
        let tool = browser();
        tool.execute(serde_json::json!({"action": "go_to_url", "url": "https://a.test/"})).await.unwrap();
        let opened = tool.execute(serde_json::json!({"action": "open_tab", "url": "https://b.test/"})).await.unwrap();
        assert!(opened.output.unwrap().starts_with("Opened tab 2"));

        let ctx = tool.context().await.unwrap();
        assert!(ctx.contains(" [1] Page A"));
        assert!(ctx.contains("*[2] Page B"));

        let switched = tool.execute(serde_json::json!({"action": "switch_tab", "tab_id": 1})).await.unwrap();
        assert!(switched.output.unwrap().contains("Alpha"));

        let closed = tool.execute(serde_json::json!({"action": "close_tab"})).await.unwrap();
        assert!(closed.output.unwrap().contains("Closed tab 1"));
        assert!(tool.context().await.unwrap().contains("Page B"));

        let missing = tool.execute(serde_json::json!({"action": "switch_tab", "tab_id": 9})).await.unwrap();
        assert!(!missing.is_success());
    }

    #[tokio::test]
    async fn web_search_opens_first_result() {
        let tool = browser();
        let result = tool.execute(serde_json::json!({"action": "web_search", "query": "cats"})).await.unwrap();
        assert!(result.output.unwrap().contains("Cats are small mammals."));
    }

    #[tokio::test]
    async fn scroll_to_text_moves_reading_position() {
        let tool = browser();
        tool.execute(serde_json::json!({"action": "go_to_url", "url": "https://b.test/"})).await.unwrap();
        let found = tool
            .execute(serde_json::json!({"action": "scroll_to_text", "text": "answer"}))
            .await
            .unwrap();
        assert!(found.output.unwrap().contains("Showing characters 16-"));

        let missing = tool
            .execute(serde_json::json!({"action": "scroll_to_text", "text": "zebra"}))
            .await
            .unwrap();
        assert!(!missing.is_success());
    }

    #[tokio::test]
    async fn scroll_to_text_offset_counts_original_characters() {
        let tool = browser();
        tool.execute(serde_json::json!({"action": "go_to_url", "url": "https://c.test/"})).await.unwrap();
        let found = tool
            .execute(serde_json::json!({"action": "scroll_to_text", "text": "TARGET"}))
            .await
            .unwrap()
            .output
            .unwrap();
        assert!(found.contains("Showing characters 12-"));
        assert!(found.ends_with("\n\nTarget here"));
    }

    #[test]
    fn case_insensitive_search_keeps_original_positions() {
        assert_eq!(find_ignore_case("İİ abc", "ABC"), Some(3));
        assert_eq!(find_ignore_case("İstanbul", "i\u{307}stan"), Some(0));
        assert_eq!(find_ignore_case("abc", ""), None);
    }

    #[tokio::test]
    async fn actions_need_an_open_page() {
        let result = browser().execute(serde_json::json!({"action": "extract_content", "goal": "x"})).await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let result = browser()
            .execute(serde_json::json!({"action": "go_to_url", "url": "file:///etc/passwd"}))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn fetch_failure_is_tool_error() {
        let result = registry()
            .dispatch("browser", serde_json::json!({"action": "go_to_url", "url": "https://missing.test/"}))
            .await;
        assert!(result.error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn shutdown_clears_session() {
        let tool = browser();
        tool.execute(serde_json::json!({"action": "go_to_url", "url": "https://a.test/"})).await.unwrap();
        tool.shutdown().await.unwrap();
        assert!(tool.context().await.is_none());
    }

    #[test]
    fn parse_page_drops_scripts_and_resolves_links() {
        let html = r#"<html><head><title> Cats </title><style>p{}</style></head>
            <body><script>var x = 1;</script><p>Cats   purr.</p><a href="/dogs">Dogs  page</a>
            <a href="mailto:x@y.z">mail</a></body></html>"#;
        let page = parse_page("https://pets.test/cats", html);
        assert_eq!(page.title, "Cats");
        assert!(page.text.contains("Cats purr."));
        assert!(!page.text.contains("var x"));
        assert_eq!(page.links, vec![Link { text: "Dogs page".into(), href: "https://pets.test/dogs".into() }]);
    }

    #[test]
    fn truncation_marks_cut() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert!(truncate_chars("abcdef", 3).starts_with("abc\n[Content truncated"));
    }
}
