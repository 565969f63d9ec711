//! Built-in tools for Taskwright.
//!
//! - `terminate` ends the agent loop
//! - `web_search` queries an ordered chain of search providers
//! - `browser` drives a stateful text-mode browsing session (exclusive)

pub mod browser;
pub mod terminate;
pub mod web_search;

use std::sync::Arc;
use std::time::Duration;

use taskwright_config::ToolsConfig;
use taskwright_core::tool::ToolRegistry;

pub use browser::{BROWSER_TOOL, BrowserTool, HttpPageFetcher, Link, Page, PageFetcher};
pub use terminate::{TERMINATE_TOOL, TerminateTool};
pub use web_search::{SearchChain, SearchHit, SearchProvider, StaticSearch, WEB_SEARCH_TOOL, WebSearchTool};

/// Create a registry with every built-in tool, configured from `[tools]`.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let search = Arc::new(SearchChain::from_config(config));
    let fetcher = Arc::new(HttpPageFetcher::new(
        Duration::from_secs(config.request_timeout_secs),
        config.max_page_chars,
    ));

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(TerminateTool));
    registry.register(Box::new(WebSearchTool::new(search.clone(), config.search_results)));
    registry.register(Box::new(BrowserTool::new(fetcher, search)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_builtin_tools() {
        let registry = default_registry(&ToolsConfig::default());
        let mut names = registry.names();
        names.sort_unstable();
        assert_eq!(names, vec!["browser", "terminate", "web_search"]);
    }

    #[test]
    fn definitions_expose_schemas() {
        let registry = default_registry(&ToolsConfig::default());
        let browser = registry
            .definitions()
            .into_iter()
            .find(|d| d.name == BROWSER_TOOL)
            .unwrap();
        let conditions = browser.parameters["allOf"].as_array().unwrap();
        let go_to_url = conditions
            .iter()
            .find(|c| c["if"]["properties"]["action"]["const"] == "go_to_url")
            .unwrap();
        assert_eq!(go_to_url["then"]["required"][0], "url");
    }
}
