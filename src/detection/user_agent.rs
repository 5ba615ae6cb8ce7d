//! Rule-based operating system / browser extraction for display
//!
//! Results are cached per User-Agent string; crawler fleets send the same
//! handful of strings over and over.

use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedAgent {
    pub os: Option<String>,
    pub browser: Option<String>,
}

/// Ordered; Android must be tested before Linux and iOS before macOS
const OS_RULES: &[(&str, &str)] = &[
    ("Windows NT", "Windows"),
    ("Android", "Android"),
    ("iPhone", "iOS"),
    ("iPad", "iOS"),
    ("CrOS", "ChromeOS"),
    ("Mac OS X", "macOS"),
    ("Macintosh", "macOS"),
    ("Linux", "Linux"),
];

/// Ordered; Chromium derivatives carry "Chrome/" too, so they go first
const BROWSER_RULES: &[(&str, &str)] = &[
    ("Edg/", "Edge"),
    ("OPR/", "Opera"),
    ("SamsungBrowser/", "Samsung Internet"),
    ("Firefox/", "Firefox"),
    ("FxiOS/", "Firefox"),
    ("CriOS/", "Chrome"),
    ("Chrome/", "Chrome"),
];

pub fn parse_user_agent(user_agent: &str) -> ParsedAgent {
    let os = OS_RULES
        .iter()
        .find(|(needle, _)| user_agent.contains(needle))
        .map(|(_, name)| name.to_string());

    let browser = BROWSER_RULES
        .iter()
        .find(|(needle, _)| user_agent.contains(needle))
        .map(|(_, name)| name.to_string())
        .or_else(|| {
            (user_agent.contains("Safari/") && user_agent.contains("Version/"))
                .then(|| "Safari".to_string())
        });

    ParsedAgent { os, browser }
}

/// Caching front for [`parse_user_agent`]
#[derive(Clone)]
pub struct UserAgentParser {
    cache: Cache<String, Arc<ParsedAgent>>,
}

impl UserAgentParser {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_idle(Duration::from_secs(3600))
            .build();
        Self { cache }
    }

    pub async fn parse(&self, user_agent: &str) -> Arc<ParsedAgent> {
        if user_agent.is_empty() {
            return Arc::new(ParsedAgent::default());
        }
        self.cache
            .get_with(user_agent.to_string(), async {
                Arc::new(parse_user_agent(user_agent))
            })
            .await
    }
}

impl Default for UserAgentParser {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_chrome() {
        let parsed = parse_user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        );
        assert_eq!(parsed.os.as_deref(), Some("Windows"));
        assert_eq!(parsed.browser.as_deref(), Some("Chrome"));
    }

    #[test]
    fn test_edge_before_chrome() {
        let parsed = parse_user_agent(
            "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 Chrome/120.0 Safari/537.36 Edg/120.0",
        );
        assert_eq!(parsed.browser.as_deref(), Some("Edge"));
    }

    #[test]
    fn test_android_before_linux() {
        let parsed = parse_user_agent(
            "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Chrome/120.0 Mobile Safari/537.36",
        );
        assert_eq!(parsed.os.as_deref(), Some("Android"));
    }

    #[test]
    fn test_iphone_safari() {
        let parsed = parse_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Version/17.0 Mobile/15E148 Safari/604.1",
        );
        assert_eq!(parsed.os.as_deref(), Some("iOS"));
        assert_eq!(parsed.browser.as_deref(), Some("Safari"));
    }

    #[test]
    fn test_crawler_has_no_browser() {
        let parsed =
            parse_user_agent("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)");
        assert_eq!(parsed, ParsedAgent::default());
    }

    #[tokio::test]
    async fn test_cached_parse_matches_uncached() {
        let parser = UserAgentParser::new(16);
        let ua = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        let first = parser.parse(ua).await;
        let second = parser.parse(ua).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, parse_user_agent(ua));
        assert_eq!(first.browser.as_deref(), Some("Firefox"));
    }
}
