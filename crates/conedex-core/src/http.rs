//! HTTP-backed [`Browser`]: a page is a fetched document.
//!
//! Good enough for server-rendered shop and flavor pages; anything that
//! needs script execution plugs in a real headless browser through the
//! same traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use scraper::{Html, Selector};
use serde::Deserialize;

use crate::error::PageError;
use crate::web::{Browser, Page};

/// Client settings for [`HttpBrowser`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub max_idle_per_host: usize,
}

impl HttpConfig {
    /// Pooled client with these settings
    pub fn client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .pool_max_idle_per_host(self.max_idle_per_host)
            .build()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("conedex/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 30,
            max_idle_per_host: 8,
        }
    }
}

/// Pooled HTTP client handing out [`HttpPage`]s.
#[derive(Debug)]
pub struct HttpBrowser {
    client: reqwest::Client,
    open_pages: Arc<AtomicUsize>,
}

impl HttpBrowser {
    pub fn new(config: &HttpConfig) -> Result<Self, PageError> {
        let client = config
            .client()
            .map_err(|e| PageError::Launch(e.to_string()))?;
        Ok(Self {
            client,
            open_pages: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Async constructor, for use as a [`BrowserHandle`](crate::BrowserHandle) launcher
    pub async fn launch(config: HttpConfig) -> Result<Self, PageError> {
        Self::new(&config)
    }

    /// Pages opened and not yet closed
    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }
}

impl Browser for HttpBrowser {
    type Page = HttpPage;

    async fn new_page(&self) -> Result<HttpPage, PageError> {
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        Ok(HttpPage {
            client: self.client.clone(),
            state: Arc::new(Mutex::new(PageState::default())),
            open_pages: self.open_pages.clone(),
        })
    }

    async fn shutdown(&self) {
        let leaked = self.open_pages();
        if leaked > 0 {
            log::warn!("shutting down with {leaked} pages still open");
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    closed: bool,
    status: Option<u16>,
    body: Option<String>,
}

/// A fetched document; clones share state.
#[derive(Debug, Clone)]
pub struct HttpPage {
    client: reqwest::Client,
    state: Arc<Mutex<PageState>>,
    open_pages: Arc<AtomicUsize>,
}

impl HttpPage {
    fn with_state<T>(&self, f: impl FnOnce(&mut PageState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// HTTP status of the last navigation
    pub fn status(&self) -> Option<u16> {
        self.with_state(|s| s.status)
    }
}

impl Page for HttpPage {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        if self.with_state(|s| s.closed) {
            return Err(PageError::Closed);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PageError::from_reqwest(&e))?;
        let status = response.status().as_u16();
        self.with_state(|s| s.status = Some(status));

        let response = response
            .error_for_status()
            .map_err(|e| PageError::from_reqwest(&e))?;
        let body = response
            .text()
            .await
            .map_err(|e| PageError::from_reqwest(&e))?;

        self.with_state(|s| s.body = Some(body));
        Ok(())
    }

    async fn content(&self) -> Result<String, PageError> {
        self.with_state(|s| match (&s.body, s.closed) {
            (_, true) => Err(PageError::Closed),
            (Some(body), false) => Ok(body.clone()),
            (None, false) => Err(PageError::NotLoaded),
        })
    }

    async fn title(&self) -> Result<Option<String>, PageError> {
        let body = self.content().await?;
        Ok(extract_title(&body))
    }

    async fn close(self) -> Result<(), PageError> {
        let was_open = self.with_state(|s| {
            let was_open = !s.closed;
            s.closed = true;
            s.body = None;
            was_open
        });
        if was_open {
            self.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Text of the document `<title>`, entity-decoded and whitespace-collapsed.
///
/// Only the title under `<head>` counts; `<svg><title>` and commented-out
/// markup are not the page title.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("head > title").ok()?;
    let element = document.select(&selector).next()?;
    let title = element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_simple_title() {
        let html = "<html><head><title>Scoops &amp; Cones</title></head></html>";
        assert_eq!(extract_title(html), Some("Scoops & Cones".to_string()));
    }

    #[test]
    fn extract_title_decodes_entities() {
        let html = "<head><title>Ben &amp; Jerry&#39;s</title></head>";
        assert_eq!(extract_title(html), Some("Ben & Jerry's".to_string()));
    }

    #[test]
    fn commented_out_title_is_ignored() {
        let html = "<html><head><!-- <title>old</title> --><title>Real</title></head></html>";
        assert_eq!(extract_title(html), Some("Real".to_string()));
    }

    #[test]
    fn svg_and_lookalike_titles_are_ignored() {
        let svg = "<html><body><svg><title>icon</title></svg></body></html>";
        assert_eq!(extract_title(svg), None);

        let titlebar = "<html><head><titlebar>x</titlebar></head></html>";
        assert_eq!(extract_title(titlebar), None);

        let both = "<html><head><title>Waffle Cones</title></head>\
                    <body><svg><title>icon</title></svg></body></html>";
        assert_eq!(extract_title(both), Some("Waffle Cones".to_string()));
    }

    #[test]
    fn extract_title_with_attributes_and_case() {
        let html = "<HEAD><TITLE lang=\"en\">\n  Mint   Chip\n</TITLE></HEAD>";
        assert_eq!(extract_title(html), Some("Mint Chip".to_string()));
    }

    #[test]
    fn missing_or_empty_title() {
        assert_eq!(extract_title("<html><body>no head</body></html>"), None);
        assert_eq!(extract_title("<title>   </title>"), None);
        assert_eq!(extract_title(""), None);
    }

    #[test]
    fn default_config() {
        let config = HttpConfig::default();
        assert!(config.user_agent.starts_with("conedex/"));
        assert_eq!(config.connect_timeout_secs, 30);
        assert!(config.client().is_ok());
    }

    #[tokio::test]
    async fn close_is_idempotent_across_clones() {
        let browser = HttpBrowser::new(&HttpConfig::default()).unwrap();
        let page = browser.new_page().await.unwrap();
        assert_eq!(browser.open_pages(), 1);

        let other = page.clone();
        page.close().await.unwrap();
        other.clone().close().await.unwrap();
        assert_eq!(browser.open_pages(), 0);

        assert!(matches!(other.content().await, Err(PageError::Closed)));
        assert!(matches!(
            other.goto("http://127.0.0.1:9/").await,
            Err(PageError::Closed)
        ));
    }

    #[tokio::test]
    async fn content_before_goto_is_not_loaded() {
        let browser = HttpBrowser::new(&HttpConfig::default()).unwrap();
        let page = browser.new_page().await.unwrap();
        assert!(matches!(page.content().await, Err(PageError::NotLoaded)));
        page.close().await.unwrap();
    }
}
