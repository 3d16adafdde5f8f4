//! Browser integration over the Chrome DevTools protocol.
//!
//! Talks to a locally running Chrome started with `--remote-debugging-port`.
//! Page discovery goes through the HTTP `/json` endpoint; DOM reads go
//! through the per-page WebSocket (`cdp`), and `scrape` turns the active
//! tab into a prefilled task draft.

pub mod cdp;
pub mod scrape;

use serde::Deserialize;
use url::Url;

pub const DEFAULT_DEBUG_HOST: &str = "127.0.0.1";
pub const DEFAULT_DEBUG_PORT: u16 = 9222;

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("No debuggable page at {0}")]
    NoActivePage(String),
    #[error("Page has no WebSocket debugger URL: {0}")]
    NoDebuggerUrl(String),
    #[error("DevTools protocol error {code}: {message}")]
    Protocol { code: i64, message: String },
    #[error("JavaScript exception: {0}")]
    JsException(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    #[error("Connection closed before a response arrived")]
    ChannelClosed,
}

/// Where the browser's debugging endpoint listens.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for DebugEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_DEBUG_HOST.to_string(),
            port: DEFAULT_DEBUG_PORT,
        }
    }
}

impl DebugEndpoint {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Parse a `http://host:port` base into an endpoint. Used by tests.
    pub fn from_http_base(base: &str) -> Result<Self, BrowserError> {
        let parsed = Url::parse(base)?;
        let host = parsed.host_str().unwrap_or(DEFAULT_DEBUG_HOST).to_string();
        let port = parsed.port_or_known_default().unwrap_or(DEFAULT_DEBUG_PORT);
        Ok(Self { host, port })
    }

    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Fetch the debuggable targets from the `/json` endpoint.
    pub async fn list_pages(&self) -> Result<Vec<PageInfo>, BrowserError> {
        let url = format!("{}/json", self.http_base());
        let pages: Vec<PageInfo> = reqwest::get(&url).await?.json().await?;
        Ok(pages)
    }

    /// The foreground tab: the first `page`-type target in `/json` order.
    ///
    /// Chrome lists targets most-recently-focused first, so the first page
    /// entry is the one the user is looking at.
    pub async fn active_page(&self) -> Result<PageInfo, BrowserError> {
        let pages = self.list_pages().await?;
        pages
            .into_iter()
            .find(|page| page.page_type == "page")
            .ok_or_else(|| BrowserError::NoActivePage(self.http_base()))
    }
}

/// One debuggable target from the `/json` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub page_type: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_default_endpoint() {
        let endpoint = DebugEndpoint::default();
        assert_eq!(endpoint.http_base(), "http://127.0.0.1:9222");
    }

    #[test]
    fn test_with_port_overrides_only_the_port() {
        let endpoint = DebugEndpoint::with_port(9333);
        assert_eq!(endpoint.host, DEFAULT_DEBUG_HOST);
        assert_eq!(endpoint.port, 9333);
    }

    #[test]
    fn test_from_http_base_round_trips() {
        let endpoint = DebugEndpoint::from_http_base("http://127.0.0.1:9901").unwrap();
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 9901);
        assert_eq!(endpoint.http_base(), "http://127.0.0.1:9901");
    }

    #[tokio::test]
    async fn test_active_page_skips_non_page_targets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "worker-1",
                    "type": "service_worker",
                    "title": "sw.js",
                    "url": "https://app.shortcut.com/sw.js"
                },
                {
                    "id": "tab-1",
                    "type": "page",
                    "title": "Story 1234",
                    "url": "https://app.shortcut.com/acme/story/1234",
                    "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/tab-1"
                },
                {
                    "id": "tab-2",
                    "type": "page",
                    "title": "New Tab",
                    "url": "chrome://newtab/"
                }
            ])))
            .mount(&server)
            .await;

        let endpoint = DebugEndpoint::from_http_base(&server.uri()).unwrap();
        let page = endpoint.active_page().await.unwrap();

        assert_eq!(page.id, "tab-1");
        assert_eq!(page.url, "https://app.shortcut.com/acme/story/1234");
        assert_eq!(
            page.web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/page/tab-1")
        );
    }

    #[tokio::test]
    async fn test_active_page_errors_when_no_page_targets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "worker-1", "type": "service_worker", "title": "", "url": "x" }
            ])))
            .mount(&server)
            .await;

        let endpoint = DebugEndpoint::from_http_base(&server.uri()).unwrap();
        let err = endpoint.active_page().await.unwrap_err();
        assert!(matches!(err, BrowserError::NoActivePage(_)));
    }
}
