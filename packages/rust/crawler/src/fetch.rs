//! Page fetching: the fetcher seam and its HTTP implementation.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use orgscout_shared::{Result, ScoutError};

use crate::page::{PageContent, parse_page};

/// User-Agent string for page requests.
const USER_AGENT: &str = concat!("orgscout/", env!("CARGO_PKG_VERSION"));

/// Maximum redirects followed per page.
const MAX_REDIRECTS: usize = 5;

/// Default visible-text budget handed to extraction.
pub const DEFAULT_MAX_PAGE_CHARS: usize = 20_000;

/// Fetches a page and returns its title, description, and visible text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, failing on navigation timeout or network error.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<PageContent>;
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// Plain HTTP fetcher: GET the page and read its static HTML.
pub struct HttpFetcher {
    client: Client,
    max_chars: usize,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| ScoutError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_chars: DEFAULT_MAX_PAGE_CHARS,
            allow_localhost: false,
        })
    }

    /// Visible text is cut to this many characters.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<PageContent> {
        let parsed = Url::parse(url).map_err(|e| ScoutError::Fetch(format!("{url}: {e}")))?;

        if !self.allow_localhost && is_ssrf_target(&parsed) {
            return Err(ScoutError::Fetch(format!("{url}: blocked private or non-HTTP target")));
        }

        let response = self
            .client
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScoutError::Fetch(format!("{url}: timed out after {}s", timeout.as_secs()))
                } else {
                    ScoutError::Fetch(format!("{url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoutError::Fetch(format!("{url}: HTTP {status}")));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ScoutError::Fetch(format!("{url}: body read failed: {e}")))?;

        let page = parse_page(&final_url, &body, self.max_chars);
        debug!(chars = page.text.chars().count(), "page fetched");
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
