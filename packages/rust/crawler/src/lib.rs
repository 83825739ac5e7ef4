//! Page fetching and visible-text extraction.
//!
//! [`PageFetcher`] is the fetch seam used by the crawl orchestrator.
//! [`HttpFetcher`] implements it over reqwest with SSRF protection and
//! per-call timeouts; [`parse_page`] pulls the title, meta description, and
//! visible text out of raw HTML.

pub mod fetch;
pub mod page;

pub use fetch::{DEFAULT_MAX_PAGE_CHARS, HttpFetcher, PageFetcher};
pub use page::{PageContent, collapse_whitespace, parse_page, truncate_chars};
