//! In-memory fakes of the search, fetch, and extraction services.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use orgscout_crawler::{PageContent, PageFetcher};
use orgscout_discovery::SearchProvider;
use orgscout_extract::Extractor;
use orgscout_schema::FieldSpec;
use orgscout_shared::{FieldValue, PipelineConfig, Result, ScoutError};

/// Search results keyed by exact query; unknown queries return nothing.
pub struct FakeSearch {
    results: HashMap<String, Vec<String>>,
}

impl FakeSearch {
    pub fn new(results: Vec<(&str, Vec<&str>)>) -> Self {
        Self {
            results: results
                .into_iter()
                .map(|(q, urls)| (q.to_string(), urls.into_iter().map(String::from).collect()))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }
}

/// Counts concurrent calls and remembers the highest count seen.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Pages keyed by URL. `None` simulates a navigation timeout; unknown URLs
/// fail as network errors. Each URL may carry a delay, and every call is
/// counted in [`InFlight`].
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, Option<PageContent>>,
    delays: HashMap<String, Duration>,
    in_flight: Arc<InFlight>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, mut page: PageContent) -> Self {
        page.url = url.to_string();
        self.pages.insert(url.to_string(), Some(page));
        self
    }

    pub fn with_timeout(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), None);
        self
    }

    /// Hold every fetch of `url` for `delay` before answering.
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn in_flight(&self) -> Arc<InFlight> {
        Arc::clone(&self.in_flight)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<PageContent> {
        self.in_flight.enter();
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.leave();

        match self.pages.get(url) {
            Some(Some(page)) => Ok(page.clone()),
            Some(None) => Err(ScoutError::Fetch(format!(
                "{url}: timed out after {}s",
                timeout.as_secs()
            ))),
            None => Err(ScoutError::Fetch(format!("{url}: connection refused"))),
        }
    }
}

/// Extraction results keyed by (field name, page text); anything else fails.
#[derive(Default)]
pub struct FakeExtractor {
    values: HashMap<(String, String), FieldValue>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, field: &str, text: &str, value: FieldValue) -> Self {
        self.values
            .insert((field.to_string(), text.to_string()), value);
        self
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, field: &FieldSpec, text: &str) -> Result<FieldValue> {
        self.values
            .get(&(field.name.clone(), text.to_string()))
            .cloned()
            .ok_or_else(|| ScoutError::Extraction(format!("{}: nothing to extract", field.name)))
    }
}

pub fn page(title: Option<&str>, description: Option<&str>, text: &str) -> PageContent {
    PageContent {
        url: String::new(),
        title: title.map(String::from),
        description: description.map(String::from),
        text: text.to_string(),
    }
}

pub fn test_config(output_root: PathBuf) -> PipelineConfig {
    PipelineConfig {
        output_root,
        results_per_field: 3,
        field_concurrency: 2,
        entity_concurrency: 2,
        entity_delay: Duration::ZERO,
        fetch_timeout: Duration::from_secs(5),
        max_page_chars: 20_000,
        summary_field: "characterSummary".into(),
    }
}
