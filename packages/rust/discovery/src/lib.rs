//! Per-field URL discovery for one entity.
//!
//! Each schema field that declares a search keyword becomes one query
//! (`"<entity name> <keyword>"`). Results are filtered against the global and
//! field avoid-lists and the first `K` survivors are kept in rank order.

mod search;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use orgscout_schema::{FieldSpec, Schema};

pub use search::{BraveSearch, SearchProvider};

/// Default number of URLs kept per field.
pub const DEFAULT_RESULTS_PER_FIELD: usize = 3;

/// Candidate URLs per field name, in rank order.
pub type FieldUrls = BTreeMap<String, Vec<String>>;

/// Build the search query for one field.
pub fn build_query(entity_name: &str, keyword: &str) -> String {
    format!("{} {}", entity_name.trim(), keyword.trim())
}

/// Drop avoided URLs and keep the first `limit` survivors in original order.
pub fn filter_candidates(
    schema: &Schema,
    field: &FieldSpec,
    raw: Vec<String>,
    limit: usize,
) -> Vec<String> {
    raw.into_iter()
        .filter(|url| {
            let avoided = schema.is_avoided(field, url);
            if avoided {
                debug!(field = %field.name, %url, "dropping avoided URL");
            }
            !avoided
        })
        .take(limit)
        .collect()
}

// ---------------------------------------------------------------------------
// QueryPlanner
// ---------------------------------------------------------------------------

/// Turns a schema's search keywords into candidate URLs for an entity.
#[derive(Clone)]
pub struct QueryPlanner {
    search: Arc<dyn SearchProvider>,
    results_per_field: usize,
}

impl QueryPlanner {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self {
            search,
            results_per_field: DEFAULT_RESULTS_PER_FIELD,
        }
    }

    /// Number of URLs kept per field (K).
    pub fn with_results_per_field(mut self, k: usize) -> Self {
        self.results_per_field = k;
        self
    }

    /// Plan candidate URLs for every searchable field of `schema`.
    ///
    /// Searches run concurrently. A failed search is logged and leaves that
    /// field with an empty list; it never fails the plan.
    #[instrument(skip_all, fields(entity = %entity_name))]
    pub async fn plan_field_urls(&self, entity_name: &str, schema: &Schema) -> FieldUrls {
        let mut searches = JoinSet::new();

        for field in schema.searchable_fields() {
            let Some(keyword) = field.search_keyword.as_deref() else {
                continue;
            };
            let query = build_query(entity_name, keyword);
            let provider = self.search.clone();
            let field_name = field.name.clone();

            searches.spawn(async move {
                let result = provider.search(&query).await;
                (field_name, query, result)
            });
        }

        let mut planned = FieldUrls::new();

        while let Some(joined) = searches.join_next().await {
            let (field_name, query, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(entity = %entity_name, error = %e, "search task failed");
                    continue;
                }
            };

            let Some(field) = schema.field(&field_name) else {
                continue;
            };

            let urls = match result {
                Ok(raw) => filter_candidates(schema, field, raw, self.results_per_field),
                Err(e) => {
                    warn!(entity = %entity_name, field = %field_name, %query, error = %e, "search failed, no URLs for field");
                    Vec::new()
                }
            };

            debug!(field = %field_name, urls = urls.len(), "field URLs planned");
            planned.insert(field_name, urls);
        }

        // Fields whose task panicked still get an entry.
        for field in schema.searchable_fields() {
            planned.entry(field.name.clone()).or_default();
        }

        info!(
            fields = planned.len(),
            urls = planned.values().map(Vec::len).sum::<usize>(),
            "field URL plan complete"
        );
        planned
    }
}
