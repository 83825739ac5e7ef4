//! Crawl orchestration for one entity: homepage pass, field URL planning,
//! bounded concurrent fetch + extract, and per-field aggregation.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use orgscout_crawler::PageFetcher;
use orgscout_discovery::{QueryPlanner, SearchProvider};
use orgscout_extract::Extractor;
use orgscout_schema::{FieldKind, FieldSpec, Schema};
use orgscout_shared::{
    Entity, FieldValue, PipelineConfig, Record, Result, ScoutError, is_identity_field,
};

/// The three external services a crawl talks to.
#[derive(Clone)]
pub struct Services {
    pub search: Arc<dyn SearchProvider>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub extractor: Arc<dyn Extractor>,
}

/// Everything `crawl_entity` needs besides the entity and schema.
#[derive(Clone)]
pub struct CrawlContext {
    planner: QueryPlanner,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    field_concurrency: usize,
    fetch_timeout: Duration,
    summary_field: String,
}

impl CrawlContext {
    pub fn new(services: &Services, config: &PipelineConfig) -> Self {
        Self {
            planner: QueryPlanner::new(Arc::clone(&services.search))
                .with_results_per_field(config.results_per_field),
            fetcher: Arc::clone(&services.fetcher),
            extractor: Arc::clone(&services.extractor),
            field_concurrency: config.field_concurrency.max(1),
            fetch_timeout: config.fetch_timeout,
            summary_field: config.summary_field.clone(),
        }
    }
}

/// Crawl one entity into a partial record.
///
/// The homepage fetch must succeed; its failure is returned. Every field-URL
/// failure after that is logged and leaves a gap, never an error.
#[instrument(skip_all, fields(entity = %entity.name))]
pub async fn crawl_entity(entity: &Entity, schema: &Schema, ctx: &CrawlContext) -> Result<Record> {
    let start = Instant::now();

    // --- Homepage ---
    let homepage = ctx
        .fetcher
        .fetch(&entity.url, ctx.fetch_timeout)
        .await
        .map_err(|e| ScoutError::Fetch(format!("homepage of {}: {e}", entity.name)))?;

    let mut record = Record {
        id: Uuid::now_v7().to_string(),
        name: homepage
            .title
            .clone()
            .unwrap_or_else(|| entity.name.trim().to_string()),
        website: entity.url.clone(),
        scraped_at: None,
        fields: BTreeMap::new(),
    };

    let summary_is_text = !is_identity_field(&ctx.summary_field)
        && schema
            .field(&ctx.summary_field)
            .is_some_and(|f| f.kind == FieldKind::ScalarText);
    if let Some(description) = homepage.description.filter(|_| summary_is_text) {
        record
            .fields
            .insert(ctx.summary_field.clone(), FieldValue::Text(description));
    }

    // --- Field URLs ---
    let plan = ctx.planner.plan_field_urls(&entity.name, schema).await;
    let permits = Arc::new(Semaphore::new(ctx.field_concurrency));
    let mut tasks = JoinSet::new();
    let mut submitted = 0usize;

    for (field_name, urls) in plan {
        let Some(field) = schema.field(&field_name) else {
            continue;
        };
        let field = Arc::new(field.clone());

        for url in urls {
            let seq = submitted;
            submitted += 1;

            let field = Arc::clone(&field);
            let permits = Arc::clone(&permits);
            let fetcher = Arc::clone(&ctx.fetcher);
            let extractor = Arc::clone(&ctx.extractor);
            let entity_name = entity.name.clone();
            let timeout = ctx.fetch_timeout;

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (seq, field, None);
                };
                let value = fetch_and_extract(
                    &entity_name,
                    &field,
                    &url,
                    timeout,
                    fetcher.as_ref(),
                    extractor.as_ref(),
                )
                .await;
                (seq, field, value)
            });
        }
    }

    // --- Aggregate in submission order ---
    let mut results = Vec::with_capacity(submitted);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(done) => results.push(done),
            Err(e) => warn!(entity = %entity.name, error = %e, "field task failed"),
        }
    }
    results.sort_by_key(|(seq, _, _)| *seq);

    let mut succeeded = 0usize;
    for (_, field, value) in results {
        let Some(value) = value else {
            continue;
        };
        succeeded += 1;
        aggregate(&mut record.fields, &field, value);
    }

    record.scraped_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    info!(
        urls = submitted,
        succeeded,
        fields = record.fields.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "entity crawled"
    );
    Ok(record)
}

/// Fetch one field URL and extract the field from it. Every failure is
/// logged and becomes `None`.
async fn fetch_and_extract(
    entity: &str,
    field: &FieldSpec,
    url: &str,
    timeout: Duration,
    fetcher: &dyn PageFetcher,
    extractor: &dyn Extractor,
) -> Option<FieldValue> {
    let page = match fetcher.fetch(url, timeout).await {
        Ok(page) => page,
        Err(e) => {
            warn!(entity, field = %field.name, url, error = %e, "fetch failed");
            return None;
        }
    };

    if page.text.trim().is_empty() {
        warn!(entity, field = %field.name, url, "page has no visible text");
        return None;
    }

    match extractor.extract(field, &page.text).await {
        Ok(value) if value_fits(field, &value) => {
            debug!(entity, field = %field.name, url, "field extracted");
            Some(value)
        }
        Ok(value) => {
            warn!(
                entity,
                field = %field.name,
                url,
                got = value.kind_label(),
                "extracted value does not match field kind"
            );
            None
        }
        Err(e) => {
            warn!(entity, field = %field.name, url, error = %e, "extraction failed");
            None
        }
    }
}

fn value_fits(field: &FieldSpec, value: &FieldValue) -> bool {
    matches!(
        (&field.kind, value),
        (FieldKind::ScalarText, FieldValue::Text(_))
            | (FieldKind::ListOfRecords(_), FieldValue::Items(_))
    )
}

/// Add one per-URL result to the record: lists are concatenated, text is
/// trimmed and joined with a single space. Identity names never land in
/// `fields`, since they are struct fields of [`Record`].
fn aggregate(fields: &mut BTreeMap<String, FieldValue>, field: &FieldSpec, value: FieldValue) {
    if is_identity_field(&field.name) {
        warn!(field = %field.name, "ignoring extracted value for identity field");
        return;
    }

    let value = match value {
        FieldValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return;
            }
            FieldValue::Text(text.to_string())
        }
        items => items,
    };

    match fields.entry(field.name.clone()) {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
            (FieldValue::Items(existing), FieldValue::Items(items)) => existing.extend(items),
            (FieldValue::Text(existing), FieldValue::Text(text)) => {
                if !existing.is_empty() {
                    existing.push(' ');
                }
                existing.push_str(&text);
            }
            _ => {}
        },
    }
}
