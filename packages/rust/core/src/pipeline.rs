//! End-to-end run: entities → crawl → partial record → merge → canonical record.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use orgscout_schema::Schema;
use orgscout_shared::{Entity, PipelineConfig, Result};

use crate::merge::merge_entity;
use crate::orchestrator::{CrawlContext, Services, crawl_entity};
use crate::run::{Run, start_run};

/// Where an entity ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStatus {
    /// Canonical record written.
    Merged { path: PathBuf },
    /// Crawl, partial write, or merge failed.
    Failed { stage: Stage, error: String },
    /// Not attempted.
    Skipped { reason: String },
}

/// Pipeline stage at which an entity failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Crawl,
    Persist,
    Merge,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Crawl => "crawl",
            Self::Persist => "persist",
            Self::Merge => "merge",
        })
    }
}

/// Result for one entity of the run.
#[derive(Debug, Clone)]
pub struct EntityOutcome {
    pub name: String,
    pub key: String,
    pub status: EntityStatus,
}

impl EntityOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self.status, EntityStatus::Merged { .. })
    }
}

/// Result of a whole run, outcomes in input order.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub outcomes: Vec<EntityOutcome>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn merged(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_merged()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.merged()
    }
}

/// Progress callback for reporting run status.
pub trait RunProgress: Send + Sync {
    /// Called when an entity acquires its slot and starts crawling.
    fn entity_started(&self, name: &str, index: usize, total: usize);
    /// Called when an entity is merged, failed, or skipped.
    fn entity_finished(&self, outcome: &EntityOutcome);
    /// Called once every entity has been attempted.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl RunProgress for SilentProgress {
    fn entity_started(&self, _name: &str, _index: usize, _total: usize) {}
    fn entity_finished(&self, _outcome: &EntityOutcome) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Run the full pipeline over `entities` in a new run workspace.
///
/// At most `entity_concurrency` entities are in flight, started
/// `entity_delay` apart. One entity's failure never affects another; the
/// only error returned is failing to create the workspace.
#[instrument(skip_all, fields(entities = entities.len()))]
pub async fn run_entities(
    entities: &[Entity],
    schema: Arc<Schema>,
    config: &PipelineConfig,
    services: &Services,
    progress: Arc<dyn RunProgress>,
) -> Result<RunSummary> {
    let start = Instant::now();
    let run = Arc::new(start_run(&config.output_root)?);
    let ctx = Arc::new(CrawlContext::new(services, config));
    let slots = Arc::new(Semaphore::new(config.entity_concurrency.max(1)));
    let total = entities.len();

    run.record_event(&format!("run {} started with {total} entities", run.id()));
    info!(run_id = %run.id(), total, "run started");

    let mut outcomes: Vec<Option<EntityOutcome>> = vec![None; total];
    let mut seen_keys = HashSet::new();
    let mut tasks = JoinSet::new();

    for (index, entity) in entities.iter().enumerate() {
        let key = entity.key();
        if !seen_keys.insert(key.clone()) {
            let outcome = EntityOutcome {
                name: entity.name.clone(),
                key: key.clone(),
                status: EntityStatus::Skipped {
                    reason: format!("duplicate entity key \"{key}\""),
                },
            };
            warn!(entity = %entity.name, %key, "skipping entity with duplicate key");
            run.record_event(&format!("{}: skipped, duplicate key {key}", entity.name));
            progress.entity_finished(&outcome);
            outcomes[index] = Some(outcome);
            continue;
        }

        if index > 0 && !config.entity_delay.is_zero() {
            tokio::time::sleep(config.entity_delay).await;
        }

        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };

        progress.entity_started(&entity.name, index, total);

        let entity = entity.clone();
        let schema = Arc::clone(&schema);
        let run = Arc::clone(&run);
        let ctx = Arc::clone(&ctx);
        let progress = Arc::clone(&progress);

        tasks.spawn(async move {
            let outcome = process_entity(&entity, key, &schema, &run, &ctx).await;
            progress.entity_finished(&outcome);
            drop(permit);
            (index, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(e) => error!(error = %e, "entity task panicked"),
        }
    }

    let outcomes: Vec<EntityOutcome> = outcomes
        .into_iter()
        .zip(entities)
        .map(|(outcome, entity)| {
            outcome.unwrap_or_else(|| EntityOutcome {
                name: entity.name.clone(),
                key: entity.key(),
                status: EntityStatus::Failed {
                    stage: Stage::Crawl,
                    error: "entity task aborted".into(),
                },
            })
        })
        .collect();

    let summary = RunSummary {
        run_id: run.id().to_string(),
        run_dir: run.dir().to_path_buf(),
        outcomes,
        elapsed: start.elapsed(),
    };

    run.record_event(&format!(
        "run {} finished: {} merged, {} failed",
        summary.run_id,
        summary.merged(),
        summary.failed()
    ));
    info!(
        run_id = %summary.run_id,
        merged = summary.merged(),
        failed = summary.failed(),
        elapsed_ms = summary.elapsed.as_millis(),
        "run complete"
    );
    progress.done(&summary);

    Ok(summary)
}

/// Crawl, persist, and merge one entity. Every failure is converted into the
/// outcome and the run log.
async fn process_entity(
    entity: &Entity,
    key: String,
    schema: &Schema,
    run: &Run,
    ctx: &CrawlContext,
) -> EntityOutcome {
    run.record_event(&format!("{}: crawl started ({})", entity.name, entity.url));

    let status = match crawl_entity(entity, schema, ctx).await {
        Err(e) => failed(run, entity, Stage::Crawl, e.to_string()),
        Ok(record) => match run.write_partial(&key, &record) {
            Err(e) => failed(run, entity, Stage::Persist, e.to_string()),
            Ok(_) => match merge_entity(&key, run, schema) {
                Err(e) => failed(run, entity, Stage::Merge, e.to_string()),
                Ok(_) => {
                    let path = run.canonical_path(&key);
                    run.record_event(&format!(
                        "{}: merged into {}",
                        entity.name,
                        path.display()
                    ));
                    EntityStatus::Merged { path }
                }
            },
        },
    };

    EntityOutcome {
        name: entity.name.clone(),
        key,
        status,
    }
}

fn failed(run: &Run, entity: &Entity, stage: Stage, error: String) -> EntityStatus {
    warn!(entity = %entity.name, %stage, %error, "entity failed");
    run.record_event(&format!("{}: {stage} failed: {error}", entity.name));
    EntityStatus::Failed { stage, error }
}
