//! Crawl orchestration, merge and validation, and run management for orgscout.
//!
//! This crate ties together discovery, fetching, and extraction into the
//! end-to-end run: each entity is crawled into a partial record, persisted
//! in the run workspace, then merged into its canonical record.

pub mod merge;
pub mod orchestrator;
pub mod pipeline;
pub mod run;

#[cfg(test)]
mod testing;

pub use merge::{dedupe_items, finalize, fold_partials, merge_entity, validate};
pub use orchestrator::{CrawlContext, Services, crawl_entity};
pub use pipeline::{
    EntityOutcome, EntityStatus, RunProgress, RunSummary, SilentProgress, Stage, run_entities,
};
pub use run::{RUN_LOG_FILE, Run, RunLog, canonical_file_name, new_run_id, start_run};
