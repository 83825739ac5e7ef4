//! Shared types, error model, and configuration for orgscout.
//!
//! This crate is the foundation depended on by all other orgscout crates.
//! It provides:
//! - [`ScoutError`], the unified error type
//! - Domain types ([`Entity`], [`Record`], [`FieldValue`], [`Item`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AvoidConfig, DefaultsConfig, ExtractionConfig, PipelineConfig, SearchConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, require_api_key,
};
pub use error::{Result, ScoutError};
pub use types::{
    Entity, FieldValue, IDENTITY_FIELDS, Item, Record, entity_key, is_identity_field,
    parse_entities,
};
