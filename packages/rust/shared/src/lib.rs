//! Shared types, error model, and configuration for bomenrich.
//!
//! This crate is the foundation depended on by all other bomenrich crates.
//! It provides:
//! - [`BomError`], the unified error type
//! - Domain types ([`JobId`], [`ColumnMap`], [`ComponentRow`], [`RowEnrichment`], [`JobMeta`])
//! - Configuration ([`AppConfig`], [`EnrichConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EnrichConfig, OpenRouterConfig, StoreSection, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_path,
    validate_api_key,
};
pub use error::{BomError, Result};
pub use types::{
    ArtifactKind, ColumnMap, ComponentRow, CURRENT_SCHEMA_VERSION, ENRICHED_DESCRIPTION_HEADER,
    ExchangeRecord, JobId, JobMeta, NO_PART_NUMBER, NO_SECOND_SOURCE, NO_SOURCE, NO_SUGGESTION,
    ROW_ERROR_PREFIX, RowEnrichment, SECOND_SOURCE_HEADER, SKIPPED_ROW, SOURCE_HEADER,
};
