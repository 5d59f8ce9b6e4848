//! workbook-core: shared types for the Workbook exporter.
//!
//! Holds the entity model decoded from the Workbook API, the [`DataSource`]
//! trait every fetch goes through, and the exporter configuration.

pub mod config;
pub mod model;
pub mod source;

pub use config::{ConfigError, CurrencyConfig, ExporterConfig};
pub use model::*;
pub use source::{DataSource, SourceError, SourceResult};
