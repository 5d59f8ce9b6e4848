//! workbook-client: Workbook REST API client.
//!
//! Implements [`workbook_core::DataSource`] over HTTPS/JSON with basic auth.
//! Each call is bounded by the configured timeout so a hanging Workbook
//! server cannot stall a scrape indefinitely.

pub mod client;

pub use client::WorkbookClient;
