//! workbook-metrics: turns Workbook data into Prometheus metric families.
//!
//! # Architecture
//!
//! ```text
//! SnapshotCollector::collect()
//!   ├── Fetching     DataSource reads, one StageStatus per stage
//!   │     └── EntityIndex (+ resolve: effective prices / capacity profiles)
//!   ├── Aggregating  families::* via aggregate::{Grouped, Distinct}
//!   │     └── histogram::build_histogram()
//!   │     └── convert::CurrencyConverter (optional)
//!   └── Done         workbook_up, scrape health, workbook_collector_up
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod aggregate;
pub mod collector;
pub mod convert;
pub mod families;
pub mod family;
pub mod histogram;
pub mod index;
pub mod prometheus;
pub mod resolve;

pub use collector::{
    Clock, Family, FamilyStatus, FixedClock, ScrapeOutcome, Snapshot, SnapshotCollector, Stage,
    StageStatus, SystemClock,
};
pub use family::{GaugeFamily, HistogramFamily, MetricDesc, MetricFamily};
pub use histogram::{build_histogram, Histogram};
pub use index::EntityIndex;
pub use prometheus::{render_prometheus, CONTENT_TYPE};
pub use resolve::resolve_effective;
