//! Exporter configuration (TOML).
//!
//! Built once at startup and handed to the collector by reference. Every
//! section has defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::{CompanyId, CurrencyId};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("workbook.url must not be empty")]
    MissingUrl,

    #[error("workbook.timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("time_entries.window_days must be greater than zero")]
    ZeroWindow,

    #[error("buckets.{name}: boundaries must be finite, got {value}")]
    NonFiniteBoundary { name: &'static str, value: f64 },

    #[error("buckets.{name}: duplicate boundary {value}")]
    DuplicateBoundary { name: &'static str, value: f64 },

    #[error("buckets.{name}: at least one boundary is required")]
    EmptyBuckets { name: &'static str },

    #[error("currency.conversion is enabled but has no target currency")]
    MissingConversionTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub workbook: WorkbookConfig,
    pub server: ServerConfig,
    pub filters: FilterConfig,
    pub buckets: BucketConfig,
    pub time_entries: TimeEntryConfig,
    pub currency: CurrencyConfig,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbookConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    /// Upper bound for a single API call.
    pub timeout_secs: u64,
}

impl Default for WorkbookConfig {
    fn default() -> Self {
        Self {
            url: "https://example.workbook.dk".to_string(),
            user: "workbook-user".to_string(),
            password: "workbook-password".to_string(),
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for WorkbookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkbookConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl WorkbookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Jobs with a status id in this list are reported.
    pub active_job_status_ids: Vec<i64>,
    /// Companies to report on. Empty means all.
    pub company_ids: Vec<CompanyId>,
    /// Finance account types to report on. Empty means all.
    pub finance_account_type_ids: Vec<i64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            active_job_status_ids: vec![0, 1],
            company_ids: Vec::new(),
            finance_account_type_ids: Vec::new(),
        }
    }
}

/// Histogram bucket boundaries per metric family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub job_age_days: Vec<f64>,
    pub customer_age_days: Vec<f64>,
    pub days_employed: Vec<f64>,
    pub profit_ratio: Vec<f64>,
    pub hours_sale: Vec<f64>,
    pub hours_cost: Vec<f64>,
    /// Creditor and debtor amounts.
    pub balance: Vec<f64>,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            job_age_days: vec![30.0, 60.0, 180.0, 365.0],
            customer_age_days: vec![30.0, 90.0, 180.0, 365.0, 730.0],
            // 3 months, 5 months, 2y9m, 5y8m, 8y7m in 30-day months.
            days_employed: vec![90.0, 150.0, 1005.0, 2040.0, 3090.0],
            profit_ratio: vec![0.2, 0.4, 0.6, 0.8],
            hours_sale: vec![500.0, 1000.0, 1500.0, 2000.0],
            hours_cost: vec![250.0, 500.0, 750.0, 1000.0],
            balance: vec![-50000.0, -25000.0, -10000.0, 0.0, 10000.0, 25000.0, 50000.0],
        }
    }
}

impl BucketConfig {
    fn named(&self) -> [(&'static str, &[f64]); 7] {
        [
            ("job_age_days", &self.job_age_days),
            ("customer_age_days", &self.customer_age_days),
            ("days_employed", &self.days_employed),
            ("profit_ratio", &self.profit_ratio),
            ("hours_sale", &self.hours_sale),
            ("hours_cost", &self.hours_cost),
            ("balance", &self.balance),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeEntryConfig {
    /// Length of the trailing window time registrations are summed over.
    pub window_days: u32,
}

impl Default for TimeEntryConfig {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    /// Declared reporting currency. Amounts stay in each company's own
    /// currency unless conversion is enabled.
    pub reporting_currency_id: Option<CurrencyId>,
    pub conversion: ConversionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub enabled: bool,
    /// ISO code amounts are converted into. Falls back to the reporting
    /// currency when unset.
    pub target: Option<String>,
    /// ISO code → multiplier into `target`.
    pub rates: BTreeMap<String, f64>,
}

impl ExporterConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ExporterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workbook.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if self.workbook.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.time_entries.window_days == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        for (name, boundaries) in self.buckets.named() {
            validate_boundaries(name, boundaries)?;
        }
        let currency = &self.currency;
        let explicit = currency.conversion.target.as_deref().is_some_and(|t| !t.is_empty());
        if currency.conversion.enabled && !explicit && currency.reporting_currency_id.is_none() {
            return Err(ConfigError::MissingConversionTarget);
        }
        Ok(())
    }
}

fn validate_boundaries(name: &'static str, boundaries: &[f64]) -> Result<(), ConfigError> {
    if boundaries.is_empty() {
        return Err(ConfigError::EmptyBuckets { name });
    }
    let mut seen = HashSet::new();
    for &value in boundaries {
        if !value.is_finite() {
            return Err(ConfigError::NonFiniteBoundary { name, value });
        }
        // -0.0 and 0.0 are the same boundary.
        let bits = if value == 0.0 { 0u64 } else { value.to_bits() };
        if !seen.insert(bits) {
            return Err(ConfigError::DuplicateBoundary { name, value });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ExporterConfig::from_toml_str("").unwrap();
        assert_eq!(config, ExporterConfig::default());
        assert_eq!(config.filters.active_job_status_ids, vec![0, 1]);
        assert_eq!(config.server.listen, "0.0.0.0:8000");
        assert!(!config.currency.conversion.enabled);
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
[workbook]
url = "https://acme.workbook.net"
timeout_secs = 5

[filters]
company_ids = [1, 3]

[buckets]
job_age_days = [7, 14]

[currency.conversion]
enabled = true
target = "EUR"
rates = { DKK = 0.134, SEK = 0.087 }
"#;
        let config = ExporterConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.workbook.url, "https://acme.workbook.net");
        assert_eq!(config.workbook.user, "workbook-user");
        assert_eq!(config.workbook.timeout(), Duration::from_secs(5));
        assert_eq!(config.filters.company_ids, vec![1, 3]);
        assert_eq!(config.buckets.job_age_days, vec![7.0, 14.0]);
        assert_eq!(config.buckets.profit_ratio, vec![0.2, 0.4, 0.6, 0.8]);
        assert_eq!(config.currency.conversion.rates.get("DKK"), Some(&0.134));
    }

    #[test]
    fn duplicate_boundaries_rejected() {
        let mut config = ExporterConfig::default();
        config.buckets.balance = vec![0.0, 10.0, -0.0];
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateBoundary { name: "balance", value: -0.0 })
        );
    }

    #[test]
    fn non_finite_boundary_rejected() {
        let mut config = ExporterConfig::default();
        config.buckets.hours_cost = vec![1.0, f64::INFINITY];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFiniteBoundary { name: "hours_cost", .. })
        ));
    }

    #[test]
    fn empty_buckets_rejected() {
        let mut config = ExporterConfig::default();
        config.buckets.profit_ratio.clear();
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyBuckets { name: "profit_ratio" })
        );
    }

    #[test]
    fn zero_window_rejected() {
        let mut config = ExporterConfig::default();
        config.time_entries.window_days = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroWindow));
    }

    #[test]
    fn conversion_without_target_rejected() {
        let mut config = ExporterConfig::default();
        config.currency.conversion.enabled = true;
        assert_eq!(config.validate(), Err(ConfigError::MissingConversionTarget));

        config.currency.reporting_currency_id = Some(1);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn debug_redacts_password() {
        let config = WorkbookConfig {
            password: "hunter2".to_string(),
            ..WorkbookConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ExporterConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("[buckets]"));
        assert_eq!(ExporterConfig::from_toml_str(&toml_str).unwrap(), config);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exporter.toml");
        std::fs::write(&path, "[time_entries]\nwindow_days = 14\n").unwrap();
        let config = ExporterConfig::from_file(&path).unwrap();
        assert_eq!(config.time_entries.window_days, 14);
    }
}
