//! Optional currency conversion of amount gauges.
//!
//! Runs after aggregation. Gauge samples carrying a `currency` label are
//! multiplied into the target currency and relabelled; samples that end up
//! with identical labels are summed. Histograms keep their native currency,
//! since bucket counts cannot be rescaled after the fact.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use workbook_core::CurrencyConfig;

use crate::family::{GaugeFamily, GaugeSample, MetricFamily};
use crate::index::EntityIndex;

const CURRENCY_LABEL: &str = "currency";

#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyConverter {
    target: String,
    rates: BTreeMap<String, f64>,
}

impl CurrencyConverter {
    pub fn new(target: impl Into<String>, rates: BTreeMap<String, f64>) -> Self {
        Self {
            target: target.into(),
            rates,
        }
    }

    /// Converter for an enabled `[currency.conversion]` section.
    ///
    /// The target is the configured ISO code, or the reporting currency's code
    /// when none is given. Returns `None` when conversion is disabled or the
    /// target cannot be determined.
    pub fn from_config(config: &CurrencyConfig, index: &EntityIndex) -> Option<Self> {
        let conversion = &config.conversion;
        if !conversion.enabled {
            return None;
        }
        let target = conversion
            .target
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| {
                config
                    .reporting_currency_id
                    .and_then(|id| index.currency_code(id))
                    .map(str::to_string)
            });
        match target {
            Some(target) => Some(Self::new(target, conversion.rates.clone())),
            None => {
                warn!(
                    reporting_currency_id = ?config.reporting_currency_id,
                    "conversion target unresolved, amounts stay in native currency"
                );
                None
            }
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn rate(&self, currency: &str) -> Option<f64> {
        if currency == self.target {
            Some(1.0)
        } else {
            self.rates.get(currency).copied()
        }
    }

    /// Convert every currency-labelled gauge family in place.
    pub fn apply(&self, families: &mut [MetricFamily]) {
        for family in families {
            if let MetricFamily::Gauge(gauge) = family {
                self.convert_gauge(gauge);
            }
        }
    }

    fn convert_gauge(&self, gauge: &mut GaugeFamily) {
        let Some(slot) = gauge.label_index(CURRENCY_LABEL) else {
            return;
        };

        let mut merged: Vec<GaugeSample> = Vec::with_capacity(gauge.samples.len());
        for mut sample in gauge.samples.drain(..) {
            let currency = &sample.label_values[slot];
            match self.rate(currency) {
                Some(rate) => {
                    sample.value *= rate;
                    sample.label_values[slot] = self.target.clone();
                }
                None => {
                    warn!(
                        metric = %gauge.name,
                        currency = %currency,
                        "no conversion rate, keeping native currency"
                    );
                }
            }
            match merged.iter_mut().find(|s| s.label_values == sample.label_values) {
                Some(existing) => existing.value += sample.value,
                None => merged.push(sample),
            }
        }
        debug!(metric = %gauge.name, samples = merged.len(), target = %self.target, "converted");
        gauge.samples = merged;
    }
}
