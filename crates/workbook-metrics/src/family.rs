//! Typed metric families handed to the exposition layer.

use crate::histogram::Histogram;

/// Static description of a metric: name, help text and label names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricFamily {
    Gauge(GaugeFamily),
    Histogram(HistogramFamily),
}

impl MetricFamily {
    pub fn name(&self) -> &str {
        match self {
            MetricFamily::Gauge(g) => &g.name,
            MetricFamily::Histogram(h) => &h.name,
        }
    }

    pub fn as_gauge(&self) -> Option<&GaugeFamily> {
        match self {
            MetricFamily::Gauge(g) => Some(g),
            MetricFamily::Histogram(_) => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&HistogramFamily> {
        match self {
            MetricFamily::Histogram(h) => Some(h),
            MetricFamily::Gauge(_) => None,
        }
    }
}

impl From<GaugeFamily> for MetricFamily {
    fn from(g: GaugeFamily) -> Self {
        MetricFamily::Gauge(g)
    }
}

impl From<HistogramFamily> for MetricFamily {
    fn from(h: HistogramFamily) -> Self {
        MetricFamily::Histogram(h)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSample {
    pub label_values: Vec<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaugeFamily {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub samples: Vec<GaugeSample>,
}

impl GaugeFamily {
    pub fn new(desc: &MetricDesc) -> Self {
        Self {
            name: desc.name.to_string(),
            help: desc.help.to_string(),
            label_names: desc.labels.iter().map(|l| l.to_string()).collect(),
            samples: Vec::new(),
        }
    }

    pub fn add(&mut self, label_values: Vec<String>, value: f64) {
        debug_assert_eq!(label_values.len(), self.label_names.len());
        self.samples.push(GaugeSample {
            label_values,
            value,
        });
    }

    /// Single unlabelled sample.
    pub fn single(desc: &MetricDesc, value: f64) -> Self {
        let mut g = Self::new(desc);
        g.add(Vec::new(), value);
        g
    }

    /// Value of the sample whose labels equal `label_values`.
    pub fn value(&self, label_values: &[&str]) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.label_values.iter().map(String::as_str).eq(label_values.iter().copied()))
            .map(|s| s.value)
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.label_names.iter().position(|l| l == label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSample {
    pub label_values: Vec<String>,
    pub buckets: Vec<(String, u64)>,
    pub sum: f64,
}

impl HistogramSample {
    pub fn count(&self) -> u64 {
        self.buckets.last().map(|(_, c)| *c).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramFamily {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub samples: Vec<HistogramSample>,
}

impl HistogramFamily {
    pub fn new(desc: &MetricDesc) -> Self {
        Self {
            name: desc.name.to_string(),
            help: desc.help.to_string(),
            label_names: desc.labels.iter().map(|l| l.to_string()).collect(),
            samples: Vec::new(),
        }
    }

    pub fn add(&mut self, label_values: Vec<String>, histogram: Histogram) {
        debug_assert_eq!(label_values.len(), self.label_names.len());
        self.samples.push(HistogramSample {
            label_values,
            buckets: histogram.buckets,
            sum: histogram.sum,
        });
    }

    pub fn sample(&self, label_values: &[&str]) -> Option<&HistogramSample> {
        self.samples
            .iter()
            .find(|s| s.label_values.iter().map(String::as_str).eq(label_values.iter().copied()))
    }
}
