//! Prometheus text exposition format.
//!
//! Renders metric families into the text format (version 0.0.4) for
//! scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use crate::family::{GaugeFamily, HistogramFamily, MetricFamily};

/// Content type of [`render_prometheus`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render a list of metric families into Prometheus text format.
///
/// Every family gets its `# HELP` and `# TYPE` lines, even without samples.
pub fn render_prometheus(families: &[MetricFamily]) -> String {
    let mut out = String::new();
    for family in families {
        match family {
            MetricFamily::Gauge(g) => render_gauge(&mut out, g),
            MetricFamily::Histogram(h) => render_histogram(&mut out, h),
        }
    }
    out
}

fn render_gauge(out: &mut String, family: &GaugeFamily) {
    header(out, &family.name, &family.help, "gauge");
    for sample in &family.samples {
        let labels = label_pairs(&family.label_names, &sample.label_values, None);
        let _ = writeln!(out, "{}{} {}", family.name, labels, format_value(sample.value));
    }
}

fn render_histogram(out: &mut String, family: &HistogramFamily) {
    header(out, &family.name, &family.help, "histogram");
    for sample in &family.samples {
        for (le, count) in &sample.buckets {
            let labels = label_pairs(&family.label_names, &sample.label_values, Some(le.as_str()));
            let _ = writeln!(out, "{}_bucket{} {}", family.name, labels, count);
        }
        let labels = label_pairs(&family.label_names, &sample.label_values, None);
        let _ = writeln!(out, "{}_sum{} {}", family.name, labels, format_value(sample.sum));
        let _ = writeln!(out, "{}_count{} {}", family.name, labels, sample.count());
    }
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, escape_help(help));
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

/// `{a="1",b="2"}`, with an optional trailing `le` label; empty when there
/// are no labels at all.
fn label_pairs(names: &[String], values: &[String], le: Option<&str>) -> String {
    let mut pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(n, v)| format!("{}=\"{}\"", n, escape_label_value(v)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{value}")
    }
}
