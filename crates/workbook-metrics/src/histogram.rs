//! Cumulative bucket histogram builder.
//!
//! One pure function shared by every histogram-shaped metric family. Counts
//! follow Prometheus conventions: each bucket counts every observation less
//! than or equal to its boundary, and a final `+Inf` bucket counts them all.

/// Label of the implicit last bucket.
pub const INF_LABEL: &str = "+Inf";

/// Cumulative bucket counts and observation sum for one label set.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// `(boundary label, cumulative count)`, ascending, ending in `+Inf`.
    pub buckets: Vec<(String, u64)>,
    pub sum: f64,
}

impl Histogram {
    /// Number of counted observations (the `+Inf` bucket).
    pub fn count(&self) -> u64 {
        self.buckets.last().map(|(_, c)| *c).unwrap_or(0)
    }
}

/// Build cumulative bucket counts for `observations`.
///
/// `boundaries` may be in any order; they are sorted here and a `+Inf`
/// boundary is appended unless already present. The caller supplies distinct
/// values. NaN observations are neither counted nor summed.
pub fn build_histogram(observations: &[f64], boundaries: &[f64]) -> Histogram {
    let mut bounds: Vec<f64> = boundaries.iter().copied().filter(|b| !b.is_nan()).collect();
    bounds.sort_by(f64::total_cmp);
    if bounds.last() != Some(&f64::INFINITY) {
        bounds.push(f64::INFINITY);
    }

    let mut counts = vec![0u64; bounds.len()];
    let mut sum = 0.0;
    for &o in observations {
        if o.is_nan() {
            continue;
        }
        sum += o;
        // Every bucket from the first boundary >= o upwards.
        let first = bounds.partition_point(|b| *b < o);
        for count in &mut counts[first..] {
            *count += 1;
        }
    }

    Histogram {
        buckets: bounds
            .iter()
            .map(|b| boundary_label(*b))
            .zip(counts)
            .collect(),
        sum,
    }
}

/// Shortest string form of a boundary (`30`, `0.2`, `-50000`, `+Inf`).
pub fn boundary_label(boundary: f64) -> String {
    if boundary == f64::INFINITY {
        INF_LABEL.to_string()
    } else if boundary == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{boundary}")
    }
}
