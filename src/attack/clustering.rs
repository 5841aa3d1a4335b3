//! One-dimensional 2-means clustering.

const MAX_ITERATIONS: usize = 100;
const MIN_SPREAD: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct TwoMeans {
    pub low_centroid: f64,
    pub high_centroid: f64,
    /// `true` for values assigned to the high cluster, in input order
    pub is_high: Vec<bool>,
}

/// Split `values` into a low and a high cluster with Lloyd's algorithm.
///
/// Centroids start at the minimum and maximum, which makes the result
/// deterministic. Returns `None` for fewer than two values, non-finite
/// values, or values without spread.
pub fn two_means(values: &[f64]) -> Option<TwoMeans> {
    if values.len() < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max - min <= MIN_SPREAD {
        return None;
    }

    let (mut low, mut high) = (min, max);
    let mut is_high: Vec<bool> = values.iter().map(|&v| (v - high).abs() < (v - low).abs()).collect();

    for _ in 0..MAX_ITERATIONS {
        let (mut low_sum, mut low_n, mut high_sum, mut high_n) = (0.0, 0usize, 0.0, 0usize);
        for (&v, &h) in values.iter().zip(&is_high) {
            if h {
                high_sum += v;
                high_n += 1;
            } else {
                low_sum += v;
                low_n += 1;
            }
        }
        if low_n > 0 {
            low = low_sum / low_n as f64;
        }
        if high_n > 0 {
            high = high_sum / high_n as f64;
        }

        let next: Vec<bool> = values.iter().map(|&v| (v - high).abs() < (v - low).abs()).collect();
        if next == is_high {
            break;
        }
        is_high = next;
    }

    Some(TwoMeans {
        low_centroid: low,
        high_centroid: high,
        is_high,
    })
}
