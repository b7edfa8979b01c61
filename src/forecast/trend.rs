//! Piecewise-linear trend.
//!
//! `trend(t) = m + k·t + Σ δ_j · max(t − s_j, 0)` with `t` scaled to [0, 1]
//! over the history. Past the last observation the final segment simply
//! continues, which is the linear extrapolation used for the horizon.

#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseTrend {
    pub offset: f64,
    pub slope: f64,
    pub changepoints: Vec<f64>,
    pub deltas: Vec<f64>,
}

/// Changepoint locations: evenly spaced observation times within the first
/// `range` share of the history, excluding the very first point.
pub fn place_changepoints(t: &[f64], max_changepoints: usize, range: f64) -> Vec<f64> {
    let n = t.len();
    let window = ((n as f64) * range.clamp(0.0, 1.0)).floor() as usize;
    let count = max_changepoints.min(window.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }

    let last = (window - 1) as f64;
    let mut cps: Vec<f64> = (1..=count)
        .map(|i| {
            let idx = (last * i as f64 / count as f64).round() as usize;
            t[idx.min(n - 1)]
        })
        .collect();
    cps.dedup();
    cps
}

fn hinge(t: f64, s: f64) -> f64 {
    (t - s).max(0.0)
}

impl PiecewiseTrend {
    /// Design columns `[1, t, hinge(t, s_1), …]`; coefficients come back in
    /// the same order for `from_coefs`.
    pub fn columns(t: &[f64], changepoints: &[f64]) -> Vec<Vec<f64>> {
        let mut cols = Vec::with_capacity(2 + changepoints.len());
        cols.push(vec![1.0; t.len()]);
        cols.push(t.to_vec());
        for &s in changepoints {
            cols.push(t.iter().map(|&ti| hinge(ti, s)).collect());
        }
        cols
    }

    pub fn from_coefs(coefs: &[f64], changepoints: &[f64]) -> Self {
        Self {
            offset: coefs[0],
            slope: coefs[1],
            changepoints: changepoints.to_vec(),
            deltas: coefs[2..2 + changepoints.len()].to_vec(),
        }
    }

    pub fn value_at(&self, t: f64) -> f64 {
        let bends: f64 = self
            .changepoints
            .iter()
            .zip(&self.deltas)
            .map(|(&s, d)| d * hinge(t, s))
            .sum();
        self.offset + self.slope * t + bends
    }

    /// Slope of the last segment, used beyond the history.
    pub fn final_slope(&self) -> f64 {
        self.slope + self.deltas.iter().sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }

    #[test]
    fn test_changepoints_inside_range() {
        let t = grid(100);
        let cps = place_changepoints(&t, 25, 0.8);
        assert_eq!(cps.len(), 25);
        assert!(cps.iter().all(|&s| s > 0.0 && s <= 0.8));
        assert!(cps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_changepoints_capped_by_history() {
        assert!(place_changepoints(&grid(2), 25, 0.8).is_empty());
        assert_eq!(place_changepoints(&grid(10), 25, 0.8).len(), 7);
    }

    #[test]
    fn test_value_continues_last_segment() {
        let trend = PiecewiseTrend::from_coefs(&[1.0, 2.0, -1.0, 0.5], &[0.25, 0.5]);
        assert!((trend.value_at(0.0) - 1.0).abs() < 1e-12);
        assert!((trend.value_at(0.5) - (1.0 + 1.0 - 0.25)).abs() < 1e-12);
        assert!((trend.final_slope() - 1.5).abs() < 1e-12);
        let step = trend.value_at(2.0) - trend.value_at(1.0);
        assert!((step - trend.final_slope()).abs() < 1e-12);
    }

    #[test]
    fn test_columns_layout() {
        let cols = PiecewiseTrend::columns(&[0.0, 0.5, 1.0], &[0.5]);
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0], vec![1.0, 1.0, 1.0]);
        assert_eq!(cols[2], vec![0.0, 0.0, 0.5]);
    }
}
