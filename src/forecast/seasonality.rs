//! Fourier-basis periodic components.

use std::f64::consts::PI;

pub const WEEKLY_PERIOD: f64 = 7.0;
pub const YEARLY_PERIOD: f64 = 365.25;

#[derive(Debug, Clone, PartialEq)]
pub struct FourierSeasonality {
    pub period: f64,
    pub order: usize,
    /// `[cos_1, sin_1, cos_2, sin_2, …]`
    pub coefs: Vec<f64>,
}

impl FourierSeasonality {
    pub fn new(period: f64, order: usize) -> Self {
        Self {
            period,
            order,
            coefs: vec![0.0; 2 * order],
        }
    }

    pub fn n_terms(&self) -> usize {
        2 * self.order
    }

    /// Basis row at day offset `day` (days since the first observation).
    pub fn features(&self, day: f64) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.n_terms());
        for k in 1..=self.order {
            let x = 2.0 * PI * k as f64 * day / self.period;
            row.push(x.cos());
            row.push(x.sin());
        }
        row
    }

    /// One column per basis term over the given day offsets.
    pub fn columns(&self, days: &[f64]) -> Vec<Vec<f64>> {
        let mut cols = vec![Vec::with_capacity(days.len()); self.n_terms()];
        for &d in days {
            for (col, v) in cols.iter_mut().zip(self.features(d)) {
                col.push(v);
            }
        }
        cols
    }

    pub fn value_at(&self, day: f64) -> f64 {
        self.features(day).iter().zip(&self.coefs).map(|(x, c)| x * c).sum()
    }
}
