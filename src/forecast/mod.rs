//! Additive trend + seasonality forecaster for the daily sales total.
//!
//! ## Model
//!
//! `y(t) = trend(t) + weekly(t) + yearly(t) + ε`
//!
//! - trend: piecewise linear, changepoints over the first 80% of history,
//!   slope changes ridge-penalised (Gaussian prior, scale 0.05)
//! - weekly: Fourier order 3, period 7 days, once a full week is observed
//! - yearly: Fourier order 10, period 365.25 days, once a year is observed
//!
//! All coefficients come from one penalised least-squares solve, so the
//! seasonal terms are exactly the regression of the de-trended residual on
//! the Fourier basis (and vice versa). There is no iterative optimiser: the
//! fit is three Cholesky solves regardless of the data.
//!
//! ## Uncertainty
//!
//! Residual σ from the historical fit, with one degree of freedom spent per
//! coefficient. A fit without enough spare observations takes σ from the
//! spread around a straight line instead. σ is widened like a regression
//! prediction interval: `z·σ·sqrt(1 + 1/n + (t − t̄)² / Σ(tᵢ − t̄)²)`, which grows
//! steadily once `t` moves past the end of the history.

pub mod numeric;
pub mod seasonality;
pub mod trend;

use crate::error::{PipelineError, Result};
use crate::models::{DailySeries, ForecastPoint};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use self::numeric::{predict, quantile_normal, residual_variance, ridge_fit};
use self::seasonality::{FourierSeasonality, WEEKLY_PERIOD, YEARLY_PERIOD};
use self::trend::{PiecewiseTrend, place_changepoints};

/// Days of history needed before the yearly component is fitted.
const MIN_YEARLY_SPAN_DAYS: f64 = 365.0;
const MIN_VARIANCE: f64 = 1e-10;
/// Spare observations a fit needs before its own residuals set the noise level.
const MIN_RESIDUAL_DOF: usize = 5;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ForecastParams {
    #[serde(default = "default_n_changepoints")]
    pub n_changepoints: usize,

    /// Share of the history (from the start) where changepoints may sit.
    #[serde(default = "default_changepoint_range")]
    pub changepoint_range: f64,

    #[serde(default = "default_changepoint_prior_scale")]
    pub changepoint_prior_scale: f64,

    #[serde(default = "default_seasonality_prior_scale")]
    pub seasonality_prior_scale: f64,

    #[serde(default = "default_weekly_order")]
    pub weekly_order: usize,

    #[serde(default = "default_yearly_order")]
    pub yearly_order: usize,

    /// Coverage of the `[yhat_lower, yhat_upper]` band.
    #[serde(default = "default_interval_width")]
    pub interval_width: f64,
}

fn default_n_changepoints() -> usize {
    25
}
fn default_changepoint_range() -> f64 {
    0.8
}
fn default_changepoint_prior_scale() -> f64 {
    0.05
}
fn default_seasonality_prior_scale() -> f64 {
    10.0
}
fn default_weekly_order() -> usize {
    3
}
fn default_yearly_order() -> usize {
    10
}
fn default_interval_width() -> f64 {
    0.8
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            n_changepoints: default_n_changepoints(),
            changepoint_range: default_changepoint_range(),
            changepoint_prior_scale: default_changepoint_prior_scale(),
            seasonality_prior_scale: default_seasonality_prior_scale(),
            weekly_order: default_weekly_order(),
            yearly_order: default_yearly_order(),
            interval_width: default_interval_width(),
        }
    }
}

/// A fitted model; produces forecasts for any horizon.
#[derive(Debug, Clone)]
pub struct FittedModel {
    start: NaiveDate,
    span_days: f64,
    y_scale: f64,
    trend: PiecewiseTrend,
    weekly: Option<FourierSeasonality>,
    yearly: Option<FourierSeasonality>,
    /// Residual std, in scaled units.
    sigma: f64,
    z: f64,
    n_obs: usize,
    t_mean: f64,
    t_sxx: f64,
    actuals: HashMap<NaiveDate, f64>,
}

fn penalty(variance: f64, prior_scale: f64) -> f64 {
    variance.max(MIN_VARIANCE) / (prior_scale * prior_scale).max(f64::EPSILON)
}

fn solve(columns: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Result<Vec<f64>> {
    ridge_fit(columns, y, penalties)
        .ok_or_else(|| PipelineError::ModelFit("normal equations are not positive definite".into()))
}

fn residuals(columns: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Result<Vec<f64>> {
    let coefs = solve(columns, y, penalties)?;
    let fitted = predict(columns, &coefs, y.len());
    Ok(y.iter().zip(&fitted).map(|(a, b)| a - b).collect())
}

impl FittedModel {
    pub fn fit(series: &DailySeries, params: &ForecastParams) -> Result<Self> {
        let points = series.points();
        let n = series.len();
        if n < 2 {
            return Err(PipelineError::InsufficientData { needed: 2, got: n });
        }

        let start = points[0].0;
        let days: Vec<f64> = points.iter().map(|(d, _)| (*d - start).num_days() as f64).collect();
        let span_days = days[n - 1];
        let t: Vec<f64> = days.iter().map(|d| d / span_days).collect();

        let y_max = points.iter().map(|(_, y)| y.abs()).fold(0.0, f64::max);
        let y_scale = if y_max > 0.0 { y_max } else { 1.0 };
        let y: Vec<f64> = points.iter().map(|(_, v)| v / y_scale).collect();

        let weekly = (span_days + 1.0 >= WEEKLY_PERIOD && params.weekly_order > 0)
            .then(|| FourierSeasonality::new(WEEKLY_PERIOD, params.weekly_order));
        let yearly = (span_days >= MIN_YEARLY_SPAN_DAYS && params.yearly_order > 0)
            .then(|| FourierSeasonality::new(YEARLY_PERIOD, params.yearly_order));

        let mut seasonal_cols = Vec::new();
        for s in weekly.iter().chain(yearly.iter()) {
            seasonal_cols.extend(s.columns(&days));
        }
        let n_seasonal = seasonal_cols.len();

        // Spread around a plain line stands in for any fit with too few
        // spare observations to measure its own noise.
        let line_cols = PiecewiseTrend::columns(&t, &[]);
        let line_resid = residuals(&line_cols, &y, &[0.0, 0.0])?;
        let line_variance = residual_variance(&line_resid, line_cols.len(), 1).unwrap_or(0.0);

        // Noise level from a straight line + seasonality; sets both priors.
        let mut base_cols = line_cols;
        base_cols.extend(seasonal_cols.iter().cloned());
        let base_resid = residuals(&base_cols, &y, &vec![0.0; base_cols.len()])?;
        let noise = residual_variance(&base_resid, base_cols.len(), MIN_RESIDUAL_DOF).unwrap_or(line_variance);

        let changepoints = place_changepoints(&t, params.n_changepoints, params.changepoint_range);
        let n_trend = 2 + changepoints.len();

        let mut columns = PiecewiseTrend::columns(&t, &changepoints);
        columns.extend(seasonal_cols);

        let mut penalties = vec![0.0, 0.0];
        penalties.extend(std::iter::repeat_n(
            penalty(noise, params.changepoint_prior_scale),
            changepoints.len(),
        ));
        penalties.extend(std::iter::repeat_n(
            penalty(noise, params.seasonality_prior_scale),
            n_seasonal,
        ));

        let coefs = solve(&columns, &y, &penalties)?;
        let fitted = predict(&columns, &coefs, n);
        let resid: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| a - b).collect();
        let sigma = residual_variance(&resid, columns.len(), MIN_RESIDUAL_DOF)
            .unwrap_or(line_variance)
            .sqrt();

        let trend = PiecewiseTrend::from_coefs(&coefs[..n_trend], &changepoints);
        let mut rest = &coefs[n_trend..];
        let weekly = weekly.map(|mut s| {
            let (mine, tail) = rest.split_at(s.n_terms());
            s.coefs = mine.to_vec();
            rest = tail;
            s
        });
        let yearly = yearly.map(|mut s| {
            s.coefs = rest[..s.n_terms()].to_vec();
            s
        });

        let t_mean = t.iter().sum::<f64>() / n as f64;
        let t_sxx: f64 = t.iter().map(|ti| (ti - t_mean).powi(2)).sum();
        let width = params.interval_width.clamp(0.01, 0.999);
        let z = quantile_normal(0.5 + width / 2.0);

        debug!(
            "forecast fit: {} obs over {} days | {} changepoints | weekly={} yearly={} | σ={:.2}",
            n,
            span_days,
            changepoints.len(),
            weekly.is_some(),
            yearly.is_some(),
            sigma * y_scale
        );

        Ok(Self {
            start,
            span_days,
            y_scale,
            trend,
            weekly,
            yearly,
            sigma,
            z,
            n_obs: n,
            t_mean,
            t_sxx,
            actuals: points.iter().copied().collect(),
        })
    }

    /// Residual standard deviation of the historical fit, in sales units.
    pub fn residual_std(&self) -> f64 {
        self.sigma * self.y_scale
    }

    /// Trend slope after the last changepoint, in sales per day.
    pub fn daily_slope(&self) -> f64 {
        self.trend.final_slope() * self.y_scale / self.span_days
    }

    fn half_width(&self, t: f64) -> f64 {
        let leverage = 1.0 + 1.0 / self.n_obs as f64 + (t - self.t_mean).powi(2) / self.t_sxx;
        self.z * self.sigma * leverage.sqrt() * self.y_scale
    }

    fn point(&self, day: f64, date: NaiveDate) -> ForecastPoint {
        let t = day / self.span_days;
        let trend = self.trend.value_at(t) * self.y_scale;
        let weekly = self.weekly.as_ref().map_or(0.0, |s| s.value_at(day)) * self.y_scale;
        let yearly = self.yearly.as_ref().map_or(0.0, |s| s.value_at(day)) * self.y_scale;
        let yhat = trend + weekly + yearly;
        let half = self.half_width(t);

        ForecastPoint {
            date,
            trend,
            seasonal_weekly: weekly,
            seasonal_yearly: yearly,
            yhat,
            yhat_lower: yhat - half,
            yhat_upper: yhat + half,
            actual: self.actuals.get(&date).copied(),
        }
    }

    /// Every calendar day from the first observation through
    /// `horizon_days` past the last one.
    pub fn predict(&self, horizon_days: u32) -> Result<Vec<ForecastPoint>> {
        let total = self.span_days as u64 + u64::from(horizon_days);
        self.start
            .checked_add_days(Days::new(total))
            .ok_or(PipelineError::InvalidHorizon(horizon_days))?;

        let points = (0..=total)
            .filter_map(|d| {
                let date = self.start.checked_add_days(Days::new(d))?;
                Some(self.point(d as f64, date))
            })
            .collect();
        Ok(points)
    }
}

pub fn fit_and_forecast_with(
    series: &DailySeries,
    horizon_days: u32,
    params: &ForecastParams,
) -> Result<Vec<ForecastPoint>> {
    FittedModel::fit(series, params)?.predict(horizon_days)
}

#[cfg(test)]
pub fn fit_and_forecast(series: &DailySeries, horizon_days: u32) -> Result<Vec<ForecastPoint>> {
    fit_and_forecast_with(series, horizon_days, &ForecastParams::default())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series_from(start: NaiveDate, values: impl IntoIterator<Item = f64>) -> DailySeries {
        DailySeries::from_pairs(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (start + Days::new(i as u64), v)),
        )
    }

    /// Deterministic pseudo-noise in [-1, 1].
    fn wobble(i: usize) -> f64 {
        ((i as f64 * 12.9898).sin() * 43_758.545).rem_euclid(1.0) * 2.0 - 1.0
    }

    // Monday-based weekly shape, zero mean.
    const WEEK: [f64; 7] = [50.0, 20.0, 0.0, -10.0, 30.0, 120.0, -210.0];

    fn realistic(days: usize) -> DailySeries {
        let start = date(2013, 1, 1);
        series_from(
            start,
            (0..days).map(|i| {
                let dow = (start + Days::new(i as u64)).weekday().num_days_from_monday() as usize;
                let yearly = 300.0 * (2.0 * std::f64::consts::PI * i as f64 / 365.25).sin();
                5_000.0 + 1.5 * i as f64 + WEEK[dow] * 4.0 + yearly + 80.0 * wobble(i)
            }),
        )
    }

    #[test]
    fn test_two_years_plus_ninety_days() {
        let forecast = fit_and_forecast(&realistic(730), 90).unwrap();
        assert_eq!(forecast.len(), 820);
        assert!(forecast.windows(2).all(|w| (w[1].date - w[0].date).num_days() == 1));
        assert_eq!(forecast[0].date, date(2013, 1, 1));
    }

    #[test]
    fn test_zero_horizon_matches_input_dates() {
        let values = [100.0, 120.0, 90.0, 130.0, 110.0, 140.0, 115.0];
        let series = series_from(date(2015, 6, 1), values);
        let forecast = fit_and_forecast(&series, 0).unwrap();
        assert_eq!(forecast.len(), 7);
        for (p, (d, y)) in forecast.iter().zip(series.points()) {
            assert_eq!(p.date, *d);
            assert_eq!(p.actual, Some(*y));
        }
    }

    #[test]
    fn test_single_point_is_insufficient() {
        let series = series_from(date(2015, 1, 1), [42.0]);
        let err = fit_and_forecast(&series, 90).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { needed: 2, got: 1 }));

        let err = fit_and_forecast(&DailySeries::default(), 10).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { got: 0, .. }));
    }

    #[test]
    fn test_two_points_extrapolate_line() {
        let series = series_from(date(2015, 1, 1), [100.0, 110.0]);
        let forecast = fit_and_forecast(&series, 3).unwrap();
        assert_eq!(forecast.len(), 5);
        assert!((forecast[4].yhat - 140.0).abs() < 0.5);
        assert!(forecast.iter().all(|p| p.seasonal() == 0.0));
    }

    #[test]
    fn test_recovers_linear_trend_and_weekly_shape() {
        let start = date(2015, 1, 5); // Monday
        let series = series_from(
            start,
            (0..70).map(|i| 1_000.0 + 10.0 * i as f64 + WEEK[i % 7]),
        );
        let model = FittedModel::fit(&series, &ForecastParams::default()).unwrap();
        let forecast = model.predict(14).unwrap();
        assert!((model.daily_slope() - 10.0).abs() < 1.5, "slope {}", model.daily_slope());

        for (i, p) in forecast.iter().enumerate() {
            let truth = 1_000.0 + 10.0 * i as f64 + WEEK[i % 7];
            assert!((p.yhat - truth).abs() < 0.01 * truth, "day {i}: {} vs {truth}", p.yhat);
        }

        // Saturday carries the weekly peak, Sunday the trough.
        let week = &forecast[70..77];
        let peak = week.iter().max_by(|a, b| a.seasonal_weekly.total_cmp(&b.seasonal_weekly)).unwrap();
        let trough = week.iter().min_by(|a, b| a.seasonal_weekly.total_cmp(&b.seasonal_weekly)).unwrap();
        assert_eq!(peak.date.weekday(), chrono::Weekday::Sat);
        assert_eq!(trough.date.weekday(), chrono::Weekday::Sun);
    }

    #[test]
    fn test_trend_follows_a_kink() {
        // Flat for 100 days, then rising 5/day.
        let series = series_from(
            date(2014, 1, 1),
            (0..200).map(|i| 2_000.0 + 5.0 * (i as f64 - 100.0).max(0.0)),
        );
        let forecast = fit_and_forecast(&series, 30).unwrap();
        assert!((forecast[50].trend - 2_000.0).abs() < 40.0);
        let step = forecast[229].trend - forecast[228].trend;
        assert!((step - 5.0).abs() < 0.5, "final daily slope {step}");
    }

    #[test]
    fn test_band_contains_yhat_and_widens_forward() {
        let forecast = fit_and_forecast(&realistic(400), 60).unwrap();
        let history = &forecast[..400];
        let inside = history
            .iter()
            .filter(|p| p.yhat_lower <= p.yhat && p.yhat <= p.yhat_upper)
            .count();
        assert!(inside as f64 >= 0.7 * history.len() as f64);

        let future = &forecast[400..];
        let widths: Vec<f64> = future.iter().map(|p| p.yhat_upper - p.yhat_lower).collect();
        assert!(widths.windows(2).all(|w| w[1] > w[0]));
        assert!(widths[0] > 0.0);

        for p in &forecast {
            assert!(((p.yhat_upper - p.yhat) - (p.yhat - p.yhat_lower)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sparse_history_keeps_a_real_band() {
        // Four observations over two years: more coefficients than points.
        let series = DailySeries::from_pairs(vec![
            (date(2013, 1, 1), 5_000.0),
            (date(2013, 9, 1), 6_200.0),
            (date(2014, 5, 1), 5_400.0),
            (date(2014, 12, 31), 6_800.0),
        ]);
        let model = FittedModel::fit(&series, &ForecastParams::default()).unwrap();
        assert!(model.residual_std() > 100.0, "σ {}", model.residual_std());

        let forecast = model.predict(30).unwrap();
        let last = forecast.last().unwrap();
        assert!(last.yhat_upper - last.yhat_lower > 200.0);
    }

    #[test]
    fn test_actuals_mostly_inside_band() {
        let series = realistic(730);
        let params = ForecastParams {
            interval_width: 0.95,
            ..Default::default()
        };
        let forecast = fit_and_forecast_with(&series, 0, &params).unwrap();
        let inside = forecast
            .iter()
            .filter_map(|p| p.actual.map(|y| (p, y)))
            .filter(|(p, y)| p.yhat_lower <= *y && *y <= p.yhat_upper)
            .count();
        assert!(inside as f64 >= 0.7 * series.len() as f64, "{inside} inside");
    }

    #[test]
    fn test_yearly_only_with_a_year_of_history() {
        let short = fit_and_forecast(&realistic(200), 10).unwrap();
        assert!(short.iter().all(|p| p.seasonal_yearly == 0.0));

        let long = fit_and_forecast(&realistic(730), 10).unwrap();
        assert!(long.iter().any(|p| p.seasonal_yearly.abs() > 1.0));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let series = realistic(500);
        let a = fit_and_forecast(&series, 30).unwrap();
        let b = fit_and_forecast(&series, 30).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_gaps_are_filled_with_model_values() {
        let series = DailySeries::from_pairs(vec![
            (date(2015, 3, 1), 100.0),
            (date(2015, 3, 2), 102.0),
            (date(2015, 3, 4), 106.0),
        ]);
        let forecast = fit_and_forecast(&series, 1).unwrap();
        assert_eq!(forecast.len(), 5);
        assert_eq!(forecast[2].date, date(2015, 3, 3));
        assert_eq!(forecast[2].actual, None);
        assert!((forecast[2].yhat - 104.0).abs() < 1.0);
    }
}
