//! Additive Holt-Winters (triple exponential smoothing).

use crate::error::{PipelineError, Result};
use crate::models::stats;
use itertools::iproduct;

const GRID_MIN: f64 = 0.05;
const GRID_MAX: f64 = 0.95;
const GRID_STEP: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

/// Fitted model state after the last training observation.
#[derive(Debug, Clone)]
pub struct HoltWinters {
    pub params: SmoothingParams,
    pub period: usize,
    pub sse: f64,
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
    observations: usize,
}

struct InitialState {
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
}

/// Level sits on the first season's trend line one step before the first
/// observation, so the first one-step forecast is `level + trend + s[0]`.
fn initial_state(series: &[f64], period: usize) -> Option<InitialState> {
    let first = &series[..period];
    let season_mean = stats::mean(first)?;
    let trend = if series.len() >= 2 * period {
        (0..period)
            .map(|i| (series[period + i] - series[i]) / period as f64)
            .sum::<f64>()
            / period as f64
    } else {
        0.0
    };
    let centre = (period as f64 - 1.0) / 2.0;
    let level = season_mean - trend * (centre + 1.0);
    let seasonals = first
        .iter()
        .enumerate()
        .map(|(i, v)| v - (season_mean + trend * (i as f64 - centre)))
        .collect();
    Some(InitialState {
        level,
        trend,
        seasonals,
    })
}

/// Run the smoothing recursions, returning the one-step SSE and final state.
fn smooth(series: &[f64], period: usize, params: SmoothingParams, init: &InitialState) -> (f64, f64, f64, Vec<f64>) {
    let SmoothingParams { alpha, beta, gamma } = params;
    let mut level = init.level;
    let mut trend = init.trend;
    let mut seasonals = init.seasonals.clone();
    let mut sse = 0.0;

    for (t, y) in series.iter().enumerate() {
        let slot = t % period;
        let season = seasonals[slot];
        sse += (y - (level + trend + season)).powi(2);

        let next_level = alpha * (y - season) + (1.0 - alpha) * (level + trend);
        trend = beta * (next_level - level) + (1.0 - beta) * trend;
        seasonals[slot] = gamma * (y - next_level) + (1.0 - gamma) * season;
        level = next_level;
    }
    (sse, level, trend, seasonals)
}

fn grid() -> Vec<f64> {
    let steps = ((GRID_MAX - GRID_MIN) / GRID_STEP).round() as usize;
    (0..=steps).map(|i| GRID_MIN + i as f64 * GRID_STEP).collect()
}

impl HoltWinters {
    /// Fit on `series`, choosing α, β and γ by grid search on one-step SSE.
    pub fn fit(series: &[f64], period: usize) -> Result<Self> {
        if period == 0 {
            return Err(PipelineError::model_fit("holt_winters", "seasonal period must be positive"));
        }
        if series.len() < period {
            return Err(PipelineError::model_fit(
                "holt_winters",
                format!(
                    "training series of {} points is shorter than one season of {}",
                    series.len(),
                    period
                ),
            ));
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::model_fit("holt_winters", "non-finite training value"));
        }

        let init = initial_state(series, period)
            .ok_or_else(|| PipelineError::model_fit("holt_winters", "empty first season"))?;

        let values = grid();
        let mut best: Option<(f64, SmoothingParams)> = None;
        for (&alpha, &beta, &gamma) in iproduct!(&values, &values, &values) {
            let params = SmoothingParams { alpha, beta, gamma };
            let (sse, ..) = smooth(series, period, params, &init);
            if sse.is_finite() && best.map_or(true, |(b, _)| sse < b) {
                best = Some((sse, params));
            }
        }
        let (sse, params) =
            best.ok_or_else(|| PipelineError::model_fit("holt_winters", "no finite fit in grid"))?;

        let (_, level, trend, seasonals) = smooth(series, period, params, &init);
        Ok(Self {
            params,
            period,
            sse,
            level,
            trend,
            seasonals,
            observations: series.len(),
        })
    }

    /// Point forecasts for the next `horizon` steps.
    pub fn forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        let out: Vec<f64> = (1..=horizon)
            .map(|h| {
                let slot = (self.observations + h - 1) % self.period;
                self.level + h as f64 * self.trend + self.seasonals[slot]
            })
            .collect();
        if out.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::model_fit("holt_winters", "non-finite forecast"));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seasonal_series(n: usize) -> Vec<f64> {
        let pattern = [5.0, 3.0, 0.0, -2.0, -4.0, -5.0, -3.0, 0.0, 2.0, 4.0, 6.0, 4.0];
        (0..n).map(|t| 100.0 + 2.0 * t as f64 + pattern[t % 12]).collect()
    }

    #[test]
    fn test_grid_bounds() {
        let g = grid();
        assert_eq!(g.len(), 19);
        assert!((g[0] - 0.05).abs() < 1e-12);
        assert!((g[18] - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_tracks_trend_and_season() {
        let series = seasonal_series(36);
        let model = HoltWinters::fit(&series, 12).unwrap();
        let forecast = model.forecast(12).unwrap();
        let expected = seasonal_series(48);
        for (f, e) in forecast.iter().zip(&expected[36..]) {
            assert!((f - e).abs() < 1.0, "forecast {} vs {}", f, e);
        }
    }

    #[test]
    fn test_short_training_fails() {
        let err = HoltWinters::fit(&[1.0; 11], 12).unwrap_err();
        assert_eq!(err.class(), "ModelFitError");
    }

    #[test]
    fn test_single_season_has_flat_trend() {
        let series = seasonal_series(12);
        let model = HoltWinters::fit(&series, 12).unwrap();
        assert_eq!(model.forecast(6).unwrap().len(), 6);
    }
}
