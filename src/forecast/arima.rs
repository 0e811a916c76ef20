// src/forecast/arima.rs
//! ARIMA(p, d, q) without constant, fitted by conditional sum of squares.
//!
//! The series is differenced `d` times, standardized, and the ARMA
//! coefficients are found with Nelder–Mead under stationarity/invertibility
//! constraints. Forecasts set future shocks to zero and integrate back.

use crate::error::{PipelineError, PipelineResult};
use crate::forecast::optimize::nelder_mead;
use crate::forecast::SeriesModel;

/// Objective value for coefficients outside the admissible region.
const PENALTY: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arima {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl Default for Arima {
    /// The order used for page-view forecasts.
    fn default() -> Self {
        Self { p: 2, d: 1, q: 2 }
    }
}

/// Coefficients of a fitted ARMA on the differenced, standardized series.
#[derive(Debug, Clone)]
pub struct ArmaFit {
    pub phi: Vec<f64>,
    pub theta: Vec<f64>,
    pub sse: f64,
}

impl Arima {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Fewest differenced observations needed for a meaningful fit.
    fn min_observations(&self) -> usize {
        2 * (self.p + self.q) + 2
    }

    /// Fit ARMA(p, q) to an already-differenced, standardized series.
    pub fn fit_arma(&self, z: &[f64]) -> ArmaFit {
        let (p, q) = (self.p, self.q);
        let mut x0 = yule_walker_start(z, p);
        x0.extend(std::iter::repeat(0.0).take(q));

        let objective = |params: &[f64]| -> f64 {
            let (phi, theta) = params.split_at(p);
            if !is_stationary(phi) || !is_stationary(&theta.iter().map(|t| -t).collect::<Vec<_>>()) {
                return PENALTY;
            }
            let sse: f64 = css_residuals(z, phi, theta).iter().map(|e| e * e).sum();
            if sse.is_finite() {
                sse
            } else {
                PENALTY
            }
        };

        let (best, sse) = nelder_mead(objective, &x0, 0.1, 800 * (p + q).max(1), 1e-10);
        let (phi, theta) = best.split_at(p);
        ArmaFit {
            phi: phi.to_vec(),
            theta: theta.to_vec(),
            sse,
        }
    }
}

impl SeriesModel for Arima {
    fn name(&self) -> &'static str {
        "arima"
    }

    fn fit_forecast(&self, series: &[f64], steps: usize) -> PipelineResult<Vec<f64>> {
        if series.is_empty() {
            return Err(PipelineError::Model("empty series".into()));
        }
        if steps == 0 {
            return Ok(Vec::new());
        }

        // Keep the tail of every differencing level for integration.
        let mut levels: Vec<Vec<f64>> = vec![series.to_vec()];
        for _ in 0..self.d {
            let prev = levels.last().map(|v| difference(v)).unwrap_or_default();
            levels.push(prev);
        }
        let diffed = levels.pop().unwrap_or_default();

        let last = series[series.len() - 1];
        if diffed.len() < self.min_observations() {
            tracing::warn!(
                observations = series.len(),
                "series too short for ARIMA({},{},{}), using random walk",
                self.p,
                self.d,
                self.q
            );
            return Ok(vec![last; steps]);
        }

        let scale = std_dev(&diffed);
        let mut forecast_diff = if scale > f64::EPSILON {
            let z: Vec<f64> = diffed.iter().map(|v| v / scale).collect();
            let fit = self.fit_arma(&z);
            tracing::debug!(phi = ?fit.phi, theta = ?fit.theta, sse = fit.sse, "arma fitted");
            arma_forecast(&z, &fit.phi, &fit.theta, steps)
                .into_iter()
                .map(|v| v * scale)
                .collect::<Vec<_>>()
        } else {
            vec![0.0; steps]
        };

        // Integrate back through each differencing level.
        while let Some(level) = levels.pop() {
            let mut acc = level.last().copied().unwrap_or(0.0);
            for v in forecast_diff.iter_mut() {
                acc += *v;
                *v = acc;
            }
        }

        if forecast_diff.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::Model("non-finite forecast".into()));
        }
        Ok(forecast_diff)
    }
}

fn difference(v: &[f64]) -> Vec<f64> {
    v.windows(2).map(|w| w[1] - w[0]).collect()
}

fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.iter().sum::<f64>() / v.len() as f64
    }
}

fn std_dev(v: &[f64]) -> f64 {
    let m = mean(v);
    (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / v.len().max(1) as f64).sqrt()
}

fn autocorrelation(v: &[f64], lag: usize) -> f64 {
    let m = mean(v);
    let denom: f64 = v.iter().map(|x| (x - m).powi(2)).sum();
    if denom <= f64::EPSILON || lag >= v.len() {
        return 0.0;
    }
    let num: f64 = (lag..v.len()).map(|t| (v[t] - m) * (v[t - lag] - m)).sum();
    num / denom
}

/// Yule–Walker starting values for AR orders up to two; zeros beyond that.
fn yule_walker_start(z: &[f64], p: usize) -> Vec<f64> {
    let r1 = autocorrelation(z, 1);
    let mut start = match p {
        0 => Vec::new(),
        1 => vec![r1],
        _ => {
            let r2 = autocorrelation(z, 2);
            let denom = 1.0 - r1 * r1;
            let mut v = vec![0.0; p];
            if denom.abs() > 1e-9 {
                v[0] = r1 * (1.0 - r2) / denom;
                v[1] = (r2 - r1 * r1) / denom;
            }
            v
        }
    };
    // pull back inside the stationary region
    while !is_stationary(&start) {
        start.iter_mut().for_each(|c| *c *= 0.5);
    }
    start
}

/// Roots of `1 - a1 z - a2 z^2 - …` lie outside the unit circle.
///
/// Exact triangle conditions for orders up to two, the sufficient
/// `sum |a_i| < 1` bound above that.
fn is_stationary(a: &[f64]) -> bool {
    match a {
        [] => true,
        [a1] => a1.abs() < 1.0,
        [a1, a2] => a2.abs() < 1.0 && a1 + a2 < 1.0 && a2 - a1 < 1.0,
        _ => a.iter().map(|c| c.abs()).sum::<f64>() < 1.0,
    }
}

/// One-step-ahead residuals with pre-sample shocks set to zero.
fn css_residuals(z: &[f64], phi: &[f64], theta: &[f64]) -> Vec<f64> {
    let p = phi.len();
    let mut e = vec![0.0; z.len()];
    for t in p..z.len() {
        let ar: f64 = phi.iter().enumerate().map(|(i, c)| c * z[t - 1 - i]).sum();
        let ma: f64 = theta
            .iter()
            .enumerate()
            .filter(|(j, _)| t > *j)
            .map(|(j, c)| c * e[t - 1 - j])
            .sum();
        e[t] = z[t] - ar - ma;
    }
    e.drain(..p.min(e.len()));
    e
}

fn arma_forecast(z: &[f64], phi: &[f64], theta: &[f64], steps: usize) -> Vec<f64> {
    let mut resid = vec![0.0; phi.len().min(z.len())];
    resid.extend(css_residuals(z, phi, theta));

    let mut hist = z.to_vec();
    let n = z.len();
    let mut out = Vec::with_capacity(steps);
    for h in 0..steps {
        let t = n + h;
        let ar: f64 = phi
            .iter()
            .enumerate()
            .filter(|(i, _)| t > *i)
            .map(|(i, c)| c * hist[t - 1 - i])
            .sum();
        // only shocks observed in-sample contribute
        let ma: f64 = theta
            .iter()
            .enumerate()
            .filter(|(j, _)| t > *j && t - 1 - j < n)
            .map(|(j, c)| c * resid[t - 1 - j])
            .sum();
        let v = ar + ma;
        hist.push(v);
        out.push(v);
    }
    out
}
