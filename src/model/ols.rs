use nalgebra::{DMatrix, DVector};

use crate::error::Error;
use crate::weights::SpatialWeights;

use super::{Estimator, FallbackReason, ModelData, RegressionResult};

/// Relative singular-value cutoff below which a design is treated as rank
/// deficient.
const RANK_TOL: f64 = 1e-10;

/// Build the augmented design [1 | X].
pub(crate) fn design_matrix(data: &ModelData) -> DMatrix<f64> {
    DMatrix::from_fn(data.n(), data.k() + 1, |r, c| {
        if c == 0 { 1.0 } else { data.x[[r, c - 1]] }
    })
}

pub(crate) struct LeastSquares {
    pub solution: DVector<f64>,
    /// True when the design was rank deficient and the minimum-norm solution
    /// was returned.
    pub degenerate: bool,
}

/// Minimum-norm least squares via SVD, the same projection `lstsq` computes.
pub(crate) fn lstsq(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<LeastSquares> {
    let svd = a.clone().svd(true, true);
    let max_sv = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let min_sv = svd.singular_values.iter().cloned().fold(f64::INFINITY, f64::min);
    let solution = svd.solve(b, max_sv * RANK_TOL).ok()?;
    Some(LeastSquares {
        solution: DVector::from_column_slice(solution.as_slice()),
        degenerate: !(min_sv > max_sv * RANK_TOL),
    })
}

/// Squared Pearson correlation; 0 when either series is constant.
pub(crate) fn corr2(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma) * (x - ma);
        vb += (y - mb) * (y - mb);
    }
    if va <= 0.0 || vb <= 0.0 {
        return 0.0;
    }
    (cov * cov) / (va * vb)
}

/// Plain least squares on [1 | X], used both directly and as the degradation
/// path of the ML engine. `reason` marks the result as a fallback when the
/// caller wanted a spatial fit.
pub(crate) fn fit_ols_impl(data: &ModelData, reason: Option<FallbackReason>) -> Result<RegressionResult, Error> {
    let design = design_matrix(data);
    let y = DVector::from_iterator(data.n(), data.y.iter().copied());

    let ls = lstsq(&design, &y).ok_or(Error::Convergence { iterations: 0 })?;
    let fitted_v = &design * &ls.solution;

    let fitted: Vec<f64> = fitted_v.iter().copied().collect();
    let residuals: Vec<f64> = data.y.iter().zip(&fitted).map(|(obs, fit)| obs - fit).collect();
    let rss: f64 = residuals.iter().map(|e| e * e).sum();
    let n = data.n() as f64;

    let mut coefficients = Vec::with_capacity(data.k() + 1);
    coefficients.push(("const".to_string(), ls.solution[0]));
    for (i, name) in data.names.iter().enumerate() {
        coefficients.push((name.clone(), ls.solution[i + 1]));
    }

    let y_obs: Vec<f64> = data.y.to_vec();
    let pseudo_r2 = corr2(&y_obs, &fitted);
    Ok(RegressionResult {
        coefficients,
        rho: 0.0,
        fitted,
        residuals,
        sigma2: if n > 0.0 { rss / n } else { f64::NAN },
        log_likelihood: None,
        aic: None,
        pseudo_r2,
        fallback: reason,
    })
}

/// Estimator without the ML solver: every spatial-lag request is answered
/// with the OLS projection, flagged as forced. Lets pipelines and tests run
/// with the likelihood machinery swapped out entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct OlsOnly;

impl Estimator for OlsOnly {
    fn fit_spatial_lag(&self, data: &ModelData, w: &SpatialWeights) -> Result<RegressionResult, Error> {
        if data.n() != w.n() {
            return Err(Error::Alignment { context: "weights", actual: w.n(), expected: data.n() });
        }
        fit_ols_impl(data, Some(FallbackReason::Forced))
    }

    fn fit_ols(&self, data: &ModelData) -> Result<RegressionResult, Error> {
        fit_ols_impl(data, None)
    }
}
