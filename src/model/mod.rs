mod lag;
mod ols;

pub use lag::MlLag;
pub use ols::OlsOnly;

use std::fmt;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::weights::SpatialWeights;

/// Validated model inputs: a response vector, a design matrix (without the
/// intercept column) and covariate names. Construction rejects non-finite
/// values and row mismatches up front — a single contaminated row poisons a
/// maximum-likelihood fit.
#[derive(Debug, Clone)]
pub struct ModelData {
    pub(crate) y: Array1<f64>,
    pub(crate) x: Array2<f64>,
    pub(crate) names: Vec<String>,
}

impl ModelData {
    pub fn new(y: Array1<f64>, x: Array2<f64>, names: &[&str]) -> Result<Self, Error> {
        if x.nrows() != y.len() {
            return Err(Error::Alignment { context: "design matrix", actual: x.nrows(), expected: y.len() });
        }
        if names.len() != x.ncols() {
            return Err(Error::Alignment { context: "covariate names", actual: names.len(), expected: x.ncols() });
        }
        for (row, v) in y.iter().enumerate() {
            if !v.is_finite() {
                return Err(Error::NonFinite { row });
            }
        }
        for ((row, _), v) in x.indexed_iter() {
            if !v.is_finite() {
                return Err(Error::NonFinite { row });
            }
        }
        Ok(Self { y, x, names: names.iter().map(|s| s.to_string()).collect() })
    }

    /// Number of observations.
    #[inline] pub fn n(&self) -> usize { self.y.len() }

    /// Number of covariates (intercept excluded).
    #[inline] pub fn k(&self) -> usize { self.x.ncols() }
}

/// Why a spatial-lag request was answered with a plain least-squares fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    /// The caller disabled the ML solver.
    Forced,
    /// Islands make the log-Jacobian term ill-posed.
    DisconnectedGraph,
    /// Constant or collinear design columns.
    DegenerateDesign,
    /// The likelihood optimizer ran out of iterations.
    NonConvergence,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallbackReason::Forced => "spatial solver disabled by configuration",
            FallbackReason::DisconnectedGraph => "weights graph has islands",
            FallbackReason::DegenerateDesign => "degenerate design matrix",
            FallbackReason::NonConvergence => "likelihood optimizer did not converge",
        };
        f.write_str(s)
    }
}

/// Outcome of a regression fit.
///
/// `fitted` and `residuals` have exactly one entry per input row, in input
/// order, with `residuals[i] = y[i] - fitted[i]`. For an OLS fallback `rho`
/// is 0 and `fallback` records why the spatial fit was not produced.
#[derive(Debug, Clone)]
pub struct RegressionResult {
    /// Named coefficients, intercept ("const") first.
    pub coefficients: Vec<(String, f64)>,
    /// Spatial autoregressive coefficient.
    pub rho: f64,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    /// ML (or OLS) error variance estimate.
    pub sigma2: f64,
    /// Full log-likelihood at the optimum; `None` for an OLS fallback.
    pub log_likelihood: Option<f64>,
    pub aic: Option<f64>,
    /// Squared correlation between observed and fitted values.
    pub pseudo_r2: f64,
    pub fallback: Option<FallbackReason>,
}

impl RegressionResult {
    /// True when the result came from the actual spatial-lag estimator.
    #[inline]
    pub fn is_spatial(&self) -> bool {
        self.fallback.is_none()
    }
}

/// Capability interface for the regression engine, so pipelines can swap in
/// a plain least-squares estimator where the ML solver is unavailable or
/// under test.
pub trait Estimator {
    /// Fit y = rho*W*y + X*beta + e by maximum likelihood, degrading to OLS
    /// where the spatial fit is impossible (see `FallbackReason`).
    fn fit_spatial_lag(&self, data: &ModelData, w: &SpatialWeights) -> Result<RegressionResult, Error>;

    /// Fit y = X*beta + e on [intercept | X], ignoring spatial structure.
    fn fit_ols(&self, data: &ModelData) -> Result<RegressionResult, Error>;
}

/// Knobs for the maximum-likelihood spatial-lag engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LagConfig {
    /// Iteration cap for the concentrated-likelihood search.
    pub max_iter: usize,
    /// Width tolerance at which the rho search stops.
    pub tol: f64,
    /// Answer every spatial-lag request with OLS (testing/debugging).
    pub force_ols: bool,
    /// Error out on islands instead of degrading to OLS.
    pub strict_connectivity: bool,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self { max_iter: 100, tol: 1e-7, force_ols: false, strict_connectivity: false }
    }
}
