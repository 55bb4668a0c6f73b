use log::warn;
use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::error::Error;
use crate::weights::SpatialWeights;

use super::ols::{corr2, design_matrix, fit_ols_impl, lstsq};
use super::{Estimator, FallbackReason, LagConfig, ModelData, RegressionResult};

/// Margin kept between the searched rho interval and its theoretical bounds
/// 1/lambda_min and 1/lambda_max, where the log-Jacobian diverges.
const RHO_MARGIN: f64 = 1e-5;

/// Iteration cap for the symmetric eigensolver.
const EIGEN_MAX_ITER: usize = 500;

/// Maximum-likelihood spatial-lag estimator.
///
/// Fits y = rho*W*y + X*beta + e by maximizing the concentrated
/// log-likelihood over rho, with the log-determinant of (I - rho*W) expanded
/// through the eigenvalues of W. Degrades to OLS (with a recorded reason)
/// rather than failing wherever the spatial fit is impossible.
#[derive(Debug, Default, Clone, Copy)]
pub struct MlLag {
    pub config: LagConfig,
}

impl MlLag {
    pub fn new(config: LagConfig) -> Self {
        Self { config }
    }

    /// Eigenvalues of the row-standardized weights matrix.
    ///
    /// W = D^-1 A with A symmetric binary, so W is similar to the symmetric
    /// matrix D^-1/2 A D^-1/2 and shares its (real) spectrum. Requires no
    /// islands: zero-degree rows would put zeros in D.
    fn eigenvalues(w: &SpatialWeights) -> Option<Vec<f64>> {
        let n = w.n();
        let mut sym = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            let di = w.degree(i) as f64;
            for &j in w.neighbors(i) {
                let dj = w.degree(j as usize) as f64;
                sym[(i, j as usize)] = 1.0 / (di * dj).sqrt();
            }
        }
        let eigen = SymmetricEigen::try_new(sym, 1e-12, EIGEN_MAX_ITER)?;
        Some(eigen.eigenvalues.iter().copied().collect())
    }

    /// Golden-section maximization of a unimodal function on [lo, hi].
    /// Returns the argmax and whether the interval shrank below `tol` within
    /// the iteration budget.
    fn golden_section(mut lo: f64, mut hi: f64, tol: f64, max_iter: usize, f: impl Fn(f64) -> f64) -> (f64, bool) {
        const INV_PHI: f64 = 0.618_033_988_749_894_8;

        let mut a = hi - INV_PHI * (hi - lo);
        let mut b = lo + INV_PHI * (hi - lo);
        let mut fa = f(a);
        let mut fb = f(b);

        let mut converged = false;
        for _ in 0..max_iter {
            if (hi - lo).abs() < tol {
                converged = true;
                break;
            }
            if fa > fb {
                hi = b;
                b = a;
                fb = fa;
                a = hi - INV_PHI * (hi - lo);
                fa = f(a);
            } else {
                lo = a;
                a = b;
                fa = fb;
                b = lo + INV_PHI * (hi - lo);
                fb = f(b);
            }
        }

        (0.5 * (lo + hi), converged)
    }
}

impl Estimator for MlLag {
    fn fit_spatial_lag(&self, data: &ModelData, w: &SpatialWeights) -> Result<RegressionResult, Error> {
        if data.n() != w.n() {
            return Err(Error::Alignment { context: "weights", actual: w.n(), expected: data.n() });
        }
        if self.config.force_ols {
            return fit_ols_impl(data, Some(FallbackReason::Forced));
        }
        if w.has_islands() {
            if self.config.strict_connectivity {
                return Err(Error::DisconnectedGraph { islands: w.islands().len() });
            }
            warn!(
                "{} island unit(s) make the spatial Jacobian singular; falling back to OLS",
                w.islands().len()
            );
            return fit_ols_impl(data, Some(FallbackReason::DisconnectedGraph));
        }

        let n = data.n();
        let nf = n as f64;
        let design = design_matrix(data);
        let y = DVector::from_iterator(n, data.y.iter().copied());
        let y_slice: Vec<f64> = data.y.to_vec();
        let wy_vec = w.lag(&y_slice);
        let wy = DVector::from_column_slice(&wy_vec);

        // Auxiliary regressions for the concentrated likelihood:
        // e0 = y - X*b0, ed = Wy - X*bd.
        let (b0, bd) = match (lstsq(&design, &y), lstsq(&design, &wy)) {
            (Some(l0), Some(ld)) if !l0.degenerate && !ld.degenerate => (l0.solution, ld.solution),
            _ => {
                warn!("degenerate design matrix; falling back to OLS");
                return fit_ols_impl(data, Some(FallbackReason::DegenerateDesign));
            }
        };
        let e0 = &y - &design * &b0;
        let ed = &wy - &design * &bd;

        let Some(lambda) = Self::eigenvalues(w) else {
            warn!("eigendecomposition of the weights matrix did not converge; falling back to OLS");
            return fit_ols_impl(data, Some(FallbackReason::NonConvergence));
        };
        let lambda_min = lambda.iter().cloned().fold(f64::INFINITY, f64::min);
        let lambda_max = lambda.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let rho_lo = if lambda_min < -RHO_MARGIN { 1.0 / lambda_min + RHO_MARGIN } else { -1.0 + RHO_MARGIN };
        let rho_hi = if lambda_max > RHO_MARGIN { 1.0 / lambda_max - RHO_MARGIN } else { 1.0 - RHO_MARGIN };

        // Concentrated log-likelihood in rho; sigma^2 and beta are profiled
        // out through the auxiliary residuals.
        let concentrated = |rho: f64| -> f64 {
            let mut rss = 0.0;
            for i in 0..n {
                let e = e0[i] - rho * ed[i];
                rss += e * e;
            }
            let sigma2 = rss / nf;
            if !(sigma2 > 0.0) {
                return f64::NEG_INFINITY;
            }
            let mut log_jacobian = 0.0;
            for &l in &lambda {
                let t = 1.0 - rho * l;
                if t <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                log_jacobian += t.ln();
            }
            -0.5 * nf * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0) + log_jacobian
        };

        let (rho, converged) =
            Self::golden_section(rho_lo, rho_hi, self.config.tol, self.config.max_iter, &concentrated);
        if !converged {
            warn!(
                "rho search did not converge within {} iterations; falling back to OLS",
                self.config.max_iter
            );
            return fit_ols_impl(data, Some(FallbackReason::NonConvergence));
        }

        let beta = &b0 - &bd * rho;
        let xb = &design * &beta;
        let fitted: Vec<f64> = (0..n).map(|i| rho * wy_vec[i] + xb[i]).collect();
        let residuals: Vec<f64> = y_slice.iter().zip(&fitted).map(|(obs, fit)| obs - fit).collect();

        let rss: f64 = (0..n).map(|i| { let e = e0[i] - rho * ed[i]; e * e }).sum();
        let sigma2 = rss / nf;
        let log_likelihood = concentrated(rho);
        // Parameters: k covariates + intercept + rho.
        let params = (data.k() + 2) as f64;
        let aic = 2.0 * params - 2.0 * log_likelihood;

        let mut coefficients = Vec::with_capacity(data.k() + 1);
        coefficients.push(("const".to_string(), beta[0]));
        for (i, name) in data.names.iter().enumerate() {
            coefficients.push((name.clone(), beta[i + 1]));
        }

        let pseudo_r2 = corr2(&y_slice, &fitted);
        Ok(RegressionResult {
            coefficients,
            rho,
            fitted,
            residuals,
            sigma2,
            log_likelihood: Some(log_likelihood),
            aic: Some(aic),
            pseudo_r2,
            fallback: None,
        })
    }

    fn fit_ols(&self, data: &ModelData) -> Result<RegressionResult, Error> {
        fit_ols_impl(data, None)
    }
}
