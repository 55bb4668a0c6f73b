use ahash::AHashMap;
use anyhow::{bail, Result};
use log::{info, warn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::exposure::ExposureRecord;
use crate::geometry::PlanarUnits;
use crate::model::{Estimator, ModelData, RegressionResult};
use crate::moran::{global_moran, local_moran, ClusterLabel, LocalMoran, MoranConfig};
use crate::types::{ContiguityMode, UnitId};
use crate::weights::WeightsCache;

/// Skip reason recorded for units without a usable metric value.
pub const SKIP_MISSING_METRIC: &str = "Missing or invalid metric value";
/// Skip reason recorded for units without usable exposure.
pub const SKIP_MISSING_EXPOSURE: &str = "Missing golf exposure (no courses in range)";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mode: ContiguityMode,
    pub moran: MoranConfig,
}

/// Everything one (unit set, metric) run produces.
#[derive(Debug)]
pub struct MetricOutcome {
    /// Units that entered the fit, in fit row order.
    pub ids: Vec<UnitId>,
    pub result: RegressionResult,
    /// Fitted values z-scored for visualization, aligned with `ids`.
    pub z_fitted: Vec<f64>,
    /// Units excluded before fitting, with the reason surfaced to callers.
    pub skip_reasons: Vec<(UnitId, String)>,
    /// Local Moran diagnostics on standardized residuals, aligned with `ids`.
    pub locals: Vec<LocalMoran>,
    pub global_moran: f64,
    /// Label tally in fixed order HH, LH, LL, HL, NotSig.
    pub cluster_counts: Vec<(&'static str, usize)>,
}

/// Z-score a series for presentation; a flat series divides by 1 instead of 0.
fn zscore_or_flat(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let sd = if var.sqrt() > 0.0 { var.sqrt() } else { 1.0 };
    values.iter().map(|v| (v - mean) / sd).collect()
}

/// Fit one metric over one unit set.
///
/// Joins exposure records and metric values onto the unit ordering, records a
/// skip reason for every excluded unit *before* filtering, fits the spatial
/// lag model on the finite subset (weights built for exactly that subset and
/// order, via the cache), and derives presentation values and residual
/// cluster diagnostics.
pub fn run_metric(
    units: &PlanarUnits,
    exposure: &[ExposureRecord],
    values: &AHashMap<UnitId, f64>,
    estimator: &dyn Estimator,
    cache: &mut WeightsCache,
    cfg: &PipelineConfig,
) -> Result<MetricOutcome> {
    let exposure_by_id: AHashMap<&UnitId, &ExposureRecord> =
        exposure.iter().map(|r| (&r.id, r)).collect();

    let mut keep: Vec<usize> = Vec::new();
    let mut y: Vec<f64> = Vec::new();
    let mut x_rows: Vec<[f64; 2]> = Vec::new();
    let mut skip_reasons: Vec<(UnitId, String)> = Vec::new();

    for (i, id) in units.ids().iter().enumerate() {
        let metric = values.get(id).copied();
        if !metric.map_or(false, f64::is_finite) {
            skip_reasons.push((id.clone(), SKIP_MISSING_METRIC.to_string()));
            continue;
        }
        let record = exposure_by_id.get(id);
        let distance = record.map_or(f64::NAN, |r| r.distance_km);
        if !distance.is_finite() {
            skip_reasons.push((id.clone(), SKIP_MISSING_EXPOSURE.to_string()));
            continue;
        }
        let count = record.map_or(0.0, |r| r.count as f64);
        keep.push(i);
        y.push(metric.unwrap_or(f64::NAN));
        x_rows.push([distance, count]);
    }

    if keep.is_empty() {
        bail!("no units with both a metric value and exposure; nothing to fit");
    }

    let subset = units.subset(&keep);
    let weights = cache.get_or_build(&subset, cfg.mode)?;

    let n = keep.len();
    let mut x = Array2::<f64>::zeros((n, 2));
    for (r, row) in x_rows.iter().enumerate() {
        x[[r, 0]] = row[0];
        x[[r, 1]] = row[1];
    }
    let data = ModelData::new(Array1::from(y), x, &["dist_to_gc_km", "golf_count"])?;

    let result = estimator.fit_spatial_lag(&data, &weights)?;
    match &result.fallback {
        Some(reason) => info!("fit degraded to OLS: {reason}"),
        None => info!("spatial lag fit: rho = {:.4}, {} units", result.rho, n),
    }

    let z_fitted = zscore_or_flat(&result.fitted);
    let resid_std = zscore_or_flat(&result.residuals);
    let locals = local_moran(&resid_std, &weights, &cfg.moran)?;
    let global = global_moran(&resid_std, &weights)?;

    let mut cluster_counts: Vec<(&'static str, usize)> = [
        ClusterLabel::HighHigh,
        ClusterLabel::LowHigh,
        ClusterLabel::LowLow,
        ClusterLabel::HighLow,
        ClusterLabel::NotSig,
    ]
    .iter()
    .map(|label| (label.as_str(), 0usize))
    .collect();
    for l in &locals {
        if let Some(entry) = cluster_counts.iter_mut().find(|(name, _)| *name == l.label.as_str()) {
            entry.1 += 1;
        }
    }

    if !skip_reasons.is_empty() {
        info!("{} unit(s) skipped before fitting", skip_reasons.len());
    }

    Ok(MetricOutcome {
        ids: subset.ids().to_vec(),
        result,
        z_fitted,
        skip_reasons,
        locals,
        global_moran: global,
        cluster_counts,
    })
}

/// Run independent (city, metric) jobs, isolating failures: one failing fit
/// is recorded against its job name and never aborts the batch.
pub fn run_batch<F>(jobs: Vec<(String, F)>) -> Vec<(String, Result<MetricOutcome>)>
where
    F: FnOnce() -> Result<MetricOutcome>,
{
    jobs.into_iter()
        .map(|(name, job)| {
            let outcome = job();
            if let Err(err) = &outcome {
                warn!("job {name} failed: {err:#}");
            }
            (name, outcome)
        })
        .collect()
}
