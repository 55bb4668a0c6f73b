use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::weights::SpatialWeights;

/// Knobs for the local autocorrelation diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoranConfig {
    /// Conditional permutations per unit for the pseudo-p-value.
    pub permutations: usize,
    /// Significance threshold below which a quadrant label is assigned.
    pub alpha: f64,
    /// RNG seed; fixed so repeated runs classify identically.
    pub seed: u64,
}

impl Default for MoranConfig {
    fn default() -> Self {
        Self { permutations: 999, alpha: 0.05, seed: 0xC0FFEE }
    }
}

/// Cluster classification of one unit against its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterLabel {
    HighHigh,
    LowHigh,
    LowLow,
    HighLow,
    NotSig,
}

impl ClusterLabel {
    /// Short code as rendered in output tables ("HH", "LH", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterLabel::HighHigh => "HH",
            ClusterLabel::LowHigh => "LH",
            ClusterLabel::LowLow => "LL",
            ClusterLabel::HighLow => "HL",
            ClusterLabel::NotSig => "NotSig",
        }
    }
}

impl std::fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local Moran statistic for one unit.
#[derive(Debug, Clone, Copy)]
pub struct LocalMoran {
    pub local_i: f64,
    /// Conditional-permutation pseudo-p-value, two-sided.
    pub p_value: f64,
    /// 1 = HH, 2 = LH, 3 = LL, 4 = HL; 0 when undefined (degenerate input
    /// or island).
    pub quadrant: u8,
    pub label: ClusterLabel,
}

/// Z-score a series; `None` when the standard deviation is zero (all local
/// statistics would be degenerate).
fn zscores(values: &[f64]) -> Option<Vec<f64>> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let sd = var.sqrt();
    if !(sd > 0.0) {
        return None;
    }
    Some(values.iter().map(|v| (v - mean) / sd).collect())
}

/// Local Moran's I per unit with conditional-permutation significance.
///
/// The statistic for unit i is z_i times the weighted average of its
/// neighbors' z-values. Significance permutes the z-values among non-focal
/// units and counts permuted statistics at least as extreme as the observed
/// one, with the standard +1/(M+1) pseudo-p correction. A constant input
/// series reports NotSig everywhere instead of dividing by zero.
pub fn local_moran(values: &[f64], w: &SpatialWeights, cfg: &MoranConfig) -> Result<Vec<LocalMoran>, Error> {
    if values.len() != w.n() {
        return Err(Error::Alignment { context: "moran values", actual: values.len(), expected: w.n() });
    }
    if let Some(row) = values.iter().position(|v| !v.is_finite()) {
        return Err(Error::NonFinite { row });
    }

    let n = w.n();
    let not_sig = LocalMoran { local_i: 0.0, p_value: 1.0, quadrant: 0, label: ClusterLabel::NotSig };

    let Some(z) = zscores(values) else {
        return Ok(vec![not_sig; n]);
    };

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let k = w.degree(i);
        if k == 0 {
            out.push(not_sig);
            continue;
        }

        let row_weights: Vec<f64> = w.row(i).map(|(_, wt)| wt).collect();
        let lag: f64 = w.row(i).map(|(j, wt)| wt * z[j]).sum();
        let local_i = z[i] * lag;

        // Conditional permutation: hold z_i fixed, redraw the neighbor set
        // from the remaining n-1 values. Each unit gets its own RNG stream so
        // results do not depend on evaluation order.
        let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(i as u64));
        let mut extreme = 0usize;
        for _ in 0..cfg.permutations {
            let draw = rand::seq::index::sample(&mut rng, n - 1, k);
            let lag_p: f64 = draw
                .iter()
                .zip(&row_weights)
                .map(|(raw, wt)| {
                    let j = if raw < i { raw } else { raw + 1 };
                    wt * z[j]
                })
                .sum();
            if (z[i] * lag_p).abs() >= local_i.abs() {
                extreme += 1;
            }
        }
        let p_value = (extreme + 1) as f64 / (cfg.permutations + 1) as f64;

        let quadrant = match (z[i] > 0.0, lag > 0.0) {
            (true, true) => 1,
            (false, true) => 2,
            (false, false) => 3,
            (true, false) => 4,
        };
        let label = if p_value >= cfg.alpha {
            ClusterLabel::NotSig
        } else {
            match quadrant {
                1 => ClusterLabel::HighHigh,
                2 => ClusterLabel::LowHigh,
                3 => ClusterLabel::LowLow,
                _ => ClusterLabel::HighLow,
            }
        };

        out.push(LocalMoran { local_i, p_value, quadrant, label });
    }

    Ok(out)
}

/// Global Moran's I, the scaled cross-product of deviations with their
/// spatial lag. NaN when the series is constant or the graph has no edges.
pub fn global_moran(values: &[f64], w: &SpatialWeights) -> Result<f64, Error> {
    if values.len() != w.n() {
        return Err(Error::Alignment { context: "moran values", actual: values.len(), expected: w.n() });
    }
    let n = w.n() as f64;
    let s0 = w.total_weight();
    let mean = values.iter().sum::<f64>() / n;
    let dev: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let den: f64 = dev.iter().map(|d| d * d).sum();
    if !(den > 0.0) || !(s0 > 0.0) {
        return Ok(f64::NAN);
    }
    let lagged = w.lag(&dev);
    let num: f64 = dev.iter().zip(&lagged).map(|(d, l)| d * l).sum();
    Ok((n / s0) * (num / den))
}
