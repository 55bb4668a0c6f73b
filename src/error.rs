use thiserror::Error;

/// Failure modes of the numerical core.
///
/// Per-unit geometry problems during loading/exposure are logged and the unit
/// is excluded rather than raised; the variants here cover the cases a caller
/// has to react to. Missing exposure (no reference sites at all) is *not* an
/// error and propagates as NaN/0 through `ExposureRecord`.
#[derive(Debug, Error)]
pub enum Error {
    /// A unit's geometry is empty or invalid and the operation cannot proceed
    /// without it.
    #[error("invalid geometry for unit {id}: {reason}")]
    Geometry { id: String, reason: String },

    /// Row counts of y/X/weights disagree. Fatal for the fit it aborts.
    #[error("misaligned inputs: {context} has {actual} rows, weights expect {expected}")]
    Alignment {
        context: &'static str,
        actual: usize,
        expected: usize,
    },

    /// A non-finite value survived into a model input row.
    #[error("non-finite value in model input at row {row}")]
    NonFinite { row: usize },

    /// The weights graph contains islands and the caller requested strict
    /// connectivity, or the Jacobian term is singular because of them.
    #[error("weights graph is disconnected: {islands} island unit(s)")]
    DisconnectedGraph { islands: usize },

    /// The likelihood optimizer exhausted its iteration budget.
    #[error("likelihood optimizer did not converge within {iterations} iterations")]
    Convergence { iterations: usize },
}
