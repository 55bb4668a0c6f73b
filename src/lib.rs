#![doc = "Golfscape public API: spatial weights, exposure features, spatial-lag regression and cluster diagnostics over census-tract geometry."]
mod aggregate;
mod error;
mod exposure;
mod geometry;
mod model;
mod moran;
mod pipeline;
mod types;
mod weights;

pub mod io;

#[doc(inline)]
pub use types::{normalize_unit_id, ContiguityMode, ReferenceSite, SiteGeometry, SpatialUnit, UnitId};

#[doc(inline)]
pub use error::Error;

#[doc(inline)]
pub use geometry::PlanarUnits;

#[doc(inline)]
pub use weights::{fingerprint_ids, SpatialWeights, WeightsCache};

#[doc(inline)]
pub use exposure::{compute_exposure, summarize, ExposureConfig, ExposureRecord, ExposureSummary};

#[doc(inline)]
pub use model::{
    Estimator, FallbackReason, LagConfig, MlLag, ModelData, OlsOnly, RegressionResult,
};

#[doc(inline)]
pub use moran::{global_moran, local_moran, ClusterLabel, LocalMoran, MoranConfig};

#[doc(inline)]
pub use aggregate::{log_transform, median_by_unit, ValuedParcel};

#[doc(inline)]
pub use pipeline::{
    run_batch, run_metric, MetricOutcome, PipelineConfig, SKIP_MISSING_EXPOSURE,
    SKIP_MISSING_METRIC,
};
