use geo::BoundingRect;
use log::{debug, warn};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::geometry::PlanarUnits;
use crate::types::{ReferenceSite, SiteGeometry, UnitId};

/// Knobs for exposure feature computation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExposureConfig {
    /// Divisor from CRS units to reported distance (meters -> km).
    pub distance_unit_m: f64,
    /// Cap on reported distance, to avoid outlier distortion when no
    /// reference site is anywhere nearby.
    pub max_distance_km: f64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self { distance_unit_m: 1000.0, max_distance_km: 1000.0 }
    }
}

/// Exposure features for one target unit.
///
/// `distance_km` is NaN when exposure is unknown (no reference sites exist,
/// or the unit has no usable geometry) — never zero-filled, so missing data
/// cannot masquerade as "a course right here".
#[derive(Debug, Clone)]
pub struct ExposureRecord {
    pub id: UnitId,
    pub distance_km: f64,
    pub count: u32,
}

/// R-tree entry: one reference site, carrying its geometry so distance
/// queries resolve against the true shape, not the bounding box.
struct SiteEntry {
    geometry: SiteGeometry,
}

impl RTreeObject for SiteEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        // Only sites with a bounding rect are loaded into the tree.
        let rect = self.geometry.bounding_rect().unwrap_or_else(|| {
            geo::Rect::new(geo::Coord { x: 0.0, y: 0.0 }, geo::Coord { x: 0.0, y: 0.0 })
        });
        AABB::from_corners(rect.min().into(), rect.max().into())
    }
}

impl PointDistance for SiteEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = self.geometry.distance_from(geo::Point::new(point[0], point[1]));
        d * d
    }
}

/// Compute per-target exposure features against a set of reference sites.
///
/// Distance is measured from a representative interior point of the target
/// to the nearest reference geometry, planar, converted to km and capped.
/// Count is the number of reference geometries intersecting the target
/// polygon. An empty reference set yields NaN distances and zero counts for
/// every target; a degenerate target yields a NaN distance and is logged.
pub fn compute_exposure(
    targets: &PlanarUnits,
    references: &[ReferenceSite],
    cfg: &ExposureConfig,
) -> Vec<ExposureRecord> {
    let entries: Vec<SiteEntry> = references
        .iter()
        .filter_map(|site| {
            if site.geometry.bounding_rect().is_none() {
                warn!("reference site {} has empty geometry; skipped", site.id);
                return None;
            }
            Some(SiteEntry { geometry: site.geometry.clone() })
        })
        .collect();

    if entries.is_empty() {
        if !references.is_empty() {
            warn!("no usable reference geometries out of {}", references.len());
        }
        debug!("exposure computed against an empty reference set: all distances NaN");
        return targets
            .ids()
            .iter()
            .map(|id| ExposureRecord { id: id.clone(), distance_km: f64::NAN, count: 0 })
            .collect();
    }

    let index = RTree::bulk_load(entries);

    targets
        .ids()
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let distance_km = match targets.interior_point(i) {
                Some(pt) => match index.nearest_neighbor(&[pt.x(), pt.y()]) {
                    Some(site) => {
                        let d = site.geometry.distance_from(pt) / cfg.distance_unit_m;
                        d.min(cfg.max_distance_km)
                    }
                    None => f64::NAN,
                },
                None => {
                    warn!("unit {id} has no interior point; exposure distance unknown");
                    f64::NAN
                }
            };

            let geom = &targets.geoms()[i];
            let count = match geom.bounding_rect() {
                Some(rect) => {
                    let env = AABB::from_corners(rect.min().into(), rect.max().into());
                    index
                        .locate_in_envelope_intersecting(&env)
                        .filter(|site| site.geometry.intersects(geom))
                        .count() as u32
                }
                None => 0,
            };

            ExposureRecord { id: id.clone(), distance_km, count }
        })
        .collect()
}

/// Distribution summary of a value series, NaN/Inf excluded.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExposureSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Summarize any value series for reporting. Non-finite entries are dropped
/// first; an all-missing series reports `count = 0` and NaN statistics.
pub fn summarize(values: impl IntoIterator<Item = f64>) -> ExposureSummary {
    let mut finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    finite.sort_unstable_by(|a, b| a.total_cmp(b));

    if finite.is_empty() {
        return ExposureSummary {
            count: 0,
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            p10: f64::NAN,
            p25: f64::NAN,
            p50: f64::NAN,
            p75: f64::NAN,
            p90: f64::NAN,
        };
    }

    let quantile = |p: f64| -> f64 {
        let h = (finite.len() - 1) as f64 * p;
        let lo = h.floor() as usize;
        let hi = h.ceil() as usize;
        finite[lo] + (finite[hi] - finite[lo]) * (h - lo as f64)
    };

    ExposureSummary {
        count: finite.len(),
        min: finite[0],
        max: finite[finite.len() - 1],
        mean: finite.iter().sum::<f64>() / finite.len() as f64,
        p10: quantile(0.10),
        p25: quantile(0.25),
        p50: quantile(0.50),
        p75: quantile(0.75),
        p90: quantile(0.90),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geo::{polygon, MultiPolygon};

    use crate::types::SpatialUnit;

    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]])
    }

    fn two_tracts() -> PlanarUnits {
        PlanarUnits::from_units(&[
            SpatialUnit::new("t1", square(0.0, 0.0, 1000.0)),
            SpatialUnit::new("t2", square(5000.0, 0.0, 1000.0)),
        ])
    }

    #[test]
    fn empty_reference_set_is_missing_not_zero() {
        let records = compute_exposure(&two_tracts(), &[], &ExposureConfig::default());
        assert_eq!(records.len(), 2);
        for r in &records {
            assert!(r.distance_km.is_nan());
            assert_eq!(r.count, 0);
        }
    }

    #[test]
    fn interior_site_zeroes_distance_and_counts() {
        let tracts = two_tracts();
        let refs = vec![ReferenceSite::point("gc1", 500.0, 500.0)];
        let records = compute_exposure(&tracts, &refs, &ExposureConfig::default());
        assert_relative_eq!(records[0].distance_km, 0.0);
        assert_eq!(records[0].count, 1);
        // The far tract sees a positive distance and no intersection.
        assert!(records[1].distance_km > 0.0);
        assert_eq!(records[1].count, 0);
    }

    #[test]
    fn adding_an_interior_site_only_improves_that_target() {
        let tracts = two_tracts();
        let base = vec![ReferenceSite::point("gc1", 500.0, 500.0)];
        let before = compute_exposure(&tracts, &base, &ExposureConfig::default());

        let mut more = base.clone();
        more.push(ReferenceSite::point("gc2", 5500.0, 500.0)); // inside t2
        let after = compute_exposure(&tracts, &more, &ExposureConfig::default());

        // t2 strictly improves
        assert!(after[1].distance_km <= before[1].distance_km);
        assert!(after[1].count >= before[1].count);
        // t1 is untouched
        assert_relative_eq!(after[0].distance_km, before[0].distance_km);
        assert_eq!(after[0].count, before[0].count);
    }

    #[test]
    fn distances_are_capped() {
        let tracts = two_tracts();
        let refs = vec![ReferenceSite::point("far", 9.0e8, 0.0)];
        let cfg = ExposureConfig::default();
        let records = compute_exposure(&tracts, &refs, &cfg);
        for r in &records {
            assert_relative_eq!(r.distance_km, cfg.max_distance_km);
        }
    }

    #[test]
    fn footprint_references_count_by_overlap() {
        let tracts = two_tracts();
        // Course footprint straddling the t1 boundary.
        let refs = vec![ReferenceSite::footprint("gc1", square(800.0, 200.0, 600.0))];
        let records = compute_exposure(&tracts, &refs, &ExposureConfig::default());
        assert_eq!(records[0].count, 1);
        assert_eq!(records[1].count, 0);
    }

    #[test]
    fn summary_quantiles() {
        let s = summarize((1..=9).map(|v| v as f64).chain([f64::NAN, f64::INFINITY]));
        assert_eq!(s.count, 9);
        assert_relative_eq!(s.min, 1.0);
        assert_relative_eq!(s.max, 9.0);
        assert_relative_eq!(s.mean, 5.0);
        assert_relative_eq!(s.p50, 5.0);
        assert_relative_eq!(s.p25, 3.0);
        assert_relative_eq!(s.p75, 7.0);
    }

    #[test]
    fn summary_of_nothing() {
        let s = summarize(std::iter::empty());
        assert_eq!(s.count, 0);
        assert!(s.mean.is_nan());
    }
}
