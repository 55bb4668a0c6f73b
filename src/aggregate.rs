use ahash::AHashMap;
use log::warn;
use rstar::AABB;

use crate::geometry::PlanarUnits;
use crate::types::{SiteGeometry, UnitId};

/// A value-bearing parcel to be assigned to units by intersection. Point
/// parcels are geocoded addresses; footprints are lot polygons.
#[derive(Debug, Clone)]
pub struct ValuedParcel {
    pub geometry: SiteGeometry,
    pub value: f64,
}

impl ValuedParcel {
    pub fn new(geometry: SiteGeometry, value: f64) -> Self {
        Self { geometry, value }
    }
}

/// Assign each parcel to every unit it intersects and reduce per unit by
/// median. Units that collect no parcels are absent from the result, which
/// downstream treats as a missing metric, not a zero.
///
/// A parcel straddling a unit boundary contributes to both units, matching
/// the intersects-join semantics of the upstream data preparation.
pub fn median_by_unit(units: &PlanarUnits, parcels: &[ValuedParcel]) -> AHashMap<UnitId, f64> {
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); units.len()];

    for parcel in parcels {
        if !parcel.value.is_finite() {
            continue;
        }
        let Some(rect) = parcel.geometry.bounding_rect() else { continue };
        let env = AABB::from_corners(rect.min().into(), rect.max().into());
        for idx in units.query(&env) {
            if parcel.geometry.intersects(&units.geoms()[idx]) {
                buckets[idx].push(parcel.value);
            }
        }
    }

    let mut out = AHashMap::with_capacity(units.len());
    for (i, mut values) in buckets.into_iter().enumerate() {
        if values.is_empty() {
            continue;
        }
        values.sort_unstable_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 1 {
            values[mid]
        } else {
            0.5 * (values[mid - 1] + values[mid])
        };
        out.insert(units.ids()[i].clone(), median);
    }
    out
}

/// Natural log of each positive value; non-positive entries are dropped and
/// logged, since a zero assessment is a data artifact, not a price.
pub fn log_transform(values: &AHashMap<UnitId, f64>) -> AHashMap<UnitId, f64> {
    let mut out = AHashMap::with_capacity(values.len());
    for (id, &v) in values {
        if v > 0.0 {
            out.insert(id.clone(), v.ln());
        } else {
            warn!("unit {id}: non-positive value {v} dropped before log transform");
        }
    }
    out
}
