mod contiguity;

use ahash::AHashMap;
use geo::{BoundingRect, InteriorPoint, MultiPolygon, Point, Rect, Validation};
use log::warn;
use rstar::{RTree, RTreeObject, AABB};

use crate::types::{SpatialUnit, UnitId};

#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub(crate) idx: usize, // Index of corresponding MultiPolygon in geoms
    bbox: Rect<f64>,
}

impl BoundingBox {
    pub(crate) fn new(idx: usize, bbox: Rect<f64>) -> Self {
        Self { idx, bbox }
    }
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Screened polygon store for one unit set, with an R-tree over bounding
/// boxes. Index positions are the canonical row ordering for every
/// downstream structure (weights rows, y/X rows, diagnostics).
#[derive(Debug, Clone)]
pub struct PlanarUnits {
    ids: Vec<UnitId>,
    index: AHashMap<UnitId, u32>,
    geoms: Vec<MultiPolygon<f64>>,
    rtree: RTree<BoundingBox>,
    dropped: Vec<(UnitId, String)>,
}

impl PlanarUnits {
    /// Screen a unit set and index the survivors.
    ///
    /// Units with empty geometry or a duplicate id are excluded and recorded
    /// in `dropped` with a reason; a marginally invalid geometry
    /// (self-touching rings, duplicate vertices) is kept, since the contiguity
    /// predicates tolerate it, but logged. Never fails the whole set on one
    /// bad unit.
    pub fn from_units(units: &[SpatialUnit]) -> Self {
        let mut ids = Vec::with_capacity(units.len());
        let mut index: AHashMap<UnitId, u32> = AHashMap::with_capacity(units.len());
        let mut geoms = Vec::with_capacity(units.len());
        let mut dropped = Vec::new();

        for unit in units {
            if unit.geometry.0.is_empty() || unit.geometry.bounding_rect().is_none() {
                warn!("unit {} excluded: empty geometry", unit.id);
                dropped.push((unit.id.clone(), "empty geometry".to_string()));
                continue;
            }
            if index.contains_key(&unit.id) {
                warn!("unit {} excluded: duplicate id", unit.id);
                dropped.push((unit.id.clone(), "duplicate id".to_string()));
                continue;
            }
            if !unit.geometry.is_valid() {
                // Kept: boundary-relation tests run at floating-point
                // tolerance and survive marginal validity.
                warn!("unit {} has invalid geometry; keeping with caution", unit.id);
            }
            index.insert(unit.id.clone(), ids.len() as u32);
            ids.push(unit.id.clone());
            geoms.push(unit.geometry.clone());
        }

        let rtree = RTree::bulk_load(
            geoms
                .iter()
                .enumerate()
                .filter_map(|(i, mp)| mp.bounding_rect().map(|rect| BoundingBox::new(i, rect)))
                .collect(),
        );

        Self { ids, index, geoms, rtree, dropped }
    }

    /// Restrict to the rows in `keep` (in the given order), re-indexing from
    /// scratch so row positions stay dense.
    pub fn subset(&self, keep: &[usize]) -> Self {
        let ids: Vec<UnitId> = keep.iter().map(|&i| self.ids[i].clone()).collect();
        let geoms: Vec<MultiPolygon<f64>> = keep.iter().map(|&i| self.geoms[i].clone()).collect();
        let index = ids.iter().enumerate().map(|(i, id)| (id.clone(), i as u32)).collect();
        let rtree = RTree::bulk_load(
            geoms
                .iter()
                .enumerate()
                .filter_map(|(i, mp)| mp.bounding_rect().map(|rect| BoundingBox::new(i, rect)))
                .collect(),
        );
        Self { ids, index, geoms, rtree, dropped: Vec::new() }
    }

    #[inline] pub fn len(&self) -> usize { self.geoms.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.geoms.is_empty() }

    #[inline] pub fn ids(&self) -> &[UnitId] { &self.ids }

    #[inline] pub fn geoms(&self) -> &[MultiPolygon<f64>] { &self.geoms }

    /// Units excluded during screening, with reasons.
    #[inline] pub fn dropped(&self) -> &[(UnitId, String)] { &self.dropped }

    /// Row position of `id`, if present.
    #[inline]
    pub fn index_of(&self, id: &UnitId) -> Option<usize> {
        self.index.get(id).map(|&i| i as usize)
    }

    /// A point guaranteed to lie inside the unit's polygon, unlike the
    /// centroid of a concave or multi-part shape. `None` for degenerate
    /// geometry.
    #[inline]
    pub fn interior_point(&self, i: usize) -> Option<Point<f64>> {
        self.geoms[i].interior_point()
    }

    /// Query the R-tree for row indices whose bounding boxes intersect the
    /// given envelope.
    pub(crate) fn query(&self, envelope: &AABB<[f64; 2]>) -> impl Iterator<Item = usize> + '_ {
        self.rtree.locate_in_envelope_intersecting(envelope).map(|bb| bb.idx)
    }
}
