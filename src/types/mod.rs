mod unit_id;

pub use unit_id::{normalize_unit_id, UnitId};

use ahash::AHashMap;
use geo::{BoundingRect, Distance, Euclidean, Intersects, MultiPolygon, Point, Rect};
use serde::{Deserialize, Serialize};

/// A single areal unit (e.g. a census tract) in a metric CRS.
///
/// `attributes` maps metric names to values; absent metrics are simply not
/// present, a stored NaN means "observed but unusable".
#[derive(Debug, Clone)]
pub struct SpatialUnit {
    pub id: UnitId,
    pub geometry: MultiPolygon<f64>,
    pub attributes: AHashMap<String, f64>,
}

impl SpatialUnit {
    pub fn new(id: impl Into<UnitId>, geometry: MultiPolygon<f64>) -> Self {
        Self { id: id.into(), geometry, attributes: AHashMap::new() }
    }

    pub fn with_attribute(mut self, name: &str, value: f64) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }
}

/// Footprint of a reference site: surveyed course boundaries where we have
/// them, a single coordinate where we only have a geocoded address.
#[derive(Debug, Clone)]
pub enum SiteGeometry {
    Point(Point<f64>),
    Footprint(MultiPolygon<f64>),
}

impl SiteGeometry {
    /// Axis-aligned bounds; `None` for an empty footprint.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            SiteGeometry::Point(p) => Some(Rect::new(p.0, p.0)),
            SiteGeometry::Footprint(mp) => mp.bounding_rect(),
        }
    }

    /// True if the site touches or overlaps the given unit polygon.
    pub fn intersects(&self, unit: &MultiPolygon<f64>) -> bool {
        match self {
            SiteGeometry::Point(p) => p.intersects(unit),
            SiteGeometry::Footprint(mp) => mp.intersects(unit),
        }
    }

    /// Planar distance in CRS units (meters) from `from` to this site.
    pub fn distance_from(&self, from: Point<f64>) -> f64 {
        match self {
            SiteGeometry::Point(p) => Euclidean.distance(from, *p),
            SiteGeometry::Footprint(mp) => Euclidean.distance(&from, mp),
        }
    }
}

/// A golf course (or comparable amenity) used as an exposure reference.
/// Never mutated by the pipeline.
#[derive(Debug, Clone)]
pub struct ReferenceSite {
    pub id: UnitId,
    pub geometry: SiteGeometry,
    pub name: Option<String>,
    /// Establishment year, where the source recorded one.
    pub opened: Option<i32>,
}

impl ReferenceSite {
    pub fn point(id: impl Into<UnitId>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            geometry: SiteGeometry::Point(Point::new(x, y)),
            name: None,
            opened: None,
        }
    }

    pub fn footprint(id: impl Into<UnitId>, mp: MultiPolygon<f64>) -> Self {
        Self { id: id.into(), geometry: SiteGeometry::Footprint(mp), name: None, opened: None }
    }
}

/// Neighbor relation used when building contiguity weights.
///
/// Queen: boundaries share at least one point (edge or corner touch).
/// Rook: boundaries share a positive-length edge. Rook ⊆ Queen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContiguityMode {
    Queen,
    Rook,
}

impl Default for ContiguityMode {
    fn default() -> Self {
        ContiguityMode::Queen
    }
}
