use ahash::AHashMap;
use anyhow::{anyhow, bail, Result};
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use log::warn;
use serde_json::{json, Map, Value};

use crate::geometry::PlanarUnits;
use crate::types::{ReferenceSite, SiteGeometry, SpatialUnit, UnitId};

/// Options for reading unit FeatureCollections.
#[derive(Debug, Clone)]
pub struct GeoJsonOptions {
    /// Property carrying the unit id. Census tract files use "CTUID".
    pub id_property: String,
}

impl Default for GeoJsonOptions {
    fn default() -> Self {
        Self { id_property: "CTUID".to_string() }
    }
}

/// Parse a GeoJSON FeatureCollection of polygonal units.
///
/// Geometry must already be in the pipeline's metric CRS. Numeric properties
/// become unit attributes; features with missing ids or non-polygonal
/// geometry are skipped with a warning, never fatal to the batch.
pub fn read_units(raw: &str, opts: &GeoJsonOptions) -> Result<Vec<SpatialUnit>> {
    let root: Value = serde_json::from_str(raw)?;
    let features = features_of(&root)?;

    let mut units = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let properties = feature.get("properties").and_then(Value::as_object);
        let Some(raw_id) = properties
            .and_then(|p| p.get(opts.id_property.as_str()))
            .and_then(value_as_id)
        else {
            warn!("feature {i} has no '{}' property; skipped", opts.id_property);
            continue;
        };

        let geometry = match feature.get("geometry").map(parse_multipolygon) {
            Some(Ok(mp)) => mp,
            Some(Err(err)) => {
                warn!("feature {i} ({raw_id}): {err}; skipped");
                continue;
            }
            None => {
                warn!("feature {i} ({raw_id}) has no geometry; skipped");
                continue;
            }
        };

        let mut unit = SpatialUnit::new(raw_id.as_str(), geometry);
        if let Some(props) = properties {
            for (name, value) in props {
                if name == opts.id_property.as_str() {
                    continue;
                }
                if let Some(v) = value.as_f64() {
                    unit.attributes.insert(name.clone(), v);
                }
            }
        }
        units.push(unit);
    }
    Ok(units)
}

/// Parse a GeoJSON FeatureCollection of reference sites (Point or Polygon
/// features). Ids come from a "gcid" property where present, otherwise the
/// feature index.
pub fn read_reference_sites(raw: &str) -> Result<Vec<ReferenceSite>> {
    let root: Value = serde_json::from_str(raw)?;
    let features = features_of(&root)?;

    let mut sites = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let properties = feature.get("properties").and_then(Value::as_object);
        let id = properties
            .and_then(|p| p.get("gcid"))
            .and_then(value_as_id)
            .unwrap_or_else(|| format!("gc{i}"));

        let Some(geometry) = feature.get("geometry") else {
            warn!("reference feature {i} has no geometry; skipped");
            continue;
        };
        let geometry = match geometry.get("type").and_then(Value::as_str) {
            Some("Point") => match parse_point(geometry) {
                Ok(p) => SiteGeometry::Point(p),
                Err(err) => {
                    warn!("reference feature {i}: {err}; skipped");
                    continue;
                }
            },
            _ => match parse_multipolygon(geometry) {
                Ok(mp) => SiteGeometry::Footprint(mp),
                Err(err) => {
                    warn!("reference feature {i}: {err}; skipped");
                    continue;
                }
            },
        };

        let mut site = ReferenceSite {
            id: UnitId::new(&id),
            geometry,
            name: None,
            opened: None,
        };
        if let Some(props) = properties {
            site.name = props.get("name").and_then(Value::as_str).map(str::to_string);
            site.opened = props.get("opened").and_then(Value::as_i64).map(|v| v as i32);
        }
        sites.push(site);
    }
    Ok(sites)
}

/// Export per-unit results as a GeoJSON FeatureCollection: each feature gets
/// the unit geometry, its id, and whatever properties the caller attached.
/// Property values must already be JSON-safe (see `io::json::num_or_null`).
pub fn write_feature_collection(
    units: &PlanarUnits,
    properties: &AHashMap<UnitId, Map<String, Value>>,
) -> Value {
    let features: Vec<Value> = units
        .ids()
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let mut props = properties.get(id).cloned().unwrap_or_default();
            props.insert("id".to_string(), json!(id.as_str()));
            json!({
                "type": "Feature",
                "geometry": multipolygon_to_value(&units.geoms()[i]),
                "properties": props,
            })
        })
        .collect();

    json!({ "type": "FeatureCollection", "features": features })
}

fn features_of(root: &Value) -> Result<&Vec<Value>> {
    if root.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        bail!("expected a GeoJSON FeatureCollection");
    }
    root.get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("FeatureCollection has no features array"))
}

/// Unit ids arrive as strings or bare numbers depending on the writer.
fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_position(value: &Value) -> Result<Coord<f64>> {
    let coords = value.as_array().ok_or_else(|| anyhow!("position is not an array"))?;
    let (Some(x), Some(y)) = (
        coords.first().and_then(Value::as_f64),
        coords.get(1).and_then(Value::as_f64),
    ) else {
        bail!("position is missing x/y");
    };
    Ok(Coord { x, y })
}

fn parse_ring(value: &Value) -> Result<LineString<f64>> {
    let positions = value.as_array().ok_or_else(|| anyhow!("ring is not an array"))?;
    let coords: Vec<Coord<f64>> = positions.iter().map(parse_position).collect::<Result<_>>()?;
    Ok(LineString(coords))
}

fn parse_polygon_rings(value: &Value) -> Result<Polygon<f64>> {
    let rings = value.as_array().ok_or_else(|| anyhow!("polygon has no rings"))?;
    let mut parsed = rings.iter().map(parse_ring);
    let exterior = parsed.next().ok_or_else(|| anyhow!("polygon has no exterior ring"))??;
    let interiors: Vec<LineString<f64>> = parsed.collect::<Result<_>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_point(geometry: &Value) -> Result<Point<f64>> {
    let coord = parse_position(
        geometry.get("coordinates").ok_or_else(|| anyhow!("Point has no coordinates"))?,
    )?;
    Ok(Point(coord))
}

/// Accepts Polygon or MultiPolygon geometry objects.
fn parse_multipolygon(geometry: &Value) -> Result<MultiPolygon<f64>> {
    let coords = geometry
        .get("coordinates")
        .ok_or_else(|| anyhow!("geometry has no coordinates"))?;
    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => Ok(MultiPolygon(vec![parse_polygon_rings(coords)?])),
        Some("MultiPolygon") => {
            let polys = coords.as_array().ok_or_else(|| anyhow!("MultiPolygon has no polygons"))?;
            Ok(MultiPolygon(polys.iter().map(parse_polygon_rings).collect::<Result<_>>()?))
        }
        other => bail!("unsupported geometry type: {other:?}"),
    }
}

fn ring_to_value(ring: &LineString<f64>) -> Value {
    Value::Array(ring.0.iter().map(|c| json!([c.x, c.y])).collect())
}

fn multipolygon_to_value(mp: &MultiPolygon<f64>) -> Value {
    let polygons: Vec<Value> = mp
        .0
        .iter()
        .map(|poly| {
            let mut rings = vec![ring_to_value(poly.exterior())];
            rings.extend(poly.interiors().iter().map(ring_to_value));
            Value::Array(rings)
        })
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": polygons })
}
