use std::fs::File;
use std::path::Path;

use ahash::AHashMap;
use anyhow::{Context, Result};
use log::warn;
use polars::frame::DataFrame;
use polars::io::SerReader;
use polars::prelude::{CsvReadOptions, CsvReader, DataType};

use crate::types::{ReferenceSite, UnitId};

/// Coordinate header pairs accepted in reference CSVs, checked in order.
/// Scraped sources disagree on naming.
const COORD_HEADERS: [(&str, &str); 3] = [("latitude", "longitude"), ("lat", "lon"), ("lat", "lng")];

/// Read reference sites (golf courses) from a CSV of coordinates.
///
/// `project` maps source (lon, lat) to the metric CRS the rest of the
/// pipeline runs in; reprojection itself lives with the upstream tooling,
/// so already-projected inputs pass the identity. Rows with missing
/// coordinates are dropped. A file without recognizable coordinate columns
/// yields an empty set with a warning, not an error — downstream exposure
/// then reports NaN distances, which is the honest answer.
pub fn read_reference_sites(path: &Path, project: impl Fn(f64, f64) -> (f64, f64)) -> Result<Vec<ReferenceSite>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open reference CSV: {}", path.display()))?;
    let df = CsvReader::new(file)
        .with_options(CsvReadOptions::default())
        .finish()?;
    reference_sites_from_dataframe(&df, project)
}

/// See [`read_reference_sites`]; operates on an already-loaded DataFrame.
pub fn reference_sites_from_dataframe(
    df: &DataFrame,
    project: impl Fn(f64, f64) -> (f64, f64),
) -> Result<Vec<ReferenceSite>> {
    let Some((lat_col, lon_col)) = COORD_HEADERS
        .iter()
        .find(|(lat, lon)| df.column(lat).is_ok() && df.column(lon).is_ok())
    else {
        warn!(
            "reference CSV missing lat/lon columns; found: {:?}",
            df.get_column_names()
        );
        return Ok(Vec::new());
    };

    let lat = df.column(lat_col)?.as_materialized_series().cast(&DataType::Float64)?;
    let lon = df.column(lon_col)?.as_materialized_series().cast(&DataType::Float64)?;
    let lat = lat.f64()?;
    let lon = lon.f64()?;

    let ids = df.column("gcid").ok().and_then(|c| c.as_materialized_series().cast(&DataType::String).ok());
    let names = df.column("name").ok().and_then(|c| c.as_materialized_series().cast(&DataType::String).ok());
    let opened = df.column("opened").or_else(|_| df.column("year")).ok()
        .and_then(|c| c.as_materialized_series().cast(&DataType::Int32).ok());

    let mut sites = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let (Some(lat_v), Some(lon_v)) = (lat.get(row), lon.get(row)) else { continue };
        if !lat_v.is_finite() || !lon_v.is_finite() {
            continue;
        }
        let (x, y) = project(lon_v, lat_v);

        let id = ids
            .as_ref()
            .and_then(|s| s.str().ok().and_then(|ca| ca.get(row)).map(str::to_string))
            .unwrap_or_else(|| format!("gc{row}"));
        let mut site = ReferenceSite::point(id.as_str(), x, y);
        site.name = names
            .as_ref()
            .and_then(|s| s.str().ok().and_then(|ca| ca.get(row)).map(str::to_string));
        site.opened = opened.as_ref().and_then(|s| s.i32().ok().and_then(|ca| ca.get(row)));
        sites.push(site);
    }

    if sites.is_empty() {
        warn!("no usable coordinate rows in reference CSV after dropping missing values");
    }
    Ok(sites)
}

/// Read a per-unit attribute table: one row per unit, an id column, and any
/// number of numeric metric columns. Non-numeric columns other than the id
/// are skipped. Ids are canonicalized on the way in, so the table joins
/// cleanly against geometry loaded elsewhere.
pub fn read_attribute_table(path: &Path, id_column: &str) -> Result<AHashMap<UnitId, AHashMap<String, f64>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open attribute CSV: {}", path.display()))?;
    let df = CsvReader::new(file)
        .with_options(CsvReadOptions::default())
        .finish()?;
    attribute_table_from_dataframe(&df, id_column)
}

/// See [`read_attribute_table`]; operates on an already-loaded DataFrame.
pub fn attribute_table_from_dataframe(
    df: &DataFrame,
    id_column: &str,
) -> Result<AHashMap<UnitId, AHashMap<String, f64>>> {
    let ids = df
        .column(id_column)
        .with_context(|| format!("attribute table is missing id column '{id_column}'"))?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let ids = ids.str()?;

    let mut numeric: Vec<(String, polars::prelude::Series)> = Vec::new();
    for col in df.get_columns() {
        let name = col.name().to_string();
        if name == id_column {
            continue;
        }
        match col.as_materialized_series().cast(&DataType::Float64) {
            Ok(series) => numeric.push((name, series)),
            Err(_) => warn!("attribute column '{name}' is not numeric; skipped"),
        }
    }

    let mut table: AHashMap<UnitId, AHashMap<String, f64>> = AHashMap::with_capacity(df.height());
    for row in 0..df.height() {
        let Some(raw_id) = ids.get(row) else { continue };
        let id = UnitId::new(raw_id);
        let attrs = table.entry(id).or_default();
        for (name, series) in &numeric {
            if let Some(v) = series.f64()?.get(row) {
                attrs.insert(name.clone(), v);
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use polars::prelude::Column;

    use super::*;

    fn identity(lon: f64, lat: f64) -> (f64, f64) {
        (lon, lat)
    }

    #[test]
    fn accepts_alternate_coordinate_headers() {
        let df = DataFrame::new(vec![
            Column::new("lat".into(), vec![Some(49.25), None, Some(49.30)]),
            Column::new("lng".into(), vec![Some(-123.1), Some(-123.2), Some(-123.0)]),
            Column::new("name".into(), vec!["Langara", "Fraserview", "McCleery"]),
        ])
        .unwrap();

        let sites = reference_sites_from_dataframe(&df, identity).unwrap();
        // Row with a missing latitude is dropped.
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].name.as_deref(), Some("Langara"));
        assert_eq!(sites[1].name.as_deref(), Some("McCleery"));
    }

    #[test]
    fn missing_coordinate_columns_yield_empty_set() {
        let df = DataFrame::new(vec![
            Column::new("name".into(), vec!["somewhere"]),
            Column::new("city".into(), vec!["Vancouver"]),
        ])
        .unwrap();
        let sites = reference_sites_from_dataframe(&df, identity).unwrap();
        assert!(sites.is_empty());
    }

    #[test]
    fn projection_is_applied_to_coordinates() {
        let df = DataFrame::new(vec![
            Column::new("latitude".into(), vec![2.0]),
            Column::new("longitude".into(), vec![3.0]),
        ])
        .unwrap();
        let sites = reference_sites_from_dataframe(&df, |lon, lat| (lon * 100.0, lat * 100.0)).unwrap();
        match &sites[0].geometry {
            crate::types::SiteGeometry::Point(p) => {
                assert_eq!((p.x(), p.y()), (300.0, 200.0));
            }
            other => panic!("expected a point, got {other:?}"),
        }
    }

    #[test]
    fn attribute_table_normalizes_ids_and_keeps_numeric_columns() {
        let df = DataFrame::new(vec![
            Column::new("CTUID".into(), vec!["9330001.00", "9330002.01"]),
            Column::new("median_value".into(), vec![750000.0, 910000.0]),
            Column::new("city".into(), vec!["Vancouver", "Vancouver"]),
        ])
        .unwrap();

        let table = attribute_table_from_dataframe(&df, "CTUID").unwrap();
        let first = &table[&UnitId::new("9330001.0")];
        assert_eq!(first["median_value"], 750000.0);
        assert!(!first.contains_key("city"));
    }
}
