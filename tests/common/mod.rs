#![allow(dead_code)]

use geo::{polygon, MultiPolygon};
use golfscape::SpatialUnit;

/// Axis-aligned unit square with lower-left corner at (x0, y0).
pub fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![
        (x: x0, y: y0),
        (x: x0 + size, y: y0),
        (x: x0 + size, y: y0 + size),
        (x: x0, y: y0 + size),
        (x: x0, y: y0),
    ]])
}

/// A rows x cols lattice of touching squares with ids "r{row}c{col}",
/// row-major. Queen contiguity on this lattice gives the familiar 3/5/8
/// neighbor counts for corner/edge/interior cells.
pub fn grid(rows: usize, cols: usize, size: f64) -> Vec<SpatialUnit> {
    let mut units = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            units.push(SpatialUnit::new(
                format!("r{r}c{c}").as_str(),
                square(c as f64 * size, r as f64 * size, size),
            ));
        }
    }
    units
}
