mod common;

use std::sync::Arc;

use golfscape::{ContiguityMode, PlanarUnits, SpatialUnit, SpatialWeights, WeightsCache};

use common::{grid, square};

#[test]
fn queen_grid_has_expected_degrees() {
    let units = PlanarUnits::from_units(&grid(3, 3, 1.0));
    let w = SpatialWeights::build(&units, ContiguityMode::Queen).unwrap();

    let degree_of = |id: &str| w.degree(units.index_of(&id.into()).unwrap());
    assert_eq!(degree_of("r0c0"), 3); // corner
    assert_eq!(degree_of("r0c1"), 5); // edge
    assert_eq!(degree_of("r1c1"), 8); // center
}

#[test]
fn rook_grid_drops_diagonals() {
    let units = PlanarUnits::from_units(&grid(3, 3, 1.0));
    let w = SpatialWeights::build(&units, ContiguityMode::Rook).unwrap();

    let degree_of = |id: &str| w.degree(units.index_of(&id.into()).unwrap());
    assert_eq!(degree_of("r0c0"), 2);
    assert_eq!(degree_of("r0c1"), 3);
    assert_eq!(degree_of("r1c1"), 4);
}

#[test]
fn neighbor_relation_is_symmetric() {
    let units = PlanarUnits::from_units(&grid(4, 5, 1.0));
    let w = SpatialWeights::build(&units, ContiguityMode::Queen).unwrap();
    for i in 0..w.n() {
        for &j in w.neighbors(i) {
            assert!(
                w.neighbors(j as usize).contains(&(i as u32)),
                "asymmetric pair ({i}, {j})"
            );
        }
    }
}

#[test]
fn rows_sum_to_one_within_tolerance() {
    let units = PlanarUnits::from_units(&grid(4, 4, 1.0));
    let w = SpatialWeights::build(&units, ContiguityMode::Queen).unwrap();
    for i in 0..w.n() {
        let sum: f64 = w.row(i).map(|(_, wt)| wt).sum();
        assert!((sum - 1.0).abs() < 1e-9, "row {i} sums to {sum}");
    }
}

#[test]
fn rebuilding_yields_identical_neighbors() {
    let units = PlanarUnits::from_units(&grid(3, 4, 1.0));
    let a = SpatialWeights::build(&units, ContiguityMode::Queen).unwrap();
    let b = SpatialWeights::build(&units, ContiguityMode::Queen).unwrap();
    assert_eq!(a.n(), b.n());
    for i in 0..a.n() {
        assert_eq!(a.neighbors(i), b.neighbors(i));
    }
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn detached_unit_is_flagged_as_island() {
    let mut units = grid(2, 2, 1.0);
    units.push(SpatialUnit::new("offshore", square(50.0, 50.0, 1.0)));
    let planar = PlanarUnits::from_units(&units);
    let w = SpatialWeights::build(&planar, ContiguityMode::Queen).unwrap();

    assert!(w.has_islands());
    let island = w.islands()[0] as usize;
    assert_eq!(w.ids()[island].as_str(), "offshore");
    assert_eq!(w.degree(island), 0);
}

#[test]
fn cache_reuses_weights_for_identical_ordering_only() {
    let planar = PlanarUnits::from_units(&grid(3, 3, 1.0));
    let mut cache = WeightsCache::new();

    let a = cache.get_or_build(&planar, ContiguityMode::Queen).unwrap();
    let b = cache.get_or_build(&planar, ContiguityMode::Queen).unwrap();
    assert!(Arc::ptr_eq(&a, &b), "same ordering must hit the cache");
    assert_eq!(cache.len(), 1);

    // Same units, different order: the fingerprint must not match.
    let reordered: Vec<usize> = (0..planar.len()).rev().collect();
    let shuffled = planar.subset(&reordered);
    let c = cache.get_or_build(&shuffled, ContiguityMode::Queen).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(cache.len(), 2);

    // A different contiguity mode never reuses the Queen entry.
    let d = cache.get_or_build(&planar, ContiguityMode::Rook).unwrap();
    assert!(!Arc::ptr_eq(&a, &d));
    assert_eq!(cache.len(), 3);

    cache.invalidate();
    assert!(cache.is_empty());
}

#[test]
fn empty_geometry_is_dropped_with_reason() {
    let mut units = grid(2, 2, 1.0);
    units.push(SpatialUnit::new("ghost", geo::MultiPolygon(vec![])));
    let planar = PlanarUnits::from_units(&units);

    assert_eq!(planar.len(), 4);
    assert_eq!(planar.dropped().len(), 1);
    assert_eq!(planar.dropped()[0].0.as_str(), "ghost");
    assert_eq!(planar.dropped()[0].1, "empty geometry");
}
