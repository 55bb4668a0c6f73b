mod common;

use ahash::AHashMap;
use golfscape::io::json::fit_table;
use golfscape::{
    compute_exposure, run_batch, run_metric, ExposureConfig, MlLag, PipelineConfig, PlanarUnits,
    ReferenceSite, UnitId, WeightsCache, SKIP_MISSING_EXPOSURE, SKIP_MISSING_METRIC,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::grid;

fn metric_values(units: &PlanarUnits, mut f: impl FnMut(usize, &UnitId) -> f64) -> AHashMap<UnitId, f64> {
    units
        .ids()
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), f(i, id)))
        .collect()
}

#[test]
fn full_run_on_grid_with_central_course() {
    let units = PlanarUnits::from_units(&grid(3, 3, 1000.0));
    let center_pt = units.interior_point(4).unwrap();
    let refs = vec![ReferenceSite::point("gc", center_pt.x(), center_pt.y())];
    let exposure = compute_exposure(&units, &refs, &ExposureConfig::default());

    // Value falls with distance from the course, plus deterministic jitter.
    let mut rng = StdRng::seed_from_u64(31);
    let noise: Vec<f64> = (0..units.len()).map(|_| rng.random_range(-0.05..0.05)).collect();
    let values = metric_values(&units, |i, _| 13.5 - exposure[i].distance_km + noise[i]);

    let mut cache = WeightsCache::new();
    let outcome = run_metric(
        &units,
        &exposure,
        &values,
        &MlLag::default(),
        &mut cache,
        &PipelineConfig::default(),
    )
    .unwrap();

    assert_eq!(outcome.ids.len(), 9);
    assert!(outcome.skip_reasons.is_empty());
    assert_eq!(outcome.z_fitted.len(), 9);
    assert_eq!(outcome.locals.len(), 9);
    assert_eq!(outcome.cluster_counts.iter().map(|(_, c)| c).sum::<usize>(), 9);

    // Closer to the course means a higher fitted value.
    let center = outcome.ids.iter().position(|id| id.as_str() == "r1c1").unwrap();
    let corner = outcome.ids.iter().position(|id| id.as_str() == "r0c0").unwrap();
    assert!(outcome.z_fitted[center] > outcome.z_fitted[corner]);

    // One unit set, one metric: exactly one weights build.
    assert_eq!(cache.len(), 1);
}

#[test]
fn skip_reasons_are_recorded_before_filtering() {
    let units = PlanarUnits::from_units(&grid(3, 3, 1000.0));
    let center_pt = units.interior_point(4).unwrap();
    let refs = vec![ReferenceSite::point("gc", center_pt.x(), center_pt.y())];
    let exposure = compute_exposure(&units, &refs, &ExposureConfig::default());

    let mut values = metric_values(&units, |i, _| 10.0 + i as f64);
    values.insert(UnitId::new("r0c2"), f64::NAN); // observed but unusable
    values.remove(&UnitId::new("r2c0")); // never observed

    let mut cache = WeightsCache::new();
    let outcome = run_metric(
        &units,
        &exposure,
        &values,
        &MlLag::default(),
        &mut cache,
        &PipelineConfig::default(),
    )
    .unwrap();

    assert_eq!(outcome.ids.len(), 7);
    assert_eq!(outcome.skip_reasons.len(), 2);
    for (id, reason) in &outcome.skip_reasons {
        assert!(
            id.as_str() == "r0c2" || id.as_str() == "r2c0",
            "unexpected skip: {id}"
        );
        assert_eq!(reason, SKIP_MISSING_METRIC);
    }
}

#[test]
fn missing_exposure_skips_with_the_domain_reason() {
    let units = PlanarUnits::from_units(&grid(2, 2, 1000.0));
    // No reference sites at all: distance is NaN for every unit.
    let exposure = compute_exposure(&units, &[], &ExposureConfig::default());
    let values = metric_values(&units, |i, _| i as f64);

    let mut cache = WeightsCache::new();
    let err = run_metric(
        &units,
        &exposure,
        &values,
        &MlLag::default(),
        &mut cache,
        &PipelineConfig::default(),
    )
    .unwrap_err();

    // Everything was skipped, so the fit itself cannot proceed...
    assert!(err.to_string().contains("nothing to fit"));
    // ...and the reason text matches what map tooltips show for these units.
    assert_eq!(SKIP_MISSING_EXPOSURE, "Missing golf exposure (no courses in range)");
}

#[test]
fn weights_cache_is_shared_across_metrics() {
    let units = PlanarUnits::from_units(&grid(3, 3, 1000.0));
    let center_pt = units.interior_point(4).unwrap();
    let refs = vec![ReferenceSite::point("gc", center_pt.x(), center_pt.y())];
    let exposure = compute_exposure(&units, &refs, &ExposureConfig::default());

    let mut rng = StdRng::seed_from_u64(63);
    let metric_a = metric_values(&units, |i, _| 20.0 - exposure[i].distance_km + rng.random_range(-0.1..0.1));
    let metric_b = metric_values(&units, |i, _| 5.0 + exposure[i].count as f64 + (i % 3) as f64);

    let mut cache = WeightsCache::new();
    let estimator = MlLag::default();
    let cfg = PipelineConfig::default();

    run_metric(&units, &exposure, &metric_a, &estimator, &mut cache, &cfg).unwrap();
    run_metric(&units, &exposure, &metric_b, &estimator, &mut cache, &cfg).unwrap();

    // Both metrics kept the same unit subset, so the second run reused the
    // cached weights instead of rebuilding.
    assert_eq!(cache.len(), 1);
}

#[test]
fn batch_isolates_failing_jobs() {
    let units = PlanarUnits::from_units(&grid(3, 3, 1000.0));
    let center_pt = units.interior_point(4).unwrap();
    let refs = vec![ReferenceSite::point("gc", center_pt.x(), center_pt.y())];
    let exposure_ok = compute_exposure(&units, &refs, &ExposureConfig::default());
    let exposure_missing = compute_exposure(&units, &[], &ExposureConfig::default());
    let values = metric_values(&units, |i, _| 10.0 - (i as f64) * 0.5);

    let estimator = MlLag::default();
    let cfg = PipelineConfig::default();

    type Job<'a> = Box<dyn FnOnce() -> anyhow::Result<golfscape::MetricOutcome> + 'a>;
    let ok_job: Job = Box::new(|| {
        let mut cache = WeightsCache::new();
        run_metric(&units, &exposure_ok, &values, &estimator, &mut cache, &cfg)
    });
    let failing_job: Job = Box::new(|| {
        let mut cache = WeightsCache::new();
        run_metric(&units, &exposure_missing, &values, &estimator, &mut cache, &cfg)
    });

    let results = run_batch(vec![
        ("vancouver/median_value".to_string(), ok_job),
        ("toronto/median_value".to_string(), failing_job),
    ]);

    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_ok());
    assert!(results[1].1.is_err(), "a failing job must not abort the batch");
}

#[test]
fn fit_export_is_strict_json() {
    let units = PlanarUnits::from_units(&grid(3, 3, 1000.0));
    let center_pt = units.interior_point(4).unwrap();
    let refs = vec![ReferenceSite::point("gc", center_pt.x(), center_pt.y())];
    let exposure = compute_exposure(&units, &refs, &ExposureConfig::default());
    let mut rng = StdRng::seed_from_u64(17);
    let values = metric_values(&units, |i, _| 8.0 - exposure[i].distance_km + rng.random_range(-0.1..0.1));

    let mut cache = WeightsCache::new();
    let outcome = run_metric(
        &units,
        &exposure,
        &values,
        &MlLag::default(),
        &mut cache,
        &PipelineConfig::default(),
    )
    .unwrap();

    let table = fit_table(&outcome);
    let text = serde_json::to_string(&table).unwrap();
    assert!(!text.contains("NaN"), "strict JSON must not carry NaN literals");
    assert!(table["model"]["rho"].is_number() || table["model"]["rho"].is_null());
    assert_eq!(table["units"].as_object().unwrap().len(), 9);
}
