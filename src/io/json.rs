use serde_json::{json, Map, Value};

use crate::exposure::ExposureRecord;
use crate::pipeline::MetricOutcome;

/// A JSON number, or null for NaN/Inf — strict JSON has no spelling for
/// non-finite floats, and a silent 0 would read as a real computed value.
pub fn num_or_null(x: f64) -> Value {
    serde_json::Number::from_f64(x).map_or(Value::Null, Value::Number)
}

/// Id-keyed exposure table: `{id: {"dist_to_gc_km": ..., "golf_count": ...}}`.
pub fn exposure_table(records: &[ExposureRecord]) -> Value {
    let mut table = Map::with_capacity(records.len());
    for r in records {
        table.insert(
            r.id.as_str().to_string(),
            json!({
                "dist_to_gc_km": num_or_null(r.distance_km),
                "golf_count": r.count,
            }),
        );
    }
    Value::Object(table)
}

/// Full fit export: per-unit fitted/residual/z values and cluster
/// diagnostics, plus the model block and skip reasons.
pub fn fit_table(outcome: &MetricOutcome) -> Value {
    let mut units = Map::with_capacity(outcome.ids.len());
    for (i, id) in outcome.ids.iter().enumerate() {
        let local = &outcome.locals[i];
        units.insert(
            id.as_str().to_string(),
            json!({
                "fitted": num_or_null(outcome.result.fitted[i]),
                "residual": num_or_null(outcome.result.residuals[i]),
                "z_fitted": num_or_null(outcome.z_fitted[i]),
                "local_I": num_or_null(local.local_i),
                "local_p": num_or_null(local.p_value),
                "cluster": local.label.as_str(),
            }),
        );
    }

    let coefficients: Map<String, Value> = outcome
        .result
        .coefficients
        .iter()
        .map(|(name, v)| (name.clone(), num_or_null(*v)))
        .collect();

    let skipped: Map<String, Value> = outcome
        .skip_reasons
        .iter()
        .map(|(id, reason)| (id.as_str().to_string(), json!(reason)))
        .collect();

    json!({
        "model": {
            "rho": num_or_null(outcome.result.rho),
            "coefficients": coefficients,
            "sigma2": num_or_null(outcome.result.sigma2),
            "log_likelihood": outcome.result.log_likelihood.map_or(Value::Null, num_or_null),
            "aic": outcome.result.aic.map_or(Value::Null, num_or_null),
            "pseudo_r2": num_or_null(outcome.result.pseudo_r2),
            "fallback": outcome.result.fallback.map(|r| r.to_string()),
            "global_moran": num_or_null(outcome.global_moran),
        },
        "clusters": Value::Object(
            outcome.cluster_counts.iter().map(|(k, v)| (k.to_string(), json!(v))).collect::<Map<_, _>>()
        ),
        "units": units,
        "skipped": skipped,
    })
}

#[cfg(test)]
mod tests {
    use crate::types::UnitId;

    use super::*;

    #[test]
    fn non_finite_numbers_become_null() {
        assert_eq!(num_or_null(f64::NAN), Value::Null);
        assert_eq!(num_or_null(f64::INFINITY), Value::Null);
        assert_eq!(num_or_null(1.5), json!(1.5));
    }

    #[test]
    fn exposure_table_sanitizes_missing_distances() {
        let records = vec![
            ExposureRecord { id: UnitId::new("a"), distance_km: 2.5, count: 1 },
            ExposureRecord { id: UnitId::new("b"), distance_km: f64::NAN, count: 0 },
        ];
        let table = exposure_table(&records);
        assert_eq!(table["a"]["dist_to_gc_km"], json!(2.5));
        assert_eq!(table["b"]["dist_to_gc_km"], Value::Null);
        assert_eq!(table["b"]["golf_count"], json!(0));
        // The serialized text must be strict JSON.
        assert!(serde_json::to_string(&table).is_ok());
    }
}
