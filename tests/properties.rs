mod common;

use std::collections::BTreeMap;

use common::{LoadRow, fleet_text};
use fuel_loads::{PipelineConfig, enrich, numeric};
use proptest::prelude::*;

fn liters_cell() -> impl Strategy<Value = String> {
    prop_oneof![
        6 => (1u32..600u32).prop_map(|l| l.to_string()),
        2 => (1u32..6000u32).prop_map(|l| format!("{},{}", l / 10, l % 10)),
        1 => (1u32..200u32).prop_map(|l| format!("-{l}")),
        1 => prop_oneof![Just(String::new()), Just("n/a".to_string()), Just("?".to_string())],
    ]
}

fn load_row() -> impl Strategy<Value = LoadRow> {
    (
        prop_oneof![Just("11"), Just("12"), Just("13")],
        1u32..=28,
        0u32..24,
        liters_cell(),
        5_000u32..60_000u32,
        prop_oneof![Just("Volvo"), Just("MB O500"), Just("Scania")],
    )
        .prop_map(|(vehicle, day, hour, liters, odometer, model)| {
            let mut row = LoadRow::new(
                &format!("{day:02}/04/2024"),
                vehicle,
                &liters,
                &odometer.to_string(),
            );
            row.time = format!("{hour:02}:30");
            row.model = model.to_string();
            row
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn enriched_records_respect_invariants(rows in proptest::collection::vec(load_row(), 1..40)) {
        let text = fleet_text(&rows, ';');
        let table = enrich(text.as_bytes(), "csv", &PipelineConfig::default())
            .expect("generated fleet file parses");
        prop_assert_eq!(table.len(), rows.len());

        for record in &table.records {
            prop_assert!(record.liters.is_none_or(|l| l >= 0.0));
            prop_assert!(!(record.is_bad_load && record.is_overconsumption));
            if record.liters.is_none_or(|l| l <= 0.0) || record.plausible_distance.is_none() {
                prop_assert!(record.efficiency_km_per_liter.is_none());
            }
        }

        let mut by_vehicle: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, record) in table.records.iter().enumerate() {
            if let Some(vehicle) = record.vehicle_id.as_deref() {
                by_vehicle.entry(vehicle).or_default().push(idx);
            }
        }
        for indices in by_vehicle.values_mut() {
            indices.sort_by_key(|idx| (table.records[*idx].timestamp, *idx));
            prop_assert!(table.records[indices[0]].distance_since_last_load.is_none());
            for pair in indices.windows(2) {
                let previous = &table.records[pair[0]];
                let current = &table.records[pair[1]];
                let expected = match (current.odometer, previous.odometer) {
                    (Some(now), Some(before)) => Some(now - before),
                    _ => None,
                };
                prop_assert_eq!(current.distance_since_last_load, expected);
            }
        }
    }

    #[test]
    fn clean_floats_survive_coercion_unchanged(values in proptest::collection::vec(-1.0e6f64..1.0e6, 1..50)) {
        let raw = values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        let cells = raw.iter().map(String::as_str).collect::<Vec<_>>();
        let column = numeric::coerce_column("liters", &cells, 0.30);
        prop_assert!(!column.report.locale_cleanup);
        let parsed = column.values.into_iter().collect::<Option<Vec<_>>>();
        prop_assert_eq!(parsed, Some(values));
    }
}
