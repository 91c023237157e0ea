//! Property-Based Tests for sweepctl
//!
//! These tests verify:
//! - Generation state survives a write/read cycle
//! - The continuation decision is a pure function of (generation, max)
//! - Broadcasting unique results restores one value per original row
//! - Rendered calibration values read back exactly

use proptest::prelude::*;
use std::collections::BTreeSet;

use sweepctl::collect::IndicatorValue;
use sweepctl::materialize::{parse_calibration, InputTemplate, JobMaterializer};
use sweepctl::{
    ChangeType, ContinuationDecider, ContinuationSignal, Generation, GenerationStateStore,
    Parameter, ProblemDefinition, SampleMatrix, SpatialIndex, UniqueSampleSet,
};
use tempfile::tempdir;

// =============================================================================
// Generation state
// =============================================================================

proptest! {
    #[test]
    fn generation_state_roundtrip(value in 0u32..1_000_000) {
        let dir = tempdir().unwrap();
        let store = GenerationStateStore::new(dir.path().join("iteration.state"));
        store.write(Generation::new(value)).unwrap();
        prop_assert_eq!(store.read_required().unwrap(), Generation::new(value));
        prop_assert_eq!(store.read_or_default().unwrap(), Generation::new(value));
    }

    #[test]
    fn generation_next_is_successor(value in 0u32..u32::MAX) {
        prop_assert_eq!(Generation::new(value).next().unwrap().value(), value + 1);
    }
}

// =============================================================================
// Continuation
// =============================================================================

proptest! {
    /// Decision depends only on (generation, max)
    #[test]
    fn decide_truth_table(generation in 0u32..50, max in 0u32..50) {
        let signal = ContinuationSignal::decide(Generation::new(generation), max);
        prop_assert_eq!(signal.is_continue(), generation < max);
    }

    /// The sentinel reads back as the decision just written, whatever it held before
    #[test]
    fn sentinel_reflects_latest_decision(
        generations in prop::collection::vec(0u32..10, 1..8),
        max in 0u32..10,
    ) {
        let dir = tempdir().unwrap();
        let decider = ContinuationDecider::new(dir.path().join("continue_signal.txt"), max);
        for g in generations {
            let written = decider.decide(Generation::new(g)).unwrap();
            prop_assert_eq!(written, ContinuationSignal::decide(Generation::new(g), max));
            prop_assert_eq!(decider.current().unwrap(), written);
        }
    }

    #[test]
    fn sentinel_content_roundtrip(continue_ in any::<bool>()) {
        let signal = if continue_ { ContinuationSignal::Continue } else { ContinuationSignal::Stop };
        prop_assert_eq!(ContinuationSignal::from_content(signal.content()), signal);
    }
}

// =============================================================================
// Deduplication and broadcast
// =============================================================================

/// Rows drawn from a small value pool so duplicates are common
fn matrix_strategy() -> impl Strategy<Value = SampleMatrix> {
    let cell = prop::sample::select(vec![0.0, -0.0, 0.25, 0.5, 1.0]);
    prop::collection::vec(prop::collection::vec(cell, 2), 1..40)
        .prop_map(|rows| SampleMatrix::from_rows(2, rows).unwrap())
}

proptest! {
    #[test]
    fn broadcast_restores_every_row(matrix in matrix_strategy()) {
        let unique = UniqueSampleSet::from_matrix(&matrix);
        prop_assert_eq!(unique.original_len(), matrix.len());
        prop_assert_eq!(unique.len() + unique.duplicate_count(), matrix.len());

        // Results are the vectors themselves: each row must get its own back
        let results: Vec<Vec<f64>> = unique.vectors().to_vec();
        let rows = unique.broadcast(&results).unwrap();
        prop_assert_eq!(rows.len(), matrix.len());
        for (row, value) in matrix.rows().iter().zip(&rows) {
            prop_assert_eq!(row, value);
        }
    }

    #[test]
    fn unique_vectors_are_distinct(matrix in matrix_strategy()) {
        let unique = UniqueSampleSet::from_matrix(&matrix);
        let keys: BTreeSet<Vec<u64>> = unique
            .vectors()
            .iter()
            .map(|v| v.iter().map(|x| (x + 0.0).to_bits()).collect())
            .collect();
        prop_assert_eq!(keys.len(), unique.len());
    }

    #[test]
    fn broadcast_rejects_wrong_length(matrix in matrix_strategy()) {
        let unique = UniqueSampleSet::from_matrix(&matrix);
        let short: Vec<usize> = (0..unique.len() - 1).collect();
        prop_assert!(unique.broadcast(&short).is_err());
    }
}

// =============================================================================
// Calibration artifacts
// =============================================================================

proptest! {
    #[test]
    fn calibration_values_roundtrip(
        esco in 0.0f64..1.0,
        cn2 in -20.0f64..20.0,
        ids in prop::collection::btree_set(1u64..200, 1..20),
    ) {
        let problem = ProblemDefinition::new(vec![
            Parameter::new("esco", ChangeType::Absval, 0.0, 1.0),
            Parameter::new("cn2", ChangeType::Pctchg, -20.0, 20.0)
                .with_scope(sweepctl::problem::SpatialScope::parse("hru|forest").unwrap()),
        ])
        .unwrap();
        let ids: Vec<u64> = ids.into_iter().collect();
        let mut spatial = SpatialIndex::new();
        spatial.insert("hru", "forest", ids.clone());

        let materializer = JobMaterializer::new(
            InputTemplate::Calibration { title: "calibration.cal".into() },
            spatial,
        );
        let text = materializer.render("run_0", &[esco, cn2], &problem).unwrap();
        let rows = parse_calibration(&text).unwrap();

        prop_assert_eq!(rows.len(), 2);
        prop_assert_eq!(rows[0].value, esco);
        prop_assert!(rows[0].units.is_empty());
        prop_assert_eq!(rows[1].value, cn2);
        prop_assert_eq!(rows[1].change_type, ChangeType::Pctchg);
        prop_assert_eq!(&rows[1].units, &ids);
    }

    /// Table cells: Display then parse is identity for finite values
    #[test]
    fn indicator_cell_roundtrip(v in -1e12f64..1e12) {
        let cell = IndicatorValue::Value(v);
        prop_assert_eq!(IndicatorValue::parse(&cell.to_string()), cell);
    }
}
