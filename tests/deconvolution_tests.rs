use poolforge::assignment::BlockAssignment;
use poolforge::deconv::{self, DeconvolutionLabel, DeconvolutionMethod, StatisticalConfig};
use poolforge::readout::PoolReadout;
use rstest::rstest;

/// 9 peptides, 3 per pool, 2x coverage, unique pool combinations:
/// rows of a 3x3 grid in round 1, columns in round 2.
fn grid_assignment() -> BlockAssignment {
    let mut a = BlockAssignment::new();
    for i in 0..9u32 {
        let id = format!("peptide_{}", i + 1);
        a.add_peptide(1, 1 + i / 3, id.clone(), "");
        a.add_peptide(2, 4 + i % 3, id, "");
    }
    a
}

fn readout_for(assignment: &BlockAssignment, positives: &[&str], signal: f64) -> PoolReadout {
    let mut readout = PoolReadout::new();
    for pool_id in assignment.pool_ids() {
        readout.insert(pool_id, 15.0);
    }
    for positive in positives {
        for pool_id in assignment.pool_ids_for_peptide(positive) {
            readout.insert(pool_id, signal);
        }
    }
    readout
}

#[rstest]
#[case(DeconvolutionMethod::Empirical)]
#[case(DeconvolutionMethod::Em)]
#[case(DeconvolutionMethod::Lasso)]
#[case(DeconvolutionMethod::ConstrainedEm)]
fn every_method_finds_a_lone_positive(#[case] method: DeconvolutionMethod) {
    let assignment = grid_assignment();
    let readout = readout_for(&assignment, &["peptide_5"], 500.0);

    let result = deconv::deconvolve(
        &readout,
        &assignment,
        method,
        2,
        100.0,
        &StatisticalConfig::default(),
    )
    .unwrap();

    assert_ne!(
        result.get("peptide_5").unwrap().label,
        DeconvolutionLabel::NotAHit,
        "{method}"
    );
    assert_eq!(result.peptides.len(), 9, "{method}");
}

#[rstest]
#[case(DeconvolutionMethod::Em)]
#[case(DeconvolutionMethod::Lasso)]
fn statistical_estimates_replace_hit_pool_counts(#[case] method: DeconvolutionMethod) {
    let assignment = grid_assignment();
    let readout = readout_for(&assignment, &["peptide_5"], 500.0);

    let result = deconv::deconvolve(
        &readout,
        &assignment,
        method,
        2,
        100.0,
        &StatisticalConfig::default(),
    )
    .unwrap();

    // The empirical path would report 2.0 (the hit-pool count); the
    // statistical estimate tracks the actual signal instead.
    let estimate = result.get("peptide_5").unwrap().estimated_spot_count;
    assert!(estimate > 100.0, "{method}: {estimate}");
}

#[test]
fn two_positives_sharing_a_pool_stay_separable() {
    let assignment = grid_assignment();
    // peptide_1 and peptide_2 share pool 1 in round 1 but differ in
    // round 2, so the design still tells them apart.
    let readout = readout_for(&assignment, &["peptide_1", "peptide_2"], 500.0);

    let result = deconv::deconvolve(
        &readout,
        &assignment,
        DeconvolutionMethod::Empirical,
        2,
        100.0,
        &StatisticalConfig::default(),
    )
    .unwrap();

    for positive in ["peptide_1", "peptide_2"] {
        assert_ne!(
            result.get(positive).unwrap().label,
            DeconvolutionLabel::NotAHit
        );
    }
    // peptide_3 shares the round-1 pool with both positives but its
    // round-2 pool is quiet.
    assert_eq!(
        result.get("peptide_3").unwrap().label,
        DeconvolutionLabel::NotAHit
    );
}

#[test]
fn noisy_background_never_reaches_hit_status() {
    let assignment = grid_assignment();
    let mut readout = PoolReadout::new();
    for (i, pool_id) in assignment.pool_ids().into_iter().enumerate() {
        readout.insert(pool_id, 10.0 + i as f64);
    }

    let result = deconv::deconvolve(
        &readout,
        &assignment,
        DeconvolutionMethod::Empirical,
        2,
        100.0,
        &StatisticalConfig::default(),
    )
    .unwrap();

    assert!(result.confident_hits().is_empty());
    assert!(result.candidate_hits().is_empty());
}
