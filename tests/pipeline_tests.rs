use poolforge::api::{self, GenerateConfig};
use poolforge::assignment::BlockAssignment;
use poolforge::deconv::{DeconvolutionLabel, DeconvolutionMethod, StatisticalConfig};
use poolforge::peptide::{Peptide, PeptideSet};
use poolforge::readout::PoolReadout;
use poolforge::solver::SolverStrategy;
use std::fs::File;
use std::io::Write;

fn roster(n: usize) -> PeptideSet {
    PeptideSet::new(
        (1..=n)
            .map(|i| Peptide::new(format!("peptide_{i}"), "YMDGTMSQV"))
            .collect(),
    )
    .unwrap()
}

/// Simulates an assay: pools holding a positive peptide read high,
/// everything else reads background.
fn simulate_readout(assignment: &BlockAssignment, positives: &[&str]) -> PoolReadout {
    let mut readout = PoolReadout::new();
    for pool_id in assignment.pool_ids() {
        readout.insert(pool_id, 20.0);
    }
    for positive in positives {
        for pool_id in assignment.pool_ids_for_peptide(positive) {
            readout.insert(pool_id, 600.0);
        }
    }
    readout
}

#[test]
fn generate_then_deconvolve_recovers_the_positive() {
    let config = GenerateConfig {
        num_peptides_per_pool: 5,
        num_coverage: 3,
        ..Default::default()
    };
    let (assignment, _) = api::generate(roster(25), &config).unwrap();

    let readout = simulate_readout(&assignment, &["peptide_13"]);
    let result = api::deconvolve(
        &readout,
        &assignment,
        DeconvolutionMethod::Empirical,
        3,
        300.0,
        &StatisticalConfig::default(),
    )
    .unwrap();

    let hit = result.get("peptide_13").unwrap();
    assert_ne!(hit.label, DeconvolutionLabel::NotAHit);
    assert_eq!(hit.hit_pool_ids.len(), 3);
}

#[test]
fn exact_pipeline_yields_confident_hit() {
    let config = GenerateConfig {
        num_peptides_per_pool: 2,
        num_coverage: 2,
        strategy: SolverStrategy::Exact,
        ..Default::default()
    };
    let (assignment, _) = api::generate(roster(10), &config).unwrap();
    assert_eq!(assignment.num_violations(), 0);

    let readout = simulate_readout(&assignment, &["peptide_4"]);
    let result = api::deconvolve(
        &readout,
        &assignment,
        DeconvolutionMethod::Empirical,
        2,
        300.0,
        &StatisticalConfig::default(),
    )
    .unwrap();

    // Zero violations means peptide_4's pool combination is unique, so
    // the call must be confident.
    assert_eq!(
        result.get("peptide_4").unwrap().label,
        DeconvolutionLabel::ConfidentHit
    );
    for p in &result.peptides {
        if p.peptide.id != "peptide_4" {
            assert_eq!(p.label, DeconvolutionLabel::NotAHit, "{}", p.peptide.id);
        }
    }
}

#[test]
fn constrained_em_gates_against_background() {
    let config = GenerateConfig {
        num_peptides_per_pool: 2,
        num_coverage: 2,
        strategy: SolverStrategy::Exact,
        ..Default::default()
    };
    let (assignment, _) = api::generate(roster(10), &config).unwrap();
    let readout = simulate_readout(&assignment, &["peptide_4", "peptide_7"]);

    let result = api::deconvolve(
        &readout,
        &assignment,
        DeconvolutionMethod::ConstrainedEm,
        2,
        300.0,
        &StatisticalConfig::default(),
    )
    .unwrap();

    assert!(result.background_spot_count.is_some());
    for positive in ["peptide_4", "peptide_7"] {
        let p = result.get(positive).unwrap();
        assert_ne!(p.label, DeconvolutionLabel::NotAHit, "{positive}");
    }
    // Every peptide gets a verdict, including the filtered-out ones.
    assert_eq!(result.peptides.len(), 10);
}

#[test]
fn assignment_survives_a_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = GenerateConfig::default();
    let (assignment, _) = api::generate(roster(25), &config).unwrap();

    let path = dir.path().join("assignment.csv");
    assignment.write_csv(&path).unwrap();
    let restored = BlockAssignment::read_csv(&path).unwrap();

    assert_eq!(restored.peptide_pools(), assignment.peptide_pools());
    assert_eq!(restored.plate_map(), assignment.plate_map());
    assert_eq!(restored.num_violations(), assignment.num_violations());
}

#[test]
fn deconvolution_results_export_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let config = GenerateConfig::default();
    let (assignment, _) = api::generate(roster(25), &config).unwrap();
    let readout = simulate_readout(&assignment, &["peptide_2"]);

    let result = api::deconvolve(
        &readout,
        &assignment,
        DeconvolutionMethod::Empirical,
        3,
        300.0,
        &StatisticalConfig::default(),
    )
    .unwrap();

    let path = dir.path().join("deconvolved.csv");
    result.write_csv(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next().unwrap(),
        "peptide_id,peptide_sequence,estimated_peptide_spot_count,hit_pool_ids,hit_pools_count,deconvolution_result"
    );
    assert_eq!(lines.count(), 25);
}

#[test]
fn generate_is_deterministic_for_a_fixed_seed() {
    let config = GenerateConfig::default();
    let (a, _) = api::generate(roster(30), &config).unwrap();
    let (b, _) = api::generate(roster(30), &config).unwrap();
    assert_eq!(a.peptide_pools(), b.peptide_pools());
    assert_eq!(a.plate_map(), b.plate_map());
}

#[test]
fn readout_csv_feeds_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readout.csv");
    let mut file = File::create(&path).unwrap();
    writeln!(file, "pool_id,spot_count").unwrap();
    writeln!(file, "1,450").unwrap();
    writeln!(file, "2,12").unwrap();
    drop(file);

    let readout = PoolReadout::load_from_file(&path).unwrap();
    assert_eq!(readout.spot_count(1), Some(450.0));
    assert_eq!(readout.len(), 2);
}
