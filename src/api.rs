//! Library entry points mirroring the CLI verbs.

use crate::assignment::{BlockAssignment, VerificationReport};
use crate::deconv::{self, DeconvolutionMethod, DeconvolvedPeptideSet, StatisticalConfig};
use crate::design::BlockDesign;
use crate::error::{PfResult, PoolforgeError};
use crate::pairs::{find_levenshtein_pairs, DisallowedPairs, PreferredPair};
use crate::peptide::PeptideSet;
use crate::plate::PlateFormat;
use crate::readout::PoolReadout;
use crate::solver::{exact, heuristic, InitStrategy, SolverStrategy};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub num_peptides_per_pool: usize,
    pub num_coverage: usize,
    pub strategy: SolverStrategy,
    /// Pre-pool similar peptides so related sequences share first-round
    /// pools. Uses the built-in Levenshtein oracle.
    pub cluster_peptides: bool,
    pub max_levenshtein_distance: usize,
    pub init_strategy: InitStrategy,
    pub max_iters: usize,
    pub allow_extra_pools: bool,
    pub random_seed: u64,
    pub num_workers: usize,
    pub shuffle_iters: usize,
    pub max_peptides_per_block: usize,
    pub max_peptides_per_pool: usize,
    pub plate_format: PlateFormat,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            num_peptides_per_pool: 5,
            num_coverage: 3,
            strategy: SolverStrategy::Heuristic,
            cluster_peptides: false,
            max_levenshtein_distance: 3,
            init_strategy: InitStrategy::Greedy,
            max_iters: heuristic::DEFAULT_MAX_ITERS,
            allow_extra_pools: false,
            random_seed: 42,
            num_workers: exact::DEFAULT_NUM_WORKERS,
            shuffle_iters: 1_000,
            max_peptides_per_block: 100,
            max_peptides_per_pool: 10,
            plate_format: PlateFormat::Wells96,
        }
    }
}

/// Generates a pooled assignment for the peptides, verifies it, and
/// assigns plate wells. Returns the assignment together with the design
/// it was solved against.
pub fn generate(
    peptides: PeptideSet,
    config: &GenerateConfig,
) -> PfResult<(BlockAssignment, BlockDesign)> {
    let preferred_pairs = if config.cluster_peptides {
        let pairs = find_levenshtein_pairs(&peptides, config.max_levenshtein_distance);
        info!(
            num_pairs = pairs.len(),
            "Identified similar peptide pairs."
        );
        pairs
    } else {
        Vec::new()
    };

    let design = BlockDesign::new(
        peptides,
        config.num_peptides_per_pool,
        config.num_coverage,
        DisallowedPairs::new(),
        preferred_pairs,
    )?;

    let mut assignment = match config.strategy {
        SolverStrategy::Heuristic => heuristic::solve(
            &design,
            &heuristic::HeuristicSolverConfig {
                random_seed: config.random_seed,
                strategy: config.init_strategy,
                max_iters: config.max_iters,
                allow_extra_pools: config.allow_extra_pools,
            },
        )?,
        SolverStrategy::Exact => solve_exact(&design, config)?,
    };

    let report = assignment.verify(config.num_peptides_per_pool, config.num_coverage);
    if report.is_optimal() {
        info!("The assignment meets all design constraints.");
    } else {
        for violation in &report.violations {
            warn!(%violation, "Design constraint not met.");
        }
    }

    assignment.assign_well_ids(config.plate_format);
    Ok((assignment, design))
}

/// Exact-strategy orchestration: optional preferred-pair packing for the
/// first coverage, block division, per-block constraint solves with
/// disjoint ID namespaces inside each group, Monte-Carlo violation
/// minimization across groups, and a final merge.
fn solve_exact(design: &BlockDesign, config: &GenerateConfig) -> PfResult<BlockAssignment> {
    let mut rng = fastrand::Rng::with_seed(config.random_seed);

    // Preferred pairs are honored by packing them into coverage 1, then
    // banning those co-occurrences from the remaining coverages.
    let (seed_assignment, solve_design, start_pool_id, start_coverage_id) =
        if design.preferred_pairs().is_empty() {
            (None, design.clone(), 1u32, 1u32)
        } else {
            let first = first_coverage_assignment(
                design.peptides(),
                design.preferred_pairs(),
                design.num_peptides_per_pool(),
                &mut rng,
            );
            let mut disallowed = design.disallowed_pairs().clone();
            for (a, b) in first.pooled_peptide_pairs() {
                disallowed.insert(&a, &b);
            }
            info!(
                num_disallowed = disallowed.len(),
                "Banned first-coverage co-occurrences from later coverages."
            );
            let reduced = BlockDesign::new(
                design.peptides().clone(),
                design.num_peptides_per_pool(),
                design.num_coverage() - 1,
                disallowed,
                Vec::new(),
            )?;
            let next_pool = first.num_pools() as u32 + 1;
            (Some(first), reduced, next_pool, 2u32)
        };

    let groups = solve_design.divide(config.max_peptides_per_block, config.max_peptides_per_pool)?;

    let mut assignments: Vec<BlockAssignment> = Vec::new();
    if let Some(first) = seed_assignment {
        assignments.push(first);
    }
    let mut solve_index = 0u64;
    for group in &groups {
        // Groups deliberately share a pool namespace; the relabeling
        // search below resolves the collisions the merge would create.
        let mut next_pool_id = start_pool_id;
        for block in group {
            info!(
                num_peptides = block.num_peptides(),
                pool_size = block.num_peptides_per_pool(),
                num_coverage = block.num_coverage(),
                "Solving block."
            );
            solve_index += 1;
            let solved = exact::solve(
                block,
                &exact::ExactSolverConfig {
                    random_seed: config.random_seed.wrapping_add(solve_index),
                    num_workers: config.num_workers,
                    node_budget: exact::DEFAULT_NODE_BUDGET,
                },
            )?;
            let renumbered = solved.update_ids(next_pool_id, start_coverage_id);
            next_pool_id += renumbered.num_pools() as u32;
            assignments.push(renumbered);
        }
    }

    let assignments =
        BlockAssignment::minimize_violations(&assignments, config.shuffle_iters, &mut rng);
    Ok(BlockAssignment::merge(&assignments))
}

/// Packs transitive preferred-pair clusters into shared pools for a
/// single coverage round, first-fit, then fills with the rest of the
/// roster in order.
fn first_coverage_assignment(
    peptides: &PeptideSet,
    preferred_pairs: &[PreferredPair],
    num_peptides_per_pool: usize,
    rng: &mut fastrand::Rng,
) -> BlockAssignment {
    use crate::pairs::compute_transitive_neighbors;

    let num_pools = peptides.len().div_ceil(num_peptides_per_pool);
    let mut pools: Vec<Vec<String>> = vec![Vec::with_capacity(num_peptides_per_pool); num_pools];
    let mut placed: Vec<String> = Vec::new();

    let place = |pools: &mut Vec<Vec<String>>, peptide_id: &str| {
        for pool in pools.iter_mut() {
            if pool.len() < num_peptides_per_pool {
                pool.push(peptide_id.to_string());
                return;
            }
        }
    };

    for mut cluster in compute_transitive_neighbors(preferred_pairs) {
        rng.shuffle(&mut cluster);
        for peptide_id in cluster {
            place(&mut pools, &peptide_id);
            placed.push(peptide_id);
        }
    }
    for peptide in peptides.iter() {
        if !placed.contains(&peptide.id) {
            place(&mut pools, &peptide.id);
        }
    }

    let mut assignment = BlockAssignment::new();
    for (pool_idx, pool) in pools.iter().enumerate() {
        for peptide_id in pool {
            let sequence = peptides.sequence_of(peptide_id).unwrap_or_default();
            assignment.add_peptide(1, pool_idx as u32 + 1, peptide_id.clone(), sequence);
        }
    }
    assignment
}

/// Deconvolves a readout against an assignment. Thin dispatch over the
/// method-specific engines.
pub fn deconvolve(
    readout: &PoolReadout,
    assignment: &BlockAssignment,
    method: DeconvolutionMethod,
    min_coverage: usize,
    min_pool_spot_count: f64,
    statistical: &StatisticalConfig,
) -> PfResult<DeconvolvedPeptideSet> {
    if readout.is_empty() {
        return Err(PoolforgeError::Config(
            "The readout contains no pool spot counts.".into(),
        ));
    }
    deconv::deconvolve(
        readout,
        assignment,
        method,
        min_coverage,
        min_pool_spot_count,
        statistical,
    )
}

/// Verifies an assignment against the design parameters.
pub fn verify(
    assignment: &BlockAssignment,
    num_peptides_per_pool: usize,
    num_coverage: usize,
) -> VerificationReport {
    assignment.verify(num_peptides_per_pool, num_coverage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peptide::Peptide;

    fn peptides(n: usize) -> PeptideSet {
        PeptideSet::new(
            (1..=n)
                .map(|i| Peptide::new(format!("peptide_{i}"), "A".repeat(9)))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn heuristic_generate_covers_all_peptides() {
        let config = GenerateConfig::default();
        let (assignment, design) = generate(peptides(25), &config).unwrap();
        assert_eq!(assignment.num_peptides(), 25);
        assert_eq!(design.num_peptides(), 25);
        assert!(!assignment.plate_map().is_empty());
        for id in assignment.peptide_ids() {
            assert_eq!(assignment.pool_ids_for_peptide(&id).len(), 3);
        }
    }

    #[test]
    fn exact_generate_is_violation_free() {
        let config = GenerateConfig {
            strategy: SolverStrategy::Exact,
            num_peptides_per_pool: 2,
            num_coverage: 2,
            ..Default::default()
        };
        let (assignment, _) = generate(peptides(10), &config).unwrap();
        assert_eq!(assignment.num_violations(), 0);
        assert!(verify(&assignment, 2, 2).is_optimal());
    }

    #[test]
    fn first_coverage_packs_clusters_together() {
        let roster = peptides(10);
        let preferred = vec![
            PreferredPair::new("peptide_1", "peptide_2", 1.0),
            PreferredPair::new("peptide_3", "peptide_4", 1.0),
        ];
        let mut rng = fastrand::Rng::with_seed(7);
        let assignment = first_coverage_assignment(&roster, &preferred, 5, &mut rng);
        assert_eq!(assignment.num_pools(), 2);
        assert_eq!(
            assignment.pool_ids_for_peptide("peptide_1"),
            assignment.pool_ids_for_peptide("peptide_2")
        );
        assert_eq!(assignment.num_peptides(), 10);
    }
}
