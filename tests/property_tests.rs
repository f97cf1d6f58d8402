use poolforge::assignment::BlockAssignment;
use poolforge::design::BlockDesign;
use poolforge::pairs::DisallowedPairs;
use poolforge::peptide::{Peptide, PeptideSet};
use poolforge::solver::heuristic::{self, HeuristicSolverConfig};
use poolforge::solver::InitStrategy;
use proptest::prelude::*;

fn roster(n: usize) -> PeptideSet {
    PeptideSet::new(
        (1..=n)
            .map(|i| Peptide::new(format!("peptide_{i}"), ""))
            .collect(),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Structural invariants of the heuristic solver, regardless of seed
    // or geometry: every peptide appears once per coverage round and no
    // pool exceeds its capacity.
    #[test]
    fn heuristic_respects_structure(
        num_peptides in 8usize..60,
        pool_size in 2usize..8,
        num_coverage in 1usize..4,
        seed in any::<u64>(),
    ) {
        prop_assume!(num_peptides >= pool_size);
        let design = BlockDesign::new(
            roster(num_peptides),
            pool_size,
            num_coverage,
            DisallowedPairs::new(),
            Vec::new(),
        ).unwrap();
        let assignment = heuristic::solve(
            &design,
            &HeuristicSolverConfig {
                random_seed: seed,
                strategy: InitStrategy::Random,
                max_iters: 200,
                allow_extra_pools: false,
            },
        ).unwrap();

        prop_assert_eq!(assignment.num_peptides(), num_peptides);
        for id in assignment.peptide_ids() {
            prop_assert_eq!(assignment.pool_ids_for_peptide(&id).len(), num_coverage);
        }
        for (_, members) in assignment.pool_members() {
            prop_assert!(members.len() <= pool_size);
        }
    }

    // Pool-ID relabeling never changes the violation count; only the
    // numeric namespace moves.
    #[test]
    fn shuffle_preserves_violations(
        num_peptides in 8usize..40,
        pool_size in 2usize..6,
        seed in any::<u64>(),
    ) {
        prop_assume!(num_peptides >= pool_size);
        let design = BlockDesign::new(
            roster(num_peptides),
            pool_size,
            2,
            DisallowedPairs::new(),
            Vec::new(),
        ).unwrap();
        let mut assignment = heuristic::solve(
            &design,
            &HeuristicSolverConfig {
                random_seed: seed,
                strategy: InitStrategy::Random,
                max_iters: 50,
                allow_extra_pools: false,
            },
        ).unwrap();

        let before = assignment.num_violations();
        let combos_before = assignment.duplicate_combination_groups().len();
        let mut rng = fastrand::Rng::with_seed(seed ^ 0x5eed);
        assignment.shuffle_pool_ids(&mut rng);
        prop_assert_eq!(assignment.num_violations(), before);
        prop_assert_eq!(assignment.duplicate_combination_groups().len(), combos_before);
    }

    // Renumbering produces consecutive IDs from the requested offsets
    // and keeps the topology intact.
    #[test]
    fn update_ids_is_an_order_preserving_relabeling(
        num_peptides in 6usize..30,
        pool_size in 2usize..5,
        start_pool in 1u32..500,
        start_coverage in 1u32..10,
    ) {
        prop_assume!(num_peptides >= pool_size);
        let design = BlockDesign::new(
            roster(num_peptides),
            pool_size,
            2,
            DisallowedPairs::new(),
            Vec::new(),
        ).unwrap();
        let assignment = heuristic::solve(&design, &HeuristicSolverConfig::default()).unwrap();

        let updated = assignment.update_ids(start_pool, start_coverage);
        let pool_ids = updated.pool_ids();
        let expected: Vec<u32> = (start_pool..start_pool + pool_ids.len() as u32).collect();
        prop_assert_eq!(pool_ids, expected);
        prop_assert_eq!(updated.coverage_ids(), vec![start_coverage, start_coverage + 1]);
        prop_assert_eq!(updated.num_violations(), assignment.num_violations());
    }

    // Merging sub-assignments over disjoint peptides and disjoint pool
    // namespaces never invents violations.
    #[test]
    fn disjoint_merge_adds_no_violations(
        half in 6usize..20,
        pool_size in 2usize..5,
    ) {
        prop_assume!(half >= pool_size);
        let make = |offset: usize| {
            let peptides = PeptideSet::new(
                (1..=half)
                    .map(|i| Peptide::new(format!("peptide_{}", offset + i), ""))
                    .collect(),
            ).unwrap();
            let design = BlockDesign::new(
                peptides,
                pool_size,
                2,
                DisallowedPairs::new(),
                Vec::new(),
            ).unwrap();
            heuristic::solve(&design, &HeuristicSolverConfig::default()).unwrap()
        };
        let a = make(0);
        let b_raw = make(half);
        let b = b_raw.update_ids(a.num_pools() as u32 + 1, 1);

        let merged = BlockAssignment::merge(&[a.clone(), b.clone()]);
        prop_assert_eq!(
            merged.num_violations(),
            a.num_violations() + b.num_violations()
        );
        prop_assert_eq!(merged.num_peptides(), half * 2);
    }
}
