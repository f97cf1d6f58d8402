use criterion::{criterion_group, criterion_main, Criterion};
use poolforge::design::BlockDesign;
use poolforge::pairs::DisallowedPairs;
use poolforge::peptide::{Peptide, PeptideSet};
use poolforge::solver::heuristic::{self, HeuristicSolverConfig};
use poolforge::solver::InitStrategy;
use std::hint::black_box;

fn setup_design(num_peptides: usize) -> BlockDesign {
    let peptides = PeptideSet::new(
        (1..=num_peptides)
            .map(|i| Peptide::new(format!("peptide_{i}"), "ACDEFGHIK"))
            .collect(),
    )
    .unwrap();
    BlockDesign::new(peptides, 10, 3, DisallowedPairs::new(), Vec::new()).unwrap()
}

fn bench_heuristic_solver(c: &mut Criterion) {
    let design = setup_design(100);

    c.bench_function("heuristic_solve_100_peptides", |b| {
        b.iter(|| {
            let assignment = heuristic::solve(
                black_box(&design),
                &HeuristicSolverConfig {
                    random_seed: 42,
                    strategy: InitStrategy::Greedy,
                    max_iters: 500,
                    allow_extra_pools: false,
                },
            )
            .unwrap();
            black_box(assignment.num_violations())
        })
    });
}

fn bench_violation_counting(c: &mut Criterion) {
    let design = setup_design(200);
    let assignment = heuristic::solve(&design, &HeuristicSolverConfig::default()).unwrap();

    c.bench_function("count_violations_200_peptides", |b| {
        b.iter(|| black_box(&assignment).num_violations())
    });
}

criterion_group!(benches, bench_heuristic_solver, bench_violation_counting);
criterion_main!(benches);
