//! Constraint-programming assignment search.
//!
//! The model has one boolean per (coverage, pool, peptide) triple with
//! three constraint families: each peptide sits in exactly one pool per
//! coverage, each pool holds exactly `num_peptides_per_pool` peptides,
//! and each peptide pair shares a pool at most once (never, for
//! disallowed pairs). The search is a seeded backtracking solver that
//! propagates the pair constraints as it places peptides; a portfolio of
//! workers with distinct seeds runs in parallel and the first solution
//! wins.

use crate::assignment::BlockAssignment;
use crate::design::BlockDesign;
use crate::error::{PfResult, PoolforgeError};
use crate::solver::SolveStatus;
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::{info, warn};

pub const DEFAULT_NUM_WORKERS: usize = 2;
pub const DEFAULT_NODE_BUDGET: u64 = 20_000_000;

#[derive(Debug, Clone)]
pub struct ExactSolverConfig {
    pub random_seed: u64,
    pub num_workers: usize,
    /// Search nodes each worker may expand before giving up.
    pub node_budget: u64,
}

impl Default for ExactSolverConfig {
    fn default() -> Self {
        Self {
            random_seed: 42,
            num_workers: DEFAULT_NUM_WORKERS,
            node_budget: DEFAULT_NODE_BUDGET,
        }
    }
}

enum SearchOutcome {
    /// placements[coverage][peptide] = local pool index.
    Solved(Vec<Vec<usize>>),
    Exhausted,
    BudgetHit,
}

/// Solves the design exactly. Returns the assignment with dummy rows
/// stripped and global 1-based pool IDs, or an error carrying the solver
/// status taxonomy.
pub fn solve(design: &BlockDesign, config: &ExactSolverConfig) -> PfResult<BlockAssignment> {
    let peptide_ids = design.all_peptide_ids();
    let num_peptides = peptide_ids.len();
    let pool_size = design.num_peptides_per_pool();
    let num_coverage = design.num_coverage();

    if num_peptides % pool_size != 0 {
        return Err(PoolforgeError::ModelInvalid(format!(
            "{num_peptides} peptides cannot fill pools of {pool_size} exactly."
        )));
    }
    let pools_per_coverage = num_peptides / pool_size;
    if pools_per_coverage < 2 && num_coverage > 1 {
        return Err(PoolforgeError::Infeasible(
            "A single pool per coverage cannot give peptides unique pool combinations.".into(),
        ));
    }

    // Disallowed pairs as index pairs (i < j).
    let index_of = |id: &str| peptide_ids.iter().position(|p| p == id);
    let mut disallowed: HashSet<(usize, usize)> = HashSet::new();
    for (a, b) in design.disallowed_pairs().iter() {
        if let (Some(i), Some(j)) = (index_of(a), index_of(b)) {
            disallowed.insert((i.min(j), i.max(j)));
        }
    }

    info!(
        num_peptides,
        pool_size, num_coverage, "Started constraint search."
    );

    let worker_outcomes: Vec<SearchOutcome> = (0..config.num_workers.max(1))
        .into_par_iter()
        .map(|worker| {
            let mut search = Search::new(
                num_peptides,
                pool_size,
                pools_per_coverage,
                num_coverage,
                &disallowed,
                fastrand::Rng::with_seed(config.random_seed.wrapping_add(worker as u64)),
                config.node_budget,
            );
            search.run()
        })
        .collect();

    let mut budget_hit = false;
    for outcome in worker_outcomes {
        match outcome {
            SearchOutcome::Solved(placements) => {
                info!(status = %SolveStatus::Optimal, "An optimal solution was found.");
                return Ok(build_assignment(design, &peptide_ids, &placements, pools_per_coverage));
            }
            SearchOutcome::BudgetHit => budget_hit = true,
            SearchOutcome::Exhausted => {}
        }
    }

    if budget_hit {
        warn!(status = %SolveStatus::Unknown, "Search budget exhausted without a verdict.");
        Err(PoolforgeError::SolverUnknown(
            "No solution found within the search budget. Raise the budget or use the heuristic strategy.".into(),
        ))
    } else {
        warn!(status = %SolveStatus::Infeasible, "The model was proven infeasible.");
        Err(PoolforgeError::Infeasible(format!(
            "No assignment exists for {num_peptides} peptides, {pool_size} per pool, {num_coverage}x coverage with the given pair constraints."
        )))
    }
}

struct Search<'a> {
    num_peptides: usize,
    pool_size: usize,
    pools_per_coverage: usize,
    num_coverage: usize,
    disallowed: &'a HashSet<(usize, usize)>,
    rng: fastrand::Rng,
    nodes_left: u64,
    /// placements[coverage][peptide] = pool, usize::MAX while unassigned.
    placements: Vec<Vec<usize>>,
    pool_members: Vec<Vec<Vec<usize>>>,
    /// Upper-triangular pair co-occurrence counts across all coverages.
    pair_counts: Vec<u8>,
}

impl<'a> Search<'a> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        num_peptides: usize,
        pool_size: usize,
        pools_per_coverage: usize,
        num_coverage: usize,
        disallowed: &'a HashSet<(usize, usize)>,
        rng: fastrand::Rng,
        node_budget: u64,
    ) -> Self {
        Self {
            num_peptides,
            pool_size,
            pools_per_coverage,
            num_coverage,
            disallowed,
            rng,
            nodes_left: node_budget,
            placements: vec![vec![usize::MAX; num_peptides]; num_coverage],
            pool_members: vec![vec![Vec::with_capacity(pool_size); pools_per_coverage]; num_coverage],
            pair_counts: vec![0; num_peptides * num_peptides],
        }
    }

    fn run(&mut self) -> SearchOutcome {
        match self.place(0) {
            Some(true) => SearchOutcome::Solved(self.placements.clone()),
            Some(false) => SearchOutcome::Exhausted,
            None => SearchOutcome::BudgetHit,
        }
    }

    fn pair_idx(&self, a: usize, b: usize) -> usize {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        lo * self.num_peptides + hi
    }

    /// Places decision `depth` (coverage-major, then peptide index).
    /// Returns Some(true) on success, Some(false) when this subtree is
    /// exhausted, None when the node budget ran out.
    fn place(&mut self, depth: usize) -> Option<bool> {
        if depth == self.num_coverage * self.num_peptides {
            return Some(true);
        }
        if self.nodes_left == 0 {
            return None;
        }
        self.nodes_left -= 1;

        let coverage = depth / self.num_peptides;
        let peptide = depth % self.num_peptides;

        let mut pool_order: Vec<usize> = (0..self.pools_per_coverage).collect();
        self.rng.shuffle(&mut pool_order);

        for pool in pool_order {
            if !self.can_place(coverage, pool, peptide) {
                continue;
            }
            self.commit(coverage, pool, peptide);
            match self.place(depth + 1) {
                Some(true) => return Some(true),
                Some(false) => self.undo(coverage, pool, peptide),
                None => {
                    self.undo(coverage, pool, peptide);
                    return None;
                }
            }
        }
        Some(false)
    }

    fn can_place(&self, coverage: usize, pool: usize, peptide: usize) -> bool {
        let members = &self.pool_members[coverage][pool];
        if members.len() >= self.pool_size {
            return false;
        }
        for &other in members {
            let (lo, hi) = if other < peptide {
                (other, peptide)
            } else {
                (peptide, other)
            };
            if self.disallowed.contains(&(lo, hi)) {
                return false;
            }
            if self.pair_counts[lo * self.num_peptides + hi] >= 1 {
                return false;
            }
        }
        true
    }

    fn commit(&mut self, coverage: usize, pool: usize, peptide: usize) {
        for i in 0..self.pool_members[coverage][pool].len() {
            let other = self.pool_members[coverage][pool][i];
            let idx = self.pair_idx(other, peptide);
            self.pair_counts[idx] += 1;
        }
        self.pool_members[coverage][pool].push(peptide);
        self.placements[coverage][peptide] = pool;
    }

    fn undo(&mut self, coverage: usize, pool: usize, peptide: usize) {
        self.pool_members[coverage][pool].pop();
        for i in 0..self.pool_members[coverage][pool].len() {
            let other = self.pool_members[coverage][pool][i];
            let idx = self.pair_idx(other, peptide);
            self.pair_counts[idx] -= 1;
        }
        self.placements[coverage][peptide] = usize::MAX;
    }
}

fn build_assignment(
    design: &BlockDesign,
    peptide_ids: &[String],
    placements: &[Vec<usize>],
    pools_per_coverage: usize,
) -> BlockAssignment {
    let mut assignment = BlockAssignment::new();
    for (coverage, pools) in placements.iter().enumerate() {
        for (peptide, &local_pool) in pools.iter().enumerate() {
            let peptide_id = &peptide_ids[peptide];
            if design.is_dummy(peptide_id) {
                continue;
            }
            let pool_id = (pools_per_coverage * coverage + local_pool) as u32 + 1;
            let sequence = design
                .peptides()
                .sequence_of(peptide_id)
                .unwrap_or_default();
            assignment.add_peptide(coverage as u32 + 1, pool_id, peptide_id.clone(), sequence);
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::DisallowedPairs;
    use crate::peptide::{Peptide, PeptideSet};

    fn design(n: usize, pool: usize, coverage: usize) -> BlockDesign {
        let peptides = PeptideSet::new(
            (1..=n)
                .map(|i| Peptide::new(format!("peptide_{i}"), ""))
                .collect(),
        )
        .unwrap();
        BlockDesign::new(peptides, pool, coverage, DisallowedPairs::new(), Vec::new()).unwrap()
    }

    #[test]
    fn solves_small_design_without_violations() {
        let d = design(10, 2, 2);
        let assignment = solve(&d, &ExactSolverConfig::default()).unwrap();
        assert_eq!(assignment.num_violations(), 0);
        assert!(assignment.verify(2, 2).is_optimal());
    }

    #[test]
    fn honors_disallowed_pairs() {
        let peptides = PeptideSet::new(
            (1..=10)
                .map(|i| Peptide::new(format!("peptide_{i}"), ""))
                .collect(),
        )
        .unwrap();
        let mut disallowed = DisallowedPairs::new();
        disallowed.insert("peptide_1", "peptide_2");
        let d = BlockDesign::new(peptides, 2, 2, disallowed.clone(), Vec::new()).unwrap();
        let assignment = solve(&d, &ExactSolverConfig::default()).unwrap();
        assert!(assignment.check_disallowed_pairs(&disallowed).is_empty());
    }

    #[test]
    fn proves_tiny_impossible_design_infeasible() {
        // 4 peptides in pools of 2 over 4 coverages needs 4 distinct
        // partners per peptide but only 3 exist.
        let d = design(4, 2, 4);
        let result = solve(&d, &ExactSolverConfig::default());
        assert!(matches!(result, Err(PoolforgeError::Infeasible(_))));
    }

    #[test]
    fn exhausted_budget_reports_unknown() {
        let d = design(25, 5, 3);
        let config = ExactSolverConfig {
            node_budget: 1,
            ..Default::default()
        };
        let result = solve(&d, &config);
        assert!(matches!(result, Err(PoolforgeError::SolverUnknown(_))));
    }
}
