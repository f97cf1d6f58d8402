//! Social-golfer style local search.
//!
//! Each coverage round partitions the peptides into pools of at most
//! `num_peptides_per_pool`. The optimizer counts every peptide pair that
//! meets more than once (or meets at all while disallowed) as a
//! collision and walks random swap moves that reduce the collision
//! count. It scales to rosters the exact solver cannot touch, at the
//! price of not proving anything.

use crate::assignment::BlockAssignment;
use crate::design::BlockDesign;
use crate::error::PfResult;
use crate::pairs::compute_transitive_neighbors;
use crate::solver::InitStrategy;
use std::collections::HashMap;
use tracing::info;

pub const DEFAULT_MAX_ITERS: usize = 2_000;

#[derive(Debug, Clone)]
pub struct HeuristicSolverConfig {
    pub random_seed: u64,
    pub strategy: InitStrategy,
    pub max_iters: usize,
    /// When true, the optimizer may open extra pools beyond the minimum
    /// to escape collisions it cannot swap away.
    pub allow_extra_pools: bool,
}

impl Default for HeuristicSolverConfig {
    fn default() -> Self {
        Self {
            random_seed: 42,
            strategy: InitStrategy::Greedy,
            max_iters: DEFAULT_MAX_ITERS,
            allow_extra_pools: false,
        }
    }
}

/// rounds[coverage][pool] holds peptide indices.
struct Solution {
    rounds: Vec<Vec<Vec<usize>>>,
    pool_size: usize,
    num_peptides: usize,
}

impl Solution {
    /// Pair co-occurrence counts over all rounds, keyed (lo, hi).
    fn pair_counts(&self) -> HashMap<(usize, usize), usize> {
        let mut counts = HashMap::new();
        for round in &self.rounds {
            for pool in round {
                for i in 0..pool.len() {
                    for j in (i + 1)..pool.len() {
                        let key = ordered(pool[i], pool[j]);
                        *counts.entry(key).or_insert(0) += 1;
                    }
                }
            }
        }
        counts
    }

    fn num_collisions(&self, disallowed: &[(usize, usize)]) -> usize {
        let counts = self.pair_counts();
        let mut collisions: usize = counts
            .values()
            .filter(|&&c| c > 1)
            .map(|&c| c - 1)
            .sum();
        for pair in disallowed {
            collisions += counts.get(pair).copied().unwrap_or(0);
        }
        collisions
    }

    /// Peptides currently involved in at least one collision.
    fn colliding_peptides(&self, disallowed: &[(usize, usize)]) -> Vec<usize> {
        let counts = self.pair_counts();
        let mut flagged = vec![false; self.num_peptides];
        for (&(a, b), &count) in &counts {
            if count > 1 || (count > 0 && disallowed.contains(&(a, b))) {
                flagged[a] = true;
                flagged[b] = true;
            }
        }
        flagged
            .iter()
            .enumerate()
            .filter(|(_, &f)| f)
            .map(|(i, _)| i)
            .collect()
    }

    fn position_of(&self, round: usize, peptide: usize) -> (usize, usize) {
        for (pool_idx, pool) in self.rounds[round].iter().enumerate() {
            if let Some(slot) = pool.iter().position(|&p| p == peptide) {
                return (pool_idx, slot);
            }
        }
        unreachable!("peptide {peptide} missing from round {round}");
    }
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Runs the heuristic solver. Never fails on collisions; the returned
/// assignment may carry violations, which `verify` will surface.
pub fn solve(design: &BlockDesign, config: &HeuristicSolverConfig) -> PfResult<BlockAssignment> {
    let peptide_ids = design.peptides().ids();
    let num_peptides = peptide_ids.len();
    let pool_size = design.num_peptides_per_pool();
    let num_coverage = design.num_coverage();
    let mut rng = fastrand::Rng::with_seed(config.random_seed);

    let index_of: HashMap<&str, usize> = peptide_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut disallowed: Vec<(usize, usize)> = design
        .disallowed_pairs()
        .iter()
        .filter_map(|(a, b)| {
            match (index_of.get(a.as_str()), index_of.get(b.as_str())) {
                (Some(&i), Some(&j)) => Some(ordered(i, j)),
                _ => None,
            }
        })
        .collect();
    disallowed.sort_unstable();
    disallowed.dedup();

    let preferred_clusters: Vec<Vec<usize>> =
        compute_transitive_neighbors(design.preferred_pairs())
            .into_iter()
            .map(|cluster| {
                cluster
                    .iter()
                    .filter_map(|id| index_of.get(id.as_str()).copied())
                    .collect()
            })
            .collect();

    info!(
        num_peptides,
        pool_size,
        num_coverage,
        strategy = %config.strategy,
        "Started heuristic search."
    );

    let mut solution = Solution {
        rounds: init_rounds(
            num_peptides,
            pool_size,
            num_coverage,
            config.strategy,
            &preferred_clusters,
            &mut rng,
        ),
        pool_size,
        num_peptides,
    };

    optimize(
        &mut solution,
        &disallowed,
        config.max_iters,
        config.allow_extra_pools,
        &mut rng,
    );

    let collisions = solution.num_collisions(&disallowed);
    info!(collisions, "Finished heuristic search.");

    let mut assignment = BlockAssignment::new();
    let mut pool_id = 0u32;
    for (round_idx, round) in solution.rounds.iter().enumerate() {
        for pool in round {
            if pool.is_empty() {
                continue;
            }
            pool_id += 1;
            for &peptide in pool {
                let id = &peptide_ids[peptide];
                let sequence = design.peptides().sequence_of(id).unwrap_or_default();
                assignment.add_peptide(round_idx as u32 + 1, pool_id, id.clone(), sequence);
            }
        }
    }
    Ok(assignment)
}

fn init_rounds(
    num_peptides: usize,
    pool_size: usize,
    num_coverage: usize,
    strategy: InitStrategy,
    preferred_clusters: &[Vec<usize>],
    rng: &mut fastrand::Rng,
) -> Vec<Vec<Vec<usize>>> {
    let num_pools = num_peptides.div_ceil(pool_size);
    match strategy {
        InitStrategy::Random => (0..num_coverage)
            .map(|_| random_round(num_peptides, pool_size, rng))
            .collect(),
        InitStrategy::Repeat => {
            let round = random_round(num_peptides, pool_size, rng);
            vec![round; num_coverage]
        }
        InitStrategy::Greedy => {
            let mut rounds = Vec::with_capacity(num_coverage);

            // Round 1: pack preferred neighbors into shared pools first.
            let mut first: Vec<Vec<usize>> = vec![Vec::with_capacity(pool_size); num_pools];
            let mut placed = vec![false; num_peptides];
            for cluster in preferred_clusters {
                let mut members = cluster.clone();
                rng.shuffle(&mut members);
                for peptide in members {
                    place_first_fit(&mut first, pool_size, peptide);
                    placed[peptide] = true;
                }
            }
            for peptide in 0..num_peptides {
                if !placed[peptide] {
                    place_first_fit(&mut first, pool_size, peptide);
                }
            }
            rounds.push(first);

            // Later rounds: put each peptide where it meets the fewest
            // peptides it has already met.
            for _ in 1..num_coverage {
                let mut met: HashMap<(usize, usize), usize> = HashMap::new();
                for round in &rounds {
                    for pool in round {
                        for i in 0..pool.len() {
                            for j in (i + 1)..pool.len() {
                                *met.entry(ordered(pool[i], pool[j])).or_insert(0) += 1;
                            }
                        }
                    }
                }
                let mut order: Vec<usize> = (0..num_peptides).collect();
                rng.shuffle(&mut order);
                let mut round: Vec<Vec<usize>> = vec![Vec::with_capacity(pool_size); num_pools];
                for peptide in order {
                    let mut best_pool = 0usize;
                    let mut best_cost = usize::MAX;
                    for (pool_idx, pool) in round.iter().enumerate() {
                        if pool.len() >= pool_size {
                            continue;
                        }
                        let cost = pool
                            .iter()
                            .map(|&other| met.get(&ordered(peptide, other)).copied().unwrap_or(0))
                            .sum();
                        if cost < best_cost {
                            best_cost = cost;
                            best_pool = pool_idx;
                        }
                    }
                    round[best_pool].push(peptide);
                }
                rounds.push(round);
            }
            rounds
        }
    }
}

fn random_round(num_peptides: usize, pool_size: usize, rng: &mut fastrand::Rng) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..num_peptides).collect();
    rng.shuffle(&mut order);
    order.chunks(pool_size).map(|c| c.to_vec()).collect()
}

fn place_first_fit(pools: &mut [Vec<usize>], pool_size: usize, peptide: usize) {
    for pool in pools.iter_mut() {
        if pool.len() < pool_size {
            pool.push(peptide);
            return;
        }
    }
}

/// Random swap descent: pick a colliding peptide, swap it with a peptide
/// from another pool of the same round, keep the move when the collision
/// count drops. With `allow_extra_pools`, a stuck peptide may instead be
/// moved to a fresh pool.
fn optimize(
    solution: &mut Solution,
    disallowed: &[(usize, usize)],
    max_iters: usize,
    allow_extra_pools: bool,
    rng: &mut fastrand::Rng,
) {
    let mut current = solution.num_collisions(disallowed);
    let mut stall = 0usize;
    for _ in 0..max_iters {
        if current == 0 {
            break;
        }
        let colliding = solution.colliding_peptides(disallowed);
        if colliding.is_empty() {
            break;
        }
        let peptide = colliding[rng.usize(0..colliding.len())];
        let round_idx = rng.usize(0..solution.rounds.len());
        let (pool_a, slot_a) = solution.position_of(round_idx, peptide);

        let num_pools = solution.rounds[round_idx].len();
        if num_pools < 2 {
            continue;
        }
        let mut pool_b = rng.usize(0..num_pools);
        if pool_b == pool_a {
            pool_b = (pool_b + 1) % num_pools;
        }

        if solution.rounds[round_idx][pool_b].is_empty() {
            continue;
        }
        let slot_b = rng.usize(0..solution.rounds[round_idx][pool_b].len());

        swap_slots(solution, round_idx, pool_a, slot_a, pool_b, slot_b);
        let candidate = solution.num_collisions(disallowed);
        if candidate < current {
            current = candidate;
            stall = 0;
        } else {
            swap_slots(solution, round_idx, pool_a, slot_a, pool_b, slot_b);
            stall += 1;
            // Escape hatch for peptides no swap can fix.
            if allow_extra_pools && stall > solution.num_peptides {
                solution.rounds[round_idx][pool_a].remove(slot_a);
                solution.rounds[round_idx].push(vec![peptide]);
                current = solution.num_collisions(disallowed);
                stall = 0;
            }
        }
    }
}

fn swap_slots(
    solution: &mut Solution,
    round: usize,
    pool_a: usize,
    slot_a: usize,
    pool_b: usize,
    slot_b: usize,
) {
    let a = solution.rounds[round][pool_a][slot_a];
    let b = solution.rounds[round][pool_b][slot_b];
    solution.rounds[round][pool_a][slot_a] = b;
    solution.rounds[round][pool_b][slot_b] = a;
}
