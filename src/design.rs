use crate::error::{PfResult, PoolforgeError};
use crate::pairs::{DisallowedPairs, PreferredPair};
use crate::peptide::{synthesize_dummy_ids, Peptide, PeptideSet};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Validated parameters for one solvable design block: the peptides, the
/// pool geometry, and the pairing constraints the solver must honor.
#[derive(Debug, Clone)]
pub struct BlockDesign {
    peptides: PeptideSet,
    num_peptides_per_pool: usize,
    num_coverage: usize,
    disallowed_pairs: DisallowedPairs,
    preferred_pairs: Vec<PreferredPair>,
    dummy_peptide_ids: Vec<String>,
}

impl BlockDesign {
    /// Builds a design, validating the geometry and padding with dummy
    /// peptides up to the next multiple of the pool size so every pool
    /// can be filled exactly.
    pub fn new(
        peptides: PeptideSet,
        num_peptides_per_pool: usize,
        num_coverage: usize,
        disallowed_pairs: DisallowedPairs,
        preferred_pairs: Vec<PreferredPair>,
    ) -> PfResult<Self> {
        if num_peptides_per_pool < 2 {
            return Err(PoolforgeError::Config(
                "Number of peptides per pool must be at least 2.".into(),
            ));
        }
        if num_coverage < 1 {
            return Err(PoolforgeError::Config(
                "Coverage must be at least 1.".into(),
            ));
        }
        if peptides.len() < num_peptides_per_pool {
            return Err(PoolforgeError::Config(format!(
                "Number of peptides per pool ({num_peptides_per_pool}) exceeds the total number of peptides ({}).",
                peptides.len()
            )));
        }

        let real_ids = peptides.ids();
        let remainder = peptides.len() % num_peptides_per_pool;
        let num_dummies = if remainder == 0 {
            0
        } else {
            num_peptides_per_pool - remainder
        };
        let dummy_peptide_ids = synthesize_dummy_ids(&real_ids, num_dummies);

        Ok(Self {
            peptides,
            num_peptides_per_pool,
            num_coverage,
            disallowed_pairs,
            preferred_pairs,
            dummy_peptide_ids,
        })
    }

    pub fn peptides(&self) -> &PeptideSet {
        &self.peptides
    }

    pub fn num_peptides(&self) -> usize {
        self.peptides.len()
    }

    pub fn num_dummy_peptides(&self) -> usize {
        self.dummy_peptide_ids.len()
    }

    pub fn num_total_peptides(&self) -> usize {
        self.num_peptides() + self.num_dummy_peptides()
    }

    pub fn num_peptides_per_pool(&self) -> usize {
        self.num_peptides_per_pool
    }

    pub fn num_coverage(&self) -> usize {
        self.num_coverage
    }

    pub fn disallowed_pairs(&self) -> &DisallowedPairs {
        &self.disallowed_pairs
    }

    pub fn preferred_pairs(&self) -> &[PreferredPair] {
        &self.preferred_pairs
    }

    pub fn dummy_peptide_ids(&self) -> &[String] {
        &self.dummy_peptide_ids
    }

    /// Real peptide IDs followed by dummy IDs. Solvers place all of
    /// them; dummy rows are stripped afterwards.
    pub fn all_peptide_ids(&self) -> Vec<String> {
        let mut ids = self.peptides.ids();
        ids.extend(self.dummy_peptide_ids.iter().cloned());
        ids
    }

    pub fn is_dummy(&self, peptide_id: &str) -> bool {
        self.dummy_peptide_ids.iter().any(|d| d == peptide_id)
    }

    /// Pools per coverage round, counting dummy padding.
    pub fn num_pools_per_coverage(&self) -> usize {
        self.num_total_peptides() / self.num_peptides_per_pool
    }

    /// Theoretical minimum pool count when `num_peptides` are processed
    /// in chunks of `num_peptides_per_design`.
    pub fn compute_num_total_pools(
        num_peptides: usize,
        num_peptides_per_design: usize,
        num_peptides_per_pool: usize,
        num_coverage: usize,
    ) -> usize {
        let mut remaining = num_peptides as i64;
        let mut total = 0usize;
        loop {
            total += num_peptides_per_design.div_ceil(num_peptides_per_pool) * num_coverage;
            remaining -= num_peptides_per_design as i64;
            if remaining <= 0 {
                break;
            }
        }
        total
    }

    /// Divides this design into computationally tractable sub-designs.
    ///
    /// Pool sizes above `max_peptides_per_pool` are repeatedly halved
    /// (round up) until each fits, peptides are distributed to the
    /// resulting pool sizes proportionately, and each share is then cut
    /// into blocks of at most `max_peptides_per_block` peptides at the
    /// block size that minimizes the total pool count.
    ///
    /// Designs in the same inner list cover the same peptides at
    /// complementary pool sizes and must be merged into one assignment;
    /// outer lists are independent.
    pub fn divide(
        &self,
        max_peptides_per_block: usize,
        max_peptides_per_pool: usize,
    ) -> PfResult<Vec<Vec<BlockDesign>>> {
        // Step 1. Halve oversized pool sizes until all fit.
        let mut pool_sizes = vec![self.num_peptides_per_pool];
        while pool_sizes.iter().any(|&s| s > max_peptides_per_pool) {
            let mut next = Vec::with_capacity(pool_sizes.len() * 2);
            for s in pool_sizes {
                if s > max_peptides_per_pool {
                    let half = s.div_ceil(2);
                    next.push(half);
                    next.push(s - half);
                } else {
                    next.push(s);
                }
            }
            pool_sizes = next;
        }

        // Step 2. Distribute peptides proportionately to the pool sizes.
        let mut peptide_counts = Vec::with_capacity(pool_sizes.len());
        let mut remaining = self.num_peptides();
        for &pool_size in &pool_sizes {
            let share = (pool_size * self.num_peptides()).div_ceil(self.num_peptides_per_pool);
            let share = share.min(remaining);
            peptide_counts.push(share);
            remaining -= share;
        }
        info!("Divided design into:");
        for (count, pool_size) in peptide_counts.iter().zip(&pool_sizes) {
            info!("\t{count} peptides; {pool_size} peptides per pool");
        }

        // Step 3. Cut each share into blocks, searching the block size
        // that minimizes the total pool count.
        let all_peptides = self.peptides.peptides();
        let mut groups: Vec<Vec<BlockDesign>> = Vec::new();
        let mut start_idx = 0usize;
        for (&pool_size, &num_peptides) in pool_sizes.iter().zip(&peptide_counts) {
            if num_peptides == 0 {
                continue;
            }
            let block_size = if num_peptides > max_peptides_per_block {
                let min_size = pool_size * pool_size;
                let mut best_size = min_size;
                let mut best_pools = usize::MAX;
                for candidate in min_size..=max_peptides_per_block {
                    let total_pools = Self::compute_num_total_pools(
                        num_peptides,
                        candidate,
                        pool_size,
                        self.num_coverage,
                    );
                    if total_pools < best_pools {
                        best_pools = total_pools;
                        best_size = candidate;
                    }
                }
                info!("Optimal number of peptides per block: {best_size}");
                best_size
            } else {
                num_peptides
            };

            let mut group = Vec::new();
            let last_idx = start_idx + num_peptides;
            while start_idx < last_idx {
                let end_idx = (start_idx + block_size).min(last_idx);
                let block_peptides: Vec<Peptide> = all_peptides[start_idx..end_idx].to_vec();
                start_idx = end_idx;
                group.push(BlockDesign::new(
                    PeptideSet::new(block_peptides)?,
                    pool_size,
                    self.num_coverage,
                    self.disallowed_pairs.clone(),
                    self.preferred_pairs.clone(),
                )?);
            }
            groups.push(group);
        }
        Ok(groups)
    }
}

/// Serializable record of a design: the roster, the geometry, and the
/// preferred pairs that shaped it. Lets a lab re-load the exact design
/// that produced an assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignArtifact {
    pub num_peptides_per_pool: usize,
    pub num_coverage: usize,
    pub peptides: Vec<Peptide>,
    pub preferred_pairs: Vec<PreferredPair>,
}

impl DesignArtifact {
    pub fn from_design(design: &BlockDesign) -> Self {
        Self {
            num_peptides_per_pool: design.num_peptides_per_pool,
            num_coverage: design.num_coverage,
            peptides: design.peptides.peptides().to_vec(),
            preferred_pairs: design.preferred_pairs.clone(),
        }
    }

    pub fn into_design(self) -> PfResult<BlockDesign> {
        BlockDesign::new(
            PeptideSet::new(self.peptides)?,
            self.num_peptides_per_pool,
            self.num_coverage,
            DisallowedPairs::new(),
            self.preferred_pairs,
        )
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> PfResult<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> PfResult<()> {
        let file = std::fs::File::create(path)?;
        self.to_writer(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> PfResult<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn read_json(path: impl AsRef<Path>) -> PfResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peptides(n: usize) -> PeptideSet {
        PeptideSet::new(
            (1..=n)
                .map(|i| Peptide::new(format!("peptide_{i}"), "A".repeat(9)))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn pads_to_next_pool_multiple() {
        let design = BlockDesign::new(
            peptides(23),
            5,
            3,
            DisallowedPairs::new(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(design.num_dummy_peptides(), 2);
        assert_eq!(design.num_total_peptides(), 25);
        assert_eq!(design.num_pools_per_coverage(), 5);
    }

    #[test]
    fn divisible_count_needs_no_dummies() {
        let design = BlockDesign::new(
            peptides(25),
            5,
            3,
            DisallowedPairs::new(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(design.num_dummy_peptides(), 0);
    }

    #[test]
    fn rejects_pool_larger_than_roster() {
        let result = BlockDesign::new(
            peptides(3),
            5,
            3,
            DisallowedPairs::new(),
            Vec::new(),
        );
        assert!(matches!(result, Err(PoolforgeError::Config(_))));
    }

    #[test]
    fn total_pool_formula_chunks_remainders() {
        // 120 peptides in blocks of 100: 100-chunk then 20-chunk.
        assert_eq!(BlockDesign::compute_num_total_pools(120, 100, 10, 3), 60);
        assert_eq!(BlockDesign::compute_num_total_pools(100, 100, 10, 3), 30);
    }

    #[test]
    fn divide_halves_oversized_pools() {
        let design = BlockDesign::new(
            peptides(40),
            20,
            3,
            DisallowedPairs::new(),
            Vec::new(),
        )
        .unwrap();
        let groups = design.divide(100, 10).unwrap();
        // Pool size 20 splits into 10 + 10; each gets half the peptides.
        assert_eq!(groups.len(), 2);
        for group in &groups {
            assert_eq!(group.len(), 1);
            assert_eq!(group[0].num_peptides_per_pool(), 10);
            assert_eq!(group[0].num_peptides(), 20);
        }
    }

    #[test]
    fn divide_passes_small_designs_through() {
        let design = BlockDesign::new(
            peptides(25),
            5,
            3,
            DisallowedPairs::new(),
            Vec::new(),
        )
        .unwrap();
        let groups = design.divide(100, 10).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[0][0].num_peptides(), 25);
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let design = BlockDesign::new(
            peptides(10),
            5,
            3,
            DisallowedPairs::new(),
            vec![PreferredPair::new("peptide_1", "peptide_2", 0.9)],
        )
        .unwrap();
        let artifact = DesignArtifact::from_design(&design);
        let mut buf = Vec::new();
        artifact.to_writer(&mut buf).unwrap();
        let restored = DesignArtifact::from_reader(buf.as_slice())
            .unwrap()
            .into_design()
            .unwrap();
        assert_eq!(restored.num_peptides(), 10);
        assert_eq!(restored.num_peptides_per_pool(), 5);
        assert_eq!(restored.preferred_pairs().len(), 1);
    }

    #[test]
    fn divide_cuts_large_rosters_into_blocks() {
        let design = BlockDesign::new(
            peptides(220),
            10,
            3,
            DisallowedPairs::new(),
            Vec::new(),
        )
        .unwrap();
        let groups = design.divide(100, 10).unwrap();
        assert_eq!(groups.len(), 1);
        let total: usize = groups[0].iter().map(|d| d.num_peptides()).sum();
        assert_eq!(total, 220);
        for block in &groups[0] {
            assert!(block.num_peptides() <= 100);
        }
    }
}
