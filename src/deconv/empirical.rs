//! Threshold-based deconvolution.
//!
//! A pool is a hit when its spot count clears `min_pool_spot_count`; a
//! peptide is a hit when enough of its pools are hits; a hit is
//! confident only when some hit pool pins it down uniquely.

use crate::assignment::{BlockAssignment, PoolId};
use crate::deconv::{DeconvolutionLabel, DeconvolutionMethod, DeconvolvedPeptide, DeconvolvedPeptideSet};
use crate::peptide::Peptide;
use crate::readout::PoolReadout;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

pub fn deconvolve(
    readout: &PoolReadout,
    assignment: &BlockAssignment,
    min_pool_spot_count: f64,
    min_coverage: usize,
) -> DeconvolvedPeptideSet {
    // Step 1. Hit pools.
    let hit_pools: BTreeSet<PoolId> = readout
        .spot_counts()
        .iter()
        .filter(|(_, &count)| count >= min_pool_spot_count)
        .map(|(&pool_id, _)| pool_id)
        .collect();
    info!(num_hit_pools = hit_pools.len(), "Identified hit pools.");

    // Step 2. Hit pools per peptide; hit peptides per coverage gate.
    let peptide_pools = assignment.peptide_pools();
    let mut hit_pool_ids: BTreeMap<&String, Vec<PoolId>> = BTreeMap::new();
    let mut hit_peptides: BTreeSet<&String> = BTreeSet::new();
    for (peptide_id, pools) in &peptide_pools {
        let hits: Vec<PoolId> = pools
            .iter()
            .copied()
            .filter(|p| hit_pools.contains(p))
            .collect();
        if hits.len() >= min_coverage {
            hit_peptides.insert(peptide_id);
        }
        hit_pool_ids.insert(peptide_id, hits);
    }

    // Step 3. Hit-peptide membership per hit pool, for the uniqueness
    // test that separates confident from candidate hits.
    let mut hit_members: BTreeMap<PoolId, usize> = BTreeMap::new();
    for peptide_id in &hit_peptides {
        for pool_id in &hit_pool_ids[*peptide_id] {
            *hit_members.entry(*pool_id).or_insert(0) += 1;
        }
    }

    let mut peptides = Vec::new();
    for (peptide_id, _) in &peptide_pools {
        let hits = &hit_pool_ids[peptide_id];
        let label = if !hit_peptides.contains(peptide_id) {
            DeconvolutionLabel::NotAHit
        } else if hits
            .iter()
            .any(|pool_id| hit_members.get(pool_id) == Some(&1))
        {
            DeconvolutionLabel::ConfidentHit
        } else {
            DeconvolutionLabel::CandidateHit
        };
        let sequence = assignment.peptide_sequence(peptide_id).unwrap_or_default();
        peptides.push(DeconvolvedPeptide {
            peptide: Peptide::new(peptide_id.clone(), sequence),
            estimated_spot_count: hits.len() as f64,
            label,
            hit_pool_ids: hits.clone(),
        });
    }

    DeconvolvedPeptideSet {
        method: DeconvolutionMethod::Empirical,
        min_pool_spot_count,
        min_coverage,
        min_peptide_activity: None,
        background_spot_count: None,
        peptides,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 4 peptides, 2 per pool, 2x coverage. p1 is the only true hit:
    // pools 1 and 3 (its combination) light up.
    fn fixture() -> (BlockAssignment, PoolReadout) {
        let mut a = BlockAssignment::new();
        a.add_peptide(1, 1, "p1", "AAA");
        a.add_peptide(1, 1, "p2", "CCC");
        a.add_peptide(1, 2, "p3", "GGG");
        a.add_peptide(1, 2, "p4", "TTT");
        a.add_peptide(2, 3, "p1", "AAA");
        a.add_peptide(2, 3, "p3", "GGG");
        a.add_peptide(2, 4, "p2", "CCC");
        a.add_peptide(2, 4, "p4", "TTT");
        let mut r = PoolReadout::new();
        r.insert(1, 300.0);
        r.insert(2, 10.0);
        r.insert(3, 280.0);
        r.insert(4, 5.0);
        (a, r)
    }

    #[test]
    fn single_positive_peptide_is_confident() {
        let (assignment, readout) = fixture();
        let result = deconvolve(&readout, &assignment, 100.0, 2);
        let p1 = result.get("p1").unwrap();
        assert_eq!(p1.label, DeconvolutionLabel::ConfidentHit);
        assert_eq!(p1.hit_pool_ids, vec![1, 3]);
        assert_eq!(p1.estimated_spot_count, 2.0);
        for other in ["p2", "p3", "p4"] {
            assert_eq!(result.get(other).unwrap().label, DeconvolutionLabel::NotAHit);
        }
    }

    #[test]
    fn fully_overlapping_hits_are_candidates() {
        // p1 and p2 share every pool, so a readout where both light up
        // cannot tell them apart.
        let mut a = BlockAssignment::new();
        a.add_peptide(1, 1, "p1", "");
        a.add_peptide(1, 1, "p2", "");
        a.add_peptide(2, 2, "p1", "");
        a.add_peptide(2, 2, "p2", "");
        let mut r = PoolReadout::new();
        r.insert(1, 500.0);
        r.insert(2, 500.0);
        let result = deconvolve(&r, &a, 100.0, 2);
        assert_eq!(result.get("p1").unwrap().label, DeconvolutionLabel::CandidateHit);
        assert_eq!(result.get("p2").unwrap().label, DeconvolutionLabel::CandidateHit);
        assert_eq!(result.candidate_hits().len(), 2);
    }

    #[test]
    fn min_coverage_gates_hits() {
        let (assignment, readout) = fixture();
        // Require 3 hit pools; p1 only has 2.
        let result = deconvolve(&readout, &assignment, 100.0, 3);
        assert_eq!(result.get("p1").unwrap().label, DeconvolutionLabel::NotAHit);
        assert!(result.confident_hits().is_empty());
    }
}
