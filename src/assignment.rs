use crate::error::{PfResult, PoolforgeError};
use crate::pairs::DisallowedPairs;
use crate::plate::{PlateFormat, PlateWell};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

pub type CoverageId = u32;
pub type PoolId = u32;

/// One placement: a peptide sits in one pool of one coverage round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub coverage_id: CoverageId,
    pub pool_id: PoolId,
    pub peptide_id: String,
    pub peptide_sequence: String,
}

/// A complete pool assignment: the flat row table plus the optional
/// physical plate mapping. Accessors derive indices on demand; the row
/// table is the single source of truth.
#[derive(Debug, Clone, Default)]
pub struct BlockAssignment {
    rows: Vec<AssignmentRow>,
    plate_map: BTreeMap<PoolId, PlateWell>,
}

impl BlockAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peptide(
        &mut self,
        coverage_id: CoverageId,
        pool_id: PoolId,
        peptide_id: impl Into<String>,
        peptide_sequence: impl Into<String>,
    ) {
        // One pool belongs to exactly one coverage round.
        debug_assert!(
            self.rows
                .iter()
                .all(|r| r.pool_id != pool_id || r.coverage_id == coverage_id),
            "pool {pool_id} already belongs to a different coverage"
        );
        self.rows.push(AssignmentRow {
            coverage_id,
            pool_id,
            peptide_id: peptide_id.into(),
            peptide_sequence: peptide_sequence.into(),
        });
    }

    pub fn rows(&self) -> &[AssignmentRow] {
        &self.rows
    }

    pub fn plate_map(&self) -> &BTreeMap<PoolId, PlateWell> {
        &self.plate_map
    }

    pub fn coverage_ids(&self) -> Vec<CoverageId> {
        let set: BTreeSet<CoverageId> = self.rows.iter().map(|r| r.coverage_id).collect();
        set.into_iter().collect()
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        let set: BTreeSet<PoolId> = self.rows.iter().map(|r| r.pool_id).collect();
        set.into_iter().collect()
    }

    /// Unique peptide IDs in first-seen order.
    pub fn peptide_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for row in &self.rows {
            if seen.insert(row.peptide_id.as_str()) {
                ids.push(row.peptide_id.clone());
            }
        }
        ids
    }

    pub fn num_pools(&self) -> usize {
        self.pool_ids().len()
    }

    pub fn num_peptides(&self) -> usize {
        self.peptide_ids().len()
    }

    pub fn peptide_sequence(&self, peptide_id: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.peptide_id == peptide_id)
            .map(|r| r.peptide_sequence.as_str())
    }

    /// Sorted unique pool IDs holding the given peptide.
    pub fn pool_ids_for_peptide(&self, peptide_id: &str) -> Vec<PoolId> {
        let set: BTreeSet<PoolId> = self
            .rows
            .iter()
            .filter(|r| r.peptide_id == peptide_id)
            .map(|r| r.pool_id)
            .collect();
        set.into_iter().collect()
    }

    /// Pool ID -> peptide IDs, in insertion order per pool.
    pub fn pool_members(&self) -> BTreeMap<PoolId, Vec<String>> {
        let mut members: BTreeMap<PoolId, Vec<String>> = BTreeMap::new();
        for row in &self.rows {
            members
                .entry(row.pool_id)
                .or_default()
                .push(row.peptide_id.clone());
        }
        members
    }

    /// Peptide ID -> sorted unique pool IDs.
    pub fn peptide_pools(&self) -> BTreeMap<String, Vec<PoolId>> {
        let mut map: BTreeMap<String, BTreeSet<PoolId>> = BTreeMap::new();
        for row in &self.rows {
            map.entry(row.peptide_id.clone())
                .or_default()
                .insert(row.pool_id);
        }
        map.into_iter()
            .map(|(id, pools)| (id, pools.into_iter().collect()))
            .collect()
    }

    /// Every unordered peptide pair that shares at least one pool.
    pub fn pooled_peptide_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for peptide_ids in self.pool_members().values() {
            for (a, b) in peptide_ids.iter().tuple_combinations() {
                pairs.push((a.clone(), b.clone()));
            }
        }
        pairs
    }

    /// Number of violations: for each peptide pair sharing more than one
    /// pool, the excess shared-pool count. Zero means every pair is
    /// co-pooled at most once.
    pub fn num_violations(&self) -> usize {
        let peptide_pools = self.peptide_pools();
        let ids: Vec<&String> = peptide_pools.keys().collect();
        let mut violations = 0usize;
        for i in 0..ids.len() {
            let pools_i: HashSet<PoolId> = peptide_pools[ids[i]].iter().copied().collect();
            for j in (i + 1)..ids.len() {
                let shared = peptide_pools[ids[j]]
                    .iter()
                    .filter(|p| pools_i.contains(p))
                    .count();
                if shared > 1 {
                    violations += shared - 1;
                }
            }
        }
        violations
    }

    /// Groups of peptides that share an identical full pool combination.
    /// A non-empty result means the assignment cannot be deconvolved
    /// unambiguously.
    pub fn duplicate_combination_groups(&self) -> Vec<(Vec<PoolId>, Vec<String>)> {
        let mut by_combination: BTreeMap<Vec<PoolId>, Vec<String>> = BTreeMap::new();
        for (peptide_id, pools) in self.peptide_pools() {
            by_combination.entry(pools).or_default().push(peptide_id);
        }
        by_combination
            .into_iter()
            .filter(|(_, peptides)| peptides.len() > 1)
            .collect()
    }

    /// True iff every peptide owns a unique pool combination.
    pub fn is_decodable(&self) -> bool {
        self.duplicate_combination_groups().is_empty()
    }

    /// Verifies the assignment against the design parameters and returns
    /// a per-constraint report. Never fails; violations are data.
    pub fn verify(&self, num_peptides_per_pool: usize, num_coverage: usize) -> VerificationReport {
        let mut violations = Vec::new();
        let num_peptides = self.num_peptides();

        // Constraint 1: each peptide is in exactly `num_coverage` pools.
        for (peptide_id, pools) in self.peptide_pools() {
            if pools.len() != num_coverage {
                violations.push(ConstraintViolation::CoverageCount {
                    peptide_id,
                    found: pools.len(),
                    expected: num_coverage,
                });
            }
        }

        // Constraint 2: unique pool combination per peptide.
        for (pool_ids, peptide_ids) in self.duplicate_combination_groups() {
            violations.push(ConstraintViolation::DuplicateCombination {
                pool_ids,
                peptide_ids,
            });
        }

        // Constraint 3: no pair co-pooled more than once.
        let pair_violations = self.num_violations();
        if pair_violations > 0 {
            violations.push(ConstraintViolation::RepeatedPairs {
                count: pair_violations,
            });
        }

        // Constraint 4: pool sizes. Dummy padding may leave some pools
        // short by the padded amount in total, but never over-full.
        let allowed_deficit = (num_peptides_per_pool
            - num_peptides % num_peptides_per_pool)
            % num_peptides_per_pool;
        let mut coverage_sizes: BTreeMap<CoverageId, BTreeMap<PoolId, usize>> = BTreeMap::new();
        for row in &self.rows {
            *coverage_sizes
                .entry(row.coverage_id)
                .or_default()
                .entry(row.pool_id)
                .or_default() += 1;
        }
        for (coverage_id, pools) in &coverage_sizes {
            let mut deficit = 0usize;
            for (pool_id, size) in pools {
                if *size > num_peptides_per_pool {
                    violations.push(ConstraintViolation::PoolSize {
                        coverage_id: *coverage_id,
                        pool_id: *pool_id,
                        found: *size,
                        expected: num_peptides_per_pool,
                    });
                } else {
                    deficit += num_peptides_per_pool - size;
                }
            }
            if deficit > allowed_deficit {
                violations.push(ConstraintViolation::UnbalancedCoverage {
                    coverage_id: *coverage_id,
                    deficit,
                    allowed: allowed_deficit,
                });
            }
        }

        // Constraint 5: minimal pool count.
        let minimum = num_peptides.div_ceil(num_peptides_per_pool) * num_coverage;
        let found = self.num_pools();
        if found != minimum {
            violations.push(ConstraintViolation::ExtraPools { found, minimum });
        }

        VerificationReport { violations }
    }

    /// Checks that no disallowed pair ever shares a pool.
    pub fn check_disallowed_pairs(&self, disallowed: &DisallowedPairs) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();
        for (pool_id, peptide_ids) in self.pool_members() {
            for (a, b) in peptide_ids.iter().tuple_combinations() {
                if disallowed.contains(a, b) {
                    violations.push(ConstraintViolation::DisallowedPairCoPooled {
                        pool_id,
                        peptide_id_1: a.clone(),
                        peptide_id_2: b.clone(),
                    });
                }
            }
        }
        violations
    }

    /// Randomly permutes the pool-ID labels. Membership topology is
    /// untouched; only the numeric namespace changes.
    pub fn shuffle_pool_ids(&mut self, rng: &mut fastrand::Rng) {
        let old_ids = self.pool_ids();
        let mut new_ids = old_ids.clone();
        rng.shuffle(&mut new_ids);
        let relabel: HashMap<PoolId, PoolId> =
            old_ids.into_iter().zip(new_ids).collect();
        for row in &mut self.rows {
            row.pool_id = relabel[&row.pool_id];
        }
        if !self.plate_map.is_empty() {
            let old_map = std::mem::take(&mut self.plate_map);
            for (pool_id, well) in old_map {
                self.plate_map.insert(relabel[&pool_id], well);
            }
        }
    }

    /// Renumbers pool and coverage IDs with fresh consecutive IDs
    /// starting at the given offsets, preserving relative order. Used to
    /// give independently solved sub-designs disjoint namespaces before
    /// merging.
    pub fn update_ids(&self, start_pool_id: PoolId, start_coverage_id: CoverageId) -> Self {
        let coverage_relabel: HashMap<CoverageId, CoverageId> = self
            .coverage_ids()
            .into_iter()
            .zip(start_coverage_id..)
            .collect();
        let pool_relabel: HashMap<PoolId, PoolId> =
            self.pool_ids().into_iter().zip(start_pool_id..).collect();

        let mut updated = BlockAssignment::new();
        for row in &self.rows {
            updated.add_peptide(
                coverage_relabel[&row.coverage_id],
                pool_relabel[&row.pool_id],
                row.peptide_id.clone(),
                row.peptide_sequence.clone(),
            );
        }
        updated
    }

    /// Merges assignments into one. Pools with the same ID are combined;
    /// callers renumber beforehand when they want disjoint pools.
    pub fn merge(assignments: &[BlockAssignment]) -> BlockAssignment {
        let mut merged = BlockAssignment::new();
        for assignment in assignments {
            for row in &assignment.rows {
                merged.add_peptide(
                    row.coverage_id,
                    row.pool_id,
                    row.peptide_id.clone(),
                    row.peptide_sequence.clone(),
                );
            }
        }
        merged
    }

    /// Monte-Carlo search over pool-ID relabelings: repeatedly shuffle
    /// the pool IDs of one randomly chosen sub-assignment and keep the
    /// permutation whenever the merged violation count decreases.
    /// Inputs are copied; the caller keeps the originals.
    pub fn minimize_violations(
        assignments: &[BlockAssignment],
        shuffle_iters: usize,
        rng: &mut fastrand::Rng,
    ) -> Vec<BlockAssignment> {
        let mut current: Vec<BlockAssignment> = assignments.to_vec();
        let mut best = current.clone();
        let mut min_violations = BlockAssignment::merge(&best).num_violations();
        for _ in 0..shuffle_iters {
            if min_violations == 0 {
                break;
            }
            let idx = rng.usize(0..current.len());
            current[idx].shuffle_pool_ids(rng);
            let violations = BlockAssignment::merge(&current).num_violations();
            if violations < min_violations {
                info!(
                    old = min_violations,
                    new = violations,
                    "Found a better pool-ID relabeling"
                );
                best = current.clone();
                min_violations = violations;
            }
        }
        best
    }

    /// Assigns plate and well IDs to pools in ascending pool-ID order,
    /// rolling over to a fresh plate when one fills up.
    pub fn assign_well_ids(&mut self, format: PlateFormat) {
        self.plate_map.clear();
        let all_wells = format.well_ids();
        for (idx, pool_id) in self.pool_ids().into_iter().enumerate() {
            let plate_id = (idx / all_wells.len()) as u32 + 1;
            let well_id = all_wells[idx % all_wells.len()].clone();
            self.plate_map
                .insert(pool_id, PlateWell::new(plate_id, well_id));
        }
    }

    /// Writes `coverage_id,pool_id,peptide_id,peptide_sequence` rows,
    /// plus `plate_id,well_id` when a plate map is present. Rows are
    /// sorted by peptide ID then pool ID for stable output.
    pub fn to_writer<W: Write>(&self, writer: W) -> PfResult<()> {
        let has_plate = !self.plate_map.is_empty();
        let mut wtr = csv::Writer::from_writer(writer);
        if has_plate {
            wtr.write_record([
                "coverage_id",
                "pool_id",
                "peptide_id",
                "peptide_sequence",
                "plate_id",
                "well_id",
            ])?;
        } else {
            wtr.write_record(["coverage_id", "pool_id", "peptide_id", "peptide_sequence"])?;
        }
        let mut sorted: Vec<&AssignmentRow> = self.rows.iter().collect();
        sorted.sort_by(|a, b| {
            a.peptide_id
                .cmp(&b.peptide_id)
                .then(a.pool_id.cmp(&b.pool_id))
        });
        for row in sorted {
            if has_plate {
                let well = self.plate_map.get(&row.pool_id);
                wtr.write_record([
                    row.coverage_id.to_string(),
                    row.pool_id.to_string(),
                    row.peptide_id.clone(),
                    row.peptide_sequence.clone(),
                    well.map(|w| w.plate_id.to_string()).unwrap_or_default(),
                    well.map(|w| w.well_id.clone()).unwrap_or_default(),
                ])?;
            } else {
                wtr.write_record([
                    row.coverage_id.to_string(),
                    row.pool_id.to_string(),
                    row.peptide_id.clone(),
                    row.peptide_sequence.clone(),
                ])?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> PfResult<()> {
        let file = std::fs::File::create(path)?;
        self.to_writer(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> PfResult<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        let col = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                PoolforgeError::Config(format!("Missing '{name}' column in assignment file."))
            })
        };
        let coverage_idx = col("coverage_id")?;
        let pool_idx = col("pool_id")?;
        let peptide_idx = col("peptide_id")?;
        let sequence_idx = headers.iter().position(|h| h == "peptide_sequence");
        let plate_idx = headers.iter().position(|h| h == "plate_id");
        let well_idx = headers.iter().position(|h| h == "well_id");

        let mut assignment = BlockAssignment::new();
        for record in rdr.records() {
            let record = record?;
            let parse_u32 = |idx: usize, name: &str| -> PfResult<u32> {
                record
                    .get(idx)
                    .and_then(|v| v.parse::<u32>().ok())
                    .ok_or_else(|| {
                        PoolforgeError::Validation(format!("Invalid '{name}' value in row."))
                    })
            };
            let coverage_id = parse_u32(coverage_idx, "coverage_id")?;
            let pool_id = parse_u32(pool_idx, "pool_id")?;
            let peptide_id = record.get(peptide_idx).unwrap_or("").to_string();
            let sequence = sequence_idx
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .to_string();
            assignment.add_peptide(coverage_id, pool_id, peptide_id, sequence);
            if let (Some(pi), Some(wi)) = (plate_idx, well_idx) {
                if let (Some(plate_raw), Some(well_raw)) = (record.get(pi), record.get(wi)) {
                    if let Ok(plate_id) = plate_raw.parse::<u32>() {
                        assignment
                            .plate_map
                            .insert(pool_id, PlateWell::new(plate_id, well_raw));
                    }
                }
            }
        }
        Ok(assignment)
    }

    pub fn read_csv(path: impl AsRef<Path>) -> PfResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Bench-ready view: one row per well with semicolon-joined peptide
    /// IDs and sequences, for pipetting at the bench.
    pub fn bench_ready_rows(&self) -> Vec<(u32, String, String, String)> {
        let mut by_well: BTreeMap<(u32, String), (Vec<String>, Vec<String>)> = BTreeMap::new();
        for row in &self.rows {
            if let Some(well) = self.plate_map.get(&row.pool_id) {
                let entry = by_well
                    .entry((well.plate_id, well.well_id.clone()))
                    .or_default();
                entry.0.push(row.peptide_id.clone());
                entry.1.push(row.peptide_sequence.clone());
            }
        }
        by_well
            .into_iter()
            .map(|((plate_id, well_id), (ids, seqs))| {
                (plate_id, well_id, ids.join(";"), seqs.join(";"))
            })
            .collect()
    }

    /// Writes the bench-ready view as CSV, one row per well.
    pub fn write_bench_ready_csv(&self, path: impl AsRef<Path>) -> PfResult<()> {
        let file = std::fs::File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        wtr.write_record(["plate_id", "well_id", "peptide_ids", "peptide_sequences"])?;
        for (plate_id, well_id, ids, seqs) in self.bench_ready_rows() {
            wtr.write_record([plate_id.to_string(), well_id, ids, seqs])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// A single failed verification constraint, with enough detail for both
/// programmatic handling and user-facing diagnosis.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintViolation {
    CoverageCount {
        peptide_id: String,
        found: usize,
        expected: usize,
    },
    DuplicateCombination {
        pool_ids: Vec<PoolId>,
        peptide_ids: Vec<String>,
    },
    RepeatedPairs {
        count: usize,
    },
    PoolSize {
        coverage_id: CoverageId,
        pool_id: PoolId,
        found: usize,
        expected: usize,
    },
    UnbalancedCoverage {
        coverage_id: CoverageId,
        deficit: usize,
        allowed: usize,
    },
    ExtraPools {
        found: usize,
        minimum: usize,
    },
    DisallowedPairCoPooled {
        pool_id: PoolId,
        peptide_id_1: String,
        peptide_id_2: String,
    },
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoverageCount {
                peptide_id,
                found,
                expected,
            } => write!(
                f,
                "Peptide {peptide_id} appears in {found} pools (expected {expected})"
            ),
            Self::DuplicateCombination {
                pool_ids,
                peptide_ids,
            } => write!(
                f,
                "Peptides [{}] share the pool combination {:?}",
                peptide_ids.join(", "),
                pool_ids
            ),
            Self::RepeatedPairs { count } => {
                write!(f, "{count} peptide pair(s) co-pooled more than once")
            }
            Self::PoolSize {
                coverage_id,
                pool_id,
                found,
                expected,
            } => write!(
                f,
                "Pool {pool_id} in coverage {coverage_id} holds {found} peptides (limit {expected})"
            ),
            Self::UnbalancedCoverage {
                coverage_id,
                deficit,
                allowed,
            } => write!(
                f,
                "Coverage {coverage_id} is short {deficit} placements (at most {allowed} allowed)"
            ),
            Self::ExtraPools { found, minimum } => {
                write!(f, "Assignment uses {found} pools (minimum is {minimum})")
            }
            Self::DisallowedPairCoPooled {
                pool_id,
                peptide_id_1,
                peptide_id_2,
            } => write!(
                f,
                "Disallowed pair ({peptide_id_1}, {peptide_id_2}) shares pool {pool_id}"
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub violations: Vec<ConstraintViolation>,
}

impl VerificationReport {
    pub fn is_optimal(&self) -> bool {
        self.violations.is_empty()
    }
}
