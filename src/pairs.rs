use crate::peptide::PeptideSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A pair of peptides that should share a pool when possible, with the
/// similarity score that nominated them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferredPair {
    pub peptide_id_1: String,
    pub peptide_id_2: String,
    pub score: f64,
}

impl PreferredPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>, score: f64) -> Self {
        Self {
            peptide_id_1: a.into(),
            peptide_id_2: b.into(),
            score,
        }
    }
}

/// Unordered peptide pairs that must never share a pool.
///
/// A positive readout from a pool holding both members of a disallowed
/// pair could not be attributed to either, so the solver treats these as
/// hard constraints.
#[derive(Debug, Clone, Default)]
pub struct DisallowedPairs {
    pairs: HashSet<(String, String)>,
}

impl DisallowedPairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, a: &str, b: &str) {
        self.pairs.insert(normalize(a, b));
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&normalize(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.pairs.iter()
    }
}

fn normalize(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Computes transitive peptide neighbors: connected components of the
/// undirected graph induced by the preferred pairs. Each peptide that
/// appears in any pair belongs to exactly one returned cluster.
pub fn compute_transitive_neighbors(pairs: &[PreferredPair]) -> Vec<Vec<String>> {
    // Adjacency over peptide IDs. BTreeMap keeps traversal order stable
    // so clustering is deterministic across runs.
    let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for pair in pairs {
        adjacency
            .entry(&pair.peptide_id_1)
            .or_default()
            .insert(&pair.peptide_id_2);
        adjacency
            .entry(&pair.peptide_id_2)
            .or_default()
            .insert(&pair.peptide_id_1);
    }

    let mut clusters: Vec<Vec<String>> = Vec::new();
    let mut assigned: BTreeSet<&str> = BTreeSet::new();
    for &start in adjacency.keys() {
        if assigned.contains(start) {
            continue;
        }
        let mut stack = vec![start];
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if visited.insert(current) {
                if let Some(neighbors) = adjacency.get(current) {
                    stack.extend(neighbors.iter().copied());
                }
            }
        }
        assigned.extend(visited.iter().copied());
        clusters.push(visited.into_iter().map(String::from).collect());
    }
    clusters
}

/// Finds preferred pairs by Levenshtein distance between sequences.
///
/// This is the built-in similarity oracle. Richer oracles (embedding
/// models, assay history) plug in through the same pair contract.
pub fn find_levenshtein_pairs(peptides: &PeptideSet, max_distance: usize) -> Vec<PreferredPair> {
    let mut pairs = Vec::new();
    let list = peptides.peptides();
    for i in 0..list.len() {
        for j in (i + 1)..list.len() {
            if list[i].sequence.is_empty() || list[j].sequence.is_empty() {
                continue;
            }
            let dist = levenshtein(&list[i].sequence, &list[j].sequence);
            if dist <= max_distance {
                pairs.push(PreferredPair::new(
                    list[i].id.clone(),
                    list[j].id.clone(),
                    dist as f64,
                ));
            }
        }
    }
    pairs
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
