use crate::error::{PfResult, PoolforgeError};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// A single candidate peptide. The sequence may be empty when the caller
/// only works with identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peptide {
    pub id: String,
    pub sequence: String,
}

impl Peptide {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence: sequence.into(),
        }
    }
}

/// An immutable roster of peptides with unique IDs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeptideSet {
    peptides: Vec<Peptide>,
}

impl PeptideSet {
    pub fn new(peptides: Vec<Peptide>) -> PfResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for p in &peptides {
            if !seen.insert(p.id.clone()) {
                return Err(PoolforgeError::Config(format!(
                    "Duplicate peptide ID: {}",
                    p.id
                )));
            }
        }
        Ok(Self { peptides })
    }

    pub fn len(&self) -> usize {
        self.peptides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peptides.is_empty()
    }

    pub fn peptides(&self) -> &[Peptide] {
        &self.peptides
    }

    pub fn ids(&self) -> Vec<String> {
        self.peptides.iter().map(|p| p.id.clone()).collect()
    }

    pub fn sequence_of(&self, peptide_id: &str) -> Option<&str> {
        self.peptides
            .iter()
            .find(|p| p.id == peptide_id)
            .map(|p| p.sequence.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peptide> {
        self.peptides.iter()
    }

    /// Loads peptides from a CSV file with `peptide_id,peptide_sequence`
    /// columns.
    pub fn load_from_file(path: impl AsRef<Path>) -> PfResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> PfResult<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        let id_idx = headers
            .iter()
            .position(|h| h == "peptide_id")
            .ok_or_else(|| PoolforgeError::Config("Missing 'peptide_id' column.".into()))?;
        let seq_idx = headers.iter().position(|h| h == "peptide_sequence");

        let mut peptides = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let id = record
                .get(id_idx)
                .ok_or_else(|| PoolforgeError::Validation("Row missing peptide_id.".into()))?
                .to_string();
            let sequence = seq_idx
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .to_string();
            peptides.push(Peptide { id, sequence });
        }
        Self::new(peptides)
    }
}

/// Synthesizes `count` placeholder peptide IDs that do not collide with
/// any real ID. Dummies keep pool sizes uniform inside a block and are
/// stripped from the final assignment.
pub fn synthesize_dummy_ids(real_ids: &[String], count: usize) -> Vec<String> {
    let mut dummy_ids = Vec::with_capacity(count);
    let mut idx = 0usize;
    while dummy_ids.len() < count {
        idx += 1;
        let candidate = format!("dummy_peptide_{idx}");
        if !real_ids.iter().any(|id| *id == candidate) {
            dummy_ids.push(candidate);
        }
    }
    dummy_ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_rejected() {
        let result = PeptideSet::new(vec![
            Peptide::new("peptide_1", "AAA"),
            Peptide::new("peptide_1", "CCC"),
        ]);
        assert!(matches!(result, Err(PoolforgeError::Config(_))));
    }

    #[test]
    fn dummy_ids_avoid_collisions() {
        let real = vec!["dummy_peptide_1".to_string(), "peptide_1".to_string()];
        let dummies = synthesize_dummy_ids(&real, 2);
        assert_eq!(dummies, vec!["dummy_peptide_2", "dummy_peptide_3"]);
    }
}
