use crate::error::{PfResult, PoolforgeError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical plate format: how many wells one plate offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlateFormat {
    Wells24,
    Wells48,
    Wells96,
    Wells384,
}

impl PlateFormat {
    pub fn from_num_wells(num_wells: usize) -> PfResult<Self> {
        match num_wells {
            24 => Ok(Self::Wells24),
            48 => Ok(Self::Wells48),
            96 => Ok(Self::Wells96),
            384 => Ok(Self::Wells384),
            other => Err(PoolforgeError::Config(format!(
                "Unsupported number of plate wells: {other} (allowed: 24, 48, 96, 384)."
            ))),
        }
    }

    pub fn num_wells(&self) -> usize {
        match self {
            Self::Wells24 => 24,
            Self::Wells48 => 48,
            Self::Wells96 => 96,
            Self::Wells384 => 384,
        }
    }

    fn dimensions(&self) -> (usize, usize) {
        match self {
            Self::Wells24 => (4, 6),
            Self::Wells48 => (6, 8),
            Self::Wells96 => (8, 12),
            Self::Wells384 => (16, 24),
        }
    }

    /// Well IDs in row-major order: A1, A2, ... for as many rows and
    /// columns as the format has.
    pub fn well_ids(&self) -> Vec<String> {
        let (rows, cols) = self.dimensions();
        let mut ids = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            let row_char = (b'A' + r as u8) as char;
            for c in 1..=cols {
                ids.push(format!("{row_char}{c}"));
            }
        }
        ids
    }
}

impl fmt::Display for PlateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.num_wells())
    }
}

/// One physical well on one plate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateWell {
    pub plate_id: u32,
    pub well_id: String,
}

impl PlateWell {
    pub fn new(plate_id: u32, well_id: impl Into<String>) -> Self {
        Self {
            plate_id,
            well_id: well_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_id_enumeration() {
        let ids = PlateFormat::Wells24.well_ids();
        assert_eq!(ids.len(), 24);
        assert_eq!(ids[0], "A1");
        assert_eq!(ids[6], "B1");
        assert_eq!(ids[23], "D6");
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(PlateFormat::from_num_wells(12).is_err());
        assert_eq!(
            PlateFormat::from_num_wells(96).unwrap(),
            PlateFormat::Wells96
        );
    }
}
