use crate::assignment::{BlockAssignment, PoolId};
use crate::error::{PfResult, PoolforgeError};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Per-pool spot counts, keyed by pool ID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolReadout {
    spot_counts: BTreeMap<PoolId, f64>,
}

impl PoolReadout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pool_id: PoolId, spot_count: f64) {
        self.spot_counts.insert(pool_id, spot_count);
    }

    pub fn spot_count(&self, pool_id: PoolId) -> Option<f64> {
        self.spot_counts.get(&pool_id).copied()
    }

    pub fn spot_counts(&self) -> &BTreeMap<PoolId, f64> {
        &self.spot_counts
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.spot_counts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.spot_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spot_counts.is_empty()
    }

    /// Loads `pool_id,spot_count` rows.
    pub fn load_from_file(path: impl AsRef<Path>) -> PfResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> PfResult<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        let pool_idx = headers
            .iter()
            .position(|h| h == "pool_id")
            .ok_or_else(|| PoolforgeError::Config("Missing 'pool_id' column.".into()))?;
        let spot_idx = headers
            .iter()
            .position(|h| h == "spot_count")
            .ok_or_else(|| PoolforgeError::Config("Missing 'spot_count' column.".into()))?;

        let mut readout = Self::new();
        for record in rdr.records() {
            let record = record?;
            let pool_id: PoolId = record
                .get(pool_idx)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PoolforgeError::Validation("Invalid pool_id value.".into()))?;
            let spot_count: f64 = record
                .get(spot_idx)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PoolforgeError::Validation("Invalid spot_count value.".into()))?;
            readout.insert(pool_id, spot_count);
        }
        Ok(readout)
    }

    /// Later readouts win on overlapping pool IDs.
    pub fn merge(readouts: &[PoolReadout]) -> PoolReadout {
        let mut merged = PoolReadout::new();
        for readout in readouts {
            for (&pool_id, &count) in &readout.spot_counts {
                merged.insert(pool_id, count);
            }
        }
        merged
    }
}

/// One physical well measurement before pool IDs are known.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateReadoutEntry {
    pub plate_id: u32,
    pub well_id: String,
    pub spot_count: f64,
}

/// Raw plate-reader output: spot counts addressed by plate and well.
/// Needs the assignment's plate map to become a `PoolReadout`.
#[derive(Debug, Clone, Default)]
pub struct PlateReadout {
    entries: Vec<PlateReadoutEntry>,
}

impl PlateReadout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, plate_id: u32, well_id: impl Into<String>, spot_count: f64) {
        self.entries.push(PlateReadoutEntry {
            plate_id,
            well_id: well_id.into(),
            spot_count,
        });
    }

    pub fn entries(&self) -> &[PlateReadoutEntry] {
        &self.entries
    }

    /// Loads `plate_id,well_id,spot_count` rows.
    pub fn load_from_file(path: impl AsRef<Path>) -> PfResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> PfResult<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        let col = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                PoolforgeError::Config(format!(
                    "Missing '{name}' column in plate readout file."
                ))
            })
        };
        let plate_idx = col("plate_id")?;
        let well_idx = col("well_id")?;
        let spot_idx = col("spot_count")?;

        let mut readout = Self::new();
        for record in rdr.records() {
            let record = record?;
            let plate_id: u32 = record
                .get(plate_idx)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PoolforgeError::Validation("Invalid plate_id value.".into()))?;
            let well_id = record
                .get(well_idx)
                .ok_or_else(|| PoolforgeError::Validation("Row missing well_id.".into()))?
                .to_string();
            let spot_count: f64 = record
                .get(spot_idx)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PoolforgeError::Validation("Invalid spot_count value.".into()))?;
            readout.add_entry(plate_id, well_id, spot_count);
        }
        Ok(readout)
    }

    pub fn merge(readouts: &[PlateReadout]) -> PlateReadout {
        let mut merged = PlateReadout::new();
        for readout in readouts {
            merged.entries.extend(readout.entries.iter().cloned());
        }
        merged
    }

    /// Resolves wells to pool IDs through the assignment's plate map.
    /// Wells with no matching pool are skipped with a warning.
    pub fn to_pool_readout(&self, assignment: &BlockAssignment) -> PfResult<PoolReadout> {
        if assignment.plate_map().is_empty() {
            return Err(PoolforgeError::Config(
                "Assignment carries no plate map; cannot resolve plate wells to pools.".into(),
            ));
        }
        let mut well_to_pool: BTreeMap<(u32, &str), PoolId> = BTreeMap::new();
        for (&pool_id, well) in assignment.plate_map() {
            well_to_pool.insert((well.plate_id, well.well_id.as_str()), pool_id);
        }
        let mut readout = PoolReadout::new();
        for entry in &self.entries {
            match well_to_pool.get(&(entry.plate_id, entry.well_id.as_str())) {
                Some(&pool_id) => readout.insert(pool_id, entry.spot_count),
                None => warn!(
                    plate_id = entry.plate_id,
                    well_id = %entry.well_id,
                    "No pool mapped to this well; skipping."
                ),
            }
        }
        Ok(readout)
    }
}
