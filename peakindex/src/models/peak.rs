use serde::{
    Deserialize,
    Serialize,
};

use crate::mz_to_neutral_mass;

/// A single centroided MS1 peak as observed in one scan of one run.
///
/// Immutable after indexing. The index owns every peak for the lifetime of a
/// run; downstream structures refer back to it through [`PeakKey`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexedPeak {
    pub mz: f64,
    pub intensity: f64,
    /// Zero-based index into the run's ordered MS1 scan list.
    pub ms1_index: u32,
    /// Retention time of the owning scan, in minutes.
    pub retention_time: f64,
}

impl IndexedPeak {
    /// Neutral mass of this centroid under a charge hypothesis.
    pub fn neutral_mass(&self, charge: u8) -> f64 {
        mz_to_neutral_mass(self.mz, charge)
    }

    /// Identity key for this physical centroid.
    ///
    /// Two peaks compare equal iff they are the same centroid in the same
    /// scan, which is the invariant the per-run apex collision checks rely
    /// on.
    pub fn key(&self) -> PeakKey {
        PeakKey {
            ms1_index: self.ms1_index,
            mz_bits: self.mz.to_bits(),
        }
    }
}

/// Hashable identity of an [`IndexedPeak`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeakKey {
    pub ms1_index: u32,
    mz_bits: u64,
}

/// Metadata for one MS1 scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ms1ScanInfo {
    /// Zero-based position among the MS1 scans of the run.
    pub ms1_index: u32,
    /// One-based scan number in the source file.
    pub scan_number: u32,
    /// Retention time in minutes.
    pub retention_time: f64,
}
