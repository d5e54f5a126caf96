use peakindex::IndexedPeak;
use serde::{
    Deserialize,
    Serialize,
};

/// One accepted isotopic envelope: the cluster of isotope peaks of a species
/// in a single MS1 scan at one charge state.
///
/// The stored peak is the centroid found at the peakfinding mass; the summed
/// intensity covers every isotope observed in that scan. An envelope belongs
/// to exactly one [`crate::models::ChromatographicPeak`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsotopicEnvelope {
    pub peak: IndexedPeak,
    pub charge: u8,
    /// Sum of the observed isotope intensities in this scan.
    pub intensity: f64,
    /// Pearson correlation of observed vs theoretical isotope intensities.
    pub pearson: f64,
}

impl IsotopicEnvelope {
    pub fn retention_time(&self) -> f64 {
        self.peak.retention_time
    }

    pub fn ms1_index(&self) -> u32 {
        self.peak.ms1_index
    }
}
