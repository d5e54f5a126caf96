use serde::{
    Deserialize,
    Serialize,
};

use crate::models::identification::{
    RunIdx,
    RunRecord,
};
use crate::models::peak::ChromatographicPeak;

/// Per-run quantification results.
///
/// Invariant after per-run error checking: no two whitelisted non-MBR peaks
/// in a run share an apex centroid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Results {
    pub runs: Vec<RunRecord>,
    /// One peak list per run, parallel to `runs`.
    pub peaks: Vec<Vec<ChromatographicPeak>>,
}

impl Results {
    pub fn new(runs: Vec<RunRecord>) -> Self {
        let peaks = runs.iter().map(|_| Vec::new()).collect();
        Self { runs, peaks }
    }

    pub fn peaks_for(&self, run: RunIdx) -> &[ChromatographicPeak] {
        &self.peaks[run.0]
    }

    pub fn set_run_peaks(&mut self, run: RunIdx, peaks: Vec<ChromatographicPeak>) {
        self.peaks[run.0] = peaks;
    }

    pub fn num_peaks(&self) -> usize {
        self.peaks.iter().map(|p| p.len()).sum()
    }
}
