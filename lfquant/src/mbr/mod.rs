mod decoys;
mod donors;
mod orchestrator;
mod scorer;

pub use donors::{
    select_donor_peaks,
    DonorPeak,
};
pub use orchestrator::{
    MbrPass,
    MbrRunStats,
};
pub use scorer::{
    fit_acceptor_stats,
    AcceptorStats,
    CandidateFeatures,
    MbrScorer,
};

use crate::models::{
    ChromatographicPeak,
    IdIdx,
    RunIdx,
};

/// One candidate transfer: a peak assembled in the acceptor run from a donor
/// identification, together with the evidence it was scored on.
#[derive(Debug, Clone)]
pub struct MbrTransfer {
    pub peak: ChromatographicPeak,
    pub features: CandidateFeatures,
    pub donor_id: IdIdx,
    pub donor_run: RunIdx,
    pub score: f64,
}
