mod cv;
mod pep;
mod qvalues;

pub use cv::{
    CrossValidatedScorer,
    DataBuffer,
    FeatureLike,
    GBMConfig,
};
pub use pep::{
    assign_mbr_pep,
    MIN_PEAKS_FOR_PEP,
    MIN_RT_DECOYS_FOR_PEP,
};
pub use qvalues::assign_mbr_qvalues;
