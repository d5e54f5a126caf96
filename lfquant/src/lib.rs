//! Label-free quantification of peptide identifications across MS runs.
//!
//! Given a set of MS/MS identifications and the centroided MS1 peaks of the
//! runs they came from, the engine finds each peptide's precursor isotopic
//! envelope in MS1, integrates it over chromatographic time, and optionally
//! transfers identifications between runs (match-between-runs) with
//! double-decoy FDR control over the transfers.

pub mod config;
pub mod data_sources;
pub mod engine;
pub mod errors;
pub mod isotopes;
pub mod mbr;
pub mod ml;
pub mod models;
pub mod quant;
pub mod traits;
pub mod utils;

pub use config::{
    DonorCriterion,
    MbrScoreWeights,
    QuantConfig,
};
pub use engine::{
    LfqEngine,
    QuantDiagnostics,
    QuantOutput,
};
pub use errors::LfqError;
pub use models::{
    ChromatographicPeak,
    DecoyMarking,
    IdIdx,
    Identification,
    IsotopicEnvelope,
    Results,
    RunIdx,
    RunRecord,
};
pub use traits::SpectrumSource;
