use std::path::PathBuf;

use serde::{
    Deserialize,
    Serialize,
};

/// Index of a run in the engine's run list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunIdx(pub usize);

/// Index of an identification in the engine's identification arena.
///
/// Peaks refer to identifications through this index rather than owning
/// references, which keeps the peak <-> identification <-> protein group
/// graph acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdIdx(pub usize);

/// Descriptor of one MS run in the experimental design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub path: PathBuf,
    pub condition: String,
    pub bio_replicate: u32,
    pub fraction: u32,
    pub tech_replicate: u32,
}

impl RunRecord {
    /// The key runs are ordered by for deterministic processing.
    pub fn order_key(&self) -> (&str, u32, u32, u32) {
        (
            &self.condition,
            self.bio_replicate,
            self.fraction,
            self.tech_replicate,
        )
    }
}

/// Whether an identification came from a target or a decoy database entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum DecoyMarking {
    #[default]
    Target,
    Decoy,
}

impl DecoyMarking {
    pub fn is_decoy(&self) -> bool {
        matches!(self, DecoyMarking::Decoy)
    }
}

/// One peptide-spectrum match delivered by the upstream search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identification {
    pub run: RunIdx,
    pub base_sequence: String,
    pub modified_sequence: String,
    pub monoisotopic_mass: f64,
    pub precursor_charge: u8,
    /// Retention time of the identifying MS2 scan, in minutes.
    pub ms2_retention_time: f64,
    pub psm_score: f64,
    pub q_value: f64,
    /// Molecular formula (e.g. "C50H80N14O18"); derived from the sequence
    /// when absent.
    pub chemical_formula: Option<String>,
    pub protein_groups: Vec<String>,
    pub decoy: DecoyMarking,
    /// Monoisotopic mass plus the most abundant isotope shift. Written once
    /// during isotope model calculation, before any quantification starts.
    pub peakfinding_mass: f64,
}

impl Identification {
    pub fn new(
        run: RunIdx,
        base_sequence: impl Into<String>,
        modified_sequence: impl Into<String>,
        monoisotopic_mass: f64,
        precursor_charge: u8,
        ms2_retention_time: f64,
        psm_score: f64,
        q_value: f64,
    ) -> Self {
        Self {
            run,
            base_sequence: base_sequence.into(),
            modified_sequence: modified_sequence.into(),
            monoisotopic_mass,
            precursor_charge,
            ms2_retention_time,
            psm_score,
            q_value,
            chemical_formula: None,
            protein_groups: Vec::new(),
            decoy: DecoyMarking::Target,
            peakfinding_mass: monoisotopic_mass,
        }
    }

    pub fn with_proteins(mut self, proteins: Vec<String>) -> Self {
        self.protein_groups = proteins;
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.chemical_formula = Some(formula.into());
        self
    }

    pub fn as_decoy(mut self) -> Self {
        self.decoy = DecoyMarking::Decoy;
        self
    }
}
