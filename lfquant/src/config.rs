use std::collections::HashSet;

use serde::{
    Deserialize,
    Serialize,
};

/// How the best donor peak is picked per peptide when building an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DonorCriterion {
    /// Highest PSM score; falls through to Intensity when the best score is 0.
    #[default]
    Score,
    /// Most distinct co-eluting peptide peaks within the alignment window.
    Neighbors,
    /// Highest peak intensity.
    Intensity,
}

/// Relative weighting of the terms in the composite MBR transfer score.
///
/// All terms are mode-normalized densities in (0, 1], so unit weights give
/// each dimension equal say.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MbrScoreWeights {
    pub ppm: f64,
    pub rt: f64,
    pub intensity: f64,
    pub correlation: f64,
}

impl Default for MbrScoreWeights {
    fn default() -> Self {
        Self {
            ppm: 1.0,
            rt: 1.0,
            intensity: 1.0,
            correlation: 1.0,
        }
    }
}

/// Engine configuration. All tolerances in ppm, all times in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantConfig {
    pub ppm_tolerance: f64,
    pub isotope_ppm_tolerance: f64,
    pub peakfinding_ppm_tolerance: f64,
    pub num_isotopes_required: usize,
    pub missed_scans_allowed: u32,
    /// Integrate the peak over time instead of reporting the apex intensity.
    pub integrate: bool,
    /// Only quantify each identification at its own precursor charge.
    pub id_specific_charge_state: bool,
    pub discrimination_factor_to_cut_peak: f64,

    pub match_between_runs: bool,
    pub mbr_ppm_tolerance: f64,
    pub mbr_rt_window: f64,
    pub mbr_alignment_window: f64,
    pub num_anchor_peptides_for_mbr: usize,
    pub donor_criterion: DonorCriterion,
    pub donor_q_value_threshold: f64,
    pub mbr_detection_q_value_threshold: f64,
    /// Only transfer a peptide into a run if its protein has at least one
    /// MS/MS identification in that run's condition.
    pub require_msms_id_in_condition: bool,

    pub quantify_ambiguous_peptides: bool,
    /// None quantifies every modified sequence.
    pub peptide_modified_sequences_to_quantify: Option<HashSet<String>>,

    /// None uses available cores minus one.
    pub max_threads: Option<usize>,
    pub random_seed: u64,
    pub pep_training_fraction: f64,
    pub score_weights: MbrScoreWeights,
}

impl Default for QuantConfig {
    fn default() -> Self {
        Self {
            ppm_tolerance: 10.0,
            isotope_ppm_tolerance: 5.0,
            peakfinding_ppm_tolerance: 20.0,
            num_isotopes_required: 2,
            missed_scans_allowed: 1,
            integrate: false,
            id_specific_charge_state: false,
            discrimination_factor_to_cut_peak: 0.6,
            match_between_runs: false,
            mbr_ppm_tolerance: 10.0,
            mbr_rt_window: 1.0,
            mbr_alignment_window: 2.5,
            num_anchor_peptides_for_mbr: 3,
            donor_criterion: DonorCriterion::Score,
            donor_q_value_threshold: 0.01,
            mbr_detection_q_value_threshold: 0.05,
            require_msms_id_in_condition: false,
            quantify_ambiguous_peptides: false,
            peptide_modified_sequences_to_quantify: None,
            max_threads: None,
            random_seed: 42,
            pep_training_fraction: 0.25,
            score_weights: MbrScoreWeights::default(),
        }
    }
}

impl QuantConfig {
    pub fn thread_count(&self) -> usize {
        match self.max_threads {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1),
        }
    }

    /// Whether a modified sequence is eligible for quantification and MBR.
    pub fn is_whitelisted(&self, modified_sequence: &str) -> bool {
        match &self.peptide_modified_sequences_to_quantify {
            Some(set) => set.contains(modified_sequence),
            None => true,
        }
    }
}
