use peakindex::PeakKey;
use serde::{
    Deserialize,
    Serialize,
};

use crate::models::envelope::IsotopicEnvelope;
use crate::models::identification::{
    IdIdx,
    RunIdx,
};

/// The chromatographic elution of one peptide species in one run: an ordered
/// sequence of per-scan isotopic envelopes with an apex.
///
/// Mutable while envelopes are added, cut, and merged; sealed once FDR
/// estimation starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromatographicPeak {
    pub run: RunIdx,
    pub envelopes: Vec<IsotopicEnvelope>,
    /// Index of the apex envelope within `envelopes`.
    pub apex: Option<usize>,
    /// Apex intensity, or integrated intensity when integration is on.
    pub intensity: f64,
    pub id_idxs: Vec<IdIdx>,
    pub is_mbr: bool,
    /// True for peaks searched at a randomized retention time (RT decoys).
    pub random_rt: bool,
    /// True when the owning identification is a decoy peptide.
    pub decoy_peptide: bool,
    pub mbr_score: Option<f64>,
    pub mbr_pep: Option<f64>,
    pub mbr_q_value: Option<f64>,
    /// Retention time of the last valley this peak was cut at.
    pub split_rt: Option<f64>,
}

impl ChromatographicPeak {
    pub fn new(run: RunIdx, id_idx: IdIdx) -> Self {
        Self {
            run,
            envelopes: Vec::new(),
            apex: None,
            intensity: 0.0,
            id_idxs: vec![id_idx],
            is_mbr: false,
            random_rt: false,
            decoy_peptide: false,
            mbr_score: None,
            mbr_pep: None,
            mbr_q_value: None,
            split_rt: None,
        }
    }

    pub fn new_mbr(run: RunIdx, id_idx: IdIdx, random_rt: bool, decoy_peptide: bool) -> Self {
        Self {
            is_mbr: true,
            random_rt,
            decoy_peptide,
            ..Self::new(run, id_idx)
        }
    }

    pub fn apex_envelope(&self) -> Option<&IsotopicEnvelope> {
        self.apex.map(|i| &self.envelopes[i])
    }

    pub fn apex_rt(&self) -> Option<f64> {
        self.apex_envelope().map(|e| e.retention_time())
    }

    pub fn apex_charge(&self) -> Option<u8> {
        self.apex_envelope().map(|e| e.charge)
    }

    pub fn apex_key(&self) -> Option<PeakKey> {
        self.apex_envelope().map(|e| e.peak.key())
    }

    /// Distinct charge states present in this peak, ascending.
    pub fn charges(&self) -> Vec<u8> {
        let mut charges: Vec<u8> = self.envelopes.iter().map(|e| e.charge).collect();
        charges.sort_unstable();
        charges.dedup();
        charges
    }

    /// Retention time span covered by the envelopes, as (min, max).
    pub fn rt_span(&self) -> Option<(f64, f64)> {
        if self.envelopes.is_empty() {
            return None;
        }
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for e in &self.envelopes {
            lo = lo.min(e.retention_time());
            hi = hi.max(e.retention_time());
        }
        Some((lo, hi))
    }

    /// Envelopes at one charge state, ordered by scan index.
    pub fn envelope_indices_at_charge(&self, charge: u8) -> Vec<usize> {
        let mut idxs: Vec<usize> = self
            .envelopes
            .iter()
            .enumerate()
            .filter(|(_, e)| e.charge == charge)
            .map(|(i, _)| i)
            .collect();
        idxs.sort_by_key(|&i| self.envelopes[i].ms1_index());
        idxs
    }

    /// Re-derive the apex and the reported intensity from the current
    /// envelope list. The apex is the most intense envelope; the intensity
    /// is either the apex intensity or, with `integrate`, the trapezoidal
    /// sum over the apex charge state's scan-ordered envelopes.
    pub fn recalculate(&mut self, integrate: bool) {
        self.envelopes
            .sort_by(|a, b| a.ms1_index().cmp(&b.ms1_index()).then(a.charge.cmp(&b.charge)));
        self.apex = self
            .envelopes
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.intensity.total_cmp(&b.intensity))
            .map(|(i, _)| i);

        let Some(apex) = self.apex else {
            self.intensity = 0.0;
            return;
        };
        if !integrate {
            self.intensity = self.envelopes[apex].intensity;
            return;
        }

        let apex_charge = self.envelopes[apex].charge;
        let ordered = self.envelope_indices_at_charge(apex_charge);
        self.intensity = ordered
            .windows(2)
            .map(|w| (self.envelopes[w[0]].intensity + self.envelopes[w[1]].intensity) / 2.0)
            .sum();
        if ordered.len() == 1 {
            self.intensity = self.envelopes[ordered[0]].intensity;
        }
    }

    /// Absorb another peak's envelopes and identifications.
    pub fn merge_from(&mut self, other: ChromatographicPeak, integrate: bool) {
        for env in other.envelopes {
            // The same (scan, charge) envelope may have been assembled by
            // both peaks; keep one copy.
            let dup = self
                .envelopes
                .iter()
                .any(|e| e.peak.key() == env.peak.key() && e.charge == env.charge);
            if !dup {
                self.envelopes.push(env);
            }
        }
        for id in other.id_idxs {
            if !self.id_idxs.contains(&id) {
                self.id_idxs.push(id);
            }
        }
        if let (Some(a), Some(b)) = (self.mbr_score, other.mbr_score) {
            self.mbr_score = Some(a.max(b));
        }
        self.recalculate(integrate);
    }
}
