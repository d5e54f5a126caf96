use peakindex::{
    IndexedPeak,
    MzTolerance,
    PeakIndex,
};

use crate::isotopes::{
    IsotopePattern,
    NEUTRON_SHIFT,
};
use crate::models::IsotopicEnvelope;
use crate::utils::stats::pearson_correlation;

/// Minimum Pearson correlation between observed and theoretical isotope
/// intensities for an envelope to be accepted.
const MIN_PEARSON: f64 = 0.7;
/// A +-1 isotope hypothesis may beat the nominal one by at most this much.
const OFF_BY_ONE_MARGIN: f64 = 0.1;
/// Observed/expected intensity ratio bounds while walking isotopes.
const INTENSITY_RATIO_BOUNDS: (f64, f64) = (0.25, 4.0);

/// Validates that a candidate centroid is the peakfinding isotope of a real
/// isotopic envelope in its scan.
///
/// The observed mass error of the candidate is carried into every sibling
/// isotope query, so an accurate envelope still matches under a small global
/// calibration offset. Each candidate is additionally tested against the
/// 13C off-by-one hypotheses: every hypothesis (the nominal one included)
/// gets an extra probe one neutron below its lowest isotope with zero
/// theoretical abundance. Real signal at the probe marks a truncated
/// envelope and drags that hypothesis down, which is what lets a
/// mis-assigned monoisotope lose to its shifted alternative.
pub struct EnvelopeValidator<'a> {
    index: &'a PeakIndex,
    pattern: &'a IsotopePattern,
    isotope_tol: MzTolerance,
    num_isotopes_required: usize,
}

struct NominalWalk {
    num_found: usize,
    found_sum: f64,
    /// Per-isotope experimental intensities, missing ones imputed from the
    /// theoretical abundances.
    experimental: Vec<f64>,
}

impl<'a> EnvelopeValidator<'a> {
    pub fn new(
        index: &'a PeakIndex,
        pattern: &'a IsotopePattern,
        isotope_ppm_tolerance: f64,
        num_isotopes_required: usize,
    ) -> Self {
        Self {
            index,
            pattern,
            isotope_tol: MzTolerance::Ppm(isotope_ppm_tolerance),
            num_isotopes_required,
        }
    }

    /// Check one candidate peak at one charge; returns the accepted envelope
    /// or None.
    pub fn validate(
        &self,
        candidate: IndexedPeak,
        charge: u8,
        peakfinding_mass: f64,
    ) -> Option<IsotopicEnvelope> {
        if self.pattern.is_empty() {
            return None;
        }
        let mass_error = candidate.neutral_mass(charge) - peakfinding_mass;

        let nominal = self.walk_nominal(&candidate, charge, peakfinding_mass, mass_error);
        if nominal.num_found < self.num_isotopes_required {
            return None;
        }
        let pearson = pearson_correlation(&nominal.experimental, &self.pattern.abundances);
        if !(pearson >= MIN_PEARSON) {
            return None;
        }

        // Compare hypotheses with their low-mass probes attached.
        let probe0 = self.low_mass_probe(&candidate, charge, peakfinding_mass, mass_error, 0.0);
        let mut exp0 = nominal.experimental.clone();
        let mut theor0 = self.pattern.abundances.clone();
        exp0.push(probe0);
        theor0.push(0.0);
        let nominal_probed = pearson_correlation(&exp0, &theor0);

        for offset in [-NEUTRON_SHIFT, NEUTRON_SHIFT] {
            let mut points =
                self.walk_alternate(&candidate, charge, peakfinding_mass, mass_error, offset);
            points.push((
                0.0,
                self.low_mass_probe(&candidate, charge, peakfinding_mass, mass_error, offset),
            ));
            let (theor, exp): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
            let alt_pearson = pearson_correlation(&exp, &theor);
            if alt_pearson > nominal_probed + OFF_BY_ONE_MARGIN {
                return None;
            }
        }

        Some(IsotopicEnvelope {
            peak: candidate,
            charge,
            intensity: nominal.found_sum,
            pearson,
        })
    }

    /// Expected neutral mass of isotope `i` under a global envelope offset.
    fn isotope_mass(&self, i: usize, peakfinding_mass: f64, mass_error: f64, offset: f64) -> f64 {
        let pf = self.pattern.peakfinding_idx;
        peakfinding_mass + mass_error + (self.pattern.shifts[i] - self.pattern.shifts[pf]) + offset
    }

    /// Ratio-gated lookup of isotope `i`: the centroid must exist and sit
    /// within the allowed ratio of its expected intensity.
    fn probe_isotope(
        &self,
        i: usize,
        candidate: &IndexedPeak,
        charge: u8,
        peakfinding_mass: f64,
        mass_error: f64,
        offset: f64,
    ) -> Option<f64> {
        let mass = self.isotope_mass(i, peakfinding_mass, mass_error, offset);
        let expected = self.pattern.abundances[i] * candidate.intensity;
        let hit = self
            .index
            .get_peak(mass, candidate.ms1_index, &self.isotope_tol, charge)?;
        let ratio = hit.intensity / expected;
        if ratio < INTENSITY_RATIO_BOUNDS.0 || ratio > INTENSITY_RATIO_BOUNDS.1 {
            return None;
        }
        Some(hit.intensity)
    }

    /// Walk outward from the peakfinding isotope in both directions,
    /// stopping at the first missing or out-of-ratio isotope. Intensities
    /// beyond the stop are imputed from the theoretical abundances for the
    /// correlation test; only found isotopes contribute to the sum.
    fn walk_nominal(
        &self,
        candidate: &IndexedPeak,
        charge: u8,
        peakfinding_mass: f64,
        mass_error: f64,
    ) -> NominalWalk {
        let n = self.pattern.len();
        let pf = self.pattern.peakfinding_idx;

        let mut found: Vec<Option<f64>> = vec![None; n];
        found[pf] = Some(candidate.intensity);

        for i in (0..pf).rev() {
            match self.probe_isotope(i, candidate, charge, peakfinding_mass, mass_error, 0.0) {
                Some(intensity) => found[i] = Some(intensity),
                None => break,
            }
        }
        for i in pf + 1..n {
            match self.probe_isotope(i, candidate, charge, peakfinding_mass, mass_error, 0.0) {
                Some(intensity) => found[i] = Some(intensity),
                None => break,
            }
        }

        NominalWalk {
            num_found: found.iter().filter(|f| f.is_some()).count(),
            found_sum: found.iter().flatten().sum(),
            experimental: found
                .iter()
                .enumerate()
                .map(|(i, f)| f.unwrap_or(self.pattern.abundances[i] * candidate.intensity))
                .collect(),
        }
    }

    /// The found isotopes of a shifted hypothesis as (theoretical,
    /// experimental) pairs. No imputation here: an all-imputed alternative
    /// would correlate perfectly by construction and veto every envelope.
    fn walk_alternate(
        &self,
        candidate: &IndexedPeak,
        charge: u8,
        peakfinding_mass: f64,
        mass_error: f64,
        offset: f64,
    ) -> Vec<(f64, f64)> {
        let n = self.pattern.len();
        let pf = self.pattern.peakfinding_idx;

        let mut found: Vec<Option<f64>> = vec![None; n];
        found[pf] = self.probe_isotope(pf, candidate, charge, peakfinding_mass, mass_error, offset);

        for i in (0..pf).rev() {
            match self.probe_isotope(i, candidate, charge, peakfinding_mass, mass_error, offset) {
                Some(intensity) => found[i] = Some(intensity),
                None => break,
            }
        }
        for i in pf + 1..n {
            match self.probe_isotope(i, candidate, charge, peakfinding_mass, mass_error, offset) {
                Some(intensity) => found[i] = Some(intensity),
                None => break,
            }
        }

        found
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.map(|intensity| (self.pattern.abundances[i], intensity)))
            .collect()
    }

    /// Intensity of whatever centroid sits one 13C spacing below the lowest
    /// isotope of a hypothesis; 0 when the scan is clean there.
    fn low_mass_probe(
        &self,
        candidate: &IndexedPeak,
        charge: u8,
        peakfinding_mass: f64,
        mass_error: f64,
        offset: f64,
    ) -> f64 {
        let probe_mass =
            self.isotope_mass(0, peakfinding_mass, mass_error, offset) - NEUTRON_SHIFT;
        self.index
            .get_peak(probe_mass, candidate.ms1_index, &self.isotope_tol, charge)
            .map(|p| p.intensity)
            .unwrap_or(0.0)
    }
}
