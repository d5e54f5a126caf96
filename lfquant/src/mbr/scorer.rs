use peakindex::MzTolerance;
use rtalign::stats::{
    interquartile_range,
    mean,
    median,
    stddev,
};
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::config::{
    MbrScoreWeights,
    QuantConfig,
};
use crate::models::{
    ChromatographicPeak,
    Identification,
};
use crate::utils::stats::NormalDensity;

/// Below this many ppm samples the acceptor's error model is meaningless
/// and MBR is disabled for the run.
const MIN_PPM_SAMPLES: usize = 3;
/// IQR of a normal distribution is 1.36 sigma; used to fit a robust spread.
const IQR_TO_SIGMA: f64 = 1.36;
/// Sample count below which the plain standard deviation replaces the
/// IQR-based spread.
const MIN_SAMPLES_FOR_IQR: usize = 30;

/// Evidence a candidate acceptor peak is scored on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CandidateFeatures {
    /// Apex mass error in ppm against the donor's peakfinding mass.
    pub ppm_error: f64,
    /// Apex RT minus the predicted acceptor RT, in minutes.
    pub rt_error: f64,
    /// log2 of the candidate peak intensity.
    pub log_intensity: f64,
    /// log2 of the donor peak intensity.
    pub donor_log_intensity: f64,
    /// Apex envelope Pearson correlation.
    pub correlation: f64,
    pub charge: u8,
    /// Donor and acceptor come from different conditions.
    pub cross_condition: bool,
}

/// Distributions fitted once per acceptor run from its MS2-identified peaks.
#[derive(Debug, Clone)]
pub struct AcceptorStats {
    pub ppm: NormalDensity,
    pub effective_ppm_tol: f64,
    pub log_intensity: NormalDensity,
}

/// Fit the acceptor's mass-error and intensity distributions.
///
/// Returns None when fewer than [`MIN_PPM_SAMPLES`] MS2 peaks carry a usable
/// mass error, in which case MBR must be skipped for this acceptor.
pub fn fit_acceptor_stats(
    peaks: &[ChromatographicPeak],
    ids: &[Identification],
    cfg: &QuantConfig,
) -> Option<AcceptorStats> {
    let mut ppm_errors = Vec::new();
    let mut log_intensities = Vec::new();
    for peak in peaks {
        if peak.is_mbr {
            continue;
        }
        let (Some(apex), Some(&id_idx)) = (peak.apex_envelope(), peak.id_idxs.first()) else {
            continue;
        };
        let id = &ids[id_idx.0];
        let observed = apex.peak.neutral_mass(apex.charge);
        ppm_errors.push((observed - id.peakfinding_mass) / id.peakfinding_mass * 1e6);
        if peak.intensity > 0.0 {
            log_intensities.push(peak.intensity.log2());
        }
    }

    if ppm_errors.len() < MIN_PPM_SAMPLES {
        return None;
    }

    let ppm_median = median(&ppm_errors);
    let spread = if ppm_errors.len() >= MIN_SAMPLES_FOR_IQR {
        interquartile_range(&ppm_errors) / IQR_TO_SIGMA
    } else {
        stddev(&ppm_errors)
    };
    let effective_ppm_tol = (ppm_median.abs() + 4.0 * spread).min(cfg.mbr_ppm_tolerance);

    let log_intensity = NormalDensity::new(mean(&log_intensities), stddev(&log_intensities));
    debug!(
        "Acceptor stats: ppm median {:.3}, spread {:.3}, effective tol {:.3} ppm, \
         log2 intensity {:.2} +- {:.2}",
        ppm_median, spread, effective_ppm_tol, log_intensity.mu, log_intensity.sigma
    );

    Some(AcceptorStats {
        ppm: NormalDensity::new(ppm_median, spread),
        effective_ppm_tol,
        log_intensity,
    })
}

/// Scores candidate transfers against one (donor, acceptor) pair.
///
/// The composite is a weighted sum of mode-normalized densities (ppm error,
/// RT deviation from prediction, log-intensity consistency) plus the apex
/// envelope correlation. Every term lies in [0, 1], so the score is
/// positive and higher is better.
#[derive(Debug, Clone)]
pub struct MbrScorer {
    stats: AcceptorStats,
    rt_error: NormalDensity,
    /// Median log2 acceptor/donor intensity ratio when the two runs belong
    /// to different conditions.
    fold_change: Option<f64>,
    weights: MbrScoreWeights,
}

impl MbrScorer {
    pub fn new(
        stats: AcceptorStats,
        rt_error_sigma: f64,
        fold_change: Option<f64>,
        weights: MbrScoreWeights,
    ) -> Self {
        Self {
            stats,
            rt_error: NormalDensity::new(0.0, rt_error_sigma),
            fold_change,
            weights,
        }
    }

    /// The mass tolerance transfers are searched at: tight when the
    /// acceptor's calibration is good, never wider than the configured MBR
    /// tolerance.
    pub fn effective_tolerance(&self) -> MzTolerance {
        MzTolerance::Ppm(self.stats.effective_ppm_tol)
    }

    pub fn score(&self, f: &CandidateFeatures) -> f64 {
        let ppm_term = self.stats.ppm.density_ratio(f.ppm_error);
        let rt_term = self.rt_error.density_ratio(f.rt_error);
        let intensity_term = match self.fold_change {
            Some(fc) if f.cross_condition => NormalDensity::new(
                f.donor_log_intensity + fc,
                self.stats.log_intensity.sigma,
            )
            .density_ratio(f.log_intensity),
            _ => self.stats.log_intensity.density_ratio(f.log_intensity),
        };
        let correlation_term = if f.correlation.is_nan() {
            0.0
        } else {
            f.correlation.clamp(0.0, 1.0)
        };

        self.weights.ppm * ppm_term
            + self.weights.rt * rt_term
            + self.weights.intensity * intensity_term
            + self.weights.correlation * correlation_term
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        IdIdx,
        IsotopicEnvelope,
        RunIdx,
    };
    use peakindex::{
        neutral_mass_to_mz,
        IndexedPeak,
    };

    fn ms2_peak_with_error(id: usize, ppm: f64, intensity: f64) -> ChromatographicPeak {
        let mass = 1000.0 * (1.0 + ppm * 1e-6);
        let mut peak = ChromatographicPeak::new(RunIdx(0), IdIdx(id));
        peak.envelopes.push(IsotopicEnvelope {
            peak: IndexedPeak {
                mz: neutral_mass_to_mz(mass, 2),
                intensity,
                ms1_index: 0,
                retention_time: 10.0,
            },
            charge: 2,
            intensity,
            pearson: 0.95,
        });
        peak.recalculate(false);
        peak
    }

    fn make_ids(n: usize) -> Vec<Identification> {
        (0..n)
            .map(|_| Identification::new(RunIdx(0), "AAA", "AAA", 1000.0, 2, 10.0, 50.0, 0.001))
            .collect()
    }

    fn features(ppm: f64, rt: f64, log_int: f64) -> CandidateFeatures {
        CandidateFeatures {
            ppm_error: ppm,
            rt_error: rt,
            log_intensity: log_int,
            donor_log_intensity: log_int,
            correlation: 0.9,
            charge: 2,
            cross_condition: false,
        }
    }

    #[test]
    fn test_too_few_samples_invalidates_scorer() {
        let ids = make_ids(2);
        let peaks = vec![
            ms2_peak_with_error(0, 1.0, 1000.0),
            ms2_peak_with_error(1, -1.0, 1000.0),
        ];
        let cfg = QuantConfig::default();
        assert!(fit_acceptor_stats(&peaks, &ids, &cfg).is_none());
    }

    #[test]
    fn test_effective_tolerance_capped() {
        let ids = make_ids(3);
        // Wildly spread ppm errors: effective tolerance must clamp to the
        // configured MBR tolerance.
        let peaks = vec![
            ms2_peak_with_error(0, -8.0, 1000.0),
            ms2_peak_with_error(1, 0.0, 1000.0),
            ms2_peak_with_error(2, 8.0, 1000.0),
        ];
        let cfg = QuantConfig::default();
        let stats = fit_acceptor_stats(&peaks, &ids, &cfg).unwrap();
        assert!(stats.effective_ppm_tol <= cfg.mbr_ppm_tolerance);
    }

    #[test]
    fn test_score_prefers_better_candidates() {
        let ids = make_ids(3);
        let peaks = vec![
            ms2_peak_with_error(0, -1.0, 1000.0),
            ms2_peak_with_error(1, 0.0, 1000.0),
            ms2_peak_with_error(2, 1.0, 1000.0),
        ];
        let cfg = QuantConfig::default();
        let stats = fit_acceptor_stats(&peaks, &ids, &cfg).unwrap();
        let scorer = MbrScorer::new(stats, 0.1, None, MbrScoreWeights::default());

        let good = scorer.score(&features(0.0, 0.0, 1000.0f64.log2()));
        let bad_rt = scorer.score(&features(0.0, 0.5, 1000.0f64.log2()));
        let bad_ppm = scorer.score(&features(6.0, 0.0, 1000.0f64.log2()));
        assert!(good > bad_rt);
        assert!(good > bad_ppm);
        assert!(good > 0.0);
    }

    #[test]
    fn test_fold_change_recenters_intensity() {
        let ids = make_ids(3);
        let peaks = vec![
            ms2_peak_with_error(0, -1.0, 1000.0),
            ms2_peak_with_error(1, 0.0, 1000.0),
            ms2_peak_with_error(2, 1.0, 1000.0),
        ];
        let cfg = QuantConfig::default();
        let stats = fit_acceptor_stats(&peaks, &ids, &cfg).unwrap();
        // Acceptor condition runs 4x hotter than the donor's.
        let scorer = MbrScorer::new(stats, 0.1, Some(2.0), MbrScoreWeights::default());

        let donor_log = 1000.0f64.log2();
        let mut shifted = features(0.0, 0.0, donor_log + 2.0);
        shifted.cross_condition = true;
        let mut unshifted = features(0.0, 0.0, donor_log);
        unshifted.cross_condition = true;
        assert!(scorer.score(&shifted) > scorer.score(&unshifted));
    }
}
