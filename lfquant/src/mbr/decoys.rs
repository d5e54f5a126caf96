use std::collections::hash_map::DefaultHasher;
use std::hash::{
    Hash,
    Hasher,
};

use crate::isotopes::HYDROGEN_MASS;
use crate::mbr::donors::DonorPeak;

/// Mass window (in hydrogen masses) a decoy donor must differ by. Close
/// enough to share instrument behavior, far enough to never be the same
/// envelope.
const MIN_MASS_DIFF_H: f64 = 5.0;
const MAX_MASS_DIFF_H: f64 = 11.0;
/// Fallback cap when no decoy exists in the tight window.
const WIDE_MASS_DIFF_DA: f64 = 1e5;

/// Pick a decoy donor peak for a real donor: a different peptide whose
/// predicted retention time will serve as the randomized search position.
///
/// The choice is pseudo-random but fully deterministic: the starting index
/// is derived from a hash of the donor's peakfinding mass and MS2 retention
/// time, and candidates are scanned circularly from there. A decoy must
/// have a different base sequence, a peakfinding mass at least 5 and less
/// than 11 hydrogen masses away (widened to 100 kDa when the tight window
/// is empty), and an apex at least two window widths from the donor's.
pub fn pick_decoy_donor(
    donors: &[DonorPeak<'_>],
    target_idx: usize,
    window_width: f64,
) -> Option<usize> {
    if donors.len() < 2 {
        return None;
    }
    let target = &donors[target_idx];

    let mut hasher = DefaultHasher::new();
    target.id.peakfinding_mass.to_bits().hash(&mut hasher);
    target.id.ms2_retention_time.to_bits().hash(&mut hasher);
    let start = (hasher.finish() % donors.len() as u64) as usize;

    for mass_cap in [MAX_MASS_DIFF_H * HYDROGEN_MASS, WIDE_MASS_DIFF_DA] {
        for j in 0..donors.len() {
            let k = (start + j) % donors.len();
            if k == target_idx {
                continue;
            }
            let candidate = &donors[k];
            if candidate.id.base_sequence == target.id.base_sequence {
                continue;
            }
            let mass_diff = (candidate.id.peakfinding_mass - target.id.peakfinding_mass).abs();
            if mass_diff < MIN_MASS_DIFF_H * HYDROGEN_MASS || mass_diff >= mass_cap {
                continue;
            }
            if (candidate.apex_rt - target.apex_rt).abs() < 2.0 * window_width {
                continue;
            }
            return Some(k);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuantConfig;
    use crate::mbr::donors::select_donor_peaks;
    use crate::models::{
        ChromatographicPeak,
        IdIdx,
        Identification,
        IsotopicEnvelope,
        RunIdx,
    };
    use peakindex::IndexedPeak;

    fn setup(
        specs: &[(&'static str, f64, f64)],
    ) -> (Vec<Identification>, Vec<ChromatographicPeak>) {
        let mut ids = Vec::new();
        let mut peaks = Vec::new();
        for (i, (seq, mass, rt)) in specs.iter().enumerate() {
            let id = Identification::new(RunIdx(0), *seq, *seq, *mass, 2, *rt, 50.0, 0.001);
            let mut peak = ChromatographicPeak::new(RunIdx(0), IdIdx(i));
            peak.envelopes.push(IsotopicEnvelope {
                peak: IndexedPeak {
                    mz: mass / 2.0,
                    intensity: 100.0,
                    ms1_index: i as u32,
                    retention_time: *rt,
                },
                charge: 2,
                intensity: 100.0,
                pearson: 0.9,
            });
            peak.recalculate(false);
            ids.push(id);
            peaks.push(peak);
        }
        (ids, peaks)
    }

    #[test]
    fn test_decoy_respects_mass_and_rt_constraints() {
        let (ids, peaks) = setup(&[
            ("AAAK", 1000.0, 10.0),
            ("BBBR", 1006.0, 20.0),  // in the 5-11 H window, far in RT
            ("CCCK", 1001.0, 30.0),  // too close in mass
            ("DDDR", 1500.0, 10.05), // too close in RT for a wide window? no: far enough
        ]);
        let run_idxs: Vec<IdIdx> = (0..4).map(IdIdx).collect();
        let cfg = QuantConfig::default();
        let donors = select_donor_peaks(&peaks, &ids, &run_idxs, &cfg);
        let target_idx = donors.iter().position(|d| d.seq == "AAAK").unwrap();

        let decoy = pick_decoy_donor(&donors, target_idx, 0.5).unwrap();
        assert_eq!(donors[decoy].seq, "BBBR");
    }

    #[test]
    fn test_decoy_mass_window_widens() {
        // No candidate within 5-11 hydrogens: the wide window must kick in.
        let (ids, peaks) = setup(&[("AAAK", 1000.0, 10.0), ("BBBR", 2000.0, 20.0)]);
        let run_idxs: Vec<IdIdx> = (0..2).map(IdIdx).collect();
        let cfg = QuantConfig::default();
        let donors = select_donor_peaks(&peaks, &ids, &run_idxs, &cfg);
        let target_idx = donors.iter().position(|d| d.seq == "AAAK").unwrap();

        let decoy = pick_decoy_donor(&donors, target_idx, 0.5).unwrap();
        assert_eq!(donors[decoy].seq, "BBBR");
    }

    #[test]
    fn test_decoy_is_deterministic() {
        let (ids, peaks) = setup(&[
            ("AAAK", 1000.0, 10.0),
            ("BBBR", 1006.0, 20.0),
            ("EEEK", 1007.0, 25.0),
        ]);
        let run_idxs: Vec<IdIdx> = (0..3).map(IdIdx).collect();
        let cfg = QuantConfig::default();
        let donors = select_donor_peaks(&peaks, &ids, &run_idxs, &cfg);
        let target_idx = donors.iter().position(|d| d.seq == "AAAK").unwrap();

        let first = pick_decoy_donor(&donors, target_idx, 0.5);
        for _ in 0..5 {
            assert_eq!(pick_decoy_donor(&donors, target_idx, 0.5), first);
        }
    }

    #[test]
    fn test_no_decoy_from_single_donor() {
        let (ids, peaks) = setup(&[("AAAK", 1000.0, 10.0)]);
        let run_idxs = vec![IdIdx(0)];
        let cfg = QuantConfig::default();
        let donors = select_donor_peaks(&peaks, &ids, &run_idxs, &cfg);
        assert_eq!(pick_decoy_donor(&donors, 0, 0.5), None);
    }
}
