use crate::models::ChromatographicPeak;

/// Minimum number of apex-charge time points before cutting is attempted.
const MIN_POINTS_TO_CUT: usize = 5;

/// Trim a chromatographic peak at intensity valleys so it covers a single
/// elution.
///
/// Walking outward from the apex over the apex charge state's scan-ordered
/// envelopes, a running minimum tracks the deepest valley seen so far. The
/// peak is cut at that valley once some later point rises far enough above
/// it (the discrimination factor) and the point just past the valley does
/// too, i.e. the valley is a genuine separation between two elutions rather
/// than a one-scan dip. The side containing the identification's retention
/// time is kept, the valley itself is dropped, and the process repeats until
/// no cut fires.
pub fn cut_peak(
    peak: &mut ChromatographicPeak,
    id_rt: f64,
    discrimination_factor: f64,
    integrate: bool,
) {
    loop {
        let Some(apex_idx) = peak.apex else { return };
        let apex_charge = peak.envelopes[apex_idx].charge;
        let seq = peak.envelope_indices_at_charge(apex_charge);
        if seq.len() < MIN_POINTS_TO_CUT {
            return;
        }
        let apex_pos = seq
            .iter()
            .position(|&i| i == apex_idx)
            .expect("apex envelope belongs to the apex charge");

        let mut cut_rt: Option<f64> = None;
        'directions: for dir in [1isize, -1] {
            let mut valley_pos: Option<usize> = None;
            let mut p = apex_pos as isize + dir;
            while p >= 0 && (p as usize) < seq.len() {
                let pos = p as usize;
                let intensity = peak.envelopes[seq[pos]].intensity;
                if intensity <= 0.0 {
                    p += dir;
                    continue;
                }

                let vp = match valley_pos {
                    Some(v) if peak.envelopes[seq[v]].intensity <= intensity => v,
                    _ => {
                        valley_pos = Some(pos);
                        pos
                    }
                };
                let valley_intensity = peak.envelopes[seq[vp]].intensity;

                if (intensity - valley_intensity) / intensity > discrimination_factor {
                    let past = vp as isize + dir;
                    let confirmed = if past >= 0 && (past as usize) < seq.len() {
                        let past_intensity = peak.envelopes[seq[past as usize]].intensity;
                        past_intensity > 0.0
                            && (past_intensity - valley_intensity) / past_intensity
                                > discrimination_factor
                    } else {
                        // The scan past the valley is absent; treat the
                        // valley as the edge of the neighboring elution.
                        true
                    };
                    if confirmed {
                        cut_rt = Some(peak.envelopes[seq[vp]].retention_time());
                        break 'directions;
                    }
                }
                p += dir;
            }
        }

        let Some(valley_rt) = cut_rt else { return };
        if id_rt > valley_rt {
            peak.envelopes.retain(|e| e.retention_time() > valley_rt);
        } else {
            peak.envelopes.retain(|e| e.retention_time() < valley_rt);
        }
        peak.split_rt = Some(valley_rt);
        peak.recalculate(integrate);
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
    use peakindex::IndexedPeak;

    fn peak_with(intensities: &[f64]) -> ChromatographicPeak {
        let mut peak = ChromatographicPeak::new(RunIdx(0), IdIdx(0));
        for (i, &intensity) in intensities.iter().enumerate() {
            peak.envelopes.push(IsotopicEnvelope {
                peak: IndexedPeak {
                    mz: 500.0,
                    intensity,
                    ms1_index: i as u32,
                    retention_time: 10.0 + i as f64 * 0.1,
                },
                charge: 2,
                intensity,
                pearson: 0.95,
            });
        }
        peak.recalculate(false);
        peak
    }

    fn intensities(peak: &ChromatographicPeak) -> Vec<f64> {
        peak.envelopes.iter().map(|e| e.intensity).collect()
    }

    #[test]
    fn test_valley_cut_keeps_id_side() {
        // Valley at index 3, identification at the apex (index 2): the
        // right-hand side past the valley is removed, valley included.
        let mut peak = peak_with(&[10.0, 50.0, 100.0, 20.0, 90.0, 30.0]);
        cut_peak(&mut peak, 10.2, 0.6, false);
        assert_eq!(intensities(&peak), vec![10.0, 50.0, 100.0]);
        assert_eq!(peak.split_rt, Some(10.3));
        assert_eq!(peak.intensity, 100.0);
    }

    #[test]
    fn test_cut_keeps_right_side_when_id_is_there() {
        let mut peak = peak_with(&[30.0, 90.0, 20.0, 100.0, 50.0, 10.0]);
        cut_peak(&mut peak, 10.3, 0.6, false);
        assert_eq!(intensities(&peak), vec![100.0, 50.0, 10.0]);
        assert_eq!(peak.split_rt, Some(10.2));
    }

    #[test]
    fn test_no_cut_on_monotonic_peak() {
        let mut peak = peak_with(&[10.0, 40.0, 100.0, 45.0, 12.0]);
        cut_peak(&mut peak, 10.2, 0.6, false);
        assert_eq!(peak.envelopes.len(), 5);
        assert_eq!(peak.split_rt, None);
    }

    #[test]
    fn test_small_peaks_not_cut() {
        let mut peak = peak_with(&[100.0, 5.0, 90.0, 4.0]);
        cut_peak(&mut peak, 10.0, 0.6, false);
        assert_eq!(peak.envelopes.len(), 4);
    }

    #[test]
    fn test_shallow_valley_survives() {
        // The dip recovers by less than the discrimination factor.
        let mut peak = peak_with(&[20.0, 80.0, 100.0, 70.0, 95.0, 60.0]);
        cut_peak(&mut peak, 10.2, 0.6, false);
        assert_eq!(peak.envelopes.len(), 6);
    }

    #[test]
    fn test_identification_rt_within_retained_span() {
        let mut peak = peak_with(&[10.0, 50.0, 100.0, 20.0, 90.0, 30.0]);
        let id_rt = 10.2;
        cut_peak(&mut peak, id_rt, 0.6, false);
        let (lo, hi) = peak.rt_span().unwrap();
        assert!(id_rt >= lo && id_rt <= hi);
    }
}
