use std::collections::HashMap;

use peakindex::PeakKey;
use tracing::debug;

use crate::config::QuantConfig;
use crate::models::{
    ChromatographicPeak,
    Identification,
};

/// Resolve apex collisions within one run's peak list.
///
/// Two peaks claiming the same apex centroid cannot both be real. The rules:
/// two whitelisted MS2 peaks merge; an MS2 peak beats an MBR peak unless the
/// MS2 peak is a decoy peptide or not whitelisted; two MBR peaks of the same
/// sequence merge; two MBR peaks of different sequences keep the higher MBR
/// score. Peaks with no envelopes are dropped. The output is re-sorted by
/// apex position so downstream passes see a deterministic order.
pub fn run_error_checking(
    peaks: Vec<ChromatographicPeak>,
    ids: &[Identification],
    cfg: &QuantConfig,
) -> Vec<ChromatographicPeak> {
    let input_len = peaks.len();
    let mut by_apex: HashMap<PeakKey, ChromatographicPeak> = HashMap::new();

    for peak in peaks {
        let Some(key) = peak.apex_key() else { continue };
        match by_apex.remove(&key) {
            None => {
                by_apex.insert(key, peak);
            }
            Some(existing) => {
                let winner = resolve_collision(existing, peak, ids, cfg);
                by_apex.insert(key, winner);
            }
        }
    }

    let mut out: Vec<ChromatographicPeak> = by_apex.into_values().collect();
    for peak in out.iter_mut() {
        peak.id_idxs.sort_unstable();
        if !cfg.quantify_ambiguous_peptides && num_distinct_sequences(peak, ids) > 1 {
            peak.intensity = 0.0;
        }
    }
    out.sort_by(|a, b| {
        a.apex_key()
            .cmp(&b.apex_key())
            .then_with(|| a.id_idxs.cmp(&b.id_idxs))
    });
    if out.len() != input_len {
        debug!(
            "Error checking collapsed {} peaks into {}",
            input_len,
            out.len()
        );
    }
    out
}

fn resolve_collision(
    a: ChromatographicPeak,
    b: ChromatographicPeak,
    ids: &[Identification],
    cfg: &QuantConfig,
) -> ChromatographicPeak {
    match (a.is_mbr, b.is_mbr) {
        (false, false) => {
            let a_ok = is_quantifiable(&a, ids, cfg);
            let b_ok = is_quantifiable(&b, ids, cfg);
            match (a_ok, b_ok) {
                (true, true) => {
                    let mut merged = a;
                    merged.merge_from(b, cfg.integrate);
                    merged
                }
                (false, true) => b,
                _ => a,
            }
        }
        (false, true) => {
            if is_quantifiable(&a, ids, cfg) {
                a
            } else {
                b
            }
        }
        (true, false) => {
            if is_quantifiable(&b, ids, cfg) {
                b
            } else {
                a
            }
        }
        (true, true) => {
            if same_sequence(&a, &b, ids) {
                let mut merged = a;
                merged.merge_from(b, cfg.integrate);
                merged
            } else if b.mbr_score.unwrap_or(0.0) > a.mbr_score.unwrap_or(0.0) {
                b
            } else {
                a
            }
        }
    }
}

/// An MS2 peak only outranks others when it is a whitelisted target.
fn is_quantifiable(peak: &ChromatographicPeak, ids: &[Identification], cfg: &QuantConfig) -> bool {
    !peak.decoy_peptide
        && peak
            .id_idxs
            .iter()
            .any(|i| cfg.is_whitelisted(&ids[i.0].modified_sequence))
}

fn num_distinct_sequences(
    peak: &ChromatographicPeak,
    ids: &[Identification],
) -> usize {
    let mut seqs: Vec<&str> = peak
        .id_idxs
        .iter()
        .map(|i| ids[i.0].modified_sequence.as_str())
        .collect();
    seqs.sort_unstable();
    seqs.dedup();
    seqs.len()
}

fn same_sequence(a: &ChromatographicPeak, b: &ChromatographicPeak, ids: &[Identification]) -> bool {
    match (a.id_idxs.first(), b.id_idxs.first()) {
        (Some(x), Some(y)) => ids[x.0].modified_sequence == ids[y.0].modified_sequence,
        _ => false,
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

    fn make_ids(seqs: &[&str]) -> Vec<Identification> {
        seqs.iter()
            .map(|s| {
                Identification::new(RunIdx(0), *s, *s, 1000.0, 2, 10.0, 50.0, 0.001)
            })
            .collect()
    }

    fn peak_at(scan: u32, id: usize, intensity: f64) -> ChromatographicPeak {
        let mut peak = ChromatographicPeak::new(RunIdx(0), IdIdx(id));
        peak.envelopes.push(IsotopicEnvelope {
            peak: IndexedPeak {
                mz: 500.0,
                intensity,
                ms1_index: scan,
                retention_time: 10.0 + scan as f64 * 0.1,
            },
            charge: 2,
            intensity,
            pearson: 0.9,
        });
        peak.recalculate(false);
        peak
    }

    #[test]
    fn test_apex_uniqueness_after_check() {
        let ids = make_ids(&["AAA", "AAA"]);
        let cfg = QuantConfig::default();
        let peaks = vec![peak_at(3, 0, 100.0), peak_at(3, 1, 100.0), peak_at(5, 0, 40.0)];
        let out = run_error_checking(peaks, &ids, &cfg);
        assert_eq!(out.len(), 2);
        let mut keys: Vec<_> = out.iter().map(|p| p.apex_key().unwrap()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_ms2_collision_merges_whitelisted() {
        let ids = make_ids(&["AAA", "BBB"]);
        let cfg = QuantConfig::default();
        let out = run_error_checking(vec![peak_at(3, 0, 100.0), peak_at(3, 1, 100.0)], &ids, &cfg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id_idxs, vec![IdIdx(0), IdIdx(1)]);
        // Two sequences on one peak is ambiguous; intensity is zeroed.
        assert_eq!(out[0].intensity, 0.0);
    }

    #[test]
    fn test_ms2_beats_mbr() {
        let ids = make_ids(&["AAA", "BBB"]);
        let cfg = QuantConfig::default();
        let ms2 = peak_at(3, 0, 100.0);
        let mut mbr = peak_at(3, 1, 100.0);
        mbr.is_mbr = true;
        mbr.mbr_score = Some(5.0);
        let out = run_error_checking(vec![mbr, ms2], &ids, &cfg);
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_mbr);
        assert_eq!(out[0].id_idxs, vec![IdIdx(0)]);
    }

    #[test]
    fn test_decoy_ms2_loses_to_mbr() {
        let mut ids = make_ids(&["AAA", "BBB"]);
        ids[0] = ids[0].clone().as_decoy();
        let cfg = QuantConfig::default();
        let mut ms2 = peak_at(3, 0, 100.0);
        ms2.decoy_peptide = true;
        let mut mbr = peak_at(3, 1, 100.0);
        mbr.is_mbr = true;
        mbr.mbr_score = Some(5.0);
        let out = run_error_checking(vec![ms2, mbr], &ids, &cfg);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_mbr);
    }

    #[test]
    fn test_mbr_different_sequences_keep_higher_score() {
        let ids = make_ids(&["AAA", "BBB"]);
        let cfg = QuantConfig::default();
        let mut a = peak_at(3, 0, 100.0);
        a.is_mbr = true;
        a.mbr_score = Some(2.0);
        let mut b = peak_at(3, 1, 100.0);
        b.is_mbr = true;
        b.mbr_score = Some(3.5);
        let out = run_error_checking(vec![a, b], &ids, &cfg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].mbr_score, Some(3.5));
        assert_eq!(out[0].id_idxs, vec![IdIdx(1)]);
    }

    #[test]
    fn test_empty_peaks_dropped() {
        let ids = make_ids(&["AAA"]);
        let cfg = QuantConfig::default();
        let empty = ChromatographicPeak::new(RunIdx(0), IdIdx(0));
        let out = run_error_checking(vec![empty], &ids, &cfg);
        assert!(out.is_empty());
    }
}
