use std::collections::{
    HashMap,
    HashSet,
};

use crate::config::{
    DonorCriterion,
    QuantConfig,
};
use crate::models::{
    ChromatographicPeak,
    IdIdx,
    Identification,
};

/// An MS2-identified peak eligible to donate its identification to another
/// run, or to anchor an alignment.
#[derive(Debug, Clone, Copy)]
pub struct DonorPeak<'a> {
    pub seq: &'a str,
    pub peak: &'a ChromatographicPeak,
    pub id: &'a Identification,
    pub id_idx: IdIdx,
    pub apex_rt: f64,
}

/// Pick one representative peak per modified sequence in a run.
///
/// Eligible peaks are MS2-identified (not MBR), confidently identified
/// (q-value under the donor threshold, target peptide), unambiguous (a
/// single identification of that sequence in the run) and actually
/// quantified (non-empty envelopes). Among a sequence's eligible peaks the
/// best is chosen by the configured donor criterion. The result is sorted
/// by sequence so iteration order is deterministic.
pub fn select_donor_peaks<'a>(
    peaks: &'a [ChromatographicPeak],
    ids: &'a [Identification],
    run_id_idxs: &[IdIdx],
    cfg: &QuantConfig,
) -> Vec<DonorPeak<'a>> {
    let mut id_count_by_seq: HashMap<&str, usize> = HashMap::new();
    for idx in run_id_idxs {
        *id_count_by_seq
            .entry(ids[idx.0].modified_sequence.as_str())
            .or_insert(0) += 1;
    }

    let mut by_seq: HashMap<&str, Vec<DonorPeak<'a>>> = HashMap::new();
    for peak in peaks {
        if peak.is_mbr || peak.apex.is_none() {
            continue;
        }
        let Some(&id_idx) = peak.id_idxs.first() else {
            continue;
        };
        let id = &ids[id_idx.0];
        if id.decoy.is_decoy() || id.q_value >= cfg.donor_q_value_threshold {
            continue;
        }
        let seq = id.modified_sequence.as_str();
        if id_count_by_seq.get(seq).copied().unwrap_or(0) != 1 {
            continue;
        }
        let Some(apex_rt) = peak.apex_rt() else {
            continue;
        };
        by_seq.entry(seq).or_default().push(DonorPeak {
            seq,
            peak,
            id,
            id_idx,
            apex_rt,
        });
    }

    let all_candidates: Vec<(f64, &str)> = by_seq
        .values()
        .flatten()
        .map(|d| (d.apex_rt, d.seq))
        .collect();

    let mut out: Vec<DonorPeak<'a>> = by_seq
        .into_iter()
        .map(|(_, candidates)| best_candidate(candidates, &all_candidates, cfg))
        .collect();
    out.sort_by(|a, b| a.seq.cmp(b.seq));
    out
}

fn best_candidate<'a>(
    candidates: Vec<DonorPeak<'a>>,
    all_candidates: &[(f64, &str)],
    cfg: &QuantConfig,
) -> DonorPeak<'a> {
    debug_assert!(!candidates.is_empty());
    match cfg.donor_criterion {
        DonorCriterion::Score => {
            let best = max_by_metric(&candidates, |d| d.id.psm_score);
            if candidates[best].id.psm_score == 0.0 {
                // Search engines that report no score leave nothing to rank
                // by; fall through to intensity.
                let best = max_by_metric(&candidates, |d| d.peak.intensity);
                candidates[best]
            } else {
                candidates[best]
            }
        }
        DonorCriterion::Neighbors => {
            let best = max_by_metric(&candidates, |d| {
                count_neighbors(d, all_candidates, cfg.mbr_alignment_window) as f64
            });
            candidates[best]
        }
        DonorCriterion::Intensity => {
            let best = max_by_metric(&candidates, |d| d.peak.intensity);
            candidates[best]
        }
    }
}

fn max_by_metric<'a>(candidates: &[DonorPeak<'a>], metric: impl Fn(&DonorPeak<'a>) -> f64) -> usize {
    let mut best = 0;
    for (i, c) in candidates.iter().enumerate().skip(1) {
        if metric(c) > metric(&candidates[best]) {
            best = i;
        }
    }
    best
}

/// Distinct other sequences with an eligible peak apexing within the
/// alignment window of this one.
fn count_neighbors(donor: &DonorPeak<'_>, all_candidates: &[(f64, &str)], window: f64) -> usize {
    let mut seen: HashSet<&str> = HashSet::new();
    for (rt, seq) in all_candidates {
        if *seq != donor.seq && (rt - donor.apex_rt).abs() <= window {
            seen.insert(seq);
        }
    }
    seen.len()
}
