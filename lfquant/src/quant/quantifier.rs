use std::collections::HashMap;

use peakindex::{
    trace_xic,
    MzTolerance,
    PeakIndex,
};
use rayon::prelude::*;
use tracing::debug;

use crate::config::QuantConfig;
use crate::isotopes::IsotopePattern;
use crate::models::{
    ChromatographicPeak,
    IdIdx,
    Identification,
    RunIdx,
};
use crate::quant::cutter::cut_peak;
use crate::quant::envelopes::EnvelopeValidator;
use crate::quant::error_check::run_error_checking;

/// Quantify every MS2 identification of one run against its peak index.
///
/// Parallel over identifications; each builds one chromatographic peak
/// independently, then the run's list goes through apex error checking.
pub fn quantify_run(
    run: RunIdx,
    index: &PeakIndex,
    ids: &[Identification],
    run_id_idxs: &[IdIdx],
    patterns: &HashMap<String, IsotopePattern>,
    cfg: &QuantConfig,
) -> Vec<ChromatographicPeak> {
    let st = std::time::Instant::now();

    let charge_range = run_charge_range(ids, run_id_idxs);

    let peaks: Vec<ChromatographicPeak> = run_id_idxs
        .par_iter()
        .with_min_len(64)
        .filter_map(|&id_idx| {
            quantify_identification(run, index, ids, id_idx, patterns, charge_range, cfg)
        })
        .collect();

    let checked = run_error_checking(peaks, ids, cfg);
    debug!(
        "Quantified {} of {} identifications in run {} in {:?}",
        checked.len(),
        run_id_idxs.len(),
        run.0,
        st.elapsed()
    );
    checked
}

/// Smallest and largest precursor charge observed among the run's
/// identifications.
fn run_charge_range(ids: &[Identification], run_id_idxs: &[IdIdx]) -> (u8, u8) {
    run_id_idxs
        .iter()
        .map(|i| ids[i.0].precursor_charge)
        .fold((u8::MAX, u8::MIN), |(lo, hi), z| (lo.min(z), hi.max(z)))
}

fn quantify_identification(
    run: RunIdx,
    index: &PeakIndex,
    ids: &[Identification],
    id_idx: IdIdx,
    patterns: &HashMap<String, IsotopePattern>,
    charge_range: (u8, u8),
    cfg: &QuantConfig,
) -> Option<ChromatographicPeak> {
    let id = &ids[id_idx.0];
    let pattern = patterns.get(&id.modified_sequence)?;
    if pattern.is_empty() {
        return None;
    }
    let validator = EnvelopeValidator::new(
        index,
        pattern,
        cfg.isotope_ppm_tolerance,
        cfg.num_isotopes_required,
    );

    let peakfinding_tol = MzTolerance::Ppm(cfg.peakfinding_ppm_tolerance);
    let final_tol = MzTolerance::Ppm(cfg.ppm_tolerance);
    let charges: Vec<u8> = if cfg.id_specific_charge_state {
        vec![id.precursor_charge]
    } else {
        (charge_range.0..=charge_range.1).collect()
    };

    let mut peak = ChromatographicPeak::new(run, id_idx);
    peak.decoy_peptide = id.decoy.is_decoy();

    for &charge in &charges {
        let xic = trace_xic(
            index,
            id.ms2_retention_time,
            id.peakfinding_mass,
            charge,
            &peakfinding_tol,
            cfg.missed_scans_allowed,
        );
        for candidate in xic {
            if !final_tol.contains(id.peakfinding_mass, candidate.neutral_mass(charge)) {
                continue;
            }
            if let Some(env) = validator.validate(candidate, charge, id.peakfinding_mass) {
                peak.envelopes.push(env);
            }
        }
    }

    // Envelopes at other charge states only count while they co-elute with
    // the identification's own precursor charge.
    let own_span = peak
        .envelopes
        .iter()
        .filter(|e| e.charge == id.precursor_charge)
        .fold(None::<(u32, u32)>, |acc, e| {
            let s = e.ms1_index();
            Some(match acc {
                None => (s, s),
                Some((lo, hi)) => (lo.min(s), hi.max(s)),
            })
        });
    let Some((lo, hi)) = own_span else {
        return None;
    };
    peak.envelopes.retain(|e| (lo..=hi).contains(&e.ms1_index()));

    peak.recalculate(cfg.integrate);
    cut_peak(
        &mut peak,
        id.ms2_retention_time,
        cfg.discrimination_factor_to_cut_peak,
        cfg.integrate,
    );

    if peak.envelopes.is_empty() {
        None
    } else {
        Some(peak)
    }
}
