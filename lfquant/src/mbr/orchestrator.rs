use std::collections::{
    BTreeMap,
    HashMap,
    HashSet,
};

use peakindex::{
    trace_xic,
    PeakIndex,
    PeakKey,
};
use rayon::prelude::*;
use rtalign::stats::{
    median,
    stddev,
};
use rtalign::{
    AnchorPoint,
    RtAlignment,
    RtPrediction,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::config::QuantConfig;
use crate::isotopes::IsotopePattern;
use crate::mbr::decoys::pick_decoy_donor;
use crate::mbr::donors::{
    select_donor_peaks,
    DonorPeak,
};
use crate::mbr::scorer::{
    fit_acceptor_stats,
    CandidateFeatures,
    MbrScorer,
};
use crate::mbr::MbrTransfer;
use crate::models::{
    ChromatographicPeak,
    IdIdx,
    Identification,
    Results,
    RunIdx,
    RunRecord,
};
use crate::quant::{
    cut_peak,
    EnvelopeValidator,
};

/// How much the search window grows per retry when neither a target nor a
/// decoy peak was found, in minutes.
const WINDOW_WIDEN_STEP: f64 = 0.5;

/// Per-acceptor MBR accounting, surfaced in the engine diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MbrRunStats {
    pub scorer_invalid: bool,
    pub donor_pairs_without_anchors: usize,
    pub targets_found: usize,
    pub decoys_found: usize,
}

/// Transfers identifications from every other run into one acceptor run.
///
/// Holds only shared, immutable state; one instance serves all acceptors.
pub struct MbrPass<'a> {
    pub cfg: &'a QuantConfig,
    pub runs: &'a [RunRecord],
    pub ids: &'a [Identification],
    pub ids_by_run: &'a [Vec<IdIdx>],
    pub patterns: &'a HashMap<String, IsotopePattern>,
    /// Conditions in which each protein group has at least one MS2
    /// identification; used by the condition gate.
    pub protein_conditions: &'a HashMap<String, HashSet<String>>,
}

impl MbrPass<'_> {
    /// Search the acceptor run for every transferable donor peptide, with a
    /// paired random-RT decoy search per donor peak.
    pub fn run_acceptor(
        &self,
        acceptor: RunIdx,
        index: &PeakIndex,
        results: &Results,
    ) -> (Vec<MbrTransfer>, MbrRunStats) {
        let st = std::time::Instant::now();
        let mut stats_out = MbrRunStats::default();
        let acceptor_peaks = results.peaks_for(acceptor);

        let Some(stats) = fit_acceptor_stats(acceptor_peaks, self.ids, self.cfg) else {
            warn!(
                "Acceptor run {} has too few MS2 mass errors to model; MBR disabled for it",
                acceptor.0
            );
            stats_out.scorer_invalid = true;
            return (Vec::new(), stats_out);
        };

        // Sequences already confidently MS2-identified here never transfer.
        let blocked: HashSet<&str> = self.ids_by_run[acceptor.0]
            .iter()
            .map(|i| &self.ids[i.0])
            .filter(|id| !id.decoy.is_decoy() && id.q_value < self.cfg.donor_q_value_threshold)
            .map(|id| id.modified_sequence.as_str())
            .collect();

        // Apexes owned by whitelisted MS2 peaks; transfers landing on one of
        // these are conflicts and move to their next hypothesis.
        let ms2_apexes: HashSet<PeakKey> = acceptor_peaks
            .iter()
            .filter(|p| {
                !p.is_mbr
                    && !p.decoy_peptide
                    && p.id_idxs
                        .iter()
                        .any(|i| self.cfg.is_whitelisted(&self.ids[i.0].modified_sequence))
            })
            .filter_map(|p| p.apex_key())
            .collect();

        let acceptor_sel = select_donor_peaks(
            acceptor_peaks,
            self.ids,
            &self.ids_by_run[acceptor.0],
            self.cfg,
        );
        let acceptor_by_seq: HashMap<&str, &DonorPeak<'_>> =
            acceptor_sel.iter().map(|d| (d.seq, d)).collect();
        let acceptor_condition = self.runs[acceptor.0].condition.as_str();

        let mut all_candidates: Vec<MbrTransfer> = Vec::new();
        for d in 0..self.runs.len() {
            if d == acceptor.0 {
                continue;
            }
            let donor_run = RunIdx(d);
            let donor_peaks = results.peaks_for(donor_run);
            if donor_peaks.is_empty() {
                continue;
            }
            let donor_sel =
                select_donor_peaks(donor_peaks, self.ids, &self.ids_by_run[d], self.cfg);

            let mut anchors = Vec::new();
            let mut shared_log_ratios = Vec::new();
            for dp in &donor_sel {
                if let Some(ap) = acceptor_by_seq.get(dp.seq) {
                    anchors.push(AnchorPoint {
                        donor_rt: dp.apex_rt,
                        acceptor_rt: ap.apex_rt,
                    });
                    if dp.peak.intensity > 0.0 && ap.peak.intensity > 0.0 {
                        shared_log_ratios.push((ap.peak.intensity / dp.peak.intensity).log2());
                    }
                }
            }
            let alignment = match RtAlignment::try_new(
                anchors,
                self.cfg.num_anchor_peptides_for_mbr,
                self.cfg.mbr_rt_window,
            ) {
                Ok(a) => a,
                Err(e) => {
                    debug!(
                        "No anchors between donor {} and acceptor {} ({}); pair skipped",
                        d, acceptor.0, e
                    );
                    stats_out.donor_pairs_without_anchors += 1;
                    continue;
                }
            };

            let cross_condition = self.runs[d].condition != acceptor_condition;
            let fold_change = if cross_condition && !shared_log_ratios.is_empty() {
                Some(median(&shared_log_ratios))
            } else {
                None
            };
            let scorer = MbrScorer::new(
                stats.clone(),
                stddev(&alignment.deltas()),
                fold_change,
                self.cfg.score_weights,
            );

            let transfer_idxs: Vec<usize> = donor_sel
                .iter()
                .enumerate()
                .filter(|(_, dp)| {
                    !blocked.contains(dp.seq)
                        && self.cfg.is_whitelisted(dp.seq)
                        && self.condition_gate(dp, acceptor_condition)
                })
                .map(|(i, _)| i)
                .collect();

            let found: Vec<Vec<MbrTransfer>> = transfer_idxs
                .par_iter()
                .with_min_len(16)
                .map(|&i| {
                    self.search_donor(
                        acceptor,
                        index,
                        &donor_sel,
                        i,
                        &alignment,
                        &scorer,
                        cross_condition,
                        donor_run,
                    )
                })
                .collect();
            for group in found {
                for t in group {
                    if t.peak.random_rt {
                        stats_out.decoys_found += 1;
                    } else {
                        stats_out.targets_found += 1;
                    }
                    all_candidates.push(t);
                }
            }
        }

        let accepted = self.resolve_candidates(all_candidates, &ms2_apexes);
        info!(
            "MBR into run {}: {} targets, {} decoys, {} accepted after conflicts, in {:?}",
            acceptor.0,
            stats_out.targets_found,
            stats_out.decoys_found,
            accepted.len(),
            st.elapsed()
        );
        (accepted, stats_out)
    }

    fn condition_gate(&self, dp: &DonorPeak<'_>, acceptor_condition: &str) -> bool {
        if !self.cfg.require_msms_id_in_condition {
            return true;
        }
        dp.id.protein_groups.iter().any(|pg| {
            self.protein_conditions
                .get(pg)
                .is_some_and(|conds| conds.contains(acceptor_condition))
        })
    }

    /// Per (sequence, decoy-label) group: take the best-scoring candidate
    /// that does not collide with an MS2 apex, then absorb the other charge
    /// states of the same species when their apexes elute inside its span.
    fn resolve_candidates(
        &self,
        candidates: Vec<MbrTransfer>,
        ms2_apexes: &HashSet<PeakKey>,
    ) -> Vec<MbrTransfer> {
        let mut groups: BTreeMap<(String, bool), Vec<MbrTransfer>> = BTreeMap::new();
        for t in candidates {
            let seq = self.ids[t.donor_id.0].modified_sequence.clone();
            groups.entry((seq, t.peak.random_rt)).or_default().push(t);
        }

        let mut accepted = Vec::new();
        for (_, mut group) in groups {
            group.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then(b.features.correlation.total_cmp(&a.features.correlation))
                    .then(a.donor_run.cmp(&b.donor_run))
            });

            let mut chosen: Option<MbrTransfer> = None;
            let mut rest = Vec::new();
            for t in group {
                if chosen.is_some() {
                    rest.push(t);
                } else if t.peak.apex_key().is_some_and(|k| ms2_apexes.contains(&k)) {
                    // Conflict with an MS2-identified peak; try the next
                    // hypothesis.
                    continue;
                } else {
                    chosen = Some(t);
                }
            }
            let Some(mut best) = chosen else { continue };

            if let Some((lo, hi)) = best.peak.rt_span() {
                for other in rest {
                    if other.peak.apex_charge() == best.peak.apex_charge() {
                        continue;
                    }
                    if let Some(rt) = other.peak.apex_rt() {
                        if rt >= lo && rt <= hi {
                            best.peak.merge_from(other.peak, self.cfg.integrate);
                        }
                    }
                }
            }
            accepted.push(best);
        }
        accepted
    }

    /// Target-then-decoy search for one donor peak, widening the window when
    /// both come up empty.
    #[allow(clippy::too_many_arguments)]
    fn search_donor(
        &self,
        acceptor: RunIdx,
        index: &PeakIndex,
        donor_sel: &[DonorPeak<'_>],
        target_i: usize,
        alignment: &RtAlignment,
        scorer: &MbrScorer,
        cross_condition: bool,
        donor_run: RunIdx,
    ) -> Vec<MbrTransfer> {
        let donor = &donor_sel[target_i];
        let Some(pattern) = self.patterns.get(donor.seq) else {
            return Vec::new();
        };
        if pattern.is_empty() {
            return Vec::new();
        }
        let mass = donor.id.peakfinding_mass;

        let mut charges: Vec<u8> = donor
            .peak
            .id_idxs
            .iter()
            .map(|i| self.ids[i.0].precursor_charge)
            .collect();
        if let Some(z) = donor.peak.apex_charge() {
            charges.push(z);
        }
        charges.sort_unstable();
        charges.dedup();

        let validator = EnvelopeValidator::new(
            index,
            pattern,
            self.cfg.isotope_ppm_tolerance,
            self.cfg.num_isotopes_required,
        );

        let mut window = alignment.predict(donor.apex_rt);
        let decoy_idx = pick_decoy_donor(donor_sel, target_i, window.width);

        loop {
            let target = self.assemble_best(
                acceptor,
                index,
                &validator,
                donor,
                &charges,
                mass,
                &window,
                scorer,
                cross_condition,
                donor_run,
                false,
            );
            // The decoy reuses the real donor's window width at the decoy
            // peptide's predicted RT, so the null search samples the same
            // volume as the real one.
            let decoy = decoy_idx.and_then(|di| {
                let decoy_rt = alignment.predict(donor_sel[di].apex_rt).rt;
                let decoy_window = window.recentered(decoy_rt);
                self.assemble_best(
                    acceptor,
                    index,
                    &validator,
                    donor,
                    &charges,
                    mass,
                    &decoy_window,
                    scorer,
                    cross_condition,
                    donor_run,
                    true,
                )
            });

            if target.is_none()
                && decoy.is_none()
                && window.width + 1e-9 < self.cfg.mbr_rt_window
            {
                window = window.widened(WINDOW_WIDEN_STEP, self.cfg.mbr_rt_window);
                continue;
            }
            return target.into_iter().chain(decoy).collect();
        }
    }

    /// Assemble the best-scoring chromatographic peak for one donor species
    /// inside one RT window: seeds ordered by intensity greedily grow peaks,
    /// each charge keeps its best, charges merge into the winner when they
    /// co-elute.
    #[allow(clippy::too_many_arguments)]
    fn assemble_best(
        &self,
        acceptor: RunIdx,
        index: &PeakIndex,
        validator: &EnvelopeValidator<'_>,
        donor: &DonorPeak<'_>,
        charges: &[u8],
        mass: f64,
        window: &RtPrediction,
        scorer: &MbrScorer,
        cross_condition: bool,
        donor_run: RunIdx,
        random_rt: bool,
    ) -> Option<MbrTransfer> {
        let (lo, hi) = window.window();
        let tol = scorer.effective_tolerance();
        let donor_log_intensity = if donor.peak.intensity > 0.0 {
            donor.peak.intensity.log2()
        } else {
            0.0
        };

        let mut per_charge: Vec<(f64, ChromatographicPeak, CandidateFeatures)> = Vec::new();
        for &charge in charges {
            let mut seeds: Vec<_> = index
                .peaks_in_rt_window(mass, lo, hi, &tol, charge)
                .into_iter()
                .filter_map(|p| validator.validate(p, charge, mass))
                .collect();
            seeds.sort_by(|a, b| {
                b.peak
                    .intensity
                    .total_cmp(&a.peak.intensity)
                    .then(a.ms1_index().cmp(&b.ms1_index()))
            });

            let mut consumed: HashSet<PeakKey> = HashSet::new();
            let mut best: Option<(f64, ChromatographicPeak, CandidateFeatures)> = None;
            for seed in &seeds {
                if consumed.contains(&seed.peak.key()) {
                    continue;
                }
                let mut peak = ChromatographicPeak::new_mbr(
                    acceptor,
                    donor.id_idx,
                    random_rt,
                    donor.id.decoy.is_decoy(),
                );
                let xic = trace_xic(
                    index,
                    seed.retention_time(),
                    mass,
                    charge,
                    &tol,
                    self.cfg.missed_scans_allowed,
                );
                for p in xic {
                    if let Some(env) = validator.validate(p, charge, mass) {
                        peak.envelopes.push(env);
                    }
                }
                if peak.envelopes.is_empty() {
                    continue;
                }
                peak.recalculate(self.cfg.integrate);
                cut_peak(
                    &mut peak,
                    seed.retention_time(),
                    self.cfg.discrimination_factor_to_cut_peak,
                    self.cfg.integrate,
                );
                if peak.envelopes.is_empty() {
                    continue;
                }
                for e in &peak.envelopes {
                    consumed.insert(e.peak.key());
                }

                let apex = peak.apex_envelope().expect("non-empty peak has an apex");
                let features = CandidateFeatures {
                    ppm_error: (apex.peak.neutral_mass(apex.charge) - mass) / mass * 1e6,
                    rt_error: apex.retention_time() - window.rt,
                    log_intensity: if peak.intensity > 0.0 {
                        peak.intensity.log2()
                    } else {
                        0.0
                    },
                    donor_log_intensity,
                    correlation: apex.pearson,
                    charge,
                    cross_condition,
                };
                let score = scorer.score(&features);
                match &best {
                    Some((s, _, _)) if *s >= score => {}
                    _ => best = Some((score, peak, features)),
                }
            }
            if let Some(b) = best {
                per_charge.push(b);
            }
        }

        if per_charge.is_empty() {
            return None;
        }
        per_charge.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(b.2.correlation.total_cmp(&a.2.correlation))
        });
        let (score, mut peak, features) = per_charge.remove(0);
        if let Some((lo_rt, hi_rt)) = peak.rt_span() {
            for (_, other, _) in per_charge {
                if let Some(rt) = other.apex_rt() {
                    if rt >= lo_rt && rt <= hi_rt {
                        peak.merge_from(other, self.cfg.integrate);
                    }
                }
            }
        }
        peak.mbr_score = Some(score);
        Some(MbrTransfer {
            peak,
            features,
            donor_id: donor.id_idx,
            donor_run,
            score,
        })
    }
}
