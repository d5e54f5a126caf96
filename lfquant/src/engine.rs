use std::collections::{
    HashMap,
    HashSet,
};
use std::path::PathBuf;

use peakindex::persistence::{
    index_cache_path,
    load_compressed,
    save_compressed,
};
use peakindex::PeakIndexBuilder;
use tracing::{
    info,
    warn,
};

use crate::config::QuantConfig;
use crate::errors::{
    LfqError,
    Result,
};
use crate::isotopes::{
    build_isotope_patterns,
    IsotopePattern,
};
use crate::mbr::{
    MbrPass,
    MbrTransfer,
};
use crate::ml::{
    assign_mbr_pep,
    assign_mbr_qvalues,
};
use crate::models::{
    ChromatographicPeak,
    IdIdx,
    Identification,
    Results,
    RunIdx,
    RunRecord,
};
use crate::quant::{
    quantify_run,
    run_error_checking,
};
use crate::traits::SpectrumSource;

/// Aggregate counters reported after a quantification, one instance per
/// engine run. Failures of individual runs or donor pairs land here rather
/// than aborting the engine.
#[derive(Debug, Default, Clone)]
pub struct QuantDiagnostics {
    pub runs_quantified: usize,
    pub runs_skipped: usize,
    pub ms2_peaks: usize,
    pub scorers_invalid: usize,
    pub donor_pairs_without_anchors: usize,
    pub mbr_targets_searched: usize,
    pub mbr_decoys_searched: usize,
    pub mbr_transfers_accepted: usize,
    pub mbr_transfers_rejected: usize,
    pub pep_trained: bool,
}

pub struct QuantOutput {
    pub results: Results,
    pub diagnostics: QuantDiagnostics,
}

/// The label-free quantification engine.
///
/// Runs are processed one at a time in a deterministic order (condition,
/// biological replicate, fraction, technical replicate): the run's MS1
/// scans are indexed, its identifications quantified in parallel, and the
/// index persisted to the scratch directory before being dropped. When
/// match-between-runs is enabled a second pass rehydrates each acceptor's
/// index and transfers identifications from all other runs, followed by
/// double-decoy FDR and optional PEP estimation over the pooled transfers.
pub struct LfqEngine<S: SpectrumSource> {
    cfg: QuantConfig,
    source: S,
    runs: Vec<RunRecord>,
    ids: Vec<Identification>,
    scratch_dir: PathBuf,
}

impl<S: SpectrumSource + Sync> LfqEngine<S> {
    pub fn new(
        cfg: QuantConfig,
        source: S,
        runs: Vec<RunRecord>,
        ids: Vec<Identification>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cfg,
            source,
            runs,
            ids,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn run(mut self) -> Result<QuantOutput> {
        if self.runs.is_empty() {
            return Err(LfqError::NoRuns);
        }
        let total_st = std::time::Instant::now();
        info!(
            "Quantifying {} identifications across {} runs",
            self.ids.len(),
            self.runs.len()
        );

        let patterns = build_isotope_patterns(&mut self.ids, self.cfg.num_isotopes_required);

        let mut ids_by_run: Vec<Vec<IdIdx>> = self.runs.iter().map(|_| Vec::new()).collect();
        for (i, id) in self.ids.iter().enumerate() {
            ids_by_run[id.run.0].push(IdIdx(i));
        }

        let mut order: Vec<usize> = (0..self.runs.len()).collect();
        order.sort_by(|&a, &b| self.runs[a].order_key().cmp(&self.runs[b].order_key()));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.cfg.thread_count())
            .build()
            .map_err(|e| LfqError::ThreadPool { msg: e.to_string() })?;

        let mut results = Results::new(self.runs.clone());
        let mut diagnostics = QuantDiagnostics::default();
        let mut index_cached = vec![false; self.runs.len()];

        for &r in &order {
            let peaks = self.quantify_one_run(
                RunIdx(r),
                &ids_by_run,
                &patterns,
                &pool,
                &mut diagnostics,
                &mut index_cached,
            )?;
            results.set_run_peaks(RunIdx(r), peaks);
        }
        diagnostics.ms2_peaks = results.num_peaks();
        info!(
            "MS2 quantification done: {} peaks over {} runs",
            diagnostics.ms2_peaks, diagnostics.runs_quantified
        );

        if self.cfg.match_between_runs {
            self.match_between_runs(
                &order,
                &ids_by_run,
                &patterns,
                &index_cached,
                &pool,
                &mut results,
                &mut diagnostics,
            )?;
        }

        info!(
            "Quantification finished in {:?}: {} peaks total",
            total_st.elapsed(),
            results.num_peaks()
        );
        Ok(QuantOutput {
            results,
            diagnostics,
        })
    }

    /// Index, quantify, and (for MBR) persist one run. Unreadable or empty
    /// runs are skipped with a warning and yield an empty peak list.
    fn quantify_one_run(
        &self,
        run_idx: RunIdx,
        ids_by_run: &[Vec<IdIdx>],
        patterns: &HashMap<String, IsotopePattern>,
        pool: &rayon::ThreadPool,
        diagnostics: &mut QuantDiagnostics,
        index_cached: &mut [bool],
    ) -> Result<Vec<ChromatographicPeak>> {
        let record = &self.runs[run_idx.0];
        let run_ids = &ids_by_run[run_idx.0];
        if run_ids.is_empty() {
            info!("Run {:?} has no identifications", record.path);
            return Ok(Vec::new());
        }

        let scans = match self.source.ms1_scans(&record.path) {
            Ok(scans) => scans,
            Err(e) => {
                warn!("Skipping unreadable run {:?}: {}", record.path, e);
                diagnostics.runs_skipped += 1;
                return Ok(Vec::new());
            }
        };
        let mut builder = PeakIndexBuilder::new();
        for (scan_info, centroids) in scans {
            builder.add_scan(scan_info, &centroids);
        }
        let index = builder.build();
        if index.is_empty() {
            warn!("Run {:?} produced no MS1 peaks", record.path);
            diagnostics.runs_skipped += 1;
            return Ok(Vec::new());
        }

        let peaks = pool.install(|| {
            quantify_run(run_idx, &index, &self.ids, run_ids, patterns, &self.cfg)
        });

        if self.cfg.match_between_runs {
            // The index is needed again in the MBR pass; failing to persist
            // it would silently halve the experiment, so this error is
            // fatal.
            let path = index_cache_path(&self.scratch_dir, run_idx.0);
            save_compressed(&index, &path)?;
            index_cached[run_idx.0] = true;
        }
        diagnostics.runs_quantified += 1;
        Ok(peaks)
    }

    #[allow(clippy::too_many_arguments)]
    fn match_between_runs(
        &self,
        order: &[usize],
        ids_by_run: &[Vec<IdIdx>],
        patterns: &HashMap<String, IsotopePattern>,
        index_cached: &[bool],
        pool: &rayon::ThreadPool,
        results: &mut Results,
        diagnostics: &mut QuantDiagnostics,
    ) -> Result<()> {
        let protein_conditions = self.protein_conditions();
        let pass = MbrPass {
            cfg: &self.cfg,
            runs: &self.runs,
            ids: &self.ids,
            ids_by_run,
            patterns,
            protein_conditions: &protein_conditions,
        };

        let mut transfers: Vec<MbrTransfer> = Vec::new();
        for &r in order {
            if !index_cached[r] {
                continue;
            }
            let index = load_compressed(&index_cache_path(&self.scratch_dir, r))?;
            let (found, stats) =
                pool.install(|| pass.run_acceptor(RunIdx(r), &index, results));
            if stats.scorer_invalid {
                diagnostics.scorers_invalid += 1;
            }
            diagnostics.donor_pairs_without_anchors += stats.donor_pairs_without_anchors;
            diagnostics.mbr_targets_searched += stats.targets_found;
            diagnostics.mbr_decoys_searched += stats.decoys_found;
            transfers.extend(found);
        }

        diagnostics.pep_trained = assign_mbr_pep(&mut transfers, &self.cfg)?;
        if diagnostics.pep_trained {
            keep_lowest_pep_per_donor(&mut transfers);
        }
        assign_mbr_qvalues(&mut transfers);

        for t in transfers {
            if t.peak.mbr_q_value.unwrap_or(1.0) <= self.cfg.mbr_detection_q_value_threshold {
                diagnostics.mbr_transfers_accepted += 1;
                let run = t.peak.run.0;
                results.peaks[run].push(t.peak);
            } else {
                diagnostics.mbr_transfers_rejected += 1;
            }
        }

        // Transfers can land on apexes that MS2 peaks own; one more
        // error-checking pass per run seals the lists.
        for r in 0..self.runs.len() {
            let peaks = std::mem::take(&mut results.peaks[r]);
            results.peaks[r] = run_error_checking(peaks, &self.ids, &self.cfg);
        }
        Ok(())
    }

    /// Conditions in which each protein group has at least one confident
    /// MS2 identification.
    fn protein_conditions(&self) -> HashMap<String, HashSet<String>> {
        let mut out: HashMap<String, HashSet<String>> = HashMap::new();
        for id in &self.ids {
            if id.decoy.is_decoy() || id.q_value >= self.cfg.donor_q_value_threshold {
                continue;
            }
            let condition = &self.runs[id.run.0].condition;
            for pg in &id.protein_groups {
                out.entry(pg.clone()).or_default().insert(condition.clone());
            }
        }
        out
    }
}

/// Among transfers of the same donor identification into the same acceptor
/// run, keep only the lowest-PEP one per decoy label.
fn keep_lowest_pep_per_donor(transfers: &mut Vec<MbrTransfer>) {
    let mut best: HashMap<(usize, IdIdx, bool), (f64, usize)> = HashMap::new();
    for (i, t) in transfers.iter().enumerate() {
        let key = (t.peak.run.0, t.donor_id, t.peak.random_rt);
        let pep = t.peak.mbr_pep.unwrap_or(1.0);
        match best.get(&key) {
            Some(&(best_pep, _)) if best_pep <= pep => {}
            _ => {
                best.insert(key, (pep, i));
            }
        }
    }
    let keep: HashSet<usize> = best.values().map(|&(_, i)| i).collect();
    let mut i = 0;
    transfers.retain(|_| {
        let keep_this = keep.contains(&i);
        i += 1;
        keep_this
    });
}
