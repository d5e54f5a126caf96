use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::config::QuantConfig;
use crate::errors::{
    LfqError,
    Result,
};
use crate::mbr::MbrTransfer;
use crate::ml::cv::{
    CrossValidatedScorer,
    DataBuffer,
    FeatureLike,
    GBMConfig,
};

/// Minimum number of transfers before PEP training is attempted.
pub const MIN_PEAKS_FOR_PEP: usize = 100;
/// Minimum number of random-RT decoys among them.
pub const MIN_RT_DECOYS_FOR_PEP: usize = 20;

const NUM_FEATURES: usize = 7;

struct TransferFeature {
    features: [f64; NUM_FEATURES],
    y: f64,
    score: f64,
    transfer_idx: usize,
}

impl FeatureLike for TransferFeature {
    fn as_feature(&self) -> impl IntoIterator<Item = f64> + '_ {
        self.features
    }

    fn get_y(&self) -> f64 {
        self.y
    }

    fn assign_score(&mut self, score: f64) {
        self.score = score;
    }

    fn get_score(&self) -> f64 {
        self.score
    }
}

/// Estimate a posterior error probability per transfer with a
/// cross-validated gradient-boosted classifier, targets vs random-RT
/// decoys.
///
/// Returns Ok(false) without touching the transfers when training is
/// infeasible (too few transfers or decoys); double-decoy q-values remain
/// the only error estimate in that case.
pub fn assign_mbr_pep(transfers: &mut [MbrTransfer], cfg: &QuantConfig) -> Result<bool> {
    let rt_decoys = transfers.iter().filter(|t| t.peak.random_rt).count();
    if transfers.len() < MIN_PEAKS_FOR_PEP || rt_decoys < MIN_RT_DECOYS_FOR_PEP {
        info!(
            "Skipping PEP estimation: {} transfers with {} random-RT decoys \
             (need {} and {})",
            transfers.len(),
            rt_decoys,
            MIN_PEAKS_FOR_PEP,
            MIN_RT_DECOYS_FOR_PEP
        );
        return Ok(false);
    }

    let mut data: Vec<TransferFeature> = transfers
        .iter()
        .enumerate()
        .map(|(i, t)| TransferFeature {
            features: [
                t.score,
                t.features.ppm_error,
                t.features.rt_error,
                t.features.log_intensity,
                if t.features.correlation.is_nan() {
                    0.0
                } else {
                    t.features.correlation
                },
                t.features.charge as f64,
                if t.features.cross_condition { 1.0 } else { 0.0 },
            ],
            y: if t.peak.random_rt { 0.0 } else { 1.0 },
            score: f64::NAN,
            transfer_idx: i,
        })
        .collect();

    // Fold assignment is round-robin over the shuffled order; the fixed
    // seed keeps the folds (and therefore the PEPs) reproducible.
    let mut rng = StdRng::seed_from_u64(cfg.random_seed);
    data.shuffle(&mut rng);

    // Each classifier trains on one fold, so the fold count realizes the
    // configured training fraction.
    let n_folds = ((1.0 / cfg.pep_training_fraction).round() as u8).clamp(3, 10);
    let config = GBMConfig::default().with_seed(cfg.random_seed);
    let mut scorer = CrossValidatedScorer::new_from_shuffled(n_folds, data, config);
    scorer
        .fit(&mut DataBuffer::default(), &mut DataBuffer::default())
        .map_err(|e| LfqError::Classifier {
            msg: format!("{:?}", e),
        })?;

    for feat in scorer.score() {
        // The averaged prediction is in log-odds of being a target.
        let pep = 1.0 / (1.0 + feat.score.exp());
        transfers[feat.transfer_idx].peak.mbr_pep = Some(pep);
    }
    info!("Assigned PEPs to {} transfers", transfers.len());
    Ok(true)
}
