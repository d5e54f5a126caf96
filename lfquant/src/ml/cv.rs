pub use forust_ml::constraints::ConstraintMap;
pub use forust_ml::errors::ForustError;
pub use forust_ml::gradientbooster::{
    GrowPolicy,
    MissingNodeTreatment,
};
pub use forust_ml::metric::Metric;
pub use forust_ml::objective::ObjectiveType;
pub use forust_ml::sampler::SampleMethod;
pub use forust_ml::{
    GradientBooster,
    Matrix,
};
use std::collections::HashSet;

/// Hyperparameters for the gradient-boosted PEP classifier.
pub struct GBMConfig {
    iterations: usize,
    learning_rate: f32,
    max_depth: usize,
    max_leaves: usize,
    l1: f32,
    l2: f32,
    gamma: f32,
    max_delta_step: f32,
    min_leaf_weight: f32,
    base_score: f64,
    nbins: u16,
    parallel: bool,
    allow_missing_splits: bool,
    monotone_constraints: Option<ConstraintMap>,
    subsample: f32,
    top_rate: f64,
    other_rate: f64,
    colsample_bytree: f64,
    seed: u64,
    missing: f64,
    create_missing_branch: bool,
    sample_method: SampleMethod,
    grow_policy: GrowPolicy,
    evaluation_metric: Option<Metric>,
    early_stopping_rounds: Option<usize>,
    initialize_base_score: bool,
    terminate_missing_features: HashSet<usize>,
    missing_node_treatment: MissingNodeTreatment,
    log_iterations: usize,
    force_children_to_bound_parent: bool,
}

impl Default for GBMConfig {
    fn default() -> Self {
        GBMConfig {
            iterations: 500,
            learning_rate: 0.1,
            max_depth: 5,
            max_leaves: usize::MAX,
            l1: 0.,
            l2: 1.,
            gamma: 0.,
            max_delta_step: 0.,
            min_leaf_weight: 5.,
            base_score: 0.5,
            nbins: 256,
            parallel: true,
            allow_missing_splits: true,
            monotone_constraints: None,
            subsample: 0.75,
            top_rate: 0.1,
            other_rate: 0.2,
            colsample_bytree: 1.0,
            seed: 0,
            missing: f64::NAN,
            create_missing_branch: false,
            sample_method: SampleMethod::None,
            grow_policy: GrowPolicy::DepthWise,
            evaluation_metric: Some(Metric::LogLoss),
            early_stopping_rounds: Some(10),
            initialize_base_score: true,
            terminate_missing_features: HashSet::new(),
            missing_node_treatment: MissingNodeTreatment::AssignToParent,
            log_iterations: 0,
            force_children_to_bound_parent: false,
        }
    }
}

impl GBMConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn try_build(&self) -> Result<GradientBooster, ForustError> {
        GradientBooster::new(
            ObjectiveType::LogLoss,
            self.iterations,
            self.learning_rate,
            self.max_depth,
            self.max_leaves,
            self.l1,
            self.l2,
            self.gamma,
            self.max_delta_step,
            self.min_leaf_weight,
            self.base_score,
            self.nbins,
            self.parallel,
            self.allow_missing_splits,
            self.monotone_constraints.clone(),
            self.subsample,
            self.top_rate,
            self.other_rate,
            self.colsample_bytree,
            self.seed,
            self.missing,
            self.create_missing_branch,
            match self.sample_method {
                SampleMethod::None => SampleMethod::None,
                SampleMethod::Random => SampleMethod::Random,
                SampleMethod::Goss => SampleMethod::Goss,
            },
            match self.grow_policy {
                GrowPolicy::DepthWise => GrowPolicy::DepthWise,
                GrowPolicy::LossGuide => GrowPolicy::LossGuide,
            },
            self.evaluation_metric,
            self.early_stopping_rounds,
            self.initialize_base_score,
            self.terminate_missing_features.clone(),
            self.missing_node_treatment,
            self.log_iterations,
            self.force_children_to_bound_parent,
        )
    }
}

/// A scorable data point for the cross-validated classifier.
pub trait FeatureLike {
    /// Note: the returned iterator MUST yield the same number of elements
    /// for every element of this type.
    fn as_feature(&self) -> impl IntoIterator<Item = f64> + '_;
    fn get_y(&self) -> f64;
    fn assign_score(&mut self, score: f64);
    fn get_score(&self) -> f64;
}

/// Reusable feature-major buffer for one fold's matrix.
#[derive(Default)]
pub struct DataBuffer {
    fold_buffer: Vec<f64>,
    response_buffer: Vec<f64>,
    nrows: usize,
    ncols: usize,
}

impl DataBuffer {
    fn fill_buffer(&mut self, assigned_fold: &[u8], data: &[impl FeatureLike], fold: u8) {
        self.fold_buffer.clear();
        self.response_buffer.clear();
        self.nrows = assigned_fold.iter().filter(|&&x| x == fold).count();

        let mut probe = Vec::new();
        probe.extend(data.first().expect("non-empty training data").as_feature());
        self.ncols = probe.len();

        // The matrix is feature-major, so values land in transposed order.
        self.fold_buffer.resize(self.ncols * self.nrows, 0.0);

        let mut sample_idx = 0;
        for (elem_fold, elem) in assigned_fold.iter().zip(data.iter()) {
            if fold == *elem_fold {
                for (feature_idx, val) in elem.as_feature().into_iter().enumerate() {
                    self.fold_buffer[feature_idx * self.nrows + sample_idx] = val;
                }
                self.response_buffer.push(elem.get_y());
                sample_idx += 1;
            }
        }
    }

    fn as_matrix(&self) -> (Matrix<'_, f64>, &'_ [f64]) {
        let mat = Matrix::new(self.fold_buffer.as_slice(), self.nrows, self.ncols);
        assert_eq!(self.fold_buffer.len(), self.nrows * self.ncols);
        assert_eq!(self.response_buffer.len(), self.nrows);
        (mat, self.response_buffer.as_slice())
    }
}

/// K-fold cross-validated gradient-boosted scorer.
///
/// For k >= 3 folds, classifier n trains on fold n with fold n+1 as its
/// early-stopping data; every point is scored by the average of the
/// classifiers that saw it in neither role, so no score is ever produced by
/// a model that trained on its own point.
pub struct CrossValidatedScorer<T: FeatureLike> {
    n_folds: u8,
    data: Vec<T>,
    assigned_fold: Vec<u8>,
    fold_classifiers: Vec<Option<GradientBooster>>,
    config: GBMConfig,
}

impl<T: FeatureLike> CrossValidatedScorer<T> {
    /// Create a new CrossValidatedScorer.
    ///
    /// NOTE: this assumes the data is already shuffled. Folds are assigned
    /// round-robin (0, 1, ..., n_folds-1, 0, 1, ...), so ordered input leads
    /// to biased folds.
    pub fn new_from_shuffled(n_folds: u8, data: Vec<T>, config: GBMConfig) -> Self {
        assert!(n_folds >= 3, "cross-validation needs at least 3 folds");
        let assigned_fold: Vec<u8> = (0..data.len())
            .map(|x| (x % n_folds as usize) as u8)
            .collect();
        Self {
            n_folds,
            data,
            assigned_fold,
            fold_classifiers: Vec::new(),
            config,
        }
    }

    pub fn fit(
        &mut self,
        train_buffer: &mut DataBuffer,
        val_buffer: &mut DataBuffer,
    ) -> Result<(), ForustError> {
        self.fold_classifiers.clear();
        (0..self.n_folds).for_each(|_| self.fold_classifiers.push(None));
        for fold in 0..self.n_folds {
            self.fit_fold(fold, train_buffer, val_buffer)?;
        }
        self.assign_scores();
        Ok(())
    }

    pub fn get_scores(&self) -> Vec<f64> {
        let mut scores = vec![0.0; self.data.len()];
        let mut buffer = DataBuffer::default();

        for train_i in 0..self.n_folds {
            let early_stop_i = self.next_fold(train_i);

            for inference_i in 0..self.n_folds {
                if inference_i == train_i || inference_i == early_stop_i {
                    continue;
                }
                let scorer = self.fold_classifiers[train_i as usize]
                    .as_ref()
                    .expect("fit assigns every fold classifier");
                let (matrix, _res) = self.fold_to_matrix(inference_i, &mut buffer);
                let preds = scorer.predict(&matrix, true);
                let mut score_i = 0;
                for pred in preds.into_iter() {
                    while self.assigned_fold[score_i] != inference_i {
                        score_i += 1;
                    }
                    scores[score_i] += pred;
                    score_i += 1;
                }
            }
        }

        let div_factor = (self.n_folds - 2) as f64;
        scores.iter_mut().for_each(|x| {
            *x /= div_factor;
        });

        scores
    }

    fn assign_scores(&mut self) {
        let scores = self.get_scores();
        for (v, s) in self.data.iter_mut().zip(scores.iter()) {
            v.assign_score(*s);
        }
    }

    /// Consume the scorer and hand back the scored data points.
    pub fn score(self) -> Vec<T> {
        self.data
    }

    fn next_fold(&self, fold: u8) -> u8 {
        (fold + 1) % self.n_folds
    }

    fn fold_to_matrix<'a>(
        &self,
        fold: u8,
        buffer: &'a mut DataBuffer,
    ) -> (Matrix<'a, f64>, &'a [f64]) {
        buffer.fill_buffer(self.assigned_fold.as_slice(), self.data.as_slice(), fold);
        buffer.as_matrix()
    }

    fn fit_fold(
        &mut self,
        fold: u8,
        train_buffer: &mut DataBuffer,
        val_buffer: &mut DataBuffer,
    ) -> Result<(), ForustError> {
        let mut model = self.config.try_build()?;
        let next_fold_id = self.next_fold(fold);
        let (matrix, response) = {
            train_buffer.fill_buffer(self.assigned_fold.as_slice(), self.data.as_slice(), fold);
            train_buffer.as_matrix()
        };
        let (v_matrix, v_response) = {
            val_buffer.fill_buffer(
                self.assigned_fold.as_slice(),
                self.data.as_slice(),
                next_fold_id,
            );
            val_buffer.as_matrix()
        };
        let eval_weight = vec![1.0f64; v_response.len()];
        let evaluation_data = Some(vec![(v_matrix, v_response, eval_weight.as_slice())]);
        model.fit_unweighted(&matrix, response, evaluation_data)?;
        self.fold_classifiers[fold as usize] = Some(model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{
        Rng,
        SeedableRng,
    };

    struct MyFeature {
        vals: [f64; 5],
        class: f64,
        score: f64,
    }

    impl FeatureLike for MyFeature {
        fn as_feature(&self) -> impl IntoIterator<Item = f64> + '_ {
            self.vals
        }

        fn get_y(&self) -> f64 {
            self.class
        }

        fn assign_score(&mut self, score: f64) {
            self.score = score;
        }

        fn get_score(&self) -> f64 {
            self.score
        }
    }

    fn random_data(num_targets: usize, num_decoys: usize) -> Vec<MyFeature> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut out = Vec::new();

        // Targets get two features drawn from twice the decoy range.
        for _ in 0..num_targets {
            out.push(MyFeature {
                vals: [
                    rng.random_range(1.0..10.0),
                    rng.random_range(1.0..10.0),
                    rng.random_range(1.0..10.0),
                    rng.random_range(1.0..20.0),
                    rng.random_range(1.0..20.0),
                ],
                class: 1.0,
                score: f64::NAN,
            });
        }
        for _ in 0..num_decoys {
            out.push(MyFeature {
                vals: [
                    rng.random_range(1.0..10.0),
                    rng.random_range(1.0..10.0),
                    rng.random_range(1.0..10.0),
                    rng.random_range(1.0..10.0),
                    rng.random_range(1.0..10.0),
                ],
                class: 0.0,
                score: f64::NAN,
            });
        }
        out
    }

    #[test]
    fn test_cv_separates_classes() {
        let config = GBMConfig::default();
        let data = random_data(500, 500);
        let data_len = data.len();

        // The construction above interleaves classes across folds poorly,
        // but round-robin assignment still puts both classes in each fold.
        let mut scorer = CrossValidatedScorer::new_from_shuffled(3, data, config);
        scorer
            .fit(&mut DataBuffer::default(), &mut DataBuffer::default())
            .unwrap();

        let out = scorer.get_scores();
        assert_eq!(out.len(), data_len);
        let avg_t: f64 = out[..500].iter().sum::<f64>() / 500.0;
        let avg_d: f64 = out[500..].iter().sum::<f64>() / 500.0;
        assert!(
            avg_t > avg_d,
            "targets should outscore decoys: {} vs {}",
            avg_t,
            avg_d
        );
    }
}
