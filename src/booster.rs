//! Booster
//!
//! The gradient boosted ensemble, its parameters and the training session
//! that grows it.
use crate::binning::{bin_matrix, feature_types, rebin_with_cuts, FeatureType};
use crate::constants::{DEFAULT_MAX_BIN, DEFAULT_MAX_CAT_TO_ONEHOT, MAX_BIN_LIMIT};
use crate::data::{JaggedMatrix, Matrix, RowMajorMatrix};
use crate::device::{Device, DeviceInventory, ExecutionContext};
use crate::errors::{BoostError, BoostWarning};
use crate::gradient::GradientPairs;
use crate::grower::GrowPolicy;
use crate::metric::{is_comparison_better, metric_callables, Metric, MetricContext};
use crate::objective::{group_ptr_from_qid, BuiltinObjective, Objective};
use crate::sampler::{row_sampler, sample_columns, SampleMethod, Sampler};
use crate::splitter::{GainParams, HistogramSplitter};
use crate::tree::{GrowthLimits, Tree};
use crate::utils::{validate_float_parameter, validate_positive_float_parameter};
use hashbrown::HashMap;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::ThreadPool;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::time::Instant;

/// Metric history per evaluation set, `validation_i -> metric -> values`.
pub type EvalsResult = HashMap<String, HashMap<String, Vec<f64>>>;

/// How the bin map is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeMethod {
    /// Bins are sketched once per session from the sample weights.
    Hist,
    /// Bins are sketched again every round, weighted by the hessian.
    Approx,
}

impl FromStr for TreeMethod {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hist" => Ok(TreeMethod::Hist),
            "approx" => Ok(TreeMethod::Approx),
            _ => Err(BoostError::ParseString(
                s.to_string(),
                "TreeMethod".to_string(),
                "hist, approx".to_string(),
            )),
        }
    }
}

impl fmt::Display for TreeMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TreeMethod::Hist => write!(f, "hist"),
            TreeMethod::Approx => write!(f, "approx"),
        }
    }
}

/// How several outputs are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiStrategy {
    /// One tree per output and round.
    OneOutputPerTree,
    /// A single tree per round with a weight vector in every leaf.
    MultiOutputTree,
}

impl FromStr for MultiStrategy {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_output_per_tree" => Ok(MultiStrategy::OneOutputPerTree),
            "multi_output_tree" => Ok(MultiStrategy::MultiOutputTree),
            _ => Err(BoostError::ParseString(
                s.to_string(),
                "MultiStrategy".to_string(),
                "one_output_per_tree, multi_output_tree".to_string(),
            )),
        }
    }
}

impl fmt::Display for MultiStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MultiStrategy::OneOutputPerTree => write!(f, "one_output_per_tree"),
            MultiStrategy::MultiOutputTree => write!(f, "multi_output_tree"),
        }
    }
}

/// Held-out data scored after every round.
pub struct EvalSet<'a> {
    pub data: &'a Matrix<'a, f64>,
    /// Labels, row-major with the same number of columns as the training labels.
    pub y: &'a [f64],
    pub sample_weight: Option<&'a [f64]>,
    pub base_margin: Option<&'a [f64]>,
    pub qid: Option<&'a [u64]>,
}

impl<'a> EvalSet<'a> {
    pub fn new(data: &'a Matrix<'a, f64>, y: &'a [f64]) -> Self {
        EvalSet {
            data,
            y,
            sample_weight: None,
            base_margin: None,
            qid: None,
        }
    }
}

/// Optional inputs of [`GradientBooster::fit`].
#[derive(Default)]
pub struct FitOptions<'a> {
    pub sample_weight: Option<&'a [f64]>,
    pub categorical_features: Option<HashSet<usize>>,
    /// Starting margins, row-major `rows x n_outputs`, used instead of the bias.
    pub base_margin: Option<&'a [f64]>,
    /// Sorted query ids, required by ranking objectives.
    pub qid: Option<&'a [u64]>,
    pub eval_sets: Vec<EvalSet<'a>>,
    /// `Some(false)` continues the previous training session.
    pub reset: Option<bool>,
    /// Time limit in seconds, checked between rounds.
    pub timeout: Option<f32>,
}

/// Gradient boosted decision tree ensemble.
#[derive(Deserialize, Serialize, Clone)]
pub struct GradientBooster {
    /// Loss that is optimized.
    pub objective: Objective,
    pub tree_method: TreeMethod,
    pub device: Device,
    pub multi_strategy: MultiStrategy,
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// Step size to use at each iteration. Each leaf weight is multiplied by
    /// this number.
    pub eta: f64,
    /// Maximum depth of a tree, 0 means unlimited and needs the loss guided policy.
    pub max_depth: usize,
    /// Maximum number of leaves of a tree, 0 means unlimited.
    pub max_leaves: usize,
    pub grow_policy: GrowPolicy,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    /// Minimum gain of a split.
    pub gamma: f64,
    /// Minimum hessian sum in a child.
    pub min_child_weight: f64,
    /// Number of bins to partition every feature into.
    pub max_bin: u16,
    pub max_cat_to_onehot: usize,
    /// Share of rows used by every tree.
    pub subsample: f32,
    /// Share of features used by every tree.
    pub colsample_bytree: f64,
    /// Trees grown per output and round, averaged.
    pub num_parallel_tree: usize,
    /// The initial prediction value of the model. Calculated from y and sample_weight if nan.
    #[serde(deserialize_with = "parse_missing")]
    pub base_score: f64,
    /// Value to consider missing, NaN is always missing.
    #[serde(deserialize_with = "parse_missing")]
    pub missing: f64,
    /// Number of threads to use during training, all cores if `None`.
    pub num_threads: Option<usize>,
    /// Integer value used to seed any randomness used in the algorithm.
    pub seed: u64,
    /// Stop after this many rounds without improvement on the last evaluation set.
    pub early_stopping_rounds: Option<usize>,
    /// Metric reported on the evaluation sets, the objective's default if `None`.
    pub eval_metric: Option<Metric>,
    /// Log progress every N rounds, 0 disables it.
    #[serde(default)]
    pub log_iterations: usize,
    // Members internal to the booster object, and not parameters set by the user.
    pub trees: Vec<Tree>,
    /// Bias of every output.
    #[serde(default)]
    pub base_scores: Vec<f64>,
    #[serde(default = "default_n_outputs")]
    pub n_outputs: usize,
    /// Best round of the last session, set when early stopping is enabled.
    #[serde(default)]
    pub best_iteration: Option<usize>,
    #[serde(default)]
    feature_types: Vec<FeatureType>,
    #[serde(default)]
    cuts: JaggedMatrix<f64>,
    #[serde(default)]
    session_device: Option<Device>,
    #[serde(default)]
    evals_result: EvalsResult,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(skip)]
    warnings: Vec<BoostWarning>,
    #[serde(skip)]
    inventory: Option<DeviceInventory>,
}

fn default_n_outputs() -> usize {
    1
}

fn parse_missing<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Deserialize::deserialize(d).map(|x: Option<_>| x.unwrap_or(f64::NAN))
}

impl Default for GradientBooster {
    fn default() -> Self {
        GradientBooster {
            objective: Objective::default(),
            tree_method: TreeMethod::Hist,
            device: Device::Cpu,
            multi_strategy: MultiStrategy::OneOutputPerTree,
            n_estimators: 100,
            eta: 0.3,
            max_depth: 6,
            max_leaves: 0,
            grow_policy: GrowPolicy::DepthWise,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            max_bin: DEFAULT_MAX_BIN,
            max_cat_to_onehot: DEFAULT_MAX_CAT_TO_ONEHOT,
            subsample: 1.0,
            colsample_bytree: 1.0,
            num_parallel_tree: 1,
            base_score: f64::NAN,
            missing: f64::NAN,
            num_threads: None,
            seed: 0,
            early_stopping_rounds: None,
            eval_metric: None,
            log_iterations: 0,
            trees: Vec::new(),
            base_scores: Vec::new(),
            n_outputs: 1,
            best_iteration: None,
            feature_types: Vec::new(),
            cuts: JaggedMatrix::new(),
            session_device: None,
            evals_result: HashMap::new(),
            metadata: HashMap::new(),
            warnings: Vec::new(),
            inventory: None,
        }
    }
}

/// Everything one call to `fit` produces. It replaces the booster state
/// only once the whole call succeeded.
struct Session {
    trees: Vec<Tree>,
    base_scores: Vec<f64>,
    n_outputs: usize,
    best_iteration: Option<usize>,
    feature_types: Vec<FeatureType>,
    cuts: JaggedMatrix<f64>,
    evals_result: EvalsResult,
    warnings: Vec<BoostWarning>,
}

struct EvalState<'a> {
    set: &'a EvalSet<'a>,
    margins: Vec<f64>,
    weights: Vec<f64>,
    group_ptr: Option<Vec<usize>>,
}

/// Shared inputs of every tree grown in a round.
struct GrowContext<'a> {
    data: &'a Matrix<'a, u16>,
    cuts: &'a JaggedMatrix<f64>,
    index: &'a [usize],
    splitter: &'a HistogramSplitter,
    limits: &'a GrowthLimits,
    cat_index: Option<&'a HashSet<usize>>,
    pool: &'a ThreadPool,
}

fn check_len(name: &str, len: Option<usize>, expected: usize) -> Result<(), BoostError> {
    match len {
        Some(l) if l != expected => Err(BoostError::DataShape(format!(
            "{} has {} values, expected {}",
            name, l, expected
        ))),
        _ => Ok(()),
    }
}

/// Bias or base margin, plus the contribution of `trees`.
fn initial_margins(
    data: &Matrix<f64>,
    base_margin: Option<&[f64]>,
    base_scores: &[f64],
    trees: &[Tree],
    missing: &f64,
) -> Vec<f64> {
    let k = base_scores.len();
    let mut margins: Vec<f64> = match base_margin {
        Some(m) => m.to_vec(),
        None => (0..data.rows).flat_map(|_| base_scores.iter().copied()).collect(),
    };
    for tree in trees {
        tree.update_margins(data, &mut margins, k, missing);
    }
    margins
}

fn format_feature_types(t: &[FeatureType]) -> String {
    let s: Vec<String> = t.iter().map(|f| f.to_string()).collect();
    format!("[{}]", s.join(", "))
}

impl GradientBooster {
    /// Gradient booster with the most common parameters, the rest is set
    /// through the `set_*` methods.
    ///
    /// * `objective` - The loss to optimize.
    /// * `tree_method` - `Hist` sketches the bins once, `Approx` every round.
    /// * `device` - Device the session runs on.
    /// * `multi_strategy` - One tree per output, or a single multi-output tree.
    /// * `n_estimators` - Number of boosting rounds.
    /// * `eta` - Learning rate.
    /// * `max_depth` - Maximum depth of every tree.
    /// * `seed` - Integer value used to seed any randomness used in the algorithm.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        objective: Objective,
        tree_method: TreeMethod,
        device: Device,
        multi_strategy: MultiStrategy,
        n_estimators: usize,
        eta: f64,
        max_depth: usize,
        seed: u64,
    ) -> Result<Self, BoostError> {
        let booster = GradientBooster {
            objective,
            tree_method,
            device,
            multi_strategy,
            n_estimators,
            eta,
            max_depth,
            seed,
            ..Default::default()
        };
        booster.validate_parameters()?;
        Ok(booster)
    }

    /// A random forest, every tree grown in a single round on a bootstrap
    /// like subsample of rows and features, with averaged leaf weights.
    pub fn random_forest(n_trees: usize) -> Self {
        GradientBooster {
            n_estimators: 1,
            num_parallel_tree: n_trees,
            eta: 1.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
            ..Default::default()
        }
    }

    pub fn validate_parameters(&self) -> Result<(), BoostError> {
        if !(self.eta > 0.0 && self.eta.is_finite()) {
            return Err(BoostError::InvalidParameter(
                "eta".to_string(),
                "a positive finite value".to_string(),
                self.eta.to_string(),
            ));
        }
        validate_positive_float_parameter(self.reg_alpha, "reg_alpha")?;
        validate_positive_float_parameter(self.reg_lambda, "reg_lambda")?;
        validate_positive_float_parameter(self.gamma, "gamma")?;
        validate_positive_float_parameter(self.min_child_weight, "min_child_weight")?;
        validate_float_parameter(self.subsample, f32::MIN_POSITIVE, 1.0, "subsample")?;
        validate_float_parameter(self.colsample_bytree, f64::MIN_POSITIVE, 1.0, "colsample_bytree")?;
        if self.num_parallel_tree == 0 {
            return Err(BoostError::InvalidParameter(
                "num_parallel_tree".to_string(),
                "at least 1".to_string(),
                "0".to_string(),
            ));
        }
        if !(2..=MAX_BIN_LIMIT).contains(&self.max_bin) {
            return Err(BoostError::InvalidParameter(
                "max_bin".to_string(),
                format!("a value between 2 and {}", MAX_BIN_LIMIT),
                self.max_bin.to_string(),
            ));
        }
        if self.max_depth == 0 && self.grow_policy == GrowPolicy::DepthWise {
            return Err(BoostError::InvalidParameter(
                "max_depth".to_string(),
                "a positive depth with the depthwise grow policy".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject configurations no device or tree method implements, before any
    /// round runs.
    fn check_configuration(&self, inventory: &DeviceInventory) -> Result<(), BoostError> {
        if self.multi_strategy == MultiStrategy::MultiOutputTree {
            if self.tree_method != TreeMethod::Hist {
                return Err(BoostError::StrategyUnsupported(self.tree_method.to_string()));
            }
            if self.device.is_cuda() {
                return Err(BoostError::DeviceUnsupported(format!(
                    "{} with {}",
                    self.multi_strategy, self.device
                )));
            }
        }
        self.device.validate(inventory)
    }

    pub fn reset(&mut self) {
        self.trees = Vec::new();
        self.base_scores = Vec::new();
        self.best_iteration = None;
        self.evals_result = HashMap::new();
        self.session_device = None;
    }

    /// Fit the gradient booster on a provided dataset.
    ///
    /// The booster is only modified when the call succeeds, an error leaves
    /// the previously trained ensemble untouched.
    ///
    /// * `data` - Features, in either layout.
    /// * `y` - Labels, row-major `rows x targets`.
    /// * `options` - Weights, categorical features, evaluation sets and the
    ///     other optional inputs.
    pub fn fit(&mut self, data: &Matrix<f64>, y: &[f64], options: FitOptions) -> Result<(), BoostError> {
        let start = Instant::now();
        self.validate_parameters()?;
        let inventory = self.inventory.unwrap_or_else(DeviceInventory::detect);
        self.check_configuration(&inventory)?;
        let ctx = self.execution_context()?;
        // Every parallel loop of the session, gradients and margin updates
        // included, runs on the context's pool.
        let session = ctx.pool.install(|| self.train(data, y, &options, &ctx, start))?;
        self.commit(session);
        Ok(())
    }

    /// The device of the booster bound to a pool of `num_threads` threads.
    pub(crate) fn execution_context(&self) -> Result<ExecutionContext, BoostError> {
        ExecutionContext::new(self.device, self.num_threads)
    }

    fn commit(&mut self, session: Session) {
        self.trees = session.trees;
        self.base_scores = session.base_scores;
        self.n_outputs = session.n_outputs;
        self.best_iteration = session.best_iteration;
        self.feature_types = session.feature_types;
        self.cuts = session.cuts;
        self.evals_result = session.evals_result;
        self.warnings = session.warnings;
        self.session_device = Some(self.device);
    }

    fn group_ptr(&self, qid: Option<&[u64]>) -> Result<Option<Vec<usize>>, BoostError> {
        match qid {
            Some(q) => Ok(Some(group_ptr_from_qid(q)?)),
            None if matches!(self.objective, Objective::Builtin(BuiltinObjective::PairwiseRank)) => Err(
                BoostError::DataShape("rank:pairwise requires query ids (qid)".to_string()),
            ),
            None => Ok(None),
        }
    }

    fn trees_per_round(&self, n_outputs: usize) -> usize {
        match self.multi_strategy {
            MultiStrategy::OneOutputPerTree => n_outputs * self.num_parallel_tree,
            MultiStrategy::MultiOutputTree => self.num_parallel_tree,
        }
    }

    fn train(
        &self,
        data: &Matrix<f64>,
        y: &[f64],
        options: &FitOptions,
        ctx: &ExecutionContext,
        start: Instant,
    ) -> Result<Session, BoostError> {
        let (rows, cols) = (data.rows, data.cols);
        if rows == 0 || y.is_empty() || y.len() % rows != 0 {
            return Err(BoostError::DataShape(format!(
                "{} labels can't be split over {} rows",
                y.len(),
                rows
            )));
        }
        let y = RowMajorMatrix::new(y.to_vec(), rows, y.len() / rows);
        check_len("sample_weight", options.sample_weight.map(|w| w.len()), rows)?;
        check_len("qid", options.qid.map(|q| q.len()), rows)?;
        let n_outputs = self.objective.n_outputs(&y)?;
        check_len("base_margin", options.base_margin.map(|m| m.len()), rows * n_outputs)?;
        let group_ptr = self.group_ptr(options.qid)?;

        let cat_index = options.categorical_features.as_ref();
        let ftypes = feature_types(cols, cat_index);
        let continuing = !options.reset.unwrap_or(true) && !self.trees.is_empty();
        if continuing {
            if let Some(previous) = self.session_device {
                if previous != self.device {
                    return Err(BoostError::DeviceChanged(previous.to_string(), self.device.to_string()));
                }
            }
            if ftypes != self.feature_types {
                return Err(BoostError::FeatureTypeMismatch(format!(
                    "expected {}, got {}",
                    format_feature_types(&self.feature_types),
                    format_feature_types(&ftypes)
                )));
            }
            if n_outputs != self.n_outputs {
                return Err(BoostError::OutputDimension {
                    expected: self.n_outputs,
                    found: n_outputs,
                });
            }
        }

        // Binning and histograms read whole columns.
        let col_major_buffer: Vec<f64>;
        let x = if data.is_col_major() {
            Matrix::new(data.data, rows, cols)
        } else {
            col_major_buffer = data.to_col_major();
            Matrix::new(&col_major_buffer, rows, cols)
        };

        let mut binned = if continuing && self.tree_method == TreeMethod::Hist {
            rebin_with_cuts(&x, &self.cuts, self.missing, cat_index)?
        } else {
            bin_matrix(&x, options.sample_weight, self.max_bin, self.missing, cat_index)?
        };

        let base_scores = if continuing {
            self.base_scores.clone()
        } else if self.base_score.is_nan() {
            self.objective.initial_scores(&y, options.sample_weight, n_outputs)
        } else {
            vec![self.base_score; n_outputs]
        };

        let mut trees = if continuing { self.trees.clone() } else { Vec::new() };
        let mut margins = initial_margins(&x, options.base_margin, &base_scores, &trees, &self.missing);

        let mut evals = Vec::with_capacity(options.eval_sets.len());
        for (i, set) in options.eval_sets.iter().enumerate() {
            let e_rows = set.data.rows;
            if e_rows == 0 {
                return Err(BoostError::DataShape(format!("validation_{} has no rows", i)));
            }
            if set.data.cols != cols {
                return Err(BoostError::DataShape(format!(
                    "validation_{} has {} features, expected {}",
                    i, set.data.cols, cols
                )));
            }
            check_len(&format!("validation_{} labels", i), Some(set.y.len()), e_rows * y.cols)?;
            self.objective
                .check_labels(&RowMajorMatrix::new(set.y.to_vec(), e_rows, y.cols), n_outputs)?;
            check_len(
                &format!("validation_{} sample_weight", i),
                set.sample_weight.map(|w| w.len()),
                e_rows,
            )?;
            check_len(
                &format!("validation_{} base_margin", i),
                set.base_margin.map(|m| m.len()),
                e_rows * n_outputs,
            )?;
            check_len(&format!("validation_{} qid", i), set.qid.map(|q| q.len()), e_rows)?;
            evals.push(EvalState {
                set,
                margins: initial_margins(set.data, set.base_margin, &base_scores, &trees, &self.missing),
                weights: set.sample_weight.map_or_else(|| vec![1.0; e_rows], |w| w.to_vec()),
                group_ptr: set.qid.map(group_ptr_from_qid).transpose()?,
            });
        }

        let metric = self.eval_metric.unwrap_or_else(|| self.objective.default_metric());
        let (metric_fn, maximize) = metric_callables(&metric);
        let mut evals_result = EvalsResult::new();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut sampler = row_sampler(SampleMethod::from_subsample(self.subsample), self.subsample);
        let splitter = HistogramSplitter::new(
            GainParams {
                reg_alpha: self.reg_alpha,
                reg_lambda: self.reg_lambda,
                gamma: self.gamma,
                min_child_weight: self.min_child_weight,
                max_cat_to_onehot: self.max_cat_to_onehot,
            },
            self.eta / self.num_parallel_tree as f64,
        );
        let limits = GrowthLimits {
            max_depth: self.max_depth,
            max_leaves: self.max_leaves,
            grow_policy: self.grow_policy,
        };
        let all_index: Vec<usize> = (0..rows).collect();
        let n_prev = trees.len();
        let per_round = self.trees_per_round(n_outputs);

        let mut warnings: Vec<BoostWarning> = Vec::new();
        let mut best: Option<(usize, f64)> = None;

        for round in 0..self.n_estimators {
            if let Some(t) = options.timeout {
                if start.elapsed().as_secs_f32() > t {
                    warn!("Reached the timeout of {} seconds after {} rounds.", t, round);
                    break;
                }
            }

            let (grad, warning) =
                self.objective
                    .gradients(&y, &margins, options.sample_weight, group_ptr.as_deref(), n_outputs)?;
            if let Some(w) = warning {
                if warnings.is_empty() {
                    warn!("{}", w);
                    warnings.push(w);
                }
            }

            if self.tree_method == TreeMethod::Approx {
                let hessian = grad.row_hessian_totals();
                binned = bin_matrix(&x, Some(&hessian), self.max_bin, self.missing, cat_index)?;
            }
            let bdata = Matrix::new(&binned.binned_data, rows, cols);
            let grow = GrowContext {
                data: &bdata,
                cuts: &binned.cuts,
                index: &all_index,
                splitter: &splitter,
                limits: &limits,
                cat_index,
                pool: &ctx.pool,
            };
            let new_trees = self.grow_round(&grow, &grad, n_outputs, sampler.as_mut(), &mut rng);

            for tree in &new_trees {
                tree.update_margins(&x, &mut margins, n_outputs, &self.missing);
                for e in evals.iter_mut() {
                    tree.update_margins(e.set.data, &mut e.margins, n_outputs, &self.missing);
                }
            }
            trees.extend(new_trees);

            let mut last_value = None;
            for (i, e) in evals.iter().enumerate() {
                let mctx = MetricContext {
                    n_outputs,
                    group_ptr: e.group_ptr.as_deref(),
                };
                let v = metric_fn(e.set.y, &e.margins, &e.weights, &mctx);
                evals_result
                    .entry(format!("validation_{}", i))
                    .or_default()
                    .entry(metric.to_string())
                    .or_default()
                    .push(v);
                last_value = Some(v);
            }

            if self.log_iterations > 0 && (round + 1) % self.log_iterations == 0 {
                let (depth, leaves) = trees.last().map_or((0, 0), |t| (t.depth, t.n_leaves));
                match last_value {
                    Some(v) => info!(
                        "round {}, trees {}, depth {}, leaves {}, {} {}",
                        round, trees.len(), depth, leaves, metric, v
                    ),
                    None => info!("round {}, trees {}, depth {}, leaves {}", round, trees.len(), depth, leaves),
                }
            }

            if let (Some(stopping_rounds), Some(v)) = (self.early_stopping_rounds, last_value) {
                match best {
                    Some((best_round, b)) if !is_comparison_better(b, v, maximize) => {
                        if round - best_round >= stopping_rounds {
                            warn!(
                                "Stopping early at round {}, the best round was {} with {} {}.",
                                round, best_round, metric, b
                            );
                            break;
                        }
                    }
                    _ => best = Some((round, v)),
                }
            }
        }

        let best_iteration = match (self.early_stopping_rounds, best) {
            (Some(_), Some((best_round, _))) => {
                trees.truncate(n_prev + (best_round + 1) * per_round);
                Some(best_round)
            }
            _ => None,
        };

        Ok(Session {
            trees,
            base_scores,
            n_outputs,
            best_iteration,
            feature_types: ftypes,
            cuts: binned.cuts,
            evals_result,
            warnings,
        })
    }

    /// Trees of one round, ordered by output and then by parallel tree.
    fn grow_round(
        &self,
        grow: &GrowContext,
        grad: &GradientPairs,
        n_outputs: usize,
        sampler: &mut dyn Sampler,
        rng: &mut StdRng,
    ) -> Vec<Tree> {
        let mut trees = Vec::with_capacity(self.trees_per_round(n_outputs));
        match self.multi_strategy {
            MultiStrategy::OneOutputPerTree => {
                for k in 0..n_outputs {
                    let selected;
                    let g = if n_outputs == 1 {
                        grad
                    } else {
                        selected = grad.select_output(k);
                        &selected
                    };
                    for _ in 0..self.num_parallel_tree {
                        trees.push(self.grow_tree(Tree::new(1, k), grow, g, sampler, rng));
                    }
                }
            }
            MultiStrategy::MultiOutputTree => {
                for _ in 0..self.num_parallel_tree {
                    trees.push(self.grow_tree(Tree::new(n_outputs, 0), grow, grad, sampler, rng));
                }
            }
        }
        trees
    }

    fn grow_tree(
        &self,
        mut tree: Tree,
        grow: &GrowContext,
        grad: &GradientPairs,
        sampler: &mut dyn Sampler,
        rng: &mut StdRng,
    ) -> Tree {
        let (index, _) = sampler.sample(rng, grow.index);
        let col_index = sample_columns(rng, grow.data.cols, self.colsample_bytree);
        tree.fit(
            grow.data,
            grow.cuts,
            index,
            &col_index,
            grad,
            grow.splitter,
            grow.limits,
            grow.cat_index,
            grow.pool,
        );
        tree
    }

    /// Metric history of the last session.
    pub fn evals_result(&self) -> &EvalsResult {
        &self.evals_result
    }

    /// Non-fatal conditions raised by the last session.
    pub fn warnings(&self) -> &[BoostWarning] {
        &self.warnings
    }

    /// `q` for numeric and `c` for categorical features, as seen by the last session.
    pub fn feature_types(&self) -> Vec<String> {
        self.feature_types.iter().map(|f| f.to_string()).collect()
    }

    /// Save a booster as a json object to a file.
    ///
    /// * `path` - Path to save booster.
    pub fn save_booster(&self, path: &str) -> Result<(), BoostError> {
        let model = self.json_dump()?;
        match fs::write(path, model) {
            Err(e) => Err(BoostError::UnableToWrite(e.to_string())),
            Ok(_) => Ok(()),
        }
    }

    /// Dump a booster as a json object
    pub fn json_dump(&self) -> Result<String, BoostError> {
        match serde_json::to_string(self) {
            Ok(s) => Ok(s),
            Err(e) => Err(BoostError::UnableToWrite(e.to_string())),
        }
    }

    /// Serialized model as bytes, holding the same document as [`Self::json_dump`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, BoostError> {
        serde_json::to_vec(self).map_err(|e| BoostError::UnableToWrite(e.to_string()))
    }

    /// Load a booster from Json string
    ///
    /// * `json_str` - String object, which can be serialized to json.
    pub fn from_json(json_str: &str) -> Result<Self, BoostError> {
        let model = serde_json::from_str::<GradientBooster>(json_str);
        match model {
            Ok(m) => Ok(m),
            Err(e) => Err(BoostError::UnableToRead(e.to_string())),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BoostError> {
        serde_json::from_slice::<GradientBooster>(bytes).map_err(|e| BoostError::UnableToRead(e.to_string()))
    }

    /// Load a booster from a path to a json booster object.
    ///
    /// * `path` - Path to load booster from.
    pub fn load_booster(path: &str) -> Result<Self, BoostError> {
        let json_str = match fs::read_to_string(path) {
            Ok(s) => Ok(s),
            Err(e) => Err(BoostError::UnableToRead(e.to_string())),
        }?;
        Self::from_json(&json_str)
    }

    // Set methods for paramters

    /// Set the objective on the booster. A custom objective loaded from a
    /// saved model has to be set again before training continues.
    pub fn set_objective<O: Into<Objective>>(mut self, objective: O) -> Self {
        self.objective = objective.into();
        self
    }

    pub fn set_tree_method(mut self, tree_method: TreeMethod) -> Self {
        self.tree_method = tree_method;
        self
    }

    pub fn set_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Use a fixed device inventory instead of detecting it at fit time.
    pub fn set_device_inventory(mut self, inventory: DeviceInventory) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn set_multi_strategy(mut self, multi_strategy: MultiStrategy) -> Self {
        self.multi_strategy = multi_strategy;
        self
    }

    pub fn set_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn set_eta(mut self, eta: f64) -> Self {
        self.eta = eta;
        self
    }

    pub fn set_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn set_max_leaves(mut self, max_leaves: usize) -> Self {
        self.max_leaves = max_leaves;
        self
    }

    pub fn set_grow_policy(mut self, grow_policy: GrowPolicy) -> Self {
        self.grow_policy = grow_policy;
        self
    }

    pub fn set_reg_alpha(mut self, reg_alpha: f64) -> Self {
        self.reg_alpha = reg_alpha;
        self
    }

    pub fn set_reg_lambda(mut self, reg_lambda: f64) -> Self {
        self.reg_lambda = reg_lambda;
        self
    }

    pub fn set_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn set_min_child_weight(mut self, min_child_weight: f64) -> Self {
        self.min_child_weight = min_child_weight;
        self
    }

    /// Set the number of bins on the booster.
    /// * `max_bin` - Number of bins to calculate to partition the data. Setting this to
    ///   a smaller number, will result in faster training time, while potentially sacrificing
    ///   accuracy. If there are more bins, than unique values in a column, all unique values
    ///   will be used.
    pub fn set_max_bin(mut self, max_bin: u16) -> Self {
        self.max_bin = max_bin;
        self
    }

    pub fn set_max_cat_to_onehot(mut self, max_cat_to_onehot: usize) -> Self {
        self.max_cat_to_onehot = max_cat_to_onehot;
        self
    }

    pub fn set_subsample(mut self, subsample: f32) -> Self {
        self.subsample = subsample;
        self
    }

    pub fn set_colsample_bytree(mut self, colsample_bytree: f64) -> Self {
        self.colsample_bytree = colsample_bytree;
        self
    }

    pub fn set_num_parallel_tree(mut self, num_parallel_tree: usize) -> Self {
        self.num_parallel_tree = num_parallel_tree;
        self
    }

    /// Set the base_score on the booster.
    /// * `base_score` - The base score of the booster, NaN to estimate it from the labels.
    pub fn set_base_score(mut self, base_score: f64) -> Self {
        self.base_score = base_score;
        self
    }

    /// Set missing value of the booster
    /// * `missing` - Float value to consider as missing.
    pub fn set_missing(mut self, missing: f64) -> Self {
        self.missing = missing;
        self
    }

    /// Set the number of threads on the booster.
    /// * `num_threads` - Set the number of threads to be used during training.
    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set the seed on the booster.
    /// * `seed` - Integer value used to see any randomness used in the algorithm.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn set_early_stopping_rounds(mut self, early_stopping_rounds: Option<usize>) -> Self {
        self.early_stopping_rounds = early_stopping_rounds;
        self
    }

    pub fn set_eval_metric(mut self, eval_metric: Option<Metric>) -> Self {
        self.eval_metric = eval_metric;
        self
    }

    /// Set the log iterations on the booster.
    /// * `log_iterations` - The number of log iterations of the booster.
    pub fn set_log_iterations(mut self, log_iterations: usize) -> Self {
        self.log_iterations = log_iterations;
        self
    }

    /// Insert metadata
    /// * `key` - String value for the metadata key.
    /// * `value` - value to assign to the metadata key.
    pub fn insert_metadata(&mut self, key: String, value: String) {
        self.metadata.insert(key, value);
    }

    /// Get Metadata
    /// * `key` - Get the associated value for the metadata key.
    pub fn get_metadata(&self, key: &String) -> Option<String> {
        self.metadata.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::GradientArray;
    use crate::metric::root_mean_squared_error;
    use crate::objective::{CustomObjective, Link};
    use crate::testing::{make_binary, make_blobs, make_ranking, make_regression};
    use crate::utils::softmax;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn one_gpu(booster: GradientBooster) -> GradientBooster {
        booster.set_device_inventory(DeviceInventory::new(1)).set_num_threads(Some(2))
    }

    fn regressor(n_estimators: usize) -> GradientBooster {
        one_gpu(GradientBooster::default().set_n_estimators(n_estimators))
    }

    fn softprob_rows(yhat: &[f64], y: &RowMajorMatrix<f64>) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let k = yhat.len() / y.rows;
        let mut p = vec![0.0; k];
        let mut grad = Vec::with_capacity(y.rows);
        let mut hess = Vec::with_capacity(y.rows);
        for i in 0..y.rows {
            softmax(&yhat[(i * k)..((i + 1) * k)], &mut p);
            let label = y.data[i] as usize;
            grad.push((0..k).map(|c| p[c] - if c == label { 1.0 } else { 0.0 }).collect());
            hess.push((0..k).map(|c| (2.0 * p[c] * (1.0 - p[c])).max(1e-6)).collect());
        }
        (grad, hess)
    }

    fn custom_softprob<F>(f: F) -> CustomObjective
    where
        F: Fn(Vec<Vec<f64>>, Vec<Vec<f64>>) -> (GradientArray, GradientArray) + Send + Sync + 'static,
    {
        CustomObjective::new("softprob", 3, Link::Softmax, move |yhat, y| {
            let (g, h) = softprob_rows(yhat, y);
            f(g, h)
        })
    }

    fn flatten(v: Vec<Vec<f64>>) -> Vec<f64> {
        v.into_iter().flatten().collect()
    }

    fn column_major(v: Vec<Vec<f64>>) -> GradientArray {
        let rows = v.len();
        let cols = v[0].len();
        let data = (0..cols).flat_map(|j| v.iter().map(move |r| r[j])).collect();
        GradientArray::ColumnMajor { data, rows, cols }
    }

    #[test]
    fn test_booster_fit_binary() {
        let (x, y) = make_binary(2000, 4, 0);
        let (x_test, y_test) = make_binary(1000, 4, 1);
        let data = Matrix::new(&x, 2000, 4);
        let test = Matrix::new(&x_test, 1000, 4);
        let mut booster = regressor(50).set_objective(BuiltinObjective::LogLoss);
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        let proba = booster.predict_proba(&test).unwrap();
        let errors = proba
            .iter()
            .zip(y_test.iter())
            .filter(|(p, t)| (**p > 0.5) != (**t == 1.0))
            .count();
        assert!((errors as f64) / 1000.0 < 0.1);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_batch_equals_inplace() {
        let (mut x, y) = make_regression(500, 5, 0.1, 0);
        for i in (0..x.len()).step_by(17) {
            x[i] = f64::NAN;
        }
        let data = Matrix::new(&x, 500, 5);
        let row_major = data.to_row_major();
        let data_rm = Matrix::new_row_major(&row_major.data, 500, 5);
        let mut booster = regressor(20);
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        let batch = booster.predict(&data).unwrap();
        assert_eq!(batch, booster.inplace_predict(&data).unwrap());
        assert_eq!(batch, booster.inplace_predict(&data_rm).unwrap());
        assert_eq!(batch, booster.predict(&data_rm).unwrap());

        // Training on the row-major view gives the same model.
        let mut booster_rm = regressor(20);
        booster_rm.fit(&data_rm, &y, FitOptions::default()).unwrap();
        assert_eq!(booster.trees, booster_rm.trees);
    }

    #[test]
    fn test_categorical_inplace() {
        let x = vec![0.0, 1.0, 2.0];
        let y = vec![1.0, 2.0, 3.0];
        let data = Matrix::new(&x, 3, 1);
        let mut booster = regressor(64);
        let options = FitOptions {
            categorical_features: Some(HashSet::from([0])),
            ..Default::default()
        };
        booster.fit(&data, &y, options).unwrap();
        assert_eq!(booster.feature_types(), vec!["c".to_string()]);
        let preds = booster.inplace_predict(&data).unwrap();
        assert_eq!(preds, booster.predict(&Matrix::new_row_major(&x, 3, 1)).unwrap());
        for (p, t) in preds.iter().zip(y.iter()) {
            assert_relative_eq!(*p, *t, epsilon = 1e-2);
        }
        // Codes never seen in training go right.
        let unseen = vec![7.0];
        let p = booster.inplace_predict(&Matrix::new(&unseen, 1, 1)).unwrap();
        assert!(p[0].is_finite());
    }

    #[test]
    fn test_unsupported_configurations() {
        let (x, y) = make_regression(100, 3, 0.1, 0);
        let data = Matrix::new(&x, 100, 3);
        let mut booster = regressor(5)
            .set_multi_strategy(MultiStrategy::MultiOutputTree)
            .set_tree_method(TreeMethod::Approx)
            .set_device(Device::Cuda(0));
        match booster.fit(&data, &y, FitOptions::default()) {
            Err(e @ BoostError::StrategyUnsupported(_)) => {
                assert!(e.to_string().starts_with("Only the hist tree method"))
            }
            _ => panic!("expected an unsupported strategy"),
        }
        let mut booster = booster.set_tree_method(TreeMethod::Hist);
        match booster.fit(&data, &y, FitOptions::default()) {
            Err(e @ BoostError::DeviceUnsupported(_)) => assert!(e.to_string().starts_with("GPU is not yet")),
            _ => panic!("expected an unsupported device"),
        }
        let mut booster = booster.set_device(Device::Cpu);
        assert!(booster.fit(&data, &y, FitOptions::default()).is_ok());
    }

    #[test]
    fn test_device_ordinal() {
        let (x, y) = make_regression(400, 4, 0.2, 3);
        let data = Matrix::new(&x, 400, 4);
        let mut booster = regressor(10).set_device("cuda:9999".parse().unwrap());
        let r = booster.fit(&data, &y, FitOptions::default());
        assert!(matches!(
            r,
            Err(BoostError::InvalidDeviceOrdinal {
                ordinal: 9999,
                available: 1
            })
        ));
        assert!(booster.trees.is_empty());

        let w: Vec<f64> = (0..400).map(|i| 1.0 + (i % 3) as f64).collect();
        let mut eval = EvalSet::new(&data, &y);
        eval.sample_weight = Some(&w);
        let mut booster = booster.set_device(Device::Cuda(0)).set_eval_metric(Some(Metric::RootMeanSquaredError));
        booster
            .fit(
                &data,
                &y,
                FitOptions {
                    sample_weight: Some(&w),
                    eval_sets: vec![eval],
                    ..Default::default()
                },
            )
            .unwrap();
        let history = &booster.evals_result()["validation_0"]["rmse"];
        assert_eq!(history.len(), 10);
        for pair in history.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9);
        }
    }

    #[test]
    fn test_custom_objective_matches_builtin() {
        let (x, y) = make_blobs(300, 4, 3, 0);
        let data = Matrix::new(&x, 300, 4);
        for strategy in [MultiStrategy::OneOutputPerTree, MultiStrategy::MultiOutputTree] {
            let mut builtin = regressor(10)
                .set_objective(BuiltinObjective::Softmax)
                .set_multi_strategy(strategy);
            builtin.fit(&data, &y, FitOptions::default()).unwrap();
            let expected = builtin.predict_proba(&data).unwrap();

            let objectives = vec![
                custom_softprob(|g, h| (GradientArray::Rows(g), GradientArray::Rows(h))),
                custom_softprob(|g, h| (column_major(g), column_major(h))),
                custom_softprob(|g, h| (GradientArray::Flat(flatten(g)), GradientArray::Flat(flatten(h)))),
            ];
            for (i, objective) in objectives.into_iter().enumerate() {
                let mut custom = regressor(10).set_objective(objective).set_multi_strategy(strategy);
                custom.fit(&data, &y, FitOptions::default()).unwrap();
                assert_eq!(custom.trees.len(), builtin.trees.len());
                for (a, b) in custom.predict_proba(&data).unwrap().iter().zip(expected.iter()) {
                    assert_relative_eq!(*a, *b, max_relative = 1e-4);
                }
                if i == 2 {
                    assert_eq!(
                        custom.warnings(),
                        &[BoostWarning::LegacyShape {
                            n_rows: 300,
                            n_outputs: 3
                        }]
                    );
                } else {
                    assert!(custom.warnings().is_empty());
                }
            }
        }
    }

    #[test]
    fn test_session_runs_on_context_pool() {
        let (x, y) = make_blobs(90, 2, 3, 3);
        let data = Matrix::new(&x, 90, 2);
        let threads = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&threads);
        let objective = CustomObjective::new("softprob", 3, Link::Softmax, move |yhat, y| {
            let name = std::thread::current().name().map(|n| n.to_string());
            if let Ok(mut names) = seen.lock() {
                names.push(name);
            }
            let (g, h) = softprob_rows(yhat, y);
            (GradientArray::Rows(g), GradientArray::Rows(h))
        });
        let mut booster = regressor(3).set_objective(objective);
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        let names = threads.lock().unwrap();
        assert_eq!(names.len(), 3);
        for name in names.iter() {
            assert!(name.as_deref().unwrap_or_default().starts_with("histgbm-cpu-"));
        }
    }

    #[test]
    fn test_custom_objective_shape_errors() {
        let (x, y) = make_blobs(60, 2, 3, 1);
        let data = Matrix::new(&x, 60, 2);
        let fit = |objective: CustomObjective| {
            let mut booster = regressor(2).set_objective(objective);
            let r = booster.fit(&data, &y, FitOptions::default());
            assert!(booster.trees.is_empty());
            r
        };

        let ragged = custom_softprob(|mut g, h| {
            g[5].pop();
            (GradientArray::Rows(g), GradientArray::Rows(h))
        });
        assert!(matches!(fit(ragged), Err(BoostError::ShapeMismatch(_))));

        let mismatched = custom_softprob(|mut g, h| {
            g.pop();
            (GradientArray::Rows(g), GradientArray::Rows(h))
        });
        match fit(mismatched) {
            Err(BoostError::ShapeMismatch(msg)) => {
                assert!(msg.starts_with("Mismatched shape between the gradient and hessian"))
            }
            _ => panic!("expected a shape mismatch"),
        }

        let short = custom_softprob(|mut g, mut h| {
            g.pop();
            h.pop();
            (GradientArray::Rows(g), GradientArray::Rows(h))
        });
        match fit(short) {
            Err(BoostError::ShapeMismatch(msg)) => {
                assert!(msg.starts_with("Mismatched size between the gradient and the number of samples"))
            }
            _ => panic!("expected a size mismatch"),
        }

        let narrow = custom_softprob(|g, h| {
            let cut = |v: Vec<Vec<f64>>| -> Vec<Vec<f64>> { v.into_iter().map(|r| r[..2].to_vec()).collect() };
            (GradientArray::Rows(cut(g)), GradientArray::Rows(cut(h)))
        });
        match fit(narrow) {
            Err(e @ BoostError::OutputDimension { .. }) => {
                assert!(e.to_string().contains("should be equal to the number of targets/classes"))
            }
            _ => panic!("expected an output dimension error"),
        }

        let bad_flat = custom_softprob(|g, h| {
            let mut g = flatten(g);
            let mut h = flatten(h);
            g.pop();
            h.pop();
            (GradientArray::Flat(g), GradientArray::Flat(h))
        });
        assert!(matches!(fit(bad_flat), Err(BoostError::ShapeMismatch(_))));
    }

    #[test]
    fn test_save_load() {
        let (x, y) = make_regression(300, 4, 0.1, 5);
        let data = Matrix::new(&x, 300, 4);
        let mut booster = regressor(15).set_missing(-999.0);
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        booster.insert_metadata("owner".to_string(), "forecasting".to_string());
        let preds = booster.predict(&data).unwrap();

        let loaded = GradientBooster::from_json(&booster.json_dump().unwrap()).unwrap();
        assert_eq!(loaded.predict(&data).unwrap(), preds);
        assert_eq!(loaded.get_metadata(&"owner".to_string()), Some("forecasting".to_string()));
        assert_eq!(loaded.missing, -999.0);
        assert!(loaded.base_score.is_nan());

        let from_bytes = GradientBooster::from_bytes(&booster.to_bytes().unwrap()).unwrap();
        assert_eq!(from_bytes.inplace_predict(&data).unwrap(), preds);

        let path = std::env::temp_dir().join("histgbm_test_save_load.json");
        let path = path.to_string_lossy().to_string();
        booster.save_booster(&path).unwrap();
        let from_file = GradientBooster::load_booster(&path).unwrap();
        assert_eq!(from_file.predict(&data).unwrap(), preds);
        let _ = fs::remove_file(&path);
        assert!(matches!(
            GradientBooster::from_json("{"),
            Err(BoostError::UnableToRead(_))
        ));
    }

    #[test]
    fn test_invalid_classes() {
        let x = vec![0.1, 0.5, 0.9];
        let y = vec![1.0, 2.0, 3.0];
        let data = Matrix::new(&x, 3, 1);
        let mut booster = regressor(3).set_objective(BuiltinObjective::Softmax);
        match booster.fit(&data, &y, FitOptions::default()) {
            Err(e @ BoostError::InvalidClasses(_, _)) => assert!(e.to_string().starts_with("Invalid classes")),
            _ => panic!("expected invalid classes"),
        }
    }

    #[test]
    fn test_boost_from_prediction() {
        let (x, y) = make_regression(400, 4, 0.2, 9);
        let data = Matrix::new(&x, 400, 4);
        for method in [TreeMethod::Hist, TreeMethod::Approx] {
            let mut full = regressor(8).set_tree_method(method);
            full.fit(&data, &y, FitOptions::default()).unwrap();

            let mut first = regressor(4).set_tree_method(method);
            first.fit(&data, &y, FitOptions::default()).unwrap();
            let margin = first.predict(&data).unwrap();

            let mut second = regressor(4).set_tree_method(method);
            second
                .fit(
                    &data,
                    &y,
                    FitOptions {
                        base_margin: Some(&margin),
                        ..Default::default()
                    },
                )
                .unwrap();
            let stacked = second.predict_with_base_margin(&data, &margin).unwrap();
            for (a, b) in stacked.iter().zip(full.predict(&data).unwrap().iter()) {
                assert_relative_eq!(*a, *b, max_relative = 1e-6, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_boost_from_prediction_multi_class() {
        let (x, y) = make_blobs(300, 3, 3, 12);
        let data = Matrix::new(&x, 300, 3);
        for method in [TreeMethod::Hist, TreeMethod::Approx] {
            let softmax = || regressor(4).set_objective(BuiltinObjective::Softmax).set_tree_method(method);
            let mut full = softmax().set_n_estimators(8);
            full.fit(&data, &y, FitOptions::default()).unwrap();

            let mut first = softmax();
            first.fit(&data, &y, FitOptions::default()).unwrap();
            let margin = first.predict(&data).unwrap();
            assert_eq!(margin.len(), 900);

            let mut second = softmax();
            second
                .fit(
                    &data,
                    &y,
                    FitOptions {
                        base_margin: Some(&margin),
                        ..Default::default()
                    },
                )
                .unwrap();
            let stacked = second.predict_with_base_margin(&data, &margin).unwrap();
            for (a, b) in stacked.iter().zip(full.predict(&data).unwrap().iter()) {
                assert_relative_eq!(*a, *b, max_relative = 1e-6, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_single_class_logistic_round_trip() {
        let (x, _) = make_binary(50, 2, 4);
        let data = Matrix::new(&x, 50, 2);
        let y = vec![1.0; 50];
        let mut booster = regressor(3).set_objective(BuiltinObjective::LogLoss);
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        assert!(booster.base_scores[0].is_finite());
        let loaded = GradientBooster::from_json(&booster.json_dump().unwrap()).unwrap();
        assert_eq!(loaded.predict(&data).unwrap(), booster.predict(&data).unwrap());
        assert!(loaded.predict_proba(&data).unwrap().iter().all(|p| *p > 0.99));
    }

    #[test]
    fn test_eval_set_validation() {
        let (x, y) = make_blobs(90, 2, 3, 6);
        let data = Matrix::new(&x, 90, 2);
        let mut booster = regressor(3).set_objective(BuiltinObjective::Softmax);
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        let trained = booster.trees.len();

        let mut y_eval = y.clone();
        y_eval[0] = 5.0;
        let r = booster.fit(
            &data,
            &y,
            FitOptions {
                eval_sets: vec![EvalSet::new(&data, &y_eval)],
                ..Default::default()
            },
        );
        match r {
            Err(e @ BoostError::InvalidClasses(_, _)) => assert!(e.to_string().contains("got [0 1 2 5]")),
            _ => panic!("expected invalid evaluation classes"),
        }
        assert_eq!(booster.trees.len(), trained);

        let empty: Vec<f64> = Vec::new();
        let empty_data = Matrix::new(&empty, 0, 2);
        let mut binary = regressor(3)
            .set_objective(BuiltinObjective::LogLoss)
            .set_eval_metric(Some(Metric::AUC));
        let (xb, yb) = make_binary(60, 2, 6);
        let r = binary.fit(
            &Matrix::new(&xb, 60, 2),
            &yb,
            FitOptions {
                eval_sets: vec![EvalSet::new(&empty_data, &empty)],
                ..Default::default()
            },
        );
        assert!(matches!(r, Err(BoostError::DataShape(_))));
        assert!(binary.trees.is_empty());
    }

    #[test]
    fn test_continuation() {
        let (x, y) = make_regression(300, 3, 0.1, 2);
        let data = Matrix::new(&x, 300, 3);
        let mut full = regressor(8);
        full.fit(&data, &y, FitOptions::default()).unwrap();

        let mut booster = regressor(4);
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        let resume = || FitOptions {
            reset: Some(false),
            ..Default::default()
        };
        booster.fit(&data, &y, resume()).unwrap();
        assert_eq!(booster.trees.len(), 8);
        assert_eq!(booster.predict(&data).unwrap(), full.predict(&data).unwrap());

        // Feature layout and device are fixed for the session.
        let r = booster.fit(
            &data,
            &y,
            FitOptions {
                reset: Some(false),
                categorical_features: Some(HashSet::from([1])),
                ..Default::default()
            },
        );
        assert!(matches!(r, Err(BoostError::FeatureTypeMismatch(_))));
        let mut booster = booster.set_device(Device::Cuda(0));
        match booster.fit(&data, &y, resume()) {
            Err(e @ BoostError::DeviceChanged(_, _)) => assert!(e.to_string().contains("from cpu to cuda:0")),
            _ => panic!("expected a device change error"),
        }
        assert_eq!(booster.trees.len(), 8);
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        assert_eq!(booster.trees.len(), 4);
    }

    #[test]
    fn test_incompatible_bins() {
        let x = vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        let y = vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0];
        let data = Matrix::new(&x, 6, 1);
        let cats = || Some(HashSet::from([0]));
        let mut booster = regressor(3);
        booster
            .fit(
                &data,
                &y,
                FitOptions {
                    categorical_features: cats(),
                    ..Default::default()
                },
            )
            .unwrap();
        let x_new = vec![0.0, 1.0, 5.0, 0.0, 1.0, 2.0];
        let r = booster.fit(
            &Matrix::new(&x_new, 6, 1),
            &y,
            FitOptions {
                categorical_features: cats(),
                reset: Some(false),
                ..Default::default()
            },
        );
        assert!(matches!(r, Err(BoostError::IncompatibleBins(0, _))));
        assert_eq!(booster.trees.len(), 3);
    }

    #[test]
    fn test_ranking() {
        let (x, y, qid) = make_ranking(40, 10, 3, 4);
        let data = Matrix::new(&x, 400, 3);
        let mut booster = regressor(30)
            .set_objective(BuiltinObjective::PairwiseRank)
            .set_max_depth(3);
        assert!(matches!(
            booster.fit(&data, &y, FitOptions::default()),
            Err(BoostError::DataShape(_))
        ));
        let mut eval = EvalSet::new(&data, &y);
        eval.qid = Some(&qid);
        booster
            .fit(
                &data,
                &y,
                FitOptions {
                    qid: Some(&qid),
                    eval_sets: vec![eval],
                    ..Default::default()
                },
            )
            .unwrap();
        let history = &booster.evals_result()["validation_0"]["ndcg"];
        let last = history[history.len() - 1];
        assert!(last >= history[0]);
        assert!(last > 0.85);
    }

    #[test]
    fn test_random_forest() {
        let (x, y) = make_regression(500, 5, 0.1, 6);
        let data = Matrix::new(&x, 500, 5);
        let mut forest = one_gpu(GradientBooster::random_forest(8).set_seed(1));
        forest.fit(&data, &y, FitOptions::default()).unwrap();
        assert_eq!(forest.trees.len(), 8);
        let mean = y.iter().sum::<f64>() / 500.0;
        let ones = vec![1.0; 500];
        let baseline = root_mean_squared_error(&y, &vec![mean; 500], &ones, 1);
        let rmse = root_mean_squared_error(&y, &forest.predict(&data).unwrap(), &ones, 1);
        assert!(rmse < 0.6 * baseline);

        // Same seed, same forest.
        let mut again = one_gpu(GradientBooster::random_forest(8).set_seed(1));
        again.fit(&data, &y, FitOptions::default()).unwrap();
        assert_eq!(again.trees, forest.trees);
    }

    #[test]
    fn test_atomic_on_failure() {
        let (x, y) = make_blobs(90, 2, 3, 2);
        let data = Matrix::new(&x, 90, 2);
        let mut booster = regressor(10).set_objective(BuiltinObjective::Softmax);
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        let trees = booster.trees.clone();
        let base_scores = booster.base_scores.clone();

        // Valid output for three rounds, then a malformed one.
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let failing = custom_softprob(move |mut g, h| {
            if counter.fetch_add(1, Ordering::SeqCst) >= 3 {
                g.pop();
            }
            (GradientArray::Rows(g), GradientArray::Rows(h))
        });
        let mut booster = booster.set_objective(failing);
        let r = booster.fit(&data, &y, FitOptions::default());
        assert!(matches!(r, Err(BoostError::ShapeMismatch(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(booster.trees, trees);
        assert_eq!(booster.base_scores, base_scores);
    }

    #[test]
    fn test_missing_custom_objective_after_load() {
        let (x, y) = make_blobs(60, 2, 3, 3);
        let data = Matrix::new(&x, 60, 2);
        let mut booster =
            regressor(2).set_objective(custom_softprob(|g, h| (GradientArray::Rows(g), GradientArray::Rows(h))));
        booster.fit(&data, &y, FitOptions::default()).unwrap();
        let mut loaded = GradientBooster::from_json(&booster.json_dump().unwrap()).unwrap();
        assert_eq!(loaded.predict_proba(&data).unwrap(), booster.predict_proba(&data).unwrap());
        let r = loaded.fit(
            &data,
            &y,
            FitOptions {
                reset: Some(false),
                ..Default::default()
            },
        );
        assert!(matches!(r, Err(BoostError::MissingCustomObjective(_))));
    }

    #[test]
    fn test_early_stopping() {
        let (x, y) = make_regression(300, 4, 1.0, 7);
        let (x_eval, y_eval) = make_regression(300, 4, 1.0, 8);
        let data = Matrix::new(&x, 300, 4);
        let eval_data = Matrix::new(&x_eval, 300, 4);
        let mut booster = regressor(300).set_early_stopping_rounds(Some(5));
        booster
            .fit(
                &data,
                &y,
                FitOptions {
                    eval_sets: vec![EvalSet::new(&eval_data, &y_eval)],
                    ..Default::default()
                },
            )
            .unwrap();
        let best = booster.best_iteration.unwrap();
        let history = &booster.evals_result()["validation_0"]["rmse"];
        assert!(history.len() < 300);
        assert_eq!(history.len(), best + 1 + 5);
        assert_eq!(booster.trees.len(), best + 1);
        assert!(history.iter().all(|v| *v >= history[best]));
        let rmse = root_mean_squared_error(&y_eval, &booster.predict(&eval_data).unwrap(), &vec![1.0; 300], 1);
        assert_relative_eq!(rmse, history[best], max_relative = 1e-9);
    }

    #[test]
    fn test_multi_target_strategies() {
        let (x, y1) = make_regression(300, 3, 0.1, 10);
        let y: Vec<f64> = y1.iter().flat_map(|v| [*v, -2.0 * *v]).collect();
        let data = Matrix::new(&x, 300, 3);
        let ones = vec![1.0; 300];
        for strategy in [MultiStrategy::OneOutputPerTree, MultiStrategy::MultiOutputTree] {
            let mut booster = regressor(20).set_multi_strategy(strategy);
            booster.fit(&data, &y, FitOptions::default()).unwrap();
            assert_eq!(booster.n_outputs, 2);
            let expected_trees = if strategy == MultiStrategy::OneOutputPerTree { 40 } else { 20 };
            assert_eq!(booster.trees.len(), expected_trees);
            let preds = booster.predict(&data).unwrap();
            assert_eq!(preds.len(), 600);
            let constant: Vec<f64> = (0..300).flat_map(|_| booster.base_scores.clone()).collect();
            let baseline = root_mean_squared_error(&y, &constant, &ones, 2);
            assert!(root_mean_squared_error(&y, &preds, &ones, 2) < 0.5 * baseline);
        }
    }

    #[test]
    fn test_validate_parameters() {
        assert!(GradientBooster::new(
            Objective::default(),
            TreeMethod::Hist,
            Device::Cpu,
            MultiStrategy::OneOutputPerTree,
            10,
            0.0,
            6,
            0
        )
        .is_err());
        assert!(GradientBooster::default().set_subsample(1.5).validate_parameters().is_err());
        assert!(GradientBooster::default().set_max_depth(0).validate_parameters().is_err());
        assert!(GradientBooster::default().set_max_bin(u16::MAX).validate_parameters().is_err());
        assert!(GradientBooster::default().set_max_bin(1).validate_parameters().is_err());
        assert!(GradientBooster::default()
            .set_max_bin(MAX_BIN_LIMIT)
            .validate_parameters()
            .is_ok());
        assert!(GradientBooster::default()
            .set_max_depth(0)
            .set_grow_policy(GrowPolicy::LossGuide)
            .validate_parameters()
            .is_ok());
        assert_eq!("approx".parse::<TreeMethod>().unwrap(), TreeMethod::Approx);
        assert_eq!(
            "multi_output_tree".parse::<MultiStrategy>().unwrap(),
            MultiStrategy::MultiOutputTree
        );
        assert!("exact".parse::<TreeMethod>().is_err());
    }
}
