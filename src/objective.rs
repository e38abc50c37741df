//! Objective
//!
//! Builtin loss functions, user supplied objectives and the inverse links
//! that turn margins into predictions.
use crate::constants::{HESSIAN_EPS, LOGIT_EPS, RANK_HESSIAN_EPS};
use crate::data::RowMajorMatrix;
use crate::errors::{BoostError, BoostWarning};
use crate::gradient::{validate_custom_gradient, GradientArray, GradientPairs};
use crate::metric::Metric;
use crate::utils::{items_to_strings, sigmoid, softmax};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

type GradFn = fn(&RowMajorMatrix<f64>, &[f64], Option<&[f64]>, Option<&[usize]>, &mut GradientPairs);
type InitFn = fn(&RowMajorMatrix<f64>, Option<&[f64]>, usize) -> Vec<f64>;

/// Signature of a user supplied objective. It receives the current margins,
/// row-major `n_rows x n_outputs`, and the labels, and returns the gradient
/// and the hessian.
pub type CustomObjectiveFn = dyn Fn(&[f64], &RowMajorMatrix<f64>) -> (GradientArray, GradientArray) + Send + Sync;

/// Inverse link from margins to predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    Identity,
    Sigmoid,
    Softmax,
}

impl Link {
    /// Transform row-major margins with `n_outputs` values per row.
    pub fn apply(&self, margins: &[f64], n_outputs: usize) -> Vec<f64> {
        match self {
            Link::Identity => margins.to_vec(),
            Link::Sigmoid => margins.iter().map(|m| sigmoid(*m)).collect(),
            Link::Softmax => {
                let mut out = vec![0.0; margins.len()];
                out.par_chunks_mut(n_outputs.max(1))
                    .zip(margins.par_chunks(n_outputs.max(1)))
                    .for_each(|(o, m)| softmax(m, o));
                out
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinObjective {
    SquaredError,
    LogLoss,
    Softmax,
    PairwiseRank,
}

impl FromStr for BuiltinObjective {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reg:squarederror" => Ok(BuiltinObjective::SquaredError),
            "binary:logistic" => Ok(BuiltinObjective::LogLoss),
            "multi:softprob" => Ok(BuiltinObjective::Softmax),
            "rank:pairwise" => Ok(BuiltinObjective::PairwiseRank),
            _ => Err(BoostError::ParseString(
                s.to_string(),
                "Objective".to_string(),
                items_to_strings(vec![
                    "reg:squarederror",
                    "binary:logistic",
                    "multi:softprob",
                    "rank:pairwise",
                ]),
            )),
        }
    }
}

impl fmt::Display for BuiltinObjective {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BuiltinObjective::SquaredError => "reg:squarederror",
            BuiltinObjective::LogLoss => "binary:logistic",
            BuiltinObjective::Softmax => "multi:softprob",
            BuiltinObjective::PairwiseRank => "rank:pairwise",
        };
        write!(f, "{}", s)
    }
}

pub fn gradient_hessian_callables(objective: &BuiltinObjective) -> GradFn {
    match objective {
        BuiltinObjective::SquaredError => SquaredError::calc_grad_hess,
        BuiltinObjective::LogLoss => LogLoss::calc_grad_hess,
        BuiltinObjective::Softmax => Softmax::calc_grad_hess,
        BuiltinObjective::PairwiseRank => PairwiseRank::calc_grad_hess,
    }
}

pub fn calc_init_callables(objective: &BuiltinObjective) -> InitFn {
    match objective {
        BuiltinObjective::SquaredError => SquaredError::calc_init,
        BuiltinObjective::LogLoss => LogLoss::calc_init,
        BuiltinObjective::Softmax => Softmax::calc_init,
        BuiltinObjective::PairwiseRank => PairwiseRank::calc_init,
    }
}

/// Objective implemented by a user callable. The callable is not part of a
/// saved model and has to be attached again before training continues.
#[derive(Clone, Serialize, Deserialize)]
pub struct CustomObjective {
    pub name: String,
    /// Number of outputs, 0 means one per label column.
    pub n_outputs: usize,
    pub link: Link,
    #[serde(skip)]
    pub func: Option<Arc<CustomObjectiveFn>>,
}

impl CustomObjective {
    pub fn new<F>(name: &str, n_outputs: usize, link: Link, func: F) -> Self
    where
        F: Fn(&[f64], &RowMajorMatrix<f64>) -> (GradientArray, GradientArray) + Send + Sync + 'static,
    {
        CustomObjective {
            name: name.to_string(),
            n_outputs,
            link,
            func: Some(Arc::new(func)),
        }
    }
}

impl fmt::Debug for CustomObjective {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CustomObjective")
            .field("name", &self.name)
            .field("n_outputs", &self.n_outputs)
            .field("link", &self.link)
            .field("attached", &self.func.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Objective {
    Builtin(BuiltinObjective),
    Custom(CustomObjective),
}

impl Default for Objective {
    fn default() -> Self {
        Objective::Builtin(BuiltinObjective::SquaredError)
    }
}

impl From<BuiltinObjective> for Objective {
    fn from(o: BuiltinObjective) -> Self {
        Objective::Builtin(o)
    }
}

impl From<CustomObjective> for Objective {
    fn from(o: CustomObjective) -> Self {
        Objective::Custom(o)
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Objective::Builtin(b) => write!(f, "{}", b),
            Objective::Custom(c) => write!(f, "custom:{}", c.name),
        }
    }
}

fn format_classes(classes: &[f64]) -> String {
    let c: Vec<String> = classes.iter().map(|v| v.to_string()).collect();
    format!("[{}]", c.join(" "))
}

fn unique_labels(y: &RowMajorMatrix<f64>) -> Vec<f64> {
    let mut u = y.data.clone();
    u.sort_unstable_by(|a, b| a.total_cmp(b));
    u.dedup();
    u
}

fn single_label_column(y: &RowMajorMatrix<f64>, objective: &BuiltinObjective) -> Result<(), BoostError> {
    if y.cols != 1 {
        return Err(BoostError::DataShape(format!(
            "{} expects a single label column, got {}",
            objective, y.cols
        )));
    }
    Ok(())
}

impl Objective {
    /// Number of outputs the ensemble needs for these labels. Class labels
    /// are validated here.
    pub fn n_outputs(&self, y: &RowMajorMatrix<f64>) -> Result<usize, BoostError> {
        match self {
            Objective::Builtin(b) => match b {
                BuiltinObjective::SquaredError => Ok(y.cols),
                BuiltinObjective::PairwiseRank => {
                    single_label_column(y, b)?;
                    Ok(1)
                }
                BuiltinObjective::LogLoss => {
                    single_label_column(y, b)?;
                    let u = unique_labels(y);
                    if u.iter().any(|v| *v != 0.0 && *v != 1.0) {
                        return Err(BoostError::InvalidClasses(format_classes(&[0.0, 1.0]), format_classes(&u)));
                    }
                    Ok(1)
                }
                BuiltinObjective::Softmax => {
                    single_label_column(y, b)?;
                    let u = unique_labels(y);
                    let expected: Vec<f64> = (0..u.len()).map(|i| i as f64).collect();
                    if u != expected || u.len() < 2 {
                        return Err(BoostError::InvalidClasses(format_classes(&expected), format_classes(&u)));
                    }
                    Ok(u.len())
                }
            },
            Objective::Custom(c) => Ok(if c.n_outputs == 0 { y.cols } else { c.n_outputs }),
        }
    }

    /// Check held-out labels against the classes of a trained ensemble with
    /// `n_outputs` outputs.
    pub fn check_labels(&self, y: &RowMajorMatrix<f64>, n_outputs: usize) -> Result<(), BoostError> {
        let expected: Vec<f64> = match self {
            Objective::Builtin(BuiltinObjective::LogLoss) => vec![0.0, 1.0],
            Objective::Builtin(BuiltinObjective::Softmax) => (0..n_outputs).map(|k| k as f64).collect(),
            Objective::Custom(c) if c.link == Link::Softmax => (0..n_outputs).map(|k| k as f64).collect(),
            _ => return Ok(()),
        };
        let u = unique_labels(y);
        if u.iter().any(|v| !expected.contains(v)) {
            return Err(BoostError::InvalidClasses(format_classes(&expected), format_classes(&u)));
        }
        Ok(())
    }

    pub fn link(&self) -> Link {
        match self {
            Objective::Builtin(BuiltinObjective::SquaredError) | Objective::Builtin(BuiltinObjective::PairwiseRank) => {
                Link::Identity
            }
            Objective::Builtin(BuiltinObjective::LogLoss) => Link::Sigmoid,
            Objective::Builtin(BuiltinObjective::Softmax) => Link::Softmax,
            Objective::Custom(c) => c.link,
        }
    }

    pub fn default_metric(&self) -> Metric {
        match self {
            Objective::Builtin(BuiltinObjective::SquaredError) => SquaredError::default_metric(),
            Objective::Builtin(BuiltinObjective::LogLoss) => LogLoss::default_metric(),
            Objective::Builtin(BuiltinObjective::Softmax) => Softmax::default_metric(),
            Objective::Builtin(BuiltinObjective::PairwiseRank) => PairwiseRank::default_metric(),
            Objective::Custom(c) => match c.link {
                Link::Identity => Metric::RootMeanSquaredError,
                Link::Sigmoid => Metric::LogLoss,
                Link::Softmax => Metric::MultiLogLoss,
            },
        }
    }

    /// Starting margin of every output. Custom objectives start from zero.
    pub fn initial_scores(&self, y: &RowMajorMatrix<f64>, sample_weight: Option<&[f64]>, n_outputs: usize) -> Vec<f64> {
        match self {
            Objective::Builtin(b) => calc_init_callables(b)(y, sample_weight, n_outputs),
            Objective::Custom(_) => vec![0.0; n_outputs],
        }
    }

    /// Compute the gradient pairs at the current margins. The output of a
    /// custom objective is fully validated before it is returned.
    pub fn gradients(
        &self,
        y: &RowMajorMatrix<f64>,
        yhat: &[f64],
        sample_weight: Option<&[f64]>,
        group_ptr: Option<&[usize]>,
        n_outputs: usize,
    ) -> Result<(GradientPairs, Option<BoostWarning>), BoostError> {
        match self {
            Objective::Builtin(b) => {
                let mut grad = GradientPairs::zeros(y.rows, n_outputs);
                gradient_hessian_callables(b)(y, yhat, sample_weight, group_ptr, &mut grad);
                Ok((grad, None))
            }
            Objective::Custom(c) => {
                let func = c
                    .func
                    .as_ref()
                    .ok_or_else(|| BoostError::MissingCustomObjective(c.name.clone()))?;
                let (g, h) = func(yhat, y);
                validate_custom_gradient(g, h, y.rows, n_outputs)
            }
        }
    }
}

/// Split sorted query ids into group boundaries `[0, e1, ..., n_rows]`.
pub fn group_ptr_from_qid(qid: &[u64]) -> Result<Vec<usize>, BoostError> {
    let mut ptr = vec![0];
    for i in 1..qid.len() {
        if qid[i] < qid[i - 1] {
            return Err(BoostError::DataShape(format!(
                "query ids must be sorted, qid {} follows {} at row {}",
                qid[i],
                qid[i - 1],
                i
            )));
        }
        if qid[i] != qid[i - 1] {
            ptr.push(i);
        }
    }
    if !qid.is_empty() {
        ptr.push(qid.len());
    }
    Ok(ptr)
}

pub trait ObjectiveFunction {
    fn calc_grad_hess(
        y: &RowMajorMatrix<f64>,
        yhat: &[f64],
        sample_weight: Option<&[f64]>,
        group_ptr: Option<&[usize]>,
        grad: &mut GradientPairs,
    );
    fn calc_init(y: &RowMajorMatrix<f64>, sample_weight: Option<&[f64]>, n_outputs: usize) -> Vec<f64>;
    fn default_metric() -> Metric;
}

#[inline]
fn row_weight(sample_weight: Option<&[f64]>, i: usize) -> f64 {
    sample_weight.map_or(1.0, |w| w[i])
}

#[derive(Default)]
pub struct SquaredError {}

impl ObjectiveFunction for SquaredError {
    #[inline]
    fn calc_grad_hess(
        y: &RowMajorMatrix<f64>,
        yhat: &[f64],
        sample_weight: Option<&[f64]>,
        _group_ptr: Option<&[usize]>,
        grad: &mut GradientPairs,
    ) {
        let k_out = grad.n_outputs;
        grad.grad
            .par_chunks_mut(k_out)
            .zip(grad.hess.par_chunks_mut(k_out))
            .enumerate()
            .for_each(|(i, (g, h))| {
                let w = row_weight(sample_weight, i);
                for k in 0..k_out {
                    g[k] = ((yhat[i * k_out + k] - y.get(i, k)) * w) as f32;
                    h[k] = w as f32;
                }
            });
    }

    fn calc_init(y: &RowMajorMatrix<f64>, sample_weight: Option<&[f64]>, n_outputs: usize) -> Vec<f64> {
        (0..n_outputs)
            .map(|k| {
                let mut ytot: f64 = 0.;
                let mut ntot: f64 = 0.;
                for i in 0..y.rows {
                    let w = row_weight(sample_weight, i);
                    ytot += w * y.get(i, k);
                    ntot += w;
                }
                if ntot > 0.0 {
                    ytot / ntot
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn default_metric() -> Metric {
        Metric::RootMeanSquaredError
    }
}

#[derive(Default)]
pub struct LogLoss {}

impl ObjectiveFunction for LogLoss {
    #[inline]
    fn calc_grad_hess(
        y: &RowMajorMatrix<f64>,
        yhat: &[f64],
        sample_weight: Option<&[f64]>,
        _group_ptr: Option<&[usize]>,
        grad: &mut GradientPairs,
    ) {
        grad.grad
            .par_iter_mut()
            .zip(grad.hess.par_iter_mut())
            .enumerate()
            .for_each(|(i, (g, h))| {
                let w = row_weight(sample_weight, i);
                let p = sigmoid(yhat[i]);
                *g = ((p - y.data[i]) * w) as f32;
                *h = (p * (1.0 - p) * w).max(HESSIAN_EPS) as f32;
            });
    }

    fn calc_init(y: &RowMajorMatrix<f64>, sample_weight: Option<&[f64]>, n_outputs: usize) -> Vec<f64> {
        let mut ytot: f64 = 0.;
        let mut ntot: f64 = 0.;
        for i in 0..y.rows {
            let w = row_weight(sample_weight, i);
            ytot += w * y.data[i];
            ntot += w;
        }
        if ntot <= 0.0 {
            return vec![0.0; n_outputs];
        }
        // A single class would put the bias at an infinite logit.
        let p = (ytot / ntot).clamp(LOGIT_EPS, 1.0 - LOGIT_EPS);
        vec![f64::ln(p / (1.0 - p)); n_outputs]
    }

    fn default_metric() -> Metric {
        Metric::LogLoss
    }
}

#[derive(Default)]
pub struct Softmax {}

impl ObjectiveFunction for Softmax {
    fn calc_grad_hess(
        y: &RowMajorMatrix<f64>,
        yhat: &[f64],
        sample_weight: Option<&[f64]>,
        _group_ptr: Option<&[usize]>,
        grad: &mut GradientPairs,
    ) {
        let k_out = grad.n_outputs;
        grad.grad
            .par_chunks_mut(k_out)
            .zip(grad.hess.par_chunks_mut(k_out))
            .enumerate()
            .for_each(|(i, (g, h))| {
                let w = row_weight(sample_weight, i);
                let mut p = vec![0.0; k_out];
                softmax(&yhat[(i * k_out)..((i + 1) * k_out)], &mut p);
                let label = y.data[i] as usize;
                for k in 0..k_out {
                    let target = if k == label { 1.0 } else { 0.0 };
                    g[k] = ((p[k] - target) * w) as f32;
                    h[k] = (2.0 * p[k] * (1.0 - p[k]) * w).max(HESSIAN_EPS) as f32;
                }
            });
    }

    fn calc_init(_y: &RowMajorMatrix<f64>, _sample_weight: Option<&[f64]>, n_outputs: usize) -> Vec<f64> {
        vec![0.0; n_outputs]
    }

    fn default_metric() -> Metric {
        Metric::MultiLogLoss
    }
}

/// Pairwise RankNet loss within query groups.
#[derive(Default)]
pub struct PairwiseRank {}

impl ObjectiveFunction for PairwiseRank {
    fn calc_grad_hess(
        y: &RowMajorMatrix<f64>,
        yhat: &[f64],
        sample_weight: Option<&[f64]>,
        group_ptr: Option<&[usize]>,
        grad: &mut GradientPairs,
    ) {
        let whole = [0, y.rows];
        let ptr = group_ptr.unwrap_or(&whole);
        grad.grad.iter_mut().for_each(|g| *g = 0.0);
        grad.hess.iter_mut().for_each(|h| *h = 0.0);
        let mut g = vec![0.0_f64; y.rows];
        let mut h = vec![0.0_f64; y.rows];
        for bounds in ptr.windows(2) {
            let (start, stop) = (bounds[0], bounds[1]);
            for i in start..stop {
                for j in start..stop {
                    if y.data[i] <= y.data[j] {
                        continue;
                    }
                    let w = 0.5 * (row_weight(sample_weight, i) + row_weight(sample_weight, j));
                    // Probability of ranking the pair the wrong way round.
                    let rho = sigmoid(yhat[j] - yhat[i]);
                    g[i] -= rho * w;
                    g[j] += rho * w;
                    let hh = rho * (1.0 - rho) * w;
                    h[i] += hh;
                    h[j] += hh;
                }
            }
        }
        for i in 0..y.rows {
            grad.grad[i] = g[i] as f32;
            grad.hess[i] = h[i].max(RANK_HESSIAN_EPS) as f32;
        }
    }

    fn calc_init(_y: &RowMajorMatrix<f64>, _sample_weight: Option<&[f64]>, n_outputs: usize) -> Vec<f64> {
        vec![0.0; n_outputs]
    }

    fn default_metric() -> Metric {
        Metric::NDCG
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn labels(v: Vec<f64>) -> RowMajorMatrix<f64> {
        let n = v.len();
        RowMajorMatrix::new(v, n, 1)
    }

    fn builtin_grad(o: BuiltinObjective, y: &RowMajorMatrix<f64>, yhat: &[f64], k: usize) -> GradientPairs {
        Objective::Builtin(o).gradients(y, yhat, None, None, k).unwrap().0
    }

    #[test]
    fn test_logloss_grad() {
        let y = labels(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let g1 = builtin_grad(BuiltinObjective::LogLoss, &y, &[-1.0, -1.0, -1.0, 1.0, 1.0, 1.0], 1);
        let g2 = builtin_grad(BuiltinObjective::LogLoss, &y, &[0.0, 0.0, -1.0, 1.0, 0.0, 1.0], 1);
        assert!(g1.grad.iter().map(|v| v.abs()).sum::<f32>() < g2.grad.iter().map(|v| v.abs()).sum::<f32>());
        assert_relative_eq!(g2.hess[0], 0.25, epsilon = 1e-7);
    }

    #[test]
    fn test_logloss_init() {
        let o = Objective::Builtin(BuiltinObjective::LogLoss);
        let y = labels(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(o.initial_scores(&y, None, 1), vec![0.0]);
        let y = labels(vec![0., 0., 0., 0., 1., 1.]);
        assert_eq!(o.initial_scores(&y, None, 1), vec![f64::ln(2. / 4.)]);
        let w = vec![1., 1., 1., 1., 2., 2.];
        assert_eq!(o.initial_scores(&y, Some(&w), 1), vec![0.0]);
        // A single class still gives a finite bias.
        let ones = o.initial_scores(&labels(vec![1.0; 5]), None, 1)[0];
        let zeros = o.initial_scores(&labels(vec![0.0; 5]), None, 1)[0];
        assert!(ones.is_finite() && ones > 10.0);
        assert_relative_eq!(zeros, -ones, epsilon = 1e-9);
    }

    #[test]
    fn test_squared_error_multi_target() {
        let o = Objective::Builtin(BuiltinObjective::SquaredError);
        let y = RowMajorMatrix::new(vec![1.0, 10.0, 3.0, 20.0], 2, 2);
        assert_eq!(o.n_outputs(&y).unwrap(), 2);
        assert_eq!(o.initial_scores(&y, None, 2), vec![2.0, 15.0]);
        let w = vec![3.0, 1.0];
        assert_eq!(o.initial_scores(&y, Some(&w), 2), vec![1.5, 12.5]);
        let g = builtin_grad(BuiltinObjective::SquaredError, &y, &[0.0, 0.0, 1.0, 1.0], 2);
        assert_eq!(g.grad, vec![-1.0, -10.0, -2.0, -19.0]);
        assert_eq!(g.hess, vec![1.0; 4]);
    }

    #[test]
    fn test_softmax_grad() {
        let y = labels(vec![0.0, 2.0, 1.0]);
        let o = Objective::Builtin(BuiltinObjective::Softmax);
        assert_eq!(o.n_outputs(&y).unwrap(), 3);
        let g = builtin_grad(BuiltinObjective::Softmax, &y, &[0.0; 9], 3);
        let third = 1.0 / 3.0;
        assert_relative_eq!(g.grad[0], (third - 1.0) as f32, epsilon = 1e-6);
        assert_relative_eq!(g.grad[1], third as f32, epsilon = 1e-6);
        assert_relative_eq!(g.grad[5], (third - 1.0) as f32, epsilon = 1e-6);
        assert_relative_eq!(g.hess[4], (2.0 * third * (1.0 - third)) as f32, epsilon = 1e-6);
        // Gradients of a row sum to zero.
        for row in g.grad.chunks(3) {
            assert_relative_eq!(row.iter().sum::<f32>(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_invalid_classes() {
        let o = Objective::Builtin(BuiltinObjective::Softmax);
        let err = o.n_outputs(&labels(vec![1.0, 2.0, 3.0])).unwrap_err();
        assert!(err.to_string().starts_with("Invalid classes"));
        assert!(err.to_string().contains("Expected: [0 1 2], got [1 2 3]"));
        assert!(o.n_outputs(&labels(vec![0.0, 0.0])).is_err());

        let o = Objective::Builtin(BuiltinObjective::LogLoss);
        let err = o.n_outputs(&labels(vec![0.0, 2.0])).unwrap_err();
        assert!(matches!(err, BoostError::InvalidClasses(_, _)));
        assert!(o.n_outputs(&RowMajorMatrix::new(vec![0.0, 1.0], 1, 2)).is_err());
    }

    #[test]
    fn test_check_labels() {
        let o = Objective::Builtin(BuiltinObjective::Softmax);
        assert!(o.check_labels(&labels(vec![2.0, 0.0]), 3).is_ok());
        let err = o.check_labels(&labels(vec![5.0, 0.0]), 3).unwrap_err();
        assert!(err.to_string().contains("Expected: [0 1 2], got [0 5]"));
        let o = Objective::Builtin(BuiltinObjective::LogLoss);
        assert!(o.check_labels(&labels(vec![1.0]), 1).is_ok());
        assert!(o.check_labels(&labels(vec![f64::NAN]), 1).is_err());
        let o = Objective::Builtin(BuiltinObjective::SquaredError);
        assert!(o.check_labels(&labels(vec![-4.5]), 1).is_ok());
    }

    #[test]
    fn test_pairwise_gradients() {
        // One group where the model ranks the pair the wrong way round, and
        // a second group with tied labels that carries no signal.
        let y = labels(vec![1.0, 0.0, 1.0, 1.0]);
        let yhat = vec![0.0, 1.0, 0.5, -0.5];
        let ptr = group_ptr_from_qid(&[7, 7, 9, 9]).unwrap();
        assert_eq!(ptr, vec![0, 2, 4]);
        let mut g = GradientPairs::zeros(4, 1);
        PairwiseRank::calc_grad_hess(&y, &yhat, None, Some(&ptr), &mut g);
        let rho = sigmoid(1.0);
        assert_relative_eq!(g.grad[0] as f64, -rho, epsilon = 1e-6);
        assert_relative_eq!(g.grad[1] as f64, rho, epsilon = 1e-6);
        assert_eq!(g.grad[2], 0.0);
        assert_eq!(g.hess[3], RANK_HESSIAN_EPS as f32);
        assert!(group_ptr_from_qid(&[2, 1]).is_err());
    }

    #[test]
    fn test_link() {
        let m = vec![0.0, 0.0, 0.0, 1000.0];
        assert_eq!(Link::Identity.apply(&m, 2), m);
        assert_eq!(Link::Sigmoid.apply(&m, 1), vec![0.5, 0.5, 0.5, 1.0]);
        let p = Link::Softmax.apply(&m, 2);
        assert_eq!(p[0], 0.5);
        assert_relative_eq!(p[3], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_custom_objective() {
        let c = CustomObjective::new("half", 0, Link::Identity, |yhat, y| {
            let g = yhat.iter().zip(y.data.iter()).map(|(p, t)| 0.5 * (p - t)).collect();
            (GradientArray::Flat(g), GradientArray::Flat(vec![0.5; yhat.len()]))
        });
        let o = Objective::Custom(c);
        let y = labels(vec![1.0, 2.0]);
        assert_eq!(o.n_outputs(&y).unwrap(), 1);
        let (g, w) = o.gradients(&y, &[0.0, 0.0], None, None, 1).unwrap();
        assert_eq!(g.grad, vec![-0.5, -1.0]);
        // Flat arrays with a single output are still reported.
        assert!(w.is_some());

        let j = serde_json::to_string(&o).unwrap();
        let loaded: Objective = serde_json::from_str(&j).unwrap();
        let r = loaded.gradients(&y, &[0.0, 0.0], None, None, 1);
        assert!(matches!(r, Err(BoostError::MissingCustomObjective(_))));
    }

    #[test]
    fn test_parse_objective() {
        assert_eq!(
            "multi:softprob".parse::<BuiltinObjective>().unwrap(),
            BuiltinObjective::Softmax
        );
        assert_eq!(BuiltinObjective::PairwiseRank.to_string(), "rank:pairwise");
        assert!("multi:unknown".parse::<BuiltinObjective>().is_err());
    }
}
