//! Metric
//!
//! Evaluation metrics computed on the margins of held-out data.
use crate::errors::BoostError;
use crate::utils::{items_to_strings, sigmoid, softmax};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Extra information a metric may need besides labels, margins and weights.
#[derive(Debug, Clone, Copy)]
pub struct MetricContext<'a> {
    /// Margins per row.
    pub n_outputs: usize,
    /// Query group boundaries, used by ranking metrics.
    pub group_ptr: Option<&'a [usize]>,
}

/// Labels, row-major margins, sample weights and context.
pub type MetricFn = fn(&[f64], &[f64], &[f64], &MetricContext) -> f64;

/// Compare to metric values, determining if b is better.
/// If one of them is NaN favor the non NaN value.
/// If both are NaN, consider the first value to be better.
pub fn is_comparison_better(value: f64, comparison: f64, maximize: bool) -> bool {
    match (value.is_nan(), comparison.is_nan()) {
        // Both nan, comparison is not better,
        // Or comparison is nan, also not better
        (true, true) | (false, true) => false,
        // comparison is not Nan, it's better
        (true, false) => true,
        (false, false) => {
            if maximize {
                value < comparison
            } else {
                value > comparison
            }
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    AUC,
    LogLoss,
    MultiLogLoss,
    RootMeanSquaredError,
    ClassificationError,
    NDCG,
}

impl FromStr for Metric {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auc" => Ok(Metric::AUC),
            "logloss" => Ok(Metric::LogLoss),
            "mlogloss" => Ok(Metric::MultiLogLoss),
            "rmse" => Ok(Metric::RootMeanSquaredError),
            "error" => Ok(Metric::ClassificationError),
            "ndcg" => Ok(Metric::NDCG),
            _ => Err(BoostError::ParseString(
                s.to_string(),
                "Metric".to_string(),
                items_to_strings(vec!["auc", "logloss", "mlogloss", "rmse", "error", "ndcg"]),
            )),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Metric::AUC => "auc",
            Metric::LogLoss => "logloss",
            Metric::MultiLogLoss => "mlogloss",
            Metric::RootMeanSquaredError => "rmse",
            Metric::ClassificationError => "error",
            Metric::NDCG => "ndcg",
        };
        write!(f, "{}", s)
    }
}

pub fn metric_callables(metric_type: &Metric) -> (MetricFn, bool) {
    match metric_type {
        Metric::AUC => (AUCMetric::calculate_metric, AUCMetric::maximize()),
        Metric::LogLoss => (LogLossMetric::calculate_metric, LogLossMetric::maximize()),
        Metric::MultiLogLoss => (MultiLogLossMetric::calculate_metric, MultiLogLossMetric::maximize()),
        Metric::RootMeanSquaredError => (
            RootMeanSquaredErrorMetric::calculate_metric,
            RootMeanSquaredErrorMetric::maximize(),
        ),
        Metric::ClassificationError => (
            ClassificationErrorMetric::calculate_metric,
            ClassificationErrorMetric::maximize(),
        ),
        Metric::NDCG => (NDCGMetric::calculate_metric, NDCGMetric::maximize()),
    }
}

pub trait EvaluationMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], sample_weight: &[f64], ctx: &MetricContext) -> f64;
    fn maximize() -> bool;
}

pub struct LogLossMetric {}
impl EvaluationMetric for LogLossMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], sample_weight: &[f64], _ctx: &MetricContext) -> f64 {
        log_loss(y, yhat, sample_weight)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct MultiLogLossMetric {}
impl EvaluationMetric for MultiLogLossMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], sample_weight: &[f64], ctx: &MetricContext) -> f64 {
        multi_log_loss(y, yhat, sample_weight, ctx.n_outputs)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct AUCMetric {}
impl EvaluationMetric for AUCMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], sample_weight: &[f64], _ctx: &MetricContext) -> f64 {
        roc_auc_score(y, yhat, sample_weight)
    }
    fn maximize() -> bool {
        true
    }
}

pub struct RootMeanSquaredErrorMetric {}
impl EvaluationMetric for RootMeanSquaredErrorMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], sample_weight: &[f64], ctx: &MetricContext) -> f64 {
        root_mean_squared_error(y, yhat, sample_weight, ctx.n_outputs)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct ClassificationErrorMetric {}
impl EvaluationMetric for ClassificationErrorMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], sample_weight: &[f64], ctx: &MetricContext) -> f64 {
        classification_error(y, yhat, sample_weight, ctx.n_outputs)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct NDCGMetric {}
impl EvaluationMetric for NDCGMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], _sample_weight: &[f64], ctx: &MetricContext) -> f64 {
        ndcg(y, yhat, ctx.group_ptr)
    }
    fn maximize() -> bool {
        true
    }
}

/// Binary log loss, `yhat` holds margins.
pub fn log_loss(y: &[f64], yhat: &[f64], sample_weight: &[f64]) -> f64 {
    let mut w_sum = 0.;
    let res = y
        .iter()
        .zip(yhat)
        .zip(sample_weight)
        .map(|((y_, yhat_), w_)| {
            w_sum += *w_;
            let p = sigmoid(*yhat_);
            -(*y_ * p.ln() + (1.0 - *y_) * ((1.0 - p).ln())) * *w_
        })
        .sum::<f64>();
    res / w_sum
}

/// Multiclass log loss over row-major margins with `n_outputs` columns.
pub fn multi_log_loss(y: &[f64], yhat: &[f64], sample_weight: &[f64], n_outputs: usize) -> f64 {
    let mut p = vec![0.0; n_outputs];
    let mut w_sum = 0.;
    let mut res = 0.;
    for (i, (y_, w_)) in y.iter().zip(sample_weight).enumerate() {
        softmax(&yhat[(i * n_outputs)..((i + 1) * n_outputs)], &mut p);
        let p_y = p.get(*y_ as usize).copied().unwrap_or(0.0);
        res -= p_y.max(f64::EPSILON).ln() * *w_;
        w_sum += *w_;
    }
    res / w_sum
}

/// Root mean squared error over every target, `y` and `yhat` are row-major
/// with `n_outputs` columns and `sample_weight` has one value per row.
pub fn root_mean_squared_error(y: &[f64], yhat: &[f64], sample_weight: &[f64], n_outputs: usize) -> f64 {
    let mut w_sum = 0.;
    let res = y
        .chunks(n_outputs)
        .zip(yhat.chunks(n_outputs))
        .zip(sample_weight)
        .map(|((y_, yhat_), w_)| {
            w_sum += *w_ * n_outputs as f64;
            y_.iter().zip(yhat_).map(|(a, b)| (a - b).powi(2)).sum::<f64>() * *w_
        })
        .sum::<f64>();
    (res / w_sum).sqrt()
}

/// Weighted share of misclassified rows. A single margin column is read as
/// a binary logit, several columns as class scores.
pub fn classification_error(y: &[f64], yhat: &[f64], sample_weight: &[f64], n_outputs: usize) -> f64 {
    let mut w_sum = 0.;
    let mut res = 0.;
    for (i, (y_, w_)) in y.iter().zip(sample_weight).enumerate() {
        let predicted = if n_outputs == 1 {
            if yhat[i] > 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            let row = &yhat[(i * n_outputs)..((i + 1) * n_outputs)];
            let mut best = 0;
            for (k, v) in row.iter().enumerate() {
                if *v > row[best] {
                    best = k;
                }
            }
            best as f64
        };
        if predicted != *y_ {
            res += *w_;
        }
        w_sum += *w_;
    }
    res / w_sum
}

fn trapezoid_area(x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    (x0 - x1).abs() * (y0 + y1) * 0.5
}

pub fn roc_auc_score(y: &[f64], yhat: &[f64], sample_weight: &[f64]) -> f64 {
    if y.is_empty() {
        return f64::NAN;
    }
    let mut indices = (0..y.len()).collect::<Vec<_>>();
    indices.sort_unstable_by(|&a, &b| yhat[b].total_cmp(&yhat[a]));
    let mut auc: f64 = 0.0;

    let mut label = y[indices[0]];
    let mut w = sample_weight[indices[0]];
    let mut fp = (1.0 - label) * w;
    let mut tp: f64 = label * w;
    let mut tp_prev: f64 = 0.0;
    let mut fp_prev: f64 = 0.0;

    for i in 1..indices.len() {
        if yhat[indices[i]] != yhat[indices[i - 1]] {
            auc += trapezoid_area(fp_prev, fp, tp_prev, tp);
            tp_prev = tp;
            fp_prev = fp;
        }
        label = y[indices[i]];
        w = sample_weight[indices[i]];
        fp += (1.0 - label) * w;
        tp += label * w;
    }

    auc += trapezoid_area(fp_prev, fp, tp_prev, tp);
    if fp <= 0.0 || tp <= 0.0 {
        auc = 0.0;
        fp = 0.0;
        tp = 0.0;
    }

    auc / (tp * fp)
}

fn dcg(relevance: impl Iterator<Item = f64>) -> f64 {
    relevance
        .enumerate()
        .map(|(i, r)| (2f64.powf(r) - 1.0) / ((i + 2) as f64).log2())
        .sum()
}

/// Mean NDCG over query groups. Groups without any relevant document score 1.
pub fn ndcg(y: &[f64], yhat: &[f64], group_ptr: Option<&[usize]>) -> f64 {
    if y.is_empty() {
        return f64::NAN;
    }
    let whole = [0, y.len()];
    let ptr = group_ptr.unwrap_or(&whole);
    let n_groups = ptr.len().saturating_sub(1);
    if n_groups == 0 {
        return f64::NAN;
    }
    let total: f64 = ptr
        .windows(2)
        .map(|b| {
            let (start, stop) = (b[0], b[1]);
            let mut order: Vec<usize> = (start..stop).collect();
            // Stable, so tied scores keep their input order.
            order.sort_by(|a, b| yhat[*b].total_cmp(&yhat[*a]));
            let mut ideal: Vec<f64> = y[start..stop].to_vec();
            ideal.sort_by(|a, b| b.total_cmp(a));
            let idcg = dcg(ideal.into_iter());
            if idcg <= 0.0 {
                1.0
            } else {
                dcg(order.iter().map(|i| y[*i])) / idcg
            }
        })
        .sum();
    total / n_groups as f64
}
