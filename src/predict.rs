//! Predict
//!
//! Batch, in place and base margin prediction. Every call runs on an
//! execution context built from the booster's device.
use crate::booster::GradientBooster;
use crate::data::Matrix;
use crate::errors::BoostError;
use rayon::prelude::*;

impl GradientBooster {
    /// Bias of every output, zeros for a booster that was never fit.
    fn bias(&self) -> Vec<f64> {
        if self.base_scores.len() == self.n_outputs {
            self.base_scores.clone()
        } else {
            vec![0.0; self.n_outputs]
        }
    }

    /// Reject data with another number of features than the training data.
    fn check_features(&self, data: &Matrix<f64>) -> Result<(), BoostError> {
        let expected = self.feature_types().len();
        if !self.trees.is_empty() && data.cols != expected {
            return Err(BoostError::DataShape(format!(
                "data has {} features, the booster was trained on {}",
                data.cols, expected
            )));
        }
        Ok(())
    }

    /// Margins `rows x n_outputs` starting from `start`, one row per chunk,
    /// computed on the booster's execution context.
    fn margins_from<F>(&self, start: Vec<f64>, leaf_row: F) -> Result<Vec<f64>, BoostError>
    where
        F: Fn(usize, &mut [f64]) + Sync + Send,
    {
        let ctx = self.execution_context()?;
        let mut margins = start;
        let n_outputs = self.n_outputs;
        ctx.pool.install(|| {
            margins
                .par_chunks_mut(n_outputs)
                .enumerate()
                .for_each(|(i, m)| leaf_row(i, m))
        });
        Ok(margins)
    }

    fn repeat_bias(&self, rows: usize) -> Vec<f64> {
        let bias = self.bias();
        (0..rows).flat_map(|_| bias.iter().copied()).collect()
    }

    /// Generate predictions on data using the gradient booster.
    ///
    /// The data is copied into a row-major buffer first, so every row is
    /// routed from a contiguous slice. Output is row-major `rows x n_outputs`.
    ///
    /// * `data` - Either a column or row major matrix of features.
    pub fn predict(&self, data: &Matrix<f64>) -> Result<Vec<f64>, BoostError> {
        self.predict_rows(data, self.repeat_bias(data.rows))
    }

    fn predict_rows(&self, data: &Matrix<f64>, start: Vec<f64>) -> Result<Vec<f64>, BoostError> {
        self.check_features(data)?;
        let buffer = data.to_row_major();
        self.margins_from(start, |i, m| {
            let row = buffer.get_row(i);
            for tree in &self.trees {
                tree.add_to_margin(tree.predict_row_from_row_slice(row, &self.missing), m);
            }
        })
    }

    /// Generate predictions reading the caller's storage in place, for either
    /// layout. The result is identical to [`Self::predict`].
    pub fn inplace_predict(&self, data: &Matrix<f64>) -> Result<Vec<f64>, BoostError> {
        self.check_features(data)?;
        self.margins_from(self.repeat_bias(data.rows), |i, m| {
            for tree in &self.trees {
                tree.add_to_margin(tree.predict_row(data, i, &self.missing), m);
            }
        })
    }

    /// Predictions that start from `base_margin` instead of the bias, the
    /// counterpart of training with `FitOptions::base_margin`.
    ///
    /// * `data` - Either a column or row major matrix of features.
    /// * `base_margin` - Row-major `rows x n_outputs` starting margins.
    pub fn predict_with_base_margin(&self, data: &Matrix<f64>, base_margin: &[f64]) -> Result<Vec<f64>, BoostError> {
        if base_margin.len() != data.rows * self.n_outputs {
            return Err(BoostError::DataShape(format!(
                "base_margin has {} values, expected {}",
                base_margin.len(),
                data.rows * self.n_outputs
            )));
        }
        self.predict_rows(data, base_margin.to_vec())
    }

    /// Predictions passed through the inverse link of the objective, the
    /// probabilities of classification objectives.
    pub fn predict_proba(&self, data: &Matrix<f64>) -> Result<Vec<f64>, BoostError> {
        let margins = self.predict(data)?;
        let ctx = self.execution_context()?;
        Ok(ctx.pool.install(|| self.objective.link().apply(&margins, self.n_outputs)))
    }
}
