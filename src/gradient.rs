//! Gradient
//!
//! Per row, per output gradient and hessian storage, and the validation of
//! gradients handed back by user supplied objectives.
use crate::errors::{BoostError, BoostWarning};
use crate::utils::fast_f64_sum;

/// Gradient and hessian values in row-major `n_rows x n_outputs` layout.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientPairs {
    pub grad: Vec<f32>,
    pub hess: Vec<f32>,
    pub n_rows: usize,
    pub n_outputs: usize,
}

impl GradientPairs {
    pub fn zeros(n_rows: usize, n_outputs: usize) -> Self {
        GradientPairs {
            grad: vec![0.0; n_rows * n_outputs],
            hess: vec![0.0; n_rows * n_outputs],
            n_rows,
            n_outputs,
        }
    }

    #[inline]
    pub fn row_grad(&self, i: usize) -> &[f32] {
        &self.grad[(i * self.n_outputs)..((i + 1) * self.n_outputs)]
    }

    #[inline]
    pub fn row_hess(&self, i: usize) -> &[f32] {
        &self.hess[(i * self.n_outputs)..((i + 1) * self.n_outputs)]
    }

    /// Copy a single output column, used when growing one tree per output.
    pub fn select_output(&self, k: usize) -> GradientPairs {
        let grad = self.grad.iter().skip(k).step_by(self.n_outputs).copied().collect();
        let hess = self.hess.iter().skip(k).step_by(self.n_outputs).copied().collect();
        GradientPairs {
            grad,
            hess,
            n_rows: self.n_rows,
            n_outputs: 1,
        }
    }

    /// Gradient and hessian sums over the given rows, accumulated in f64.
    pub fn sums(&self, index: &[usize]) -> (Vec<f64>, Vec<f64>) {
        if self.n_outputs == 1 && index.len() == self.n_rows {
            return (vec![fast_f64_sum(&self.grad)], vec![fast_f64_sum(&self.hess)]);
        }
        let mut g = vec![0.0; self.n_outputs];
        let mut h = vec![0.0; self.n_outputs];
        for i in index {
            for k in 0..self.n_outputs {
                g[k] += f64::from(self.grad[i * self.n_outputs + k]);
                h[k] += f64::from(self.hess[i * self.n_outputs + k]);
            }
        }
        (g, h)
    }

    /// Hessian summed over outputs per row, the sketch weight of the approx method.
    pub fn row_hessian_totals(&self) -> Vec<f64> {
        (0..self.n_rows)
            .map(|i| self.row_hess(i).iter().map(|h| f64::from(*h)).sum())
            .collect()
    }
}

/// Gradient or hessian array returned by a custom objective.
#[derive(Debug, Clone)]
pub enum GradientArray {
    /// Flattened 1-D array, accepted in compatibility mode.
    Flat(Vec<f64>),
    /// One vector per sample, each with one value per output.
    Rows(Vec<Vec<f64>>),
    /// Column-major (Fortran order) dense array.
    ColumnMajor { data: Vec<f64>, rows: usize, cols: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Flat(usize),
    Dense(usize, usize),
}

impl GradientArray {
    fn shape(&self, name: &str) -> Result<Shape, BoostError> {
        match self {
            GradientArray::Flat(v) => Ok(Shape::Flat(v.len())),
            GradientArray::Rows(rows) => {
                let cols = rows.first().map_or(0, |r| r.len());
                if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
                    return Err(BoostError::ShapeMismatch(format!(
                        "Ragged {} returned by the custom objective, row {} has {} values, expected {}.",
                        name,
                        i,
                        r.len(),
                        cols
                    )));
                }
                Ok(Shape::Dense(rows.len(), cols))
            }
            GradientArray::ColumnMajor { data, rows, cols } => {
                if data.len() != rows * cols {
                    return Err(BoostError::ShapeMismatch(format!(
                        "The {} buffer holds {} values, which does not match its ({}, {}) shape.",
                        name,
                        data.len(),
                        rows,
                        cols
                    )));
                }
                Ok(Shape::Dense(*rows, *cols))
            }
        }
    }

    /// Values in row-major order.
    fn into_row_major(self) -> Vec<f64> {
        match self {
            GradientArray::Flat(v) => v,
            GradientArray::Rows(rows) => rows.into_iter().flatten().collect(),
            GradientArray::ColumnMajor { data, rows, cols } => {
                let mut out = Vec::with_capacity(data.len());
                for i in 0..rows {
                    out.extend((0..cols).map(|j| data[j * rows + i]));
                }
                out
            }
        }
    }
}

/// Validate the output of a custom objective and convert it into gradient pairs.
///
/// Every check runs before the values are used, so a malformed return never
/// reaches histogram accumulation.
pub fn validate_custom_gradient(
    grad: GradientArray,
    hess: GradientArray,
    n_rows: usize,
    n_outputs: usize,
) -> Result<(GradientPairs, Option<BoostWarning>), BoostError> {
    let g_shape = grad.shape("gradient")?;
    let h_shape = hess.shape("hessian")?;
    if g_shape != h_shape {
        return Err(BoostError::ShapeMismatch(format!(
            "Mismatched shape between the gradient and hessian: {:?} vs {:?}.",
            g_shape, h_shape
        )));
    }
    let warning = match g_shape {
        Shape::Dense(rows, cols) => {
            if rows != n_rows {
                return Err(BoostError::ShapeMismatch(format!(
                    "Mismatched size between the gradient and the number of samples: {} rows, expected {}.",
                    rows, n_rows
                )));
            }
            if cols != n_outputs {
                return Err(BoostError::OutputDimension {
                    expected: n_outputs,
                    found: cols,
                });
            }
            None
        }
        Shape::Flat(len) => {
            if len != n_rows * n_outputs {
                return Err(BoostError::ShapeMismatch(format!(
                    "Mismatched size between the gradient and the number of samples: {} values, expected {} x {}.",
                    len, n_rows, n_outputs
                )));
            }
            Some(BoostWarning::LegacyShape { n_rows, n_outputs })
        }
    };
    let pairs = GradientPairs {
        grad: grad.into_row_major().into_iter().map(|v| v as f32).collect(),
        hess: hess.into_row_major().into_iter().map(|v| v as f32).collect(),
        n_rows,
        n_outputs,
    };
    Ok((pairs, warning))
}
