//! Binning
//!
//! Quantile sketch of the training data. Every feature gets a sorted list of
//! cut values, and every value is replaced by the index of its bin.
use crate::constants::MAX_CATEGORY_CODE;
use crate::data::{FloatData, JaggedMatrix, Matrix};
use crate::errors::BoostError;
use crate::utils::{is_missing, map_bin, percentiles};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Type of a feature column, recorded on the booster after training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureType {
    Numerical,
    Categorical,
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeatureType::Numerical => write!(f, "q"),
            FeatureType::Categorical => write!(f, "c"),
        }
    }
}

/// Build the feature type list of a dataset with `cols` columns.
pub fn feature_types(cols: usize, cat_index: Option<&HashSet<usize>>) -> Vec<FeatureType> {
    (0..cols)
        .map(|i| match cat_index {
            Some(c) if c.contains(&i) => FeatureType::Categorical,
            _ => FeatureType::Numerical,
        })
        .collect()
}

/// If there are fewer unique values than their are
/// percentiles, just return the unique values of the
/// vectors.
///
/// * `v` - A numeric slice to calculate percentiles for.
/// * `sample_weight` - Instance weights for each row in the data.
fn percentiles_or_value<T>(v: &[T], sample_weight: &[T], pcts: &[T]) -> Vec<T>
where
    T: FloatData<T>,
{
    let mut v_u = v.to_owned();
    v_u.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v_u.dedup();
    if v_u.len() <= pcts.len() + 1 {
        v_u
    } else {
        percentiles(v, sample_weight, pcts)
    }
}

// Every feature is bucketed into bins 0 to N, where N is the number of cut
// values. Bin 0 is reserved for missing values, and a value lands in the bin
// equal to the number of cuts less than or equal to it. If we generated these
// cuts:
// [1.0, 4.0, 8.0, MAX]
// the value 3.0 lands in bin 1, 4.0 in bin 2, and a split sending bins 1..=2
// to the left translates to [feature < 8.0].
#[derive(Debug)]
pub struct BinnedData<T> {
    pub binned_data: Vec<u16>,
    pub cuts: JaggedMatrix<T>,
}

/// Check the columns before any cut is computed.
fn validate_columns(
    data: &Matrix<f64>,
    missing: f64,
    cat_index: Option<&HashSet<usize>>,
) -> Result<(), BoostError> {
    for i in 0..data.cols {
        let col = data.get_col(i);
        if !missing.is_nan() && col.iter().any(|v| v.is_nan()) {
            return Err(BoostError::NANValueFound(missing));
        }
        if cat_index.map_or(false, |c| c.contains(&i)) {
            if let Some(v) = col
                .iter()
                .filter(|v| !is_missing(v, &missing))
                .find(|v| !is_valid_category(**v))
            {
                return Err(BoostError::InvalidCategory(i, *v, MAX_CATEGORY_CODE));
            }
        }
    }
    Ok(())
}

/// Is the value usable as a category code.
#[inline]
pub fn is_valid_category(v: f64) -> bool {
    v >= 0.0 && v.fract() == 0.0 && v <= MAX_CATEGORY_CODE as f64
}

/// Convert a matrix of data, into a binned matrix.
///
/// * `data` - Numeric data to be binned.
/// * `cuts` - A slice of Vectors, where the vectors are the corresponding
///     cut values for each of the columns.
pub fn bin_matrix_from_cuts<T: FloatData<T>>(
    data: &Matrix<T>,
    cuts: &JaggedMatrix<T>,
    missing: &T,
) -> Result<Vec<u16>, BoostError> {
    // The column of a record is found by dividing its position by the
    // number of rows.
    data.data[..(data.rows * data.cols)]
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let col = i / data.rows;
            map_bin(cuts.get_col(col), v, missing).ok_or_else(|| BoostError::TooManyBins(col, cuts.get_col(col).len()))
        })
        .collect()
}

/// Bin a numeric matrix.
///
/// * `data` - A column-major numeric matrix, of data to be binned.
/// * `sample_weight` - Instance weights for each row of the data. The approx
///     tree method passes the hessian here.
/// * `nbins` - The number of bins each column should be binned into.
/// * `missing` - Float value to consider as missing.
/// * `cat_index` - Columns holding category codes.
pub fn bin_matrix(
    data: &Matrix<f64>,
    sample_weight: Option<&[f64]>,
    nbins: u16,
    missing: f64,
    cat_index: Option<&HashSet<usize>>,
) -> Result<BinnedData<f64>, BoostError> {
    validate_columns(data, missing, cat_index)?;

    let mut pcts = Vec::new();
    let nbins_ = f64::from_u16(nbins);
    for i in 0..nbins {
        let v = f64::from_u16(i) / nbins_;
        pcts.push(v);
    }

    let s_w = vec![1.0; data.rows];
    let weight = match sample_weight {
        Some(sample_weight) => sample_weight,
        None => &s_w,
    };

    // Generate the cuts for each of the columns.
    let mut cuts = JaggedMatrix::new();
    for i in 0..data.cols {
        let (no_miss, w): (Vec<f64>, Vec<f64>) = data
            .get_col(i)
            .iter()
            .zip(weight.iter())
            .filter(|(v, _)| !is_missing(v, &missing))
            .unzip();

        let col_cuts = if cat_index.map_or(false, |c| c.contains(&i)) {
            // One bin per observed category.
            let col_categories: HashSet<u32> = HashSet::from_iter(no_miss.iter().map(|&e| e as u32));
            let mut col_cuts: Vec<f64> = col_categories.iter().map(|&e| e as f64).collect();
            col_cuts.sort_unstable_by(|a, b| a.total_cmp(b));
            col_cuts.push(f64::MAX);
            col_cuts
        } else {
            let mut col_cuts = percentiles_or_value(&no_miss, &w, &pcts);
            col_cuts.push(f64::MAX);
            col_cuts.dedup();
            col_cuts
        };
        cuts.push_col(col_cuts);
    }

    debug!(
        "binned {} rows into {} features, {} cuts in total",
        data.rows,
        data.cols,
        cuts.data.len()
    );

    let binned_data = bin_matrix_from_cuts(data, &cuts, &missing)?;

    Ok(BinnedData { binned_data, cuts })
}

/// Bin new data against a bin map computed earlier in the session. Fails if a
/// categorical column holds a code the bin map does not know, since that would
/// require the boundaries to be recomputed.
pub fn rebin_with_cuts(
    data: &Matrix<f64>,
    cuts: &JaggedMatrix<f64>,
    missing: f64,
    cat_index: Option<&HashSet<usize>>,
) -> Result<BinnedData<f64>, BoostError> {
    validate_columns(data, missing, cat_index)?;
    if cuts.cols != data.cols {
        return Err(BoostError::FeatureTypeMismatch(format!(
            "bin map has {} features, data has {}",
            cuts.cols, data.cols
        )));
    }
    if let Some(cat_index) = cat_index {
        for i in cat_index.iter() {
            let known = cuts.get_col(*i);
            let unknown = data
                .get_col(*i)
                .iter()
                .filter(|v| !is_missing(v, &missing))
                .find(|v| known.binary_search_by(|c| c.total_cmp(v)).is_err());
            if let Some(v) = unknown {
                return Err(BoostError::IncompatibleBins(
                    *i,
                    format!("category {} was not present when the bins were built", v),
                ));
            }
        }
    }
    Ok(BinnedData {
        binned_data: bin_matrix_from_cuts(data, cuts, &missing)?,
        cuts: cuts.clone(),
    })
}
