use crate::data::FloatData;
use crate::errors::BoostError;
use std::collections::VecDeque;
use std::convert::TryInto;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

// Validation
pub fn validate_positive_float_parameter<T: FloatData<T>>(value: T, parameter: &str) -> Result<(), BoostError> {
    validate_float_parameter(value, T::ZERO, T::INFINITY, parameter)
}

pub fn validate_float_parameter<T: FloatData<T>>(value: T, min: T, max: T, parameter: &str) -> Result<(), BoostError> {
    if value.is_nan() || value < min || max < value {
        let ex_msg = format!("real value within range {} and {}", min, max);
        Err(BoostError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Calculate if a value is missing. NaN is always treated as missing.
#[inline]
pub fn is_missing(value: &f64, missing: &f64) -> bool {
    value.is_nan() || value == missing
}

/// L1 soft thresholding of a gradient sum.
#[inline]
pub fn soft_threshold(gradient_sum: f64, alpha: f64) -> f64 {
    if gradient_sum > alpha {
        gradient_sum - alpha
    } else if gradient_sum < -alpha {
        gradient_sum + alpha
    } else {
        0.0
    }
}

/// Regularized closed form leaf weight.
#[inline]
pub fn weight(gradient_sum: f64, hessian_sum: f64, alpha: f64, lambda: f64) -> f64 {
    let denom = hessian_sum + lambda;
    if denom <= 0.0 {
        return 0.0;
    }
    -soft_threshold(gradient_sum, alpha) / denom
}

/// Regularized structure score of a node, the loss reduction it achieves
/// compared to a zero leaf.
#[inline]
pub fn gain(gradient_sum: f64, hessian_sum: f64, alpha: f64, lambda: f64) -> f64 {
    let denom = hessian_sum + lambda;
    if denom <= 0.0 {
        return 0.0;
    }
    let t = soft_threshold(gradient_sum, alpha);
    (t * t) / denom
}

#[inline]
pub fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Numerically stable softmax of one row of margins.
pub fn softmax(row: &[f64], out: &mut [f64]) {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut total = 0.0;
    for (o, v) in out.iter_mut().zip(row) {
        *o = (*v - max).exp();
        total += *o;
    }
    for o in out.iter_mut() {
        *o /= total;
    }
}

const LANES: usize = 16;

/// Fast summation, ends up being roughly 8 to 10 times faster
/// than values.iter().copied().sum().
#[inline]
pub fn fast_sum<T: FloatData<T>>(values: &[T]) -> T {
    let chunks = values.chunks_exact(LANES);
    let remainder = chunks.remainder();

    let sum = chunks.fold([T::ZERO; LANES], |mut acc, chunk| {
        for i in 0..LANES {
            acc[i] += chunk[i];
        }
        acc
    });

    let remainder: T = remainder.iter().copied().sum();

    let mut reduced = T::ZERO;
    for s in sum.iter().take(LANES) {
        reduced += *s;
    }
    reduced + remainder
}

/// Fast summation, but using f64 as the internal representation so that
/// we don't have issues with the precision of long f32 sums.
#[inline]
pub fn fast_f64_sum(values: &[f32]) -> f64 {
    let chunks = values.chunks_exact(LANES);
    let remainder = chunks.remainder();

    let sum = chunks.fold([f64::ZERO; LANES], |mut acc, chunk| {
        let chunk: &[f32; LANES] = match chunk.try_into() {
            Ok(c) => c,
            Err(_) => return acc,
        };
        for i in 0..LANES {
            acc[i] += f64::from(chunk[i]);
        }
        acc
    });

    let remainder: f64 = remainder.iter().fold(f64::ZERO, |acc, b| acc + f64::from(*b));

    let mut reduced: f64 = 0.;
    for s in sum.iter().take(LANES) {
        reduced += *s;
    }
    reduced + remainder
}

/// Naive weighted percentiles calculation.
///
/// Currently this function does not support missing values.
///
/// * `v` - A Vector of which to find percentiles for.
/// * `sample_weight` - Sample weights for the instances of the vector.
/// * `percentiles` - Percentiles to look for in the data. This should be
///     values from 0 to 1, and in sorted order.
pub fn percentiles<T>(v: &[T], sample_weight: &[T], percentiles: &[T]) -> Vec<T>
where
    T: FloatData<T>,
{
    let mut p = Vec::new();
    if v.is_empty() {
        return p;
    }
    let mut idx: Vec<usize> = (0..v.len()).collect();
    idx.sort_unstable_by(|a, b| v[*a].partial_cmp(&v[*b]).unwrap_or(std::cmp::Ordering::Equal));

    // Setup percentiles
    let mut pcts = VecDeque::from_iter(percentiles.iter());
    let mut current_pct = match pcts.pop_front() {
        Some(p_) => *p_,
        None => return p,
    };

    let mut cuml_pct = T::ZERO;
    let mut current_value = v[idx[0]];
    let total_values = fast_sum(sample_weight);

    for i in idx.iter() {
        if current_value != v[*i] {
            current_value = v[*i];
        }
        cuml_pct += sample_weight[*i] / total_values;
        if (current_pct == T::ZERO) || (cuml_pct >= current_pct) {
            // The same number might be a valid value for several percentiles.
            while cuml_pct >= current_pct {
                p.push(current_value);
                match pcts.pop_front() {
                    Some(p_) => current_pct = *p_,
                    None => return p,
                }
            }
        } else if current_pct == T::ONE {
            if let Some(i_) = idx.last() {
                p.push(v[*i_]);
                break;
            }
        }
    }
    p
}

/// Return the index of the first value in a sorted
/// vector that is greater than a provided value.
/// Missing values always map to bin zero, so bin `j` holds the values
/// `x[j - 1] <= v < x[j]`.
///
/// * `x` - The sorted slice of values.
/// * `v` - The value used to calculate the first
///   value larger than it.
#[inline]
pub fn map_bin<T: FloatData<T>>(x: &[T], v: &T, missing: &T) -> Option<u16> {
    if v.is_nan() || (v == missing) {
        return Some(0);
    }
    let mut low = 0;
    let mut high = x.len();
    while low != high {
        let mid = (low + high) / 2;
        if x[mid] <= *v {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    // Values below the first cut share the first bin, bin zero stays
    // reserved for missing values.
    u16::try_from(low.max(1)).ok()
}

/// Pivot row indices so every row going to the left child comes first.
/// Returns the number of rows sent left.
///
/// * `index` - The row indices of the node being split.
/// * `feature` - Binned values of the split feature for all rows.
/// * `left_bins` - Lookup table, true for the non-missing bins that go left.
/// * `default_left` - Direction for the missing bin.
#[inline]
pub fn pivot_on_split(index: &mut [usize], feature: &[u16], left_bins: &[bool], default_left: bool) -> usize {
    let goes_left = |row: usize| -> bool {
        let b = feature[row];
        if b == 0 {
            default_left
        } else {
            left_bins.get(b as usize).copied().unwrap_or(false)
        }
    };
    let mut low = 0;
    let mut high = index.len();
    while low < high {
        if goes_left(index[low]) {
            low += 1;
        } else {
            high -= 1;
            index.swap(low, high);
        }
    }
    low
}

#[inline]
pub fn precision_round(n: f64, precision: i32) -> f64 {
    let p = (10.0_f64).powi(precision);
    (n * p).round() / p
}
