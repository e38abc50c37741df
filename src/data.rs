//! Data
//!
//! Matrix views over caller owned feature storage, and the owned buffers
//! used for labels, margins and bin maps.
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Floating point types the binning and summation helpers work on.
pub trait FloatData<T>:
    Mul<Output = T>
    + Display
    + Add<Output = T>
    + Div<Output = T>
    + Neg<Output = T>
    + Copy
    + Debug
    + PartialEq
    + PartialOrd
    + AddAssign
    + Sub<Output = T>
    + SubAssign
    + Sum
    + Send
    + Sync
{
    const ZERO: T;
    const ONE: T;
    const INFINITY: T;
    fn from_u16(v: u16) -> T;
    fn is_nan(self) -> bool;
}

impl FloatData<f64> for f64 {
    const ZERO: f64 = 0.0;
    const ONE: f64 = 1.0;
    const INFINITY: f64 = f64::INFINITY;

    fn from_u16(v: u16) -> f64 {
        f64::from(v)
    }
    fn is_nan(self) -> bool {
        self.is_nan()
    }
}

impl FloatData<f32> for f32 {
    const ZERO: f32 = 0.0;
    const ONE: f32 = 1.0;
    const INFINITY: f32 = f32::INFINITY;

    fn from_u16(v: u16) -> f32 {
        f32::from(v)
    }
    fn is_nan(self) -> bool {
        self.is_nan()
    }
}

/// Dense matrix view over caller owned storage.
///
/// The view knows its layout through two strides, so the same type reads
/// column-major (Fortran order) and row-major (C order) buffers without
/// copying them. Training needs whole columns and converts row-major
/// input with [`Matrix::to_col_major`] first.
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Row numbers, `0..rows`.
    pub index: Vec<usize>,
    pub rows: usize,
    pub cols: usize,
    // Distance between consecutive rows, and between consecutive columns.
    row_stride: usize,
    col_stride: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Column-major view, element `(i, j)` lives at `j * rows + i`.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix {
            data,
            index: (0..rows).collect(),
            rows,
            cols,
            row_stride: 1,
            col_stride: rows,
        }
    }

    /// Row-major view, element `(i, j)` lives at `i * cols + j`.
    pub fn new_row_major(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix {
            data,
            index: (0..rows).collect(),
            rows,
            cols,
            row_stride: cols,
            col_stride: 1,
        }
    }

    /// Is every column a contiguous slice of the storage.
    pub fn is_col_major(&self) -> bool {
        self.row_stride == 1 || self.cols <= 1
    }

    /// Element of row `i` and column `j`, for either layout.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[i * self.row_stride + j * self.col_stride]
    }

    /// Entire column as a slice, only valid for column-major storage.
    pub fn get_col(&self, col: usize) -> &[T] {
        debug_assert!(self.is_col_major(), "column slices require column-major storage");
        let start = col * self.rows;
        &self.data[start..(start + self.rows)]
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Copy the values into a column-major buffer.
    pub fn to_col_major(&self) -> Vec<T> {
        if self.is_col_major() {
            return self.data[..(self.rows * self.cols)].to_vec();
        }
        let mut out = Vec::with_capacity(self.rows * self.cols);
        for j in 0..self.cols {
            out.extend((0..self.rows).map(|i| *self.get(i, j)));
        }
        out
    }

    /// Copy the values into an owned row-major matrix.
    pub fn to_row_major(&self) -> RowMajorMatrix<T> {
        if !self.is_col_major() || self.cols == 1 {
            return RowMajorMatrix::new(self.data[..(self.rows * self.cols)].to_vec(), self.rows, self.cols);
        }
        let mut data = Vec::with_capacity(self.rows * self.cols);
        for i in 0..self.rows {
            data.extend((0..self.cols).map(|j| *self.get(i, j)));
        }
        RowMajorMatrix::new(data, self.rows, self.cols)
    }
}

/// Owned row-major matrix. Holds labels and margins, where one contiguous
/// row carries every target or output of a sample, and the transposed copy
/// of the batch prediction path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowMajorMatrix<T> {
    pub data: Vec<T>,
    pub rows: usize,
    pub cols: usize,
}

impl<T> RowMajorMatrix<T> {
    pub fn new(data: Vec<T>, rows: usize, cols: usize) -> Self {
        RowMajorMatrix { data, rows, cols }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[i * self.cols + j]
    }

    /// Get a full row as a slice.
    #[inline]
    pub fn get_row(&self, i: usize) -> &[T] {
        &self.data[(i * self.cols)..((i + 1) * self.cols)]
    }
}

/// Columns of different lengths stored back to back, the layout of a bin map.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JaggedMatrix<T> {
    pub data: Vec<T>,
    /// Exclusive end of every column in `data`.
    pub ends: Vec<usize>,
    pub cols: usize,
}

impl<T> JaggedMatrix<T> {
    pub fn new() -> Self {
        JaggedMatrix {
            data: Vec::new(),
            ends: Vec::new(),
            cols: 0,
        }
    }

    /// Append a column.
    pub fn push_col<I: IntoIterator<Item = T>>(&mut self, values: I) {
        self.data.extend(values);
        self.ends.push(self.data.len());
        self.cols += 1;
    }

    pub fn get_col(&self, col: usize) -> &[T] {
        let start = if col == 0 { 0 } else { self.ends[col - 1] };
        &self.data[start..self.ends[col]]
    }
}

impl<T> Default for JaggedMatrix<T> {
    fn default() -> Self {
        Self::new()
    }
}
