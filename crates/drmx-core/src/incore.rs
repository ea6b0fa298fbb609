//! Small dense, row-major in-core matrix.
//!
//! Used as the right/left operand of in-core multiplies, as the block type
//! handed to map-block functions, and as the gathered form of results.
//! Production kernels belong to the substrate; this is deliberately plain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct InCoreMatrix {
    nrow: usize,
    ncol: usize,
    values: Vec<f64>,
}

impl InCoreMatrix {
    pub fn zeros(nrow: usize, ncol: usize) -> Self {
        Self {
            nrow,
            ncol,
            values: vec![0.0; nrow * ncol],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Build from row vectors; all rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let nrow = rows.len();
        let ncol = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut values = Vec::with_capacity(nrow * ncol);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != ncol {
                return Err(Error::Shape(format!(
                    "row {i} has {} columns, expected {ncol}",
                    row.len()
                )));
            }
            values.extend(row);
        }
        Ok(Self { nrow, ncol, values })
    }

    pub fn from_fn(nrow: usize, ncol: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut values = Vec::with_capacity(nrow * ncol);
        for i in 0..nrow {
            for j in 0..ncol {
                values.push(f(i, j));
            }
        }
        Self { nrow, ncol, values }
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.ncol + j]
    }

    pub fn set(&mut self, i: usize, j: usize, v: f64) {
        self.values[i * self.ncol + j] = v;
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.ncol..(i + 1) * self.ncol]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.nrow).map(move |i| self.row(i))
    }

    pub fn transpose(&self) -> Self {
        Self::from_fn(self.ncol, self.nrow, |i, j| self.get(j, i))
    }

    pub fn times(&self, other: &InCoreMatrix) -> Result<Self> {
        if self.ncol != other.nrow {
            return Err(Error::Shape(format!(
                "cannot multiply {}x{} by {}x{}",
                self.nrow, self.ncol, other.nrow, other.ncol
            )));
        }
        let mut out = Self::zeros(self.nrow, other.ncol);
        for i in 0..self.nrow {
            for k in 0..self.ncol {
                let a = self.get(i, k);
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.ncol {
                    out.values[i * other.ncol + j] += a * other.get(k, j);
                }
            }
        }
        Ok(out)
    }

    /// Row vector times this matrix.
    pub fn left_times_row(&self, row: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.ncol];
        for (k, &a) in row.iter().enumerate().take(self.nrow) {
            if a == 0.0 {
                continue;
            }
            for (j, o) in out.iter_mut().enumerate() {
                *o += a * self.get(k, j);
            }
        }
        out
    }

    pub fn nnz(&self) -> u64 {
        self.values.iter().filter(|v| **v != 0.0).count() as u64
    }

    /// Element-wise comparison within `eps`.
    pub fn approx_eq(&self, other: &InCoreMatrix, eps: f64) -> bool {
        self.nrow == other.nrow
            && self.ncol == other.ncol
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl fmt::Debug for InCoreMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InCoreMatrix({}x{})", self.nrow, self.ncol)?;
        if self.nrow * self.ncol <= 64 {
            f.debug_list().entries(self.rows()).finish()?;
        }
        Ok(())
    }
}
