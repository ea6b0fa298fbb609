//! Minimal YAML → expression parser.
//!
//! Example:
//! ```yaml
//! inputs:
//!   x: { rows: 100, cols: 4, seed: 7, partitions: 3 }
//!   m: { rows: 4, cols: 2, key_type: text }
//! expr:
//!   matmul:
//!     - t: { input: x }
//!     - input: x
//! ```
//!
//! Inputs are only declared here. Turning a declaration into a leaf
//! checkpoint is up to the caller's resolver (the CLI generates random data
//! and parallelizes it).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use drmx_core::prelude::*;

use crate::algebra::InCoreTimes;
use crate::logical::{Drm, EwiseOp, ScalarOp};
use crate::shape::validate_shapes;

#[derive(Debug, Error)]
pub enum DslError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown input `{0}`")]
    UnknownInput(String),

    #[error("invalid expression: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] Error),
}

pub type DslResult<T> = std::result::Result<T, DslError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionDoc {
    #[serde(default)]
    pub inputs: BTreeMap<String, InputDef>,
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub expr: ExprDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDef {
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub partitions: Option<usize>,
    #[serde(default = "default_key_type")]
    pub key_type: KeyType,
}

fn default_key_type() -> KeyType {
    KeyType::Int
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprDef {
    Input(String),
    T(Box<ExprDef>),
    Matmul(Box<ExprDef>, Box<ExprDef>),
    Add(Box<ExprDef>, Box<ExprDef>),
    Sub(Box<ExprDef>, Box<ExprDef>),
    Hadamard(Box<ExprDef>, Box<ExprDef>),
    Div(Box<ExprDef>, Box<ExprDef>),
    Scalar {
        of: Box<ExprDef>,
        op: ScalarOp,
        value: f64,
    },
    Rows {
        of: Box<ExprDef>,
        start: usize,
        end: usize,
    },
    TimesInCore {
        of: Box<ExprDef>,
        matrix: Vec<Vec<f64>>,
    },
    InCoreTimes {
        matrix: Vec<Vec<f64>>,
        of: Box<ExprDef>,
    },
}

/// Parse a YAML document. Input declarations are checked here; the
/// expression is checked when it is built.
pub fn parse_yaml_expression(yaml_src: &str) -> DslResult<ExpressionDoc> {
    let doc: ExpressionDoc = serde_yaml::from_str(yaml_src)?;
    for (name, def) in &doc.inputs {
        if def.rows == 0 || def.cols == 0 {
            return Err(DslError::Invalid(format!(
                "input `{name}` must have at least one row and column"
            )));
        }
        if def.partitions == Some(0) {
            return Err(DslError::Invalid(format!("input `{name}` has zero partitions")));
        }
    }
    Ok(doc)
}

impl ExpressionDoc {
    /// Build the expression tree. `resolve` is called once per referenced
    /// input, so repeated references share one leaf node.
    pub fn build<F>(&self, mut resolve: F) -> DslResult<Drm>
    where
        F: FnMut(&str, &InputDef) -> drmx_core::Result<Drm>,
    {
        let mut leaves = BTreeMap::new();
        let drm = self.build_expr(&self.expr, &mut resolve, &mut leaves)?;
        validate_shapes(&drm)?;
        Ok(drm)
    }

    fn build_expr<F>(
        &self,
        expr: &ExprDef,
        resolve: &mut F,
        leaves: &mut BTreeMap<String, Drm>,
    ) -> DslResult<Drm>
    where
        F: FnMut(&str, &InputDef) -> drmx_core::Result<Drm>,
    {
        macro_rules! sub {
            ($e:expr) => {
                self.build_expr($e, resolve, leaves)?
            };
        }

        Ok(match expr {
            ExprDef::Input(name) => self.resolve_input(name, resolve, leaves)?,
            ExprDef::T(a) => sub!(a).t(),
            ExprDef::Matmul(a, b) => sub!(a).times(&sub!(b)),
            ExprDef::Add(a, b) => sub!(a).ewise(&sub!(b), EwiseOp::Add),
            ExprDef::Sub(a, b) => sub!(a).ewise(&sub!(b), EwiseOp::Sub),
            ExprDef::Hadamard(a, b) => sub!(a).ewise(&sub!(b), EwiseOp::Hadamard),
            ExprDef::Div(a, b) => sub!(a).ewise(&sub!(b), EwiseOp::Div),
            ExprDef::Scalar { of, op, value } => sub!(of).scalar(*value, *op),
            ExprDef::Rows { of, start, end } => sub!(of).rows(*start..*end),
            ExprDef::TimesInCore { of, matrix } => {
                let m = InCoreMatrix::from_rows(matrix.clone())?;
                sub!(of).times_in_core(m)
            }
            ExprDef::InCoreTimes { matrix, of } => {
                let m = InCoreMatrix::from_rows(matrix.clone())?;
                m.times_drm(&sub!(of))
            }
        })
    }

    fn resolve_input<F>(
        &self,
        name: &str,
        resolve: &mut F,
        leaves: &mut BTreeMap<String, Drm>,
    ) -> DslResult<Drm>
    where
        F: FnMut(&str, &InputDef) -> drmx_core::Result<Drm>,
    {
        if let Some(leaf) = leaves.get(name) {
            return Ok(leaf.clone());
        }
        let def = self
            .inputs
            .get(name)
            .ok_or_else(|| DslError::UnknownInput(name.to_string()))?;
        let leaf = resolve(name, def)?;
        if leaf.nrow() != def.rows || leaf.ncol() != def.cols {
            return Err(DslError::Invalid(format!(
                "resolver returned {}x{} for `{name}`, declared {}x{}",
                leaf.nrow(),
                leaf.ncol(),
                def.rows,
                def.cols
            )));
        }
        leaves.insert(name.to_string(), leaf.clone());
        Ok(leaf)
    }
}
