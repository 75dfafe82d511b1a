//! Parameter maps and their validation.
//!
//! A model's trainable state is represented as a [`ParameterMap`]: stable
//! parameter keys (e.g. `dense.weight`) mapped to dense `f32` tensors.

pub mod signature;

pub use signature::{ArchitectureSignature, SignatureMismatch};

use crate::{Result, StoreError};
use ndarray::ArrayD;
use std::collections::BTreeMap;

/// Trainable parameters keyed by parameter name.
///
/// Iteration is in key order; shard layout and mismatch reports follow it.
pub type ParameterMap = BTreeMap<String, ArrayD<f32>>;

/// Check that a parameter map can be persisted.
///
/// The map must be non-empty, every key must be non-empty, and every value
/// must be finite.
pub fn validate_parameters(params: &ParameterMap) -> Result<()> {
    if params.is_empty() {
        return Err(StoreError::InvalidParameters {
            reason: "parameter map is empty".to_string(),
        });
    }

    for (key, tensor) in params {
        if key.is_empty() {
            return Err(StoreError::InvalidParameters {
                reason: "parameter key must not be empty".to_string(),
            });
        }

        if let Some((index, value)) = tensor.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(StoreError::InvalidParameters {
                reason: format!(
                    "parameter '{}' has non-finite value {} at flat index {}",
                    key, value, index
                ),
            });
        }
    }

    Ok(())
}

/// Total number of scalar values across all tensors.
pub fn num_elements(params: &ParameterMap) -> u64 {
    params.values().map(|t| t.len() as u64).sum()
}

/// Compare two parameter maps for equality within `tolerance`.
///
/// Keys and shapes must match exactly.
pub fn approx_eq(a: &ParameterMap, b: &ParameterMap, tolerance: f32) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|((ka, ta), (kb, tb))| {
            ka == kb
                && ta.shape() == tb.shape()
                && ta.iter().zip(tb.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
        })
}
