//! SafeTensors shard codec.
//!
//! A snapshot's tensors are packed, in key order, into one or more
//! safetensors files. Every tensor is stored as little-endian F32.

use crate::params::ParameterMap;
use crate::{Result, StoreError};
use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::{SafeTensors, TensorView};
use safetensors::Dtype;
use std::collections::HashMap;

/// Extension of shard files.
pub(crate) const SHARD_EXTENSION: &str = "safetensors";

const META_SNAPSHOT: &str = "paramvault.snapshot";
const META_SEQUENCE: &str = "paramvault.sequence";

/// File name for shard `shard` of snapshot `name` at `sequence`.
pub(crate) fn shard_file_name(name: &str, sequence: u64, shard: usize) -> String {
    format!("{}.{:08}.{:03}.{}", name, sequence, shard, SHARD_EXTENSION)
}

/// Group parameter keys into shards of at most `max_bytes` payload.
///
/// A tensor larger than the limit is placed in a shard of its own.
pub(crate) fn plan_shards(params: &ParameterMap, max_bytes: u64) -> Vec<Vec<&str>> {
    let mut shards = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_bytes = 0u64;

    for (key, tensor) in params {
        let bytes = (tensor.len() * std::mem::size_of::<f32>()) as u64;
        if !current.is_empty() && current_bytes + bytes > max_bytes {
            shards.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current.push(key.as_str());
        current_bytes += bytes;
    }

    if !current.is_empty() {
        shards.push(current);
    }
    shards
}

/// Serialize the tensors named by `keys` into one safetensors buffer.
pub(crate) fn encode_shard(
    params: &ParameterMap,
    keys: &[&str],
    snapshot: &str,
    sequence: u64,
) -> Result<Vec<u8>> {
    let corrupt = |reason: String| StoreError::CorruptSnapshot {
        name: snapshot.to_string(),
        reason,
    };

    let buffers: Vec<(&str, Vec<usize>, Vec<u8>)> = keys
        .iter()
        .filter_map(|key| params.get(*key).map(|t| (*key, t)))
        .map(|(key, tensor)| {
            let data: Vec<u8> = tensor.iter().flat_map(|x| x.to_le_bytes()).collect();
            (key, tensor.shape().to_vec(), data)
        })
        .collect();

    let mut views = Vec::with_capacity(buffers.len());
    for (key, shape, data) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), data)
            .map_err(|e| corrupt(format!("cannot encode '{}': {}", key, e)))?;
        views.push((*key, view));
    }

    let metadata: HashMap<String, String> = [
        (META_SNAPSHOT.to_string(), snapshot.to_string()),
        (META_SEQUENCE.to_string(), sequence.to_string()),
    ]
    .into_iter()
    .collect();

    safetensors::serialize(views, &Some(metadata))
        .map_err(|e| corrupt(format!("serialization failed: {}", e)))
}

/// Decode every tensor in a safetensors buffer.
pub(crate) fn decode_shard(bytes: &[u8], snapshot: &str) -> Result<ParameterMap> {
    let corrupt = |reason: String| StoreError::CorruptSnapshot {
        name: snapshot.to_string(),
        reason,
    };

    let tensors =
        SafeTensors::deserialize(bytes).map_err(|e| corrupt(format!("invalid shard: {}", e)))?;

    let mut params = ParameterMap::new();
    for (key, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(corrupt(format!(
                "tensor '{}' has dtype {:?}, expected F32",
                key,
                view.dtype()
            )));
        }

        let shape = view.shape().to_vec();
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let array = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
            corrupt(format!("tensor '{}' does not fit shape {:?}: {}", key, shape, e))
        })?;
        params.insert(key, array);
    }

    Ok(params)
}
