//! Safetensors archives of named `f32` tensors.
//!
//! Snapshots and updates travel as opaque bytes; only the aggregation side and the
//! concrete models ever look inside them through this module.

use std::collections::BTreeMap;

use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::PayloadErr;

/// Tensors keyed by name, in a stable order.
pub type TensorMap = BTreeMap<String, Tensor>;

/// A dense row-major `f32` array.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Creates a new `Tensor`.
    ///
    /// # Arguments
    /// * `shape` - The dimensions of the array.
    /// * `data` - The row-major values, its length must be the product of `shape`.
    ///
    /// # Returns
    /// A `PayloadErr::SizeMismatch` if `data` doesn't fill `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, PayloadErr> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(PayloadErr::SizeMismatch {
                name: String::new(),
                got: data.len(),
                expected,
            });
        }

        Ok(Self { shape, data })
    }

    /// Creates a one dimensional tensor.
    pub fn vector(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }
}

/// Parses a safetensors archive into a `TensorMap`.
///
/// # Arguments
/// * `bytes` - The raw archive.
///
/// # Returns
/// The decoded tensors or a `PayloadErr` if the archive is malformed or holds a non `F32` tensor.
pub fn decode(bytes: &[u8]) -> Result<TensorMap, PayloadErr> {
    let archive = SafeTensors::deserialize(bytes)?;
    let mut tensors = TensorMap::new();

    for (name, view) in archive.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(PayloadErr::UnsupportedDtype {
                name,
                dtype: format!("{:?}", view.dtype()),
            });
        }

        // The archive gives no alignment guarantee, so the values are copied out.
        let data: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
        let shape = view.shape().to_vec();
        tensors.insert(name, Tensor { shape, data });
    }

    Ok(tensors)
}

/// Writes `tensors` as a safetensors archive.
///
/// # Arguments
/// * `tensors` - The named tensors to serialize.
///
/// # Returns
/// The archive bytes or a `PayloadErr` if any tensor's data doesn't match its shape.
pub fn encode(tensors: &TensorMap) -> Result<Vec<u8>, PayloadErr> {
    let mut views = Vec::with_capacity(tensors.len());

    for (name, tensor) in tensors {
        let bytes: &[u8] = bytemuck::cast_slice(&tensor.data);
        let view = TensorView::new(Dtype::F32, tensor.shape.clone(), bytes).map_err(|_| {
            PayloadErr::SizeMismatch {
                name: name.clone(),
                got: tensor.data.len(),
                expected: tensor.shape.iter().product(),
            }
        })?;
        views.push((name.as_str(), view));
    }

    Ok(safetensors::serialize(views, &None)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TensorMap {
        let mut tensors = TensorMap::new();
        tensors.insert(
            "fc.weight".into(),
            Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        );
        tensors.insert("fc.bias".into(), Tensor::vector(vec![0.5, -0.5]));
        tensors
    }

    #[test]
    fn test_encode_decode_keeps_names_and_shapes() {
        let tensors = sample();
        let bytes = encode(&tensors).unwrap();
        assert_eq!(decode(&bytes).unwrap(), tensors);
    }

    #[test]
    fn test_empty_archive() {
        let bytes = encode(&TensorMap::new()).unwrap();
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_tensor_rejects_wrong_len() {
        let err = Tensor::new(vec![2, 2], vec![1.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            PayloadErr::SizeMismatch {
                got: 3,
                expected: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_garbage_is_a_format_error() {
        let err = decode(b"definitely not an archive").unwrap_err();
        assert!(matches!(err, PayloadErr::Format(_)));
    }
}
