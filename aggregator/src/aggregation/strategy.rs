use model::{Tensor, TensorMap};
use rayon::prelude::*;

use super::{AggregationErr, Result};

/// Combines a batch of client models into a single global model.
pub trait AggStrategy: Send + Sync {
    /// Folds `updates` into one model.
    ///
    /// # Arguments
    /// * `updates` - A non empty batch whose models share the same schema.
    fn combine(&self, updates: &[TensorMap]) -> TensorMap;
}

/// Federated averaging: the element-wise arithmetic mean of every tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FedAvg;

impl AggStrategy for FedAvg {
    fn combine(&self, updates: &[TensorMap]) -> TensorMap {
        let Some((first, _)) = updates.split_first() else {
            return TensorMap::new();
        };

        let n = updates.len() as f64;

        first
            .par_iter()
            .map(|(name, tensor)| {
                let mut sum = vec![0f64; tensor.data.len()];

                for update in updates {
                    let Some(other) = update.get(name) else {
                        continue;
                    };

                    sum.iter_mut()
                        .zip(&other.data)
                        .for_each(|(acc, x)| *acc += f64::from(*x));
                }

                let data = sum.into_iter().map(|acc| (acc / n) as f32).collect();
                let mean = Tensor {
                    shape: tensor.shape.clone(),
                    data,
                };

                (name.clone(), mean)
            })
            .collect()
    }
}

/// Checks that `update` has exactly the tensors of `reference`, with the same shapes.
pub fn check_schema(reference: &TensorMap, update: &TensorMap) -> Result<()> {
    for (name, tensor) in reference {
        let Some(other) = update.get(name) else {
            return Err(AggregationErr::mismatch(name, "missing from update"));
        };

        if other.shape != tensor.shape {
            return Err(AggregationErr::mismatch(
                name,
                format!("expected shape {:?}, got {:?}", tensor.shape, other.shape),
            ));
        }
    }

    if let Some(name) = update.keys().find(|name| !reference.contains_key(*name)) {
        return Err(AggregationErr::mismatch(name, "not present in reference"));
    }

    Ok(())
}

/// Validates a batch and folds it with `strategy`.
///
/// # Arguments
/// * `strategy` - How to combine the models.
/// * `updates` - The decoded client models.
///
/// # Returns
/// The aggregated model, `EmptyBatch` if there was nothing to aggregate or
/// `SchemaMismatch` if the models don't agree on their tensors.
pub fn aggregate<S: AggStrategy + ?Sized>(strategy: &S, updates: &[TensorMap]) -> Result<TensorMap> {
    let Some((first, rest)) = updates.split_first() else {
        return Err(AggregationErr::EmptyBatch);
    };

    for update in rest {
        check_schema(first, update)?;
    }

    Ok(strategy.combine(updates))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(entries: &[(&str, Vec<usize>, Vec<f32>)]) -> TensorMap {
        entries
            .iter()
            .map(|(name, shape, data)| {
                let tensor = Tensor::new(shape.clone(), data.clone()).unwrap();
                (name.to_string(), tensor)
            })
            .collect()
    }

    #[test]
    fn test_fedavg_mean() {
        let a = model(&[("w", vec![2], vec![1.0, 2.0]), ("b", vec![1], vec![0.0])]);
        let b = model(&[("w", vec![2], vec![3.0, 6.0]), ("b", vec![1], vec![1.0])]);

        let merged = aggregate(&FedAvg, &[a, b]).unwrap();

        assert_eq!(merged["w"].data, [2.0, 4.0]);
        assert_eq!(merged["b"].data, [0.5]);
        assert_eq!(merged["w"].shape, [2]);
    }

    #[test]
    fn test_fedavg_identical_updates_is_identity() {
        let m = model(&[("w", vec![2, 2], vec![0.1, -0.3, 7.25, 1e-3])]);
        let batch = vec![m.clone(); 3];

        let merged = aggregate(&FedAvg, &batch).unwrap();
        assert_eq!(merged, m);
    }

    #[test]
    fn test_empty_batch() {
        let err = aggregate(&FedAvg, &[]).unwrap_err();
        assert!(matches!(err, AggregationErr::EmptyBatch));
    }

    #[test]
    fn test_missing_tensor_is_a_mismatch() {
        let a = model(&[("w", vec![1], vec![1.0]), ("b", vec![1], vec![1.0])]);
        let b = model(&[("w", vec![1], vec![1.0])]);

        let err = aggregate(&FedAvg, &[a, b]).unwrap_err();
        assert!(matches!(err, AggregationErr::SchemaMismatch { tensor, .. } if tensor == "b"));
    }

    #[test]
    fn test_extra_tensor_is_a_mismatch() {
        let a = model(&[("w", vec![1], vec![1.0])]);
        let b = model(&[("w", vec![1], vec![1.0]), ("z", vec![1], vec![1.0])]);

        let err = aggregate(&FedAvg, &[a, b]).unwrap_err();
        assert!(matches!(err, AggregationErr::SchemaMismatch { tensor, .. } if tensor == "z"));
    }

    #[test]
    fn test_shape_mismatch() {
        let a = model(&[("w", vec![2], vec![1.0, 2.0])]);
        let b = model(&[("w", vec![1, 2], vec![1.0, 2.0])]);

        let err = aggregate(&FedAvg, &[a, b]).unwrap_err();
        assert!(matches!(err, AggregationErr::SchemaMismatch { .. }));
    }
}
