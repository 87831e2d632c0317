use covey_core::{Tensor, TensorError, Weights};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("nothing to aggregate")]
    Empty,
    #[error("got {updates} updates but {counts} sample counts")]
    CountsMismatch { updates: usize, counts: usize },
    #[error("update {update} has {actual} tensors, expected {expected}")]
    TensorCountMismatch {
        update: usize,
        expected: usize,
        actual: usize,
    },
    #[error("update {update}, tensor {tensor}: dtype or shape incompatible with the first update")]
    ShapeMismatch { update: usize, tensor: usize },
    #[error(transparent)]
    BadTensor(#[from] TensorError),
}

/// Folds the local updates of a finished round into new global weights.
pub trait Aggregator: Send {
    fn aggregate(
        &self,
        updates: &[Weights],
        sample_counts: &[u32],
    ) -> Result<Weights, AggregationError>;
}

/// Federated averaging: element-wise mean weighted by each update's sample
/// count.
///
/// All-zero sample counts degrade to the unweighted mean instead of erroring,
/// so protocol smoke clients that train nothing still close their round.
pub struct FederatedAveraging;

impl Aggregator for FederatedAveraging {
    fn aggregate(
        &self,
        updates: &[Weights],
        sample_counts: &[u32],
    ) -> Result<Weights, AggregationError> {
        if updates.is_empty() {
            return Err(AggregationError::Empty);
        }
        if updates.len() != sample_counts.len() {
            return Err(AggregationError::CountsMismatch {
                updates: updates.len(),
                counts: sample_counts.len(),
            });
        }

        let total: u64 = sample_counts.iter().map(|c| *c as u64).sum();
        let factors: Vec<f64> = if total == 0 {
            vec![1.0 / updates.len() as f64; updates.len()]
        } else {
            sample_counts
                .iter()
                .map(|c| *c as f64 / total as f64)
                .collect()
        };

        let template = &updates[0];
        for (i, update) in updates.iter().enumerate().skip(1) {
            if update.len() != template.len() {
                return Err(AggregationError::TensorCountMismatch {
                    update: i,
                    expected: template.len(),
                    actual: update.len(),
                });
            }
        }

        let mut aggregated = Vec::with_capacity(template.len());
        for t in 0..template.len() {
            let reference = &template[t];
            let mut acc = vec![0.0f64; reference.numel()];
            for (u, update) in updates.iter().enumerate() {
                let tensor = &update[t];
                if tensor.dtype() != reference.dtype() || tensor.shape() != reference.shape() {
                    return Err(AggregationError::ShapeMismatch { update: u, tensor: t });
                }
                let values = tensor.to_f64_vec()?;
                for (slot, value) in acc.iter_mut().zip(values) {
                    *slot += value * factors[u];
                }
            }
            aggregated.push(Tensor::from_f64_vec(
                reference.dtype(),
                reference.shape().to_vec(),
                &acc,
            )?);
        }
        Ok(aggregated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covey_core::Dtype;
    use pretty_assertions::assert_eq;

    fn weights(values: &[f64]) -> Weights {
        vec![Tensor::from_f64(vec![values.len() as u64], values).unwrap()]
    }

    fn decoded(weights: &Weights) -> Vec<f64> {
        weights[0].to_f64_vec().unwrap()
    }

    #[test]
    fn single_update_aggregates_to_itself() {
        let update = weights(&[2.0, 4.0, 6.0, 8.0]);
        let result = FederatedAveraging
            .aggregate(std::slice::from_ref(&update), &[1])
            .unwrap();
        assert_eq!(result, update);
    }

    #[test]
    fn weighted_mean_by_sample_count() {
        let updates = [weights(&[1.0, 10.0]), weights(&[4.0, 40.0])];
        // p1 trained on 1 example, p2 on 3: mean = 0.25 * p1 + 0.75 * p2
        let result = FederatedAveraging.aggregate(&updates, &[1, 3]).unwrap();
        assert_eq!(decoded(&result), vec![3.25, 32.5]);
    }

    #[test]
    fn zero_sample_counts_fall_back_to_unweighted_mean() {
        let updates = [weights(&[2.0]), weights(&[4.0])];
        let result = FederatedAveraging.aggregate(&updates, &[0, 0]).unwrap();
        assert_eq!(decoded(&result), vec![3.0]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            FederatedAveraging.aggregate(&[], &[]),
            Err(AggregationError::Empty)
        ));
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let updates = [weights(&[1.0, 2.0]), weights(&[1.0, 2.0, 3.0])];
        assert!(matches!(
            FederatedAveraging.aggregate(&updates, &[1, 1]),
            Err(AggregationError::ShapeMismatch { update: 1, tensor: 0 })
        ));
    }

    #[test]
    fn dtype_mismatch_is_an_error() {
        let f32_update = vec![Tensor::from_f32(vec![1], &[1.0]).unwrap()];
        let f64_update = vec![Tensor::from_f64(vec![1], &[1.0]).unwrap()];
        assert!(matches!(
            FederatedAveraging.aggregate(&[f64_update, f32_update], &[1, 1]),
            Err(AggregationError::ShapeMismatch { update: 1, tensor: 0 })
        ));
    }

    #[test]
    fn tensor_count_mismatch_is_an_error() {
        let one = vec![Tensor::from_f32(vec![1], &[1.0]).unwrap()];
        let two = vec![
            Tensor::from_f32(vec![1], &[1.0]).unwrap(),
            Tensor::from_f32(vec![1], &[2.0]).unwrap(),
        ];
        assert!(matches!(
            FederatedAveraging.aggregate(&[one, two], &[1, 1]),
            Err(AggregationError::TensorCountMismatch { update: 1, expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn result_keeps_the_input_dtype() {
        let updates = [
            vec![Tensor::from_f32(vec![2], &[1.0, 3.0]).unwrap()],
            vec![Tensor::from_f32(vec![2], &[3.0, 5.0]).unwrap()],
        ];
        let result = FederatedAveraging.aggregate(&updates, &[1, 1]).unwrap();
        assert_eq!(result[0].dtype(), Dtype::F32);
        assert_eq!(decoded(&result), vec![2.0, 4.0]);
    }
}
