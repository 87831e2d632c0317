use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Element type of a [`Tensor`] buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    F32,
    F64,
}

impl Dtype {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Dtype::F32 => 4,
            Dtype::F64 => 8,
        }
    }
}

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("buffer holds {actual} bytes but shape {shape:?} as {dtype:?} needs {expected}")]
    LengthMismatch {
        dtype: Dtype,
        shape: Vec<u64>,
        expected: usize,
        actual: usize,
    },
}

/// A typed multidimensional array: dtype, shape and a raw little-endian
/// buffer.
///
/// The coordinator treats tensors as opaque values; only the aggregator
/// decodes the buffer, and it re-validates the length first since tensors
/// arrive off the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    dtype: Dtype,
    shape: Vec<u64>,
    #[serde(with = "serde_bytes")]
    data: Vec<u8>,
}

/// The global model: an ordered sequence of tensors.
pub type Weights = Vec<Tensor>;

impl Tensor {
    pub fn new(dtype: Dtype, shape: Vec<u64>, data: Vec<u8>) -> Result<Self, TensorError> {
        let tensor = Self { dtype, shape, data };
        tensor.check_len()?;
        Ok(tensor)
    }

    pub fn from_f32(shape: Vec<u64>, values: &[f32]) -> Result<Self, TensorError> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(Dtype::F32, shape, data)
    }

    pub fn from_f64(shape: Vec<u64>, values: &[f64]) -> Result<Self, TensorError> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(Dtype::F64, shape, data)
    }

    /// Re-encodes `values` with this dtype and shape. Values are truncated to
    /// `f32` range when the dtype asks for it.
    pub fn from_f64_vec(dtype: Dtype, shape: Vec<u64>, values: &[f64]) -> Result<Self, TensorError> {
        match dtype {
            Dtype::F32 => {
                let narrowed: Vec<f32> = values.iter().map(|v| *v as f32).collect();
                Self::from_f32(shape, &narrowed)
            }
            Dtype::F64 => Self::from_f64(shape, values),
        }
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Number of elements the shape describes.
    pub fn numel(&self) -> usize {
        self.shape.iter().product::<u64>() as usize
    }

    /// Decodes the buffer into `f64` values, validating its length against
    /// the shape.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>, TensorError> {
        self.check_len()?;
        let values = match self.dtype {
            Dtype::F32 => self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()) as f64)
                .collect(),
            Dtype::F64 => self
                .data
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        };
        Ok(values)
    }

    fn check_len(&self) -> Result<(), TensorError> {
        let expected = self.numel() * self.dtype.size_in_bytes();
        if self.data.len() != expected {
            return Err(TensorError::LengthMismatch {
                dtype: self.dtype,
                shape: self.shape.clone(),
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}
