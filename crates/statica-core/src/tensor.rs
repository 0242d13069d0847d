//! CPU-side tensor used for inference inputs and outputs.

use crate::types::{DataType, Element, Shape};
use crate::{CoreError, Result};

/// Owned tensor living in host memory.
///
/// Data is stored as raw little-endian bytes together with its shape and
/// element type, so a caller can build a tensor of the wrong type and the
/// executor can still reject it by inspecting `dtype()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<u8>,
    shape: Shape,
    dtype: DataType,
}

impl Tensor {
    /// Create a tensor from a vector with a given shape.
    ///
    /// # Example
    /// ```
    /// # use statica_core::Tensor;
    /// let tensor = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], [2, 2]).unwrap();
    /// assert_eq!(tensor.len(), 4);
    /// ```
    pub fn from_vec<T: Element>(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.volume() {
            return Err(CoreError::Tensor(format!(
                "Data length {} doesn't match shape {} (expected {})",
                data.len(),
                shape,
                shape.volume()
            )));
        }

        Ok(Self {
            data: bytemuck::cast_slice(&data).to_vec(),
            shape,
            dtype: T::DTYPE,
        })
    }

    /// Create a tensor from raw bytes.
    pub fn from_bytes(data: Vec<u8>, shape: impl Into<Shape>, dtype: DataType) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.byte_size(dtype);
        if data.len() != expected {
            return Err(CoreError::Tensor(format!(
                "Byte length {} doesn't match shape {} of {} (expected {})",
                data.len(),
                shape,
                dtype,
                expected
            )));
        }
        Ok(Self { data, shape, dtype })
    }

    /// A tensor of the given shape filled with `value`.
    pub fn full<T: Element>(value: T, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let data = vec![value; shape.volume()];
        Self {
            data: bytemuck::cast_slice(&data).to_vec(),
            shape,
            dtype: T::DTYPE,
        }
    }

    /// Copy the tensor data out as a typed vector.
    ///
    /// # Errors
    /// Returns an error if `T` doesn't match the tensor's element type.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(CoreError::TypeMismatch {
                expected: self.dtype,
                actual: T::DTYPE,
            });
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }

    /// Raw bytes of the tensor data in row-major order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Total number of elements in the tensor.
    pub fn len(&self) -> usize {
        self.shape.volume()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reinterpret the same data under a new shape of equal volume.
    pub fn reshape(self, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if shape.volume() != self.shape.volume() {
            return Err(CoreError::Tensor(format!(
                "Cannot reshape {} into {}",
                self.shape, shape
            )));
        }
        Ok(Self { shape, ..self })
    }
}
