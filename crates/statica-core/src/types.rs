//! Element types and fixed tensor shapes.

use std::fmt;

/// Element data type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    F32,
    F16,
    I32,
    I64,
    U8,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DataType::F32 | DataType::I32 => 4,
            DataType::F16 => 2,
            DataType::I64 => 8,
            DataType::U8 => 1,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::F32 => "float32",
            DataType::F16 => "float16",
            DataType::I32 => "int32",
            DataType::I64 => "int64",
            DataType::U8 => "uint8",
        };
        f.write_str(name)
    }
}

/// Rust scalar types that can back a `Tensor`.
///
/// `F16` has no native Rust scalar; half-precision tensors are built from raw
/// bytes with `Tensor::from_bytes`.
pub trait Element: bytemuck::Pod {
    const DTYPE: DataType;
}

impl Element for f32 {
    const DTYPE: DataType = DataType::F32;
}

impl Element for i32 {
    const DTYPE: DataType = DataType::I32;
}

impl Element for i64 {
    const DTYPE: DataType = DataType::I64;
}

impl Element for u8 {
    const DTYPE: DataType = DataType::U8;
}

/// A fully static tensor shape.
///
/// Shapes in statica are a compile-time contract between the plan and the
/// caller; there are no symbolic or unknown dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of dimensions).
    ///
    /// Panics on overflow in debug builds; use `checked_volume` for shapes
    /// that come from untrusted input.
    pub fn volume(&self) -> usize {
        self.0.iter().product()
    }

    /// Total number of elements, or `None` if the product overflows `usize`.
    pub fn checked_volume(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Size in bytes of a tensor of this shape with the given element type.
    pub fn byte_size(&self, dtype: DataType) -> usize {
        self.volume() * dtype.size()
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl PartialEq<[usize]> for Shape {
    fn eq(&self, other: &[usize]) -> bool {
        self.0 == other
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_and_bytes() {
        let shape = Shape::from([1, 3, 224, 224]);
        assert_eq!(shape.volume(), 150_528);
        assert_eq!(shape.byte_size(DataType::F32), 602_112);
        assert_eq!(shape.rank(), 4);
    }

    #[test]
    fn test_checked_volume() {
        assert_eq!(Shape::from([1, 3, 224, 224]).checked_volume(), Some(150_528));
        assert_eq!(Shape::new(Vec::new()).checked_volume(), Some(1));
        assert_eq!(Shape::from([1 << 33, 1 << 33, 1 << 33]).checked_volume(), None);
        assert_eq!(Shape::from([usize::MAX, 0]).checked_volume(), Some(0));
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::from([1, 1000]).to_string(), "(1, 1000)");
        assert_eq!(DataType::F32.to_string(), "float32");
    }

    #[test]
    fn test_element_dtypes() {
        assert_eq!(<f32 as Element>::DTYPE, DataType::F32);
        assert_eq!(<i64 as Element>::DTYPE, DataType::I64);
        assert_eq!(DataType::F16.size(), 2);
    }
}
