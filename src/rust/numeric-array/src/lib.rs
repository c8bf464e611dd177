// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Homogeneous N-dimensional numeric buffers.
//!
//! A [`NumericArray`] is a shape plus a flat, row-major buffer of one of
//! the three supported element kinds. Element positions are addressed by
//! their flat index, which keeps partial reads and writes independent of
//! any particular array library.

use ndarray::{Array, ArrayD, Dimension, IxDyn};
use num_complex::Complex;

#[cfg(feature = "serde")]
mod serde_impl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumericKind {
    Integer64,
    Float64,
    Complex64,
}

impl NumericKind {
    pub fn name(&self) -> &'static str {
        match self {
            NumericKind::Integer64 => "int64",
            NumericKind::Float64 => "float64",
            NumericKind::Complex64 => "complex128",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NumericBuffer {
    Integer64(Vec<i64>),
    Float64(Vec<f64>),
    Complex64(Vec<Complex<f64>>),
}

impl NumericBuffer {
    pub fn len(&self) -> usize {
        match self {
            NumericBuffer::Integer64(vec) => vec.len(),
            NumericBuffer::Float64(vec) => vec.len(),
            NumericBuffer::Complex64(vec) => vec.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> NumericKind {
        match self {
            NumericBuffer::Integer64(_) => NumericKind::Integer64,
            NumericBuffer::Float64(_) => NumericKind::Float64,
            NumericBuffer::Complex64(_) => NumericKind::Complex64,
        }
    }

    /// Widen the buffer to `kind`. Narrowing casts are rejected.
    pub fn cast(self, kind: NumericKind) -> Result<NumericBuffer, CastError> {
        let from = self.kind();
        if kind < from {
            return Err(CastError { from, to: kind });
        }
        let out = match (self, kind) {
            (NumericBuffer::Integer64(v), NumericKind::Float64) => {
                NumericBuffer::Float64(v.into_iter().map(|x| x as f64).collect())
            }
            (NumericBuffer::Integer64(v), NumericKind::Complex64) => NumericBuffer::Complex64(
                v.into_iter().map(|x| Complex::new(x as f64, 0.0)).collect(),
            ),
            (NumericBuffer::Float64(v), NumericKind::Complex64) => {
                NumericBuffer::Complex64(v.into_iter().map(|x| Complex::new(x, 0.0)).collect())
            }
            (buffer, _) => buffer,
        };
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot cast {} values into a {} buffer", .from.name(), .to.name())]
pub struct CastError {
    pub from: NumericKind,
    pub to: NumericKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("shape {shape:?} holds {expected} elements, buffer has {found}")]
pub struct ShapeError {
    pub shape: Vec<usize>,
    pub expected: usize,
    pub found: usize,
}

/// Number of elements addressed by `shape`. The empty shape is a scalar.
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    shape: Vec<usize>,
    buffer: NumericBuffer,
}

impl NumericArray {
    pub fn new(shape: Vec<usize>, buffer: NumericBuffer) -> Result<Self, ShapeError> {
        let expected = element_count(&shape);
        if expected != buffer.len() {
            return Err(ShapeError {
                shape,
                expected,
                found: buffer.len(),
            });
        }
        Ok(NumericArray { shape, buffer })
    }

    /// One-dimensional array over the whole buffer.
    pub fn from_buffer(buffer: NumericBuffer) -> Self {
        NumericArray {
            shape: vec![buffer.len()],
            buffer,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        NumericArray {
            shape: vec![],
            buffer: NumericBuffer::Integer64(vec![value]),
        }
    }

    pub fn from_f64(value: f64) -> Self {
        NumericArray {
            shape: vec![],
            buffer: NumericBuffer::Float64(vec![value]),
        }
    }

    pub fn from_complex(value: Complex<f64>) -> Self {
        NumericArray {
            shape: vec![],
            buffer: NumericBuffer::Complex64(vec![value]),
        }
    }

    /// A float array of `shape` with every element NaN.
    ///
    /// This is the canonical placeholder used to pre-allocate a record
    /// that is filled in later by sliced writes.
    pub fn full_nan(shape: &[usize]) -> Self {
        NumericArray {
            shape: shape.to_vec(),
            buffer: NumericBuffer::Float64(vec![f64::NAN; element_count(shape)]),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn kind(&self) -> NumericKind {
        self.buffer.kind()
    }

    pub fn buffer(&self) -> &NumericBuffer {
        &self.buffer
    }

    pub fn into_parts(self) -> (Vec<usize>, NumericBuffer) {
        (self.shape, self.buffer)
    }

    pub fn reshape(self, shape: Vec<usize>) -> Result<Self, ShapeError> {
        NumericArray::new(shape, self.buffer)
    }

    pub fn cast(self, kind: NumericKind) -> Result<Self, CastError> {
        Ok(NumericArray {
            shape: self.shape,
            buffer: self.buffer.cast(kind)?,
        })
    }

    /// Whether the element at `index` is an unwritten placeholder.
    ///
    /// Integers have no placeholder value.
    pub fn is_placeholder(&self, index: usize) -> bool {
        match &self.buffer {
            NumericBuffer::Integer64(_) => false,
            NumericBuffer::Float64(vec) => vec.get(index).is_some_and(|x| x.is_nan()),
            NumericBuffer::Complex64(vec) => vec.get(index).is_some_and(|x| x.is_nan()),
        }
    }

    /// Copy the elements at `indices` into a new array of `shape`.
    ///
    /// Panics if an index is out of range or `shape` does not match the
    /// number of indices.
    pub fn gather(&self, indices: &[usize], shape: Vec<usize>) -> NumericArray {
        assert_eq!(element_count(&shape), indices.len());
        let buffer = match &self.buffer {
            NumericBuffer::Integer64(v) => {
                NumericBuffer::Integer64(indices.iter().map(|&i| v[i]).collect())
            }
            NumericBuffer::Float64(v) => {
                NumericBuffer::Float64(indices.iter().map(|&i| v[i]).collect())
            }
            NumericBuffer::Complex64(v) => {
                NumericBuffer::Complex64(indices.iter().map(|&i| v[i]).collect())
            }
        };
        NumericArray { shape, buffer }
    }

    /// Overwrite the elements at `indices` with `values`, in order.
    ///
    /// `values` is widened to this array's kind; narrowing is an error and
    /// leaves `self` untouched.
    pub fn scatter(&mut self, indices: &[usize], values: &NumericArray) -> Result<(), CastError> {
        assert_eq!(indices.len(), values.len());
        let values = values.buffer.clone().cast(self.kind())?;
        match (&mut self.buffer, values) {
            (NumericBuffer::Integer64(dst), NumericBuffer::Integer64(src)) => {
                scatter_into(dst, indices, src)
            }
            (NumericBuffer::Float64(dst), NumericBuffer::Float64(src)) => {
                scatter_into(dst, indices, src)
            }
            (NumericBuffer::Complex64(dst), NumericBuffer::Complex64(src)) => {
                scatter_into(dst, indices, src)
            }
            _ => unreachable!("buffer was cast to the destination kind"),
        }
        Ok(())
    }

    /// Element-wise equality where NaN compares equal to NaN.
    pub fn nan_eq(&self, other: &NumericArray) -> bool {
        if self.shape != other.shape {
            return false;
        }
        fn float_eq(a: f64, b: f64) -> bool {
            a == b || (a.is_nan() && b.is_nan())
        }
        match (&self.buffer, &other.buffer) {
            (NumericBuffer::Integer64(a), NumericBuffer::Integer64(b)) => a == b,
            (NumericBuffer::Float64(a), NumericBuffer::Float64(b)) => {
                a.iter().zip(b).all(|(x, y)| float_eq(*x, *y))
            }
            (NumericBuffer::Complex64(a), NumericBuffer::Complex64(b)) => a
                .iter()
                .zip(b)
                .all(|(x, y)| float_eq(x.re, y.re) && float_eq(x.im, y.im)),
            _ => false,
        }
    }

    pub fn to_i64_array(&self) -> Option<ArrayD<i64>> {
        match &self.buffer {
            NumericBuffer::Integer64(v) => to_array(&self.shape, v),
            _ => None,
        }
    }

    pub fn to_f64_array(&self) -> Option<ArrayD<f64>> {
        match &self.buffer {
            NumericBuffer::Float64(v) => to_array(&self.shape, v),
            _ => None,
        }
    }

    pub fn to_complex_array(&self) -> Option<ArrayD<Complex<f64>>> {
        match &self.buffer {
            NumericBuffer::Complex64(v) => to_array(&self.shape, v),
            _ => None,
        }
    }
}

fn scatter_into<T>(dst: &mut [T], indices: &[usize], src: Vec<T>) {
    for (&i, value) in indices.iter().zip(src) {
        dst[i] = value;
    }
}

fn to_array<T: Clone>(shape: &[usize], values: &[T]) -> Option<ArrayD<T>> {
    ArrayD::from_shape_vec(IxDyn(shape), values.to_vec()).ok()
}

macro_rules! impl_from_ndarray {
    ($elem:ty, $variant:ident) => {
        impl<D: Dimension> From<Array<$elem, D>> for NumericArray {
            fn from(array: Array<$elem, D>) -> Self {
                NumericArray {
                    shape: array.shape().to_vec(),
                    buffer: NumericBuffer::$variant(array.iter().cloned().collect()),
                }
            }
        }

        impl From<Vec<$elem>> for NumericArray {
            fn from(values: Vec<$elem>) -> Self {
                NumericArray::from_buffer(NumericBuffer::$variant(values))
            }
        }
    };
}

impl_from_ndarray!(i64, Integer64);
impl_from_ndarray!(f64, Float64);
impl_from_ndarray!(Complex<f64>, Complex64);

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_ndarray_is_row_major() {
        let arr = NumericArray::from(array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(arr.shape(), &[2, 2]);
        assert_eq!(
            arr.buffer(),
            &NumericBuffer::Float64(vec![1.0, 2.0, 3.0, 4.0])
        );

        let transposed = NumericArray::from(array![[1.0, 2.0], [3.0, 4.0]].reversed_axes());
        assert_eq!(
            transposed.buffer(),
            &NumericBuffer::Float64(vec![1.0, 3.0, 2.0, 4.0])
        );
    }

    #[test]
    fn test_shape_must_match_buffer() {
        let err = NumericArray::new(vec![2, 3], NumericBuffer::Integer64(vec![1, 2])).unwrap_err();
        assert_eq!(err.expected, 6);
        assert_eq!(err.found, 2);
        assert_eq!(NumericArray::from_f64(1.5).ndim(), 0);
        assert_eq!(NumericArray::from_f64(1.5).len(), 1);
    }

    #[test]
    fn test_cast_widens_only() {
        let ints = NumericBuffer::Integer64(vec![1, -2]);
        assert_eq!(
            ints.clone().cast(NumericKind::Float64),
            Ok(NumericBuffer::Float64(vec![1.0, -2.0]))
        );
        assert_eq!(
            ints.cast(NumericKind::Complex64),
            Ok(NumericBuffer::Complex64(vec![
                Complex::new(1.0, 0.0),
                Complex::new(-2.0, 0.0)
            ]))
        );
        let err = NumericBuffer::Float64(vec![0.5])
            .cast(NumericKind::Integer64)
            .unwrap_err();
        assert_eq!(err.from, NumericKind::Float64);
        assert_eq!(err.to, NumericKind::Integer64);
    }

    #[test]
    fn test_placeholder() {
        let arr = NumericArray::from(vec![1.0, f64::NAN]);
        assert!(!arr.is_placeholder(0));
        assert!(arr.is_placeholder(1));
        assert!(!NumericArray::from(vec![0_i64]).is_placeholder(0));
        assert!(NumericArray::full_nan(&[2, 2]).is_placeholder(3));
    }

    #[test]
    fn test_gather_scatter() {
        let mut arr = NumericArray::full_nan(&[2, 3]);
        arr.scatter(&[3, 4, 5], &NumericArray::from(vec![7_i64, 8, 9]))
            .unwrap();
        let row = arr.gather(&[3, 4, 5], vec![3]);
        assert_eq!(row, NumericArray::from(vec![7.0, 8.0, 9.0]));
        assert!(arr.is_placeholder(0));

        let mut ints = NumericArray::from(vec![1_i64, 2]);
        assert!(ints.scatter(&[0], &NumericArray::from(vec![0.5])).is_err());
        assert_eq!(ints, NumericArray::from(vec![1_i64, 2]));
    }

    #[test]
    fn test_nan_eq() {
        let a = NumericArray::from(vec![1.0, f64::NAN]);
        let b = NumericArray::from(vec![1.0, f64::NAN]);
        assert_ne!(a, b);
        assert!(a.nan_eq(&b));
        assert!(!a.nan_eq(&NumericArray::from(vec![1.0, 2.0])));
        assert!(!a.nan_eq(&a.clone().reshape(vec![2, 1]).unwrap()));
    }

    #[test]
    fn test_to_ndarray() {
        let arr = NumericArray::from(array![[1_i64, 2], [3, 4]]);
        assert_eq!(arr.to_i64_array().unwrap(), array![[1_i64, 2], [3, 4]].into_dyn());
        assert!(arr.to_f64_array().is_none());
    }
}
