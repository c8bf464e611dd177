// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Storable leaf values and the structures returned by reads.

use indexmap::IndexMap;
use ndarray::{Array, ArrayD, Dimension, IxDyn};
use num_complex::Complex64;
use numeric_array::{NumericArray, ShapeError, element_count};
use serde::{Deserialize, Serialize};

/// An N-dimensional array of strings.
///
/// An empty string is the placeholder value of a text record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextArray {
    shape: Vec<usize>,
    values: Vec<String>,
}

impl TextArray {
    pub fn new(shape: Vec<usize>, values: Vec<String>) -> Result<Self, ShapeError> {
        let expected = element_count(&shape);
        if expected != values.len() {
            return Err(ShapeError {
                shape,
                expected,
                found: values.len(),
            });
        }
        Ok(TextArray { shape, values })
    }

    /// Zero-dimensional array holding a single string.
    pub fn scalar(value: String) -> Self {
        TextArray {
            shape: vec![],
            values: vec![value],
        }
    }

    /// A text array of `shape` filled with empty strings.
    pub fn empty(shape: &[usize]) -> Self {
        TextArray {
            shape: shape.to_vec(),
            values: vec![String::new(); element_count(shape)],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_parts(self) -> (Vec<usize>, Vec<String>) {
        (self.shape, self.values)
    }

    pub(crate) fn is_consistent(&self) -> bool {
        element_count(&self.shape) == self.values.len()
    }

    pub fn is_placeholder(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(String::is_empty)
    }

    pub(crate) fn gather(&self, indices: &[usize], shape: Vec<usize>) -> TextArray {
        TextArray {
            shape,
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }

    pub(crate) fn scatter(&mut self, indices: &[usize], values: &TextArray) {
        for (&i, value) in indices.iter().zip(&values.values) {
            self.values[i].clone_from(value);
        }
    }

    pub fn to_array(&self) -> Option<ArrayD<String>> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.values.clone()).ok()
    }
}

impl<D: Dimension> From<Array<String, D>> for TextArray {
    fn from(array: Array<String, D>) -> Self {
        TextArray {
            shape: array.shape().to_vec(),
            values: array.iter().cloned().collect(),
        }
    }
}

impl From<Vec<String>> for TextArray {
    fn from(values: Vec<String>) -> Self {
        TextArray {
            shape: vec![values.len()],
            values,
        }
    }
}

impl From<Vec<&str>> for TextArray {
    fn from(values: Vec<&str>) -> Self {
        values
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>()
            .into()
    }
}

/// A single storable value: one of the primitive shapes a record can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Int(i64),
    Float(f64),
    Complex(Complex64),
    Str(String),
    Numeric(NumericArray),
    Text(TextArray),
}

impl Data {
    /// Shape of the value; scalars have the empty shape.
    pub fn shape(&self) -> &[usize] {
        match self {
            Data::Int(_) | Data::Float(_) | Data::Complex(_) | Data::Str(_) => &[],
            Data::Numeric(arr) => arr.shape(),
            Data::Text(arr) => arr.shape(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Data::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Data::Float(v) => Some(*v),
            Data::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_numeric(&self) -> Option<&NumericArray> {
        match self {
            Data::Numeric(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextArray> {
        match self {
            Data::Text(arr) => Some(arr),
            _ => None,
        }
    }

    /// Equality where NaN compares equal to NaN.
    pub fn nan_eq(&self, other: &Data) -> bool {
        fn float_eq(a: f64, b: f64) -> bool {
            a == b || (a.is_nan() && b.is_nan())
        }
        match (self, other) {
            (Data::Float(a), Data::Float(b)) => float_eq(*a, *b),
            (Data::Complex(a), Data::Complex(b)) => float_eq(a.re, b.re) && float_eq(a.im, b.im),
            (Data::Numeric(a), Data::Numeric(b)) => a.nan_eq(b),
            _ => self == other,
        }
    }
}

/// The result of a read: a single value, or a group reconstructed as a
/// nested mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Data(Data),
    Group(IndexMap<String, Entry>),
}

impl Entry {
    pub fn as_data(&self) -> Option<&Data> {
        match self {
            Entry::Data(data) => Some(data),
            Entry::Group(_) => None,
        }
    }

    pub fn into_data(self) -> Option<Data> {
        match self {
            Entry::Data(data) => Some(data),
            Entry::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&IndexMap<String, Entry>> {
        match self {
            Entry::Group(map) => Some(map),
            Entry::Data(_) => None,
        }
    }

    /// Structural equality where NaN compares equal to NaN. Key order is
    /// ignored.
    pub fn nan_eq(&self, other: &Entry) -> bool {
        match (self, other) {
            (Entry::Data(a), Entry::Data(b)) => a.nan_eq(b),
            (Entry::Group(a), Entry::Group(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| value.nan_eq(other)))
            }
            _ => false,
        }
    }
}

impl From<Data> for Entry {
    fn from(data: Data) -> Self {
        Entry::Data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_text_array_shape() {
        let text = TextArray::from(array![["a".to_string(), "b".to_string()]]);
        assert_eq!(text.shape(), &[1, 2]);
        assert!(TextArray::new(vec![3], vec!["x".into()]).is_err());
        assert!(TextArray::empty(&[2]).is_placeholder(1));
    }

    #[test]
    fn test_entry_nan_eq_ignores_key_order() {
        let a = Entry::Group(IndexMap::from([
            ("x".to_string(), Entry::Data(Data::Float(f64::NAN))),
            ("y".to_string(), Entry::Data(Data::Int(1))),
        ]));
        let b = Entry::Group(IndexMap::from([
            ("y".to_string(), Entry::Data(Data::Int(1))),
            ("x".to_string(), Entry::Data(Data::Float(f64::NAN))),
        ]));
        assert!(a.nan_eq(&b));
        assert!(!a.nan_eq(&Entry::Data(Data::Int(1))));
    }
}
