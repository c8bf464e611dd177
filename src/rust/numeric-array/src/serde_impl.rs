// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! `serde` support for `NumericArray`.
//!
//! Floating point values are stored as their IEEE-754 bit patterns so that
//! NaN, infinities and signed zeros survive text formats such as JSON.
//!
//! This module requires optional feature `serde`.
use num_complex::Complex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{NumericArray, NumericBuffer};

#[derive(Serialize, Deserialize)]
#[serde(tag = "dtype", content = "bits", rename_all = "lowercase")]
enum StoredBuffer {
    Int64(Vec<i64>),
    Float64(Vec<u64>),
    Complex128(Vec<[u64; 2]>),
}

#[derive(Serialize, Deserialize)]
struct StoredArray {
    shape: Vec<usize>,
    values: StoredBuffer,
}

impl Serialize for NumericArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values = match &self.buffer {
            NumericBuffer::Integer64(v) => StoredBuffer::Int64(v.clone()),
            NumericBuffer::Float64(v) => StoredBuffer::Float64(v.iter().map(|x| x.to_bits()).collect()),
            NumericBuffer::Complex64(v) => StoredBuffer::Complex128(
                v.iter().map(|x| [x.re.to_bits(), x.im.to_bits()]).collect(),
            ),
        };
        StoredArray {
            shape: self.shape.clone(),
            values,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NumericArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = StoredArray::deserialize(deserializer)?;
        let buffer = match stored.values {
            StoredBuffer::Int64(v) => NumericBuffer::Integer64(v),
            StoredBuffer::Float64(v) => {
                NumericBuffer::Float64(v.into_iter().map(f64::from_bits).collect())
            }
            StoredBuffer::Complex128(v) => NumericBuffer::Complex64(
                v.into_iter()
                    .map(|[re, im]| Complex::new(f64::from_bits(re), f64::from_bits(im)))
                    .collect(),
            ),
        };
        NumericArray::new(stored.shape, buffer).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_floats_survive_json() {
        let arr = NumericArray::from(vec![f64::NAN, f64::INFINITY, -0.0, 1.5]);
        let text = serde_json::to_string(&arr).unwrap();
        let back: NumericArray = serde_json::from_str(&text).unwrap();
        assert!(arr.nan_eq(&back));
        match back.buffer() {
            NumericBuffer::Float64(v) => assert!(v[2].is_sign_negative()),
            _ => panic!("expected float buffer"),
        }
    }

    #[test]
    fn test_rejects_inconsistent_shape() {
        let text = r#"{"shape":[3],"values":{"dtype":"int64","bits":[1,2]}}"#;
        assert!(serde_json::from_str::<NumericArray>(text).is_err());
    }
}
