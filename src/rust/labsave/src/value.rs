// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Arbitrary input values accepted by `append`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::{Array, Dimension};
use num_complex::Complex64;
use numeric_array::{NumericArray, NumericBuffer, ShapeError, element_count};

use crate::data::{Data, Entry, TextArray};

/// An object outside the supported value set that may still be able to
/// describe itself as text.
pub trait Repr: fmt::Debug + Send + Sync {
    /// Text representation, or `None` when the object has none.
    fn repr(&self) -> Option<String>;
}

/// An array whose elements are not of a numeric dtype, e.g. booleans or
/// heterogeneous objects.
#[derive(Debug, Clone)]
pub struct ObjectArray {
    shape: Vec<usize>,
    elements: Vec<Value>,
}

impl ObjectArray {
    pub fn new(shape: Vec<usize>, elements: Vec<Value>) -> Result<Self, ShapeError> {
        let expected = element_count(&shape);
        if expected != elements.len() {
            return Err(ShapeError {
                shape,
                expected,
                found: elements.len(),
            });
        }
        Ok(ObjectArray { shape, elements })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex64),
    Str(String),
    Numeric(NumericArray),
    Text(TextArray),
    Array(ObjectArray),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Object(Arc<dyn Repr>),
}

impl Value {
    pub fn is_numeric_scalar(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Complex(_)
        )
    }
}

/// `str()`-style rendering: strings are returned verbatim.
pub(crate) fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        other => to_repr(other),
    }
}

/// `repr()`-style rendering: strings are quoted. Returns `None` if any
/// part of the value has no representation.
pub(crate) fn to_repr(value: &Value) -> Option<String> {
    let text = match value {
        Value::None => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => float_repr(*v),
        Value::Complex(v) => complex_repr(*v),
        Value::Str(s) => quote(s),
        Value::Numeric(arr) => {
            let elements: Vec<String> = match arr.buffer() {
                NumericBuffer::Integer64(v) => v.iter().map(i64::to_string).collect(),
                NumericBuffer::Float64(v) => v.iter().map(|x| float_repr(*x)).collect(),
                NumericBuffer::Complex64(v) => v.iter().map(|x| complex_repr(*x)).collect(),
            };
            nested_brackets(arr.shape(), &elements)
        }
        Value::Text(arr) => {
            let elements: Vec<String> = arr.values().iter().map(|s| quote(s)).collect();
            nested_brackets(arr.shape(), &elements)
        }
        Value::Array(arr) => {
            let elements = arr
                .elements()
                .iter()
                .map(to_repr)
                .collect::<Option<Vec<_>>>()?;
            nested_brackets(arr.shape(), &elements)
        }
        Value::List(items) => {
            let items = items.iter().map(to_repr).collect::<Option<Vec<_>>>()?;
            format!("[{}]", items.join(", "))
        }
        Value::Map(map) => {
            let items = map
                .iter()
                .map(|(k, v)| Some(format!("{}: {}", quote(k), to_repr(v)?)))
                .collect::<Option<Vec<_>>>()?;
            format!("{{{}}}", items.join(", "))
        }
        Value::Object(obj) => obj.repr()?,
    };
    Some(text)
}

pub(crate) fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = value.abs();
    if magnitude >= 1e16 || (magnitude != 0.0 && magnitude < 1e-4) {
        format!("{value:e}")
    } else if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn complex_component(value: f64) -> String {
    let text = float_repr(value);
    text.strip_suffix(".0").map(str::to_owned).unwrap_or(text)
}

fn complex_repr(value: Complex64) -> String {
    let imag = complex_component(value.im);
    if value.re == 0.0 && value.re.is_sign_positive() {
        return format!("{imag}j");
    }
    let sign = if imag.starts_with('-') { "" } else { "+" };
    format!("({}{sign}{imag}j)", complex_component(value.re))
}

fn quote(s: &str) -> String {
    if s.contains('\'') && !s.contains('"') {
        format!("\"{s}\"")
    } else {
        format!("'{}'", s.replace('\'', "\\'"))
    }
}

fn nested_brackets(shape: &[usize], elements: &[String]) -> String {
    match shape.split_first() {
        None => elements.first().cloned().unwrap_or_default(),
        Some((_, inner)) => {
            let step = element_count(inner);
            if step == 0 || elements.is_empty() {
                return "[]".to_string();
            }
            let parts: Vec<String> = elements
                .chunks(step)
                .map(|chunk| nested_brackets(inner, chunk))
                .collect();
            format!("[{}]", parts.join(" "))
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Complex64> for Value {
    fn from(value: Complex64) -> Self {
        Value::Complex(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<NumericArray> for Value {
    fn from(value: NumericArray) -> Self {
        Value::Numeric(value)
    }
}

impl From<TextArray> for Value {
    fn from(value: TextArray) -> Self {
        Value::Text(value)
    }
}

impl From<ObjectArray> for Value {
    fn from(value: ObjectArray) -> Self {
        Value::Array(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

impl<V: Into<Value>> From<IndexMap<String, V>> for Value {
    fn from(map: IndexMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(map: BTreeMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Value {
    fn from(map: HashMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Value::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<D: Dimension> From<Array<i64, D>> for Value {
    fn from(array: Array<i64, D>) -> Self {
        Value::Numeric(array.into())
    }
}

impl<D: Dimension> From<Array<f64, D>> for Value {
    fn from(array: Array<f64, D>) -> Self {
        Value::Numeric(array.into())
    }
}

impl<D: Dimension> From<Array<Complex64, D>> for Value {
    fn from(array: Array<Complex64, D>) -> Self {
        Value::Numeric(array.into())
    }
}

impl<D: Dimension> From<Array<String, D>> for Value {
    fn from(array: Array<String, D>) -> Self {
        Value::Text(array.into())
    }
}

impl<D: Dimension> From<Array<bool, D>> for Value {
    fn from(array: Array<bool, D>) -> Self {
        Value::Array(ObjectArray {
            shape: array.shape().to_vec(),
            elements: array.iter().map(|&b| Value::Bool(b)).collect(),
        })
    }
}

impl From<Data> for Value {
    fn from(data: Data) -> Self {
        match data {
            Data::Int(v) => Value::Int(v),
            Data::Float(v) => Value::Float(v),
            Data::Complex(v) => Value::Complex(v),
            Data::Str(v) => Value::Str(v),
            Data::Numeric(v) => Value::Numeric(v),
            Data::Text(v) => Value::Text(v),
        }
    }
}

impl From<Entry> for Value {
    fn from(entry: Entry) -> Self {
        match entry {
            Entry::Data(data) => data.into(),
            Entry::Group(map) => Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}
