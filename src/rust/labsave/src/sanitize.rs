// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Reduction of arbitrary input values to storable shapes.
//!
//! Every value ends up as one of the [`Data`] variants or as a mapping of
//! sanitized children. Expected degradations (a mixed list stored as
//! strings, an object stored as its text representation) are regular
//! branches; only a value without any representation is an error.

use indexmap::IndexMap;
use labsave_log::{diagnostic, warn};
use numeric_array::{NumericArray, NumericBuffer, NumericKind};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::data::{Data, TextArray};
use crate::error::{Error, Result};
use crate::value::{ObjectArray, Value, to_repr, to_text};

/// How the sanitized value is to be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeHint {
    /// Stored with the dtype of the value itself.
    Native,
    /// Stored as an array of ASCII strings.
    String,
    /// Not a leaf: each entry becomes a child node.
    Mapping,
}

/// Lossy step taken to make a leaf storable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    /// `None` stored as the string `"None"`.
    NoneAsString,
    /// Elements stored by their text.
    StringArray,
    /// Stored as a single repr string, the structure is lost.
    FlatString,
    /// An object stored by its text representation.
    TextRepr,
    /// Nothing could represent the value; the policy's sentinel was stored.
    Substituted,
}

/// A degradation applied at `key`, the `/` separated location of the leaf
/// inside the sanitized value (empty for the value itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizationChange {
    pub key: String,
    pub degradation: Degradation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sanitized {
    Leaf {
        data: Data,
        hint: DtypeHint,
        degradation: Option<Degradation>,
    },
    Mapping(IndexMap<String, Sanitized>),
}

impl Sanitized {
    pub fn hint(&self) -> DtypeHint {
        match self {
            Sanitized::Leaf { hint, .. } => *hint,
            Sanitized::Mapping(_) => DtypeHint::Mapping,
        }
    }

    /// Every degradation below this value, in mapping order.
    pub fn changes(&self) -> Vec<SanitizationChange> {
        let mut changes = vec![];
        self.collect_changes("", &mut changes);
        changes
    }

    fn collect_changes(&self, key: &str, changes: &mut Vec<SanitizationChange>) {
        match self {
            Sanitized::Leaf {
                degradation: Some(degradation),
                ..
            } => changes.push(SanitizationChange {
                key: key.to_string(),
                degradation: *degradation,
            }),
            Sanitized::Leaf { .. } => {}
            Sanitized::Mapping(children) => {
                for (name, child) in children {
                    let child_key = if key.is_empty() {
                        name.clone()
                    } else {
                        format!("{key}/{name}")
                    };
                    child.collect_changes(&child_key, changes);
                }
            }
        }
    }

    fn native(data: Data) -> Self {
        Sanitized::Leaf {
            data,
            hint: DtypeHint::Native,
            degradation: None,
        }
    }

    fn string(text: TextArray) -> Self {
        Sanitized::Leaf {
            data: Data::Text(text),
            hint: DtypeHint::String,
            degradation: None,
        }
    }

    fn degraded(self, kind: Degradation) -> Self {
        match self {
            Sanitized::Leaf { data, hint, .. } => Sanitized::Leaf {
                data,
                hint,
                degradation: Some(kind),
            },
            mapping => mapping,
        }
    }
}

/// What to do with a value that has no representation at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsanitizablePolicy {
    /// Fail with [`Error::UnsanitizableValue`].
    #[default]
    Fail,
    /// Store the given sentinel string instead and log a warning.
    Substitute(String),
}

enum Coercion<T> {
    Coerced(T),
    Unsupported,
}

pub fn sanitize(value: Value, policy: &UnsanitizablePolicy) -> Result<Sanitized> {
    match value {
        Value::Int(v) => Ok(Sanitized::native(Data::Int(v))),
        Value::Float(v) => Ok(Sanitized::native(Data::Float(v))),
        Value::Complex(v) => Ok(Sanitized::native(Data::Complex(v))),
        Value::Str(v) => Ok(Sanitized::native(Data::Str(v))),
        Value::Bool(v) => Ok(Sanitized::native(Data::Int(v.into()))),
        Value::None => {
            diagnostic!("storing None as the string 'None'");
            Ok(Sanitized::native(Data::Str("None".to_string()))
                .degraded(Degradation::NoneAsString))
        }
        Value::Numeric(arr) => Ok(Sanitized::native(Data::Numeric(arr))),
        Value::Text(text) => sanitize_text_array(text),
        Value::Array(arr) => sanitize_object_array(arr, policy),
        Value::List(items) => sanitize_list(items, policy),
        Value::Map(map) => map
            .into_iter()
            .map(|(key, child)| Ok((key, sanitize(child, policy)?)))
            .collect::<Result<IndexMap<_, _>>>()
            .map(Sanitized::Mapping),
        Value::Object(obj) => match obj.repr() {
            Some(text) => {
                warn!("storing {:?} by its text representation", obj);
                Ok(Sanitized::native(Data::Str(text)).degraded(Degradation::TextRepr))
            }
            None => unsanitizable(format!("{obj:?}"), policy),
        },
    }
}

fn sanitize_text_array(text: TextArray) -> Result<Sanitized> {
    if text.values().iter().all(|s| s.is_ascii()) {
        return Ok(Sanitized::string(text));
    }
    let flat = to_repr(&Value::Text(text)).unwrap_or_default();
    warn!("text array is not ASCII encodable, reduced to the flat string {}", flat);
    Ok(Sanitized::native(Data::Str(flat)).degraded(Degradation::FlatString))
}

fn sanitize_object_array(arr: ObjectArray, policy: &UnsanitizablePolicy) -> Result<Sanitized> {
    if let Coercion::Coerced(values) = coerce_to_float(arr.elements()) {
        let numeric = NumericArray::new(arr.shape().to_vec(), NumericBuffer::Float64(values))
            .map_err(Error::new)?;
        return Ok(Sanitized::native(Data::Numeric(numeric)));
    }
    if let Coercion::Coerced(strings) = encode_ascii(arr.elements()) {
        let text = TextArray::new(arr.shape().to_vec(), strings).map_err(Error::new)?;
        diagnostic!("array of shape {:?} stored as strings", arr.shape());
        return Ok(Sanitized::string(text).degraded(Degradation::StringArray));
    }
    reduce_to_flat_string(Value::Array(arr), policy)
}

fn sanitize_list(items: Vec<Value>, policy: &UnsanitizablePolicy) -> Result<Sanitized> {
    if let Coercion::Coerced(numeric) = coerce_numeric_list(&items) {
        return Ok(Sanitized::native(Data::Numeric(numeric)));
    }
    if let Coercion::Coerced(strings) = encode_ascii(&items) {
        diagnostic!("list of {} mixed elements stored as strings", strings.len());
        return Ok(
            Sanitized::string(TextArray::from(strings)).degraded(Degradation::StringArray),
        );
    }
    reduce_to_flat_string(Value::List(items), policy)
}

fn reduce_to_flat_string(value: Value, policy: &UnsanitizablePolicy) -> Result<Sanitized> {
    match to_repr(&value) {
        Some(text) => {
            warn!("value reduced to a flat string, its structure is lost: {}", text);
            Ok(Sanitized::native(Data::Str(text)).degraded(Degradation::FlatString))
        }
        None => unsanitizable(format!("{value:?}"), policy),
    }
}

fn unsanitizable(description: String, policy: &UnsanitizablePolicy) -> Result<Sanitized> {
    match policy {
        UnsanitizablePolicy::Fail => Err(Error::UnsanitizableValue(description)),
        UnsanitizablePolicy::Substitute(sentinel) => {
            warn!("no representation for {}, storing '{}' instead", description, sentinel);
            Ok(Sanitized::native(Data::Str(sentinel.clone()))
                .degraded(Degradation::Substituted))
        }
    }
}

/// Lossless conversion of every element to `f64`.
fn coerce_to_float(elements: &[Value]) -> Coercion<Vec<f64>> {
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        let value = match element {
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Float(x) => *x,
            // Compared in i128: the cast back to i64 saturates.
            Value::Int(i) if (*i as f64) as i128 == i128::from(*i) => *i as f64,
            _ => return Coercion::Unsupported,
        };
        out.push(value);
    }
    Coercion::Coerced(out)
}

/// Applies `str()` to every element and requires the result to be ASCII.
fn encode_ascii(elements: &[Value]) -> Coercion<Vec<String>> {
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        match to_text(element) {
            Some(text) if text.is_ascii() => out.push(text),
            _ => return Coercion::Unsupported,
        }
    }
    Coercion::Coerced(out)
}

/// A (possibly nested, rectangular) list whose leaves are all numeric
/// scalars, promoted to the widest element kind.
fn coerce_numeric_list(items: &[Value]) -> Coercion<NumericArray> {
    let mut walk = ListWalk::default();
    if !walk.visit(items, 0) {
        return Coercion::Unsupported;
    }
    let kind = walk
        .leaves
        .iter()
        .map(|leaf| match leaf {
            Value::Complex(_) => NumericKind::Complex64,
            Value::Float(_) => NumericKind::Float64,
            _ => NumericKind::Integer64,
        })
        .max()
        .unwrap_or(NumericKind::Float64);
    let buffer = match kind {
        NumericKind::Integer64 => {
            NumericBuffer::Integer64(walk.leaves.iter().map(|leaf| as_i64(leaf)).collect())
        }
        NumericKind::Float64 => {
            NumericBuffer::Float64(walk.leaves.iter().map(|leaf| as_complex(leaf).re).collect())
        }
        NumericKind::Complex64 => {
            NumericBuffer::Complex64(walk.leaves.iter().map(|leaf| as_complex(leaf)).collect())
        }
    };
    match NumericArray::new(walk.shape, buffer) {
        Ok(arr) => Coercion::Coerced(arr),
        Err(_) => Coercion::Unsupported,
    }
}

fn as_i64(leaf: &Value) -> i64 {
    match leaf {
        Value::Int(i) => *i,
        Value::Bool(b) => (*b).into(),
        _ => 0,
    }
}

fn as_complex(leaf: &Value) -> Complex64 {
    match leaf {
        Value::Complex(c) => *c,
        Value::Float(x) => Complex64::new(*x, 0.0),
        other => Complex64::new(as_i64(other) as f64, 0.0),
    }
}

#[derive(Default)]
struct ListWalk<'a> {
    shape: Vec<usize>,
    leaf_depth: Option<usize>,
    leaves: Vec<&'a Value>,
}

impl<'a> ListWalk<'a> {
    fn visit(&mut self, items: &'a [Value], depth: usize) -> bool {
        if depth == self.shape.len() {
            self.shape.push(items.len());
        } else if self.shape[depth] != items.len() {
            return false;
        }
        for item in items {
            match item {
                Value::List(inner) => {
                    if !self.visit(inner, depth + 1) {
                        return false;
                    }
                }
                leaf if leaf.is_numeric_scalar() => {
                    if *self.leaf_depth.get_or_insert(depth) != depth {
                        return false;
                    }
                    self.leaves.push(leaf);
                }
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::value::Repr;

    #[derive(Debug)]
    struct NoRepr;

    impl Repr for NoRepr {
        fn repr(&self) -> Option<String> {
            None
        }
    }

    #[derive(Debug)]
    struct Instrument;

    impl Repr for Instrument {
        fn repr(&self) -> Option<String> {
            Some("<Instrument lockin>".to_string())
        }
    }

    fn leaf(value: impl Into<Value>) -> (Data, DtypeHint) {
        match sanitize(value.into(), &UnsanitizablePolicy::Fail).unwrap() {
            Sanitized::Leaf { data, hint, .. } => (data, hint),
            Sanitized::Mapping(_) => panic!("expected a leaf"),
        }
    }

    #[test]
    fn test_scalars_are_native() {
        assert_eq!(leaf(3), (Data::Int(3), DtypeHint::Native));
        assert_eq!(leaf(2.5), (Data::Float(2.5), DtypeHint::Native));
        assert_eq!(leaf("x"), (Data::Str("x".into()), DtypeHint::Native));
        assert_eq!(leaf(true), (Data::Int(1), DtypeHint::Native));
        assert_eq!(leaf(Value::None), (Data::Str("None".into()), DtypeHint::Native));
    }

    #[test]
    fn test_numeric_list_promotes() {
        assert_eq!(
            leaf(vec![Value::from(1), Value::from(2)]).0,
            Data::Numeric(NumericArray::from(vec![1_i64, 2]))
        );
        assert_eq!(
            leaf(vec![Value::from(1), Value::from(2.5)]).0,
            Data::Numeric(NumericArray::from(vec![1.0, 2.5]))
        );
        assert_eq!(
            leaf(Vec::<Value>::new()).0,
            Data::Numeric(NumericArray::from(Vec::<f64>::new()))
        );
    }

    #[test]
    fn test_nested_list_becomes_matrix() {
        let (data, hint) = leaf(vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(hint, DtypeHint::Native);
        let arr = data.as_numeric().unwrap();
        assert_eq!(arr.shape(), &[2, 2]);
        assert_eq!(arr.buffer(), &NumericBuffer::Integer64(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_ragged_list_is_stored_as_strings() {
        let ragged = vec![Value::from(vec![1, 2]), Value::from(vec![3])];
        let (data, hint) = leaf(ragged);
        assert_eq!(hint, DtypeHint::String);
        assert_eq!(data, Data::Text(TextArray::from(vec!["[1, 2]", "[3]"])));
    }

    #[test]
    fn test_mixed_list_is_stored_as_strings() {
        let (data, hint) = leaf(vec![Value::from(1), Value::from("a"), Value::from(0.5)]);
        assert_eq!(hint, DtypeHint::String);
        assert_eq!(data, Data::Text(TextArray::from(vec!["1", "a", "0.5"])));
    }

    #[test]
    fn test_non_ascii_list_is_flattened() {
        let (data, hint) = leaf(vec![Value::from(1), Value::from("µV")]);
        assert_eq!(hint, DtypeHint::Native);
        assert_eq!(data, Data::Str("[1, 'µV']".into()));
    }

    #[test]
    fn test_bool_array_coerces_to_float() {
        let (data, hint) = leaf(ndarray::array![true, false]);
        assert_eq!(hint, DtypeHint::Native);
        assert_eq!(data, Data::Numeric(NumericArray::from(vec![1.0, 0.0])));
    }

    #[test]
    fn test_object_array_with_complex_falls_back_to_strings() {
        let arr = ObjectArray::new(
            vec![2],
            vec![Value::from(1), Value::from(Complex64::new(0.0, 1.0))],
        )
        .unwrap();
        assert_eq!(leaf(arr).0, Data::Text(TextArray::from(vec!["1", "1j"])));
    }

    #[test]
    fn test_mapping_is_recursive() {
        let value: Value = [("a", Value::from(1)), ("b", Value::from(vec![0.5]))]
            .into_iter()
            .collect();
        let sanitized = sanitize(value, &UnsanitizablePolicy::Fail).unwrap();
        assert_eq!(sanitized.hint(), DtypeHint::Mapping);
        let Sanitized::Mapping(map) = sanitized else {
            panic!("expected a mapping")
        };
        assert_eq!(map["a"].hint(), DtypeHint::Native);
    }

    #[test]
    fn test_objects() {
        assert_eq!(
            leaf(Value::Object(Arc::new(Instrument))).0,
            Data::Str("<Instrument lockin>".into())
        );
        let err = sanitize(Value::Object(Arc::new(NoRepr)), &UnsanitizablePolicy::Fail);
        assert!(matches!(err, Err(Error::UnsanitizableValue(_))));

        let nested = Value::from(vec![Value::from(1), Value::Object(Arc::new(NoRepr))]);
        let substituted = sanitize(
            nested,
            &UnsanitizablePolicy::Substitute("<lost>".to_string()),
        )
        .unwrap();
        assert_eq!(
            substituted,
            Sanitized::Leaf {
                data: Data::Str("<lost>".into()),
                hint: DtypeHint::Native,
                degradation: Some(Degradation::Substituted),
            }
        );
    }

    #[test]
    fn test_large_integers_are_not_rounded() {
        let exact = ObjectArray::new(vec![2], vec![Value::from(1_i64 << 53), Value::from(0.5)])
            .unwrap();
        assert_eq!(
            leaf(exact).0,
            Data::Numeric(NumericArray::from(vec![9007199254740992.0, 0.5]))
        );

        let max = ObjectArray::new(vec![2], vec![Value::from(i64::MAX), Value::from(0.5)]).unwrap();
        let (data, hint) = leaf(max);
        assert_eq!(hint, DtypeHint::String);
        assert_eq!(
            data,
            Data::Text(TextArray::from(vec!["9223372036854775807", "0.5"]))
        );
    }

    #[test]
    fn test_changes_report_degraded_leaves() {
        let value: Value = [
            ("gain", Value::from(1.5)),
            ("mixed", Value::from(vec![Value::from(1), Value::from("a")])),
            (
                "setup",
                [("lockin", Value::Object(Arc::new(Instrument))), ("note", Value::None)]
                    .into_iter()
                    .collect(),
            ),
        ]
        .into_iter()
        .collect();
        let sanitized = sanitize(value, &UnsanitizablePolicy::Fail).unwrap();
        let changes = sanitized.changes();
        let reported: Vec<(&str, Degradation)> = changes
            .iter()
            .map(|change| (change.key.as_str(), change.degradation))
            .collect();
        assert_eq!(
            reported,
            vec![
                ("mixed", Degradation::StringArray),
                ("setup/lockin", Degradation::TextRepr),
                ("setup/note", Degradation::NoneAsString),
            ]
        );
        assert!(leaf_changes(vec![1.0, 2.0]).is_empty());
        assert_eq!(
            leaf_changes(vec![Value::from(1), Value::from("µV")])[0],
            SanitizationChange {
                key: String::new(),
                degradation: Degradation::FlatString
            }
        );
    }

    fn leaf_changes(value: impl Into<Value>) -> Vec<SanitizationChange> {
        sanitize(value.into(), &UnsanitizablePolicy::Fail)
            .unwrap()
            .changes()
    }
}
