// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! In-memory node tree of a container.

use std::collections::BTreeMap;

use bitvec::prelude::{BitVec, Lsb0};
use indexmap::IndexMap;
use numeric_array::{NumericArray, NumericBuffer};
use serde::{Deserialize, Serialize};

use crate::data::{Data, Entry, TextArray};

/// Per-element record of which positions hold written data.
pub(crate) type FillMask = BitVec<u64, Lsb0>;

/// Values of a record or attribute. Scalars are zero-dimensional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "array", rename_all = "lowercase")]
pub(crate) enum Buffer {
    Numeric(NumericArray),
    Text(TextArray),
}

impl Buffer {
    pub fn shape(&self) -> &[usize] {
        match self {
            Buffer::Numeric(arr) => arr.shape(),
            Buffer::Text(arr) => arr.shape(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Buffer::Numeric(arr) => arr.len(),
            Buffer::Text(arr) => arr.len(),
        }
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            Buffer::Numeric(arr) => arr.kind().name(),
            Buffer::Text(_) => "text",
        }
    }

    pub fn is_placeholder(&self, index: usize) -> bool {
        match self {
            Buffer::Numeric(arr) => arr.is_placeholder(index),
            Buffer::Text(arr) => arr.is_placeholder(index),
        }
    }

    pub fn gather(&self, indices: &[usize], shape: Vec<usize>) -> Buffer {
        match self {
            Buffer::Numeric(arr) => Buffer::Numeric(arr.gather(indices, shape)),
            Buffer::Text(arr) => Buffer::Text(arr.gather(indices, shape)),
        }
    }

    /// Whether `values` can be written into this buffer without narrowing.
    pub fn accepts(&self, values: &Buffer) -> bool {
        match (self, values) {
            (Buffer::Numeric(dst), Buffer::Numeric(src)) => src.kind() <= dst.kind(),
            (Buffer::Text(_), Buffer::Text(_)) => true,
            _ => false,
        }
    }

    /// Overwrite the positions `indices` with `values`. Returns `false`,
    /// leaving the buffer untouched, when the dtypes are incompatible.
    pub fn scatter(&mut self, indices: &[usize], values: &Buffer) -> bool {
        match (self, values) {
            (Buffer::Numeric(dst), Buffer::Numeric(src)) => dst.scatter(indices, src).is_ok(),
            (Buffer::Text(dst), Buffer::Text(src)) => {
                dst.scatter(indices, src);
                true
            }
            _ => false,
        }
    }

    pub fn is_consistent(&self) -> bool {
        match self {
            Buffer::Numeric(_) => true,
            Buffer::Text(arr) => arr.is_consistent(),
        }
    }

    /// Convert to a user-facing value. Zero-dimensional buffers become
    /// scalars.
    pub fn into_data(self) -> Data {
        match self {
            Buffer::Numeric(arr) if arr.ndim() == 0 => match arr.into_parts().1 {
                NumericBuffer::Integer64(v) => Data::Int(v[0]),
                NumericBuffer::Float64(v) => Data::Float(v[0]),
                NumericBuffer::Complex64(v) => Data::Complex(v[0]),
            },
            Buffer::Text(arr) if arr.shape().is_empty() => {
                Data::Str(arr.into_parts().1.swap_remove(0))
            }
            Buffer::Numeric(arr) => Data::Numeric(arr),
            Buffer::Text(arr) => Data::Text(arr),
        }
    }
}

impl From<Data> for Buffer {
    fn from(data: Data) -> Self {
        match data {
            Data::Int(v) => Buffer::Numeric(NumericArray::from_i64(v)),
            Data::Float(v) => Buffer::Numeric(NumericArray::from_f64(v)),
            Data::Complex(v) => Buffer::Numeric(NumericArray::from_complex(v)),
            Data::Str(v) => Buffer::Text(TextArray::scalar(v)),
            Data::Numeric(arr) => Buffer::Numeric(arr),
            Data::Text(arr) => Buffer::Text(arr),
        }
    }
}

/// Coordinate labeling of one axis of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimLabel {
    /// Axis label, e.g. `"V_g (V)"`.
    pub label: String,
    /// Path of the one-dimensional record holding the coordinates.
    pub coordinate: String,
    /// Human-readable name of the coordinate record.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub values: Buffer,
    pub filled: FillMask,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: IndexMap<String, Buffer>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dims: BTreeMap<usize, DimLabel>,
}

impl Record {
    /// A new record. Elements that hold a placeholder value start unfilled.
    pub fn new(values: Buffer) -> Self {
        let filled = (0..values.len())
            .map(|i| !values.is_placeholder(i))
            .collect();
        Record {
            values,
            filled,
            attrs: IndexMap::new(),
            dims: BTreeMap::new(),
        }
    }

    pub fn any_filled(&self, indices: &[usize]) -> bool {
        indices.iter().any(|&i| self.filled[i])
    }

    pub fn mark_filled(&mut self, indices: &[usize]) {
        for &i in indices {
            self.filled.set(i, true);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub(crate) enum Node {
    Group(Group),
    Record(Record),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Group {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: IndexMap<String, Buffer>,
    #[serde(default)]
    pub children: IndexMap<String, Node>,
}

/// A single change to the tree. Changes are applied in memory and
/// recorded in the container journal in the same form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub(crate) enum Change {
    Create {
        path: Vec<String>,
        record: Record,
    },
    Fill {
        path: Vec<String>,
        indices: Vec<usize>,
        values: Buffer,
    },
    Dim {
        path: Vec<String>,
        axis: usize,
        label: DimLabel,
    },
    Attrs {
        path: Vec<String>,
        attrs: IndexMap<String, Buffer>,
    },
}

/// What lives at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Occupancy {
    Absent,
    Group,
    Record,
    /// A record sits at this depth of the path, so nothing can exist below it.
    BlockedAt(usize),
}

pub(crate) enum NodeRef<'a> {
    Group(&'a Group),
    Record(&'a Record),
}

impl Group {
    pub fn occupancy(&self, parts: &[String]) -> Occupancy {
        let mut group = self;
        for (depth, part) in parts.iter().enumerate() {
            match group.children.get(part) {
                None => return Occupancy::Absent,
                Some(Node::Group(child)) => group = child,
                Some(Node::Record(_)) if depth + 1 == parts.len() => return Occupancy::Record,
                Some(Node::Record(_)) => return Occupancy::BlockedAt(depth),
            }
        }
        Occupancy::Group
    }

    pub fn lookup(&self, parts: &[String]) -> Option<NodeRef<'_>> {
        let Some((first, rest)) = parts.split_first() else {
            return Some(NodeRef::Group(self));
        };
        match self.children.get(first)? {
            Node::Group(group) => group.lookup(rest),
            Node::Record(record) if rest.is_empty() => Some(NodeRef::Record(record)),
            Node::Record(_) => None,
        }
    }

    pub fn record_mut(&mut self, parts: &[String]) -> Option<&mut Record> {
        let (first, rest) = parts.split_first()?;
        match self.children.get_mut(first)? {
            Node::Group(group) => group.record_mut(rest),
            Node::Record(record) if rest.is_empty() => Some(record),
            Node::Record(_) => None,
        }
    }

    /// Attributes of the group or record at `parts`.
    pub fn attrs_mut(&mut self, parts: &[String]) -> Option<&mut IndexMap<String, Buffer>> {
        let Some((first, rest)) = parts.split_first() else {
            return Some(&mut self.attrs);
        };
        match self.children.get_mut(first)? {
            Node::Group(group) => group.attrs_mut(rest),
            Node::Record(record) if rest.is_empty() => Some(&mut record.attrs),
            Node::Record(_) => None,
        }
    }

    /// Insert a record, creating intermediate groups. Returns `false` if a
    /// record blocks the path.
    pub fn insert_record(&mut self, parts: &[String], record: Record) -> bool {
        let Some((name, parent)) = parts.split_last() else {
            return false;
        };
        let mut group = self;
        for part in parent {
            let node = group
                .children
                .entry(part.clone())
                .or_insert_with(|| Node::Group(Group::default()));
            group = match node {
                Node::Group(child) => child,
                Node::Record(_) => return false,
            };
        }
        group.children.insert(name.clone(), Node::Record(record));
        true
    }

    /// Rebuild the subtree as plain values.
    pub fn to_entry(&self) -> Entry {
        Entry::Group(
            self.children
                .iter()
                .map(|(name, node)| {
                    let entry = match node {
                        Node::Group(group) => group.to_entry(),
                        Node::Record(record) => Entry::Data(record.values.clone().into_data()),
                    };
                    (name.clone(), entry)
                })
                .collect(),
        )
    }

    /// Apply a change that was validated against this tree, or replay one
    /// read back from disk.
    pub fn apply(&mut self, change: Change) -> Result<(), String> {
        match change {
            Change::Create { path, record } => {
                if !self.insert_record(&path, record) {
                    return Err(format!("cannot create a record at '{}'", display(&path)));
                }
            }
            Change::Fill {
                path,
                indices,
                values,
            } => {
                let record = self.record_mut(&path).ok_or_else(|| missing(&path))?;
                let in_bounds = indices
                    .iter()
                    .all(|&i| i < record.values.len() && i < record.filled.len());
                if !in_bounds || indices.len() != values.len() {
                    return Err(format!("fill of '{}' does not fit the record", display(&path)));
                }
                if !record.values.scatter(&indices, &values) {
                    return Err(format!(
                        "cannot write {} data into {} record '{}'",
                        values.dtype_name(),
                        record.values.dtype_name(),
                        display(&path)
                    ));
                }
                record.mark_filled(&indices);
            }
            Change::Dim { path, axis, label } => {
                self.record_mut(&path)
                    .ok_or_else(|| missing(&path))?
                    .dims
                    .insert(axis, label);
            }
            Change::Attrs { path, attrs } => {
                self.attrs_mut(&path)
                    .ok_or_else(|| missing(&path))?
                    .extend(attrs);
            }
        }
        Ok(())
    }

    /// Check structural invariants after loading from disk.
    pub fn validate(&self, at: &str) -> Result<(), String> {
        validate_attrs(&self.attrs, at)?;
        for (name, node) in &self.children {
            let path = format!("{}/{name}", at.trim_end_matches('/'));
            match node {
                Node::Group(group) => group.validate(&path)?,
                Node::Record(record) => {
                    if !record.values.is_consistent() {
                        return Err(format!("record '{path}' has an inconsistent shape"));
                    }
                    if record.filled.len() != record.values.len() {
                        return Err(format!("record '{path}' has a fill mask of the wrong length"));
                    }
                    validate_attrs(&record.attrs, &path)?;
                }
            }
        }
        Ok(())
    }
}

fn validate_attrs(attrs: &IndexMap<String, Buffer>, at: &str) -> Result<(), String> {
    match attrs.iter().find(|(_, value)| !value.is_consistent()) {
        Some((name, _)) => Err(format!("attribute '{name}' of '{at}' has an inconsistent shape")),
        None => Ok(()),
    }
}

fn display(path: &[String]) -> String {
    format!("/{}", path.join("/"))
}

fn missing(path: &[String]) -> String {
    format!("no record or group at '{}'", display(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(path: &str) -> Vec<String> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_placeholders_start_unfilled() {
        let record = Record::new(Buffer::Numeric(NumericArray::from(vec![1.0, f64::NAN])));
        assert!(record.any_filled(&[0]));
        assert!(!record.any_filled(&[1]));

        let text = Record::new(Buffer::Text(TextArray::from(vec!["", "a"])));
        assert!(!text.any_filled(&[0]));
        assert!(text.any_filled(&[0, 1]));
    }

    #[test]
    fn test_insert_and_occupancy() {
        let mut root = Group::default();
        let record = Record::new(Buffer::from(Data::Int(1)));
        assert!(root.insert_record(&parts("a/b"), record.clone()));
        assert_eq!(root.occupancy(&parts("a")), Occupancy::Group);
        assert_eq!(root.occupancy(&parts("a/b")), Occupancy::Record);
        assert_eq!(root.occupancy(&parts("a/b/c")), Occupancy::BlockedAt(1));
        assert_eq!(root.occupancy(&parts("x")), Occupancy::Absent);
        assert!(!root.insert_record(&parts("a/b/c"), record));
    }

    #[test]
    fn test_scalar_buffers_become_scalars() {
        assert_eq!(Buffer::from(Data::Float(0.5)).into_data(), Data::Float(0.5));
        assert_eq!(
            Buffer::from(Data::Str("x".into())).into_data(),
            Data::Str("x".into())
        );
    }

    #[test]
    fn test_to_entry() {
        let mut root = Group::default();
        root.insert_record(&parts("y/a"), Record::new(Buffer::from(Data::Int(1))));
        root.insert_record(
            &parts("y/b"),
            Record::new(Buffer::from(Data::Str("x".into()))),
        );
        let entry = root.to_entry();
        let y = entry.as_group().unwrap()["y"].as_group().unwrap();
        assert_eq!(y["a"], Entry::Data(Data::Int(1)));
        assert_eq!(y["b"], Entry::Data(Data::Str("x".into())));
    }

    #[test]
    fn test_apply_fill_checks_bounds() {
        let mut root = Group::default();
        root.insert_record(
            &parts("h"),
            Record::new(Buffer::Numeric(NumericArray::full_nan(&[2]))),
        );
        let fill = |index| Change::Fill {
            path: parts("h"),
            indices: vec![index],
            values: Buffer::from(Data::Float(1.0)),
        };
        assert!(root.apply(fill(5)).is_err());
        root.apply(fill(1)).unwrap();
        let Some(NodeRef::Record(record)) = root.lookup(&parts("h")) else {
            panic!("expected a record")
        };
        assert!(record.any_filled(&[1]));
        assert!(!record.any_filled(&[0]));
    }

    #[test]
    fn test_validate_checks_attributes() {
        let mut root = Group::default();
        root.insert_record(&parts("a"), Record::new(Buffer::from(Data::Int(1))));
        root.validate("/").unwrap();

        let broken: Buffer =
            serde_json::from_str(r#"{"type": "text", "array": {"shape": [], "values": []}}"#)
                .unwrap();
        root.record_mut(&parts("a"))
            .unwrap()
            .attrs
            .insert("unit".to_string(), broken.clone());
        assert!(root.validate("/").is_err());

        root.record_mut(&parts("a")).unwrap().attrs.clear();
        root.attrs.insert("unit".to_string(), broken);
        assert!(root.validate("/").is_err());
    }
}
