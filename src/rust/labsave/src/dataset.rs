// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! A single container file and the operations on its node tree.
//!
//! The tree is kept in memory between calls. Every mutation is validated in
//! full and turned into a list of changes before anything is modified; the
//! changes are then applied and recorded as one journal entry. If recording
//! fails the tree is reloaded from disk, so the in-memory state never runs
//! ahead of the file.

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use labsave_log::{info, warn};

use crate::data::{Data, Entry, TextArray};
use crate::error::{Error, Result};
use crate::format::Storage;
use crate::path::NodePath;
use crate::sanitize::{Sanitized, UnsanitizablePolicy, sanitize};
use crate::selection::Selection;
use crate::tree::{Buffer, Change, DimLabel, Group, NodeRef, Occupancy, Record};
use crate::value::{Value, to_repr};

/// Attribute set on a coordinate record by [`Dataset::make_dim`].
pub const DIMENSION_SCALE_CLASS: &str = "DIMENSION_SCALE";

#[derive(Debug)]
pub struct Dataset {
    storage: Storage,
    root: Group,
    policy: UnsanitizablePolicy,
}

impl Dataset {
    /// Open the container at `filename`, or prepare to create it. The file
    /// itself is written on the first mutation.
    pub fn open(filename: impl AsRef<Path>) -> Result<Self> {
        let filename = filename.as_ref();
        let (storage, root) = if filename.exists() {
            info!("opening container '{}'", filename.display());
            Storage::load(filename)?
        } else {
            info!("container '{}' will be created on first write", filename.display());
            (Storage::new(filename), Group::default())
        };
        Ok(Dataset {
            storage,
            root,
            policy: UnsanitizablePolicy::default(),
        })
    }

    /// Like [`Dataset::open`], but fails if the file already exists.
    pub fn create(filename: impl AsRef<Path>) -> Result<Self> {
        let filename = filename.as_ref();
        if filename.exists() {
            return Err(Error::PathExists(filename.display().to_string()));
        }
        Self::open(filename)
    }

    pub fn with_policy(mut self, policy: UnsanitizablePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn filename(&self) -> &Path {
        self.storage.path()
    }

    pub fn policy(&self) -> &UnsanitizablePolicy {
        &self.policy
    }

    /// Write `value` at `path`.
    ///
    /// Without a selection a new record is created, and an existing node at
    /// `path` is an error. With a selection the addressed region of the
    /// existing record is filled; every element in it must still be
    /// unwritten. Mappings create one child per key and merge into an
    /// existing group.
    pub fn append(
        &mut self,
        path: &str,
        value: impl Into<Value>,
        slc: Option<&Selection>,
    ) -> Result<()> {
        let sanitized = sanitize(value.into(), &self.policy)?;
        self.append_sanitized(path, &sanitized, slc)
    }

    /// [`Dataset::append`] for a value that has already been sanitized.
    pub fn append_sanitized(
        &mut self,
        path: &str,
        value: &Sanitized,
        slc: Option<&Selection>,
    ) -> Result<()> {
        let path = NodePath::parse(path)?;
        let mut changes = Vec::new();
        self.plan(&path, value, slc, &mut changes)?;
        self.commit(changes)
    }

    fn plan(
        &self,
        path: &NodePath,
        value: &Sanitized,
        slc: Option<&Selection>,
        changes: &mut Vec<Change>,
    ) -> Result<()> {
        let data = match value {
            Sanitized::Mapping(children) => {
                match self.root.occupancy(path.parts()) {
                    Occupancy::Record => return Err(Error::PathExists(path.to_string())),
                    Occupancy::BlockedAt(depth) => return Err(blocked(path, depth)),
                    Occupancy::Absent | Occupancy::Group => {}
                }
                for (key, child) in children {
                    self.plan(&path.child(key)?, child, None, changes)?;
                }
                return Ok(());
            }
            Sanitized::Leaf { data, .. } => data,
        };
        if path.is_root() {
            return Err(Error::InvalidPath(path.to_string()));
        }

        match (self.root.occupancy(path.parts()), slc) {
            (Occupancy::BlockedAt(depth), _) => Err(blocked(path, depth)),
            (Occupancy::Group, _) | (Occupancy::Record, None) => {
                Err(Error::PathExists(path.to_string()))
            }
            (Occupancy::Absent, slc) => {
                if slc.is_some() {
                    warn!("no record at '{}' to fill, creating it from the given value", path);
                }
                changes.push(Change::Create {
                    path: path.parts().to_vec(),
                    record: Record::new(Buffer::from(data.clone())),
                });
                Ok(())
            }
            (Occupancy::Record, Some(slc)) => {
                let record = self.record(path)?;
                let values = Buffer::from(data.clone());
                let region = slc
                    .resolve(record.values.shape())
                    .map_err(|source| Error::InvalidSelection {
                        path: path.to_string(),
                        source,
                    })?;
                if region.shape != values.shape() {
                    return Err(Error::ShapeMismatch {
                        path: path.to_string(),
                        expected: region.shape,
                        found: values.shape().to_vec(),
                    });
                }
                if !record.values.accepts(&values) {
                    return Err(Error::DtypeMismatch {
                        path: path.to_string(),
                        expected: record.values.dtype_name(),
                        found: values.dtype_name(),
                    });
                }
                if record.any_filled(&region.indices) {
                    return Err(Error::WriteConflict(path.to_string()));
                }
                changes.push(Change::Fill {
                    path: path.parts().to_vec(),
                    indices: region.indices,
                    values,
                });
                Ok(())
            }
        }
    }

    /// Read the record at `path`, optionally restricted to `slc`, or the
    /// whole subtree of the group at `path` as a nested mapping.
    pub fn get(&self, path: &str, slc: Option<&Selection>) -> Result<Entry> {
        let path = NodePath::parse(path)?;
        match (self.node(&path)?, slc) {
            (NodeRef::Group(group), None) => Ok(group.to_entry()),
            (NodeRef::Group(_), Some(_)) => Err(Error::NotARecord(path.to_string())),
            (NodeRef::Record(record), None) => Ok(Entry::Data(record.values.clone().into_data())),
            (NodeRef::Record(record), Some(slc)) => {
                let region = slc.resolve(record.values.shape()).map_err(|source| {
                    Error::InvalidSelection {
                        path: path.to_string(),
                        source,
                    }
                })?;
                let values = record.values.gather(&region.indices, region.shape);
                Ok(Entry::Data(values.into_data()))
            }
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        NodePath::parse(path)
            .is_ok_and(|path| self.root.lookup(path.parts()).is_some())
    }

    /// Names of the children of the group at `path`. Records have none.
    pub fn keys(&self, path: &str) -> Result<Vec<String>> {
        let path = NodePath::parse(path)?;
        Ok(match self.node(&path)? {
            NodeRef::Group(group) => group.children.keys().cloned().collect(),
            NodeRef::Record(_) => Vec::new(),
        })
    }

    pub fn shape(&self, path: &str) -> Result<Vec<usize>> {
        let path = NodePath::parse(path)?;
        Ok(self.record(&path)?.values.shape().to_vec())
    }

    pub fn attrs(&self, path: &str) -> Result<IndexMap<String, Data>> {
        let path = NodePath::parse(path)?;
        let attrs = match self.node(&path)? {
            NodeRef::Group(group) => &group.attrs,
            NodeRef::Record(record) => &record.attrs,
        };
        Ok(attrs
            .iter()
            .map(|(name, value)| (name.clone(), value.clone().into_data()))
            .collect())
    }

    /// Dimension labels of the record at `path`, keyed by axis.
    pub fn dims(&self, path: &str) -> Result<BTreeMap<usize, DimLabel>> {
        let path = NodePath::parse(path)?;
        Ok(self.record(&path)?.dims.clone())
    }

    /// Declare that axis `axis` of the record at `path` is labeled
    /// `label`, with coordinates taken from the one-dimensional record at
    /// `dim_path`.
    ///
    /// The coordinate record must already exist and its length must match
    /// the extent of the labeled axis.
    pub fn make_dim(
        &mut self,
        path: &str,
        axis: usize,
        label: &str,
        dim_path: &str,
        dim_name: &str,
    ) -> Result<()> {
        let path = NodePath::parse(path)?;
        let dim_path = NodePath::parse(dim_path)?;
        let shape = self.record(&path)?.values.shape().to_vec();
        let coordinate_shape = self.record(&dim_path)?.values.shape().to_vec();
        let mismatch = |reason: String| Error::DimensionMismatch {
            path: path.to_string(),
            axis,
            reason,
        };
        let Some(&extent) = shape.get(axis) else {
            return Err(mismatch(format!("the record has {} dimension(s)", shape.len())));
        };
        match coordinate_shape.as_slice() {
            [len] if *len == extent => {}
            [len] => {
                return Err(mismatch(format!(
                    "'{dim_path}' has {len} coordinate(s), the axis has {extent}"
                )));
            }
            other => {
                return Err(mismatch(format!(
                    "'{dim_path}' is not one-dimensional (shape {other:?})"
                )));
            }
        }

        self.commit(vec![
            Change::Dim {
                path: path.parts().to_vec(),
                axis,
                label: DimLabel {
                    label: label.to_string(),
                    coordinate: dim_path.to_string(),
                    name: dim_name.to_string(),
                },
            },
            Change::Attrs {
                path: dim_path.parts().to_vec(),
                attrs: IndexMap::from([
                    ("CLASS".to_string(), text_attr(DIMENSION_SCALE_CLASS)),
                    ("NAME".to_string(), text_attr(dim_name)),
                ]),
            },
        ])
    }

    /// Set attribute `name` on the node at `path`, replacing any previous
    /// value.
    pub fn create_attr(&mut self, path: &str, name: &str, value: impl Into<Value>) -> Result<()> {
        let path = NodePath::parse(path)?;
        self.node(&path)?;
        let value = attr_buffer(name, value.into(), &self.policy)?;
        self.commit(vec![Change::Attrs {
            path: path.parts().to_vec(),
            attrs: IndexMap::from([(name.to_string(), value)]),
        }])
    }

    /// Set one attribute per entry of `mapping`, each name prefixed with
    /// `prefix`. Nested mappings are flattened to `key.subkey` names.
    pub fn create_attr_dict<K, V>(
        &mut self,
        path: &str,
        mapping: impl IntoIterator<Item = (K, V)>,
        prefix: &str,
    ) -> Result<()>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let path = NodePath::parse(path)?;
        self.node(&path)?;
        let mut flat = IndexMap::new();
        for (key, value) in mapping {
            flatten_attrs(
                format!("{prefix}{}", key.into()),
                value.into(),
                &self.policy,
                &mut flat,
            )?;
        }
        self.commit(vec![Change::Attrs {
            path: path.parts().to_vec(),
            attrs: flat,
        }])
    }

    fn node(&self, path: &NodePath) -> Result<NodeRef<'_>> {
        self.root
            .lookup(path.parts())
            .ok_or_else(|| Error::PathNotFound(path.to_string()))
    }

    fn record(&self, path: &NodePath) -> Result<&Record> {
        match self.node(path)? {
            NodeRef::Record(record) => Ok(record),
            NodeRef::Group(_) => Err(Error::NotARecord(path.to_string())),
        }
    }

    fn commit(&mut self, changes: Vec<Change>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let line = self.storage.encode(&changes)?;
        let outcome = changes
            .into_iter()
            .try_for_each(|change| self.root.apply(change))
            .map_err(Error::new)
            .and_then(|()| self.storage.persist(&self.root, &line));
        if let Err(err) = outcome {
            self.reload();
            return Err(err);
        }
        Ok(())
    }

    fn reload(&mut self) {
        let filename = self.filename().to_path_buf();
        if !filename.exists() {
            self.storage = Storage::new(&filename);
            self.root = Group::default();
            return;
        }
        match Storage::load(&filename) {
            Ok((storage, root)) => {
                self.storage = storage;
                self.root = root;
            }
            Err(err) => {
                warn!(
                    "failed to reload '{}' after a failed write: {}",
                    filename.display(),
                    err
                );
            }
        }
    }
}

fn blocked(path: &NodePath, depth: usize) -> Error {
    let prefix = format!("/{}", path.parts()[..=depth].join("/"));
    Error::PathExists(prefix)
}

fn text_attr(value: &str) -> Buffer {
    Buffer::Text(TextArray::scalar(value.to_string()))
}

fn attr_buffer(name: &str, value: Value, policy: &UnsanitizablePolicy) -> Result<Buffer> {
    if let Value::Map(_) = value {
        let text = to_repr(&value)
            .ok_or_else(|| Error::UnsanitizableValue(format!("attribute '{name}'")))?;
        warn!("storing mapping attribute '{}' by its text representation", name);
        return Ok(text_attr(&text));
    }
    match sanitize(value, policy)? {
        Sanitized::Leaf { data, .. } => Ok(Buffer::from(data)),
        Sanitized::Mapping(_) => Err(Error::UnsanitizableValue(format!("attribute '{name}'"))),
    }
}

fn flatten_attrs(
    name: String,
    value: Value,
    policy: &UnsanitizablePolicy,
    flat: &mut IndexMap<String, Buffer>,
) -> Result<()> {
    match value {
        Value::Map(children) => {
            for (key, child) in children {
                flatten_attrs(format!("{name}.{key}"), child, policy, flat)?;
            }
            Ok(())
        }
        value => {
            let buffer = attr_buffer(&name, value, policy)?;
            flat.insert(name, buffer);
            Ok(())
        }
    }
}
