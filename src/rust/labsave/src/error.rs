// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;

use crate::selection::SelectionError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("value cannot be reduced to a storable form: {0}")]
    UnsanitizableValue(String),

    #[error("shape mismatch at '{path}': selection addresses {expected:?}, value has shape {found:?}")]
    ShapeMismatch {
        path: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("a node already exists at '{0}'")]
    PathExists(String),

    #[error("the addressed region of '{0}' already holds data")]
    WriteConflict(String),

    #[error("no group or record at '{0}'")]
    PathNotFound(String),

    #[error("cannot write {found} data into {expected} record '{path}'")]
    DtypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid selection for '{path}': {source}")]
    InvalidSelection {
        path: String,
        #[source]
        source: SelectionError,
    },

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("'{0}' is a group, not a record")]
    NotARecord(String),

    #[error("cannot label axis {axis} of '{path}': {reason}")]
    DimensionMismatch {
        path: String,
        axis: usize,
        reason: String,
    },

    #[error("no destination named '{0}'")]
    UnknownDestination(String),

    #[error("malformed container '{path}': {reason}")]
    MalformedContainer { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    pub fn new<T>(msg: T) -> Self
    where
        T: Display,
    {
        Error::Anyhow(anyhow::anyhow!(msg.to_string()))
    }
}
