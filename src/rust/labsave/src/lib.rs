// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Incremental persistence of nested measurement data.
//!
//! Values of arbitrary shape are sanitized into storable records and written
//! into a hierarchical container, either in full or region by region into
//! pre-allocated placeholder records. A [`Saver`] mirrors every write to
//! each configured destination.
//!
//! ```no_run
//! use labsave::{NumericArray, SaveConfig, Saver, sel};
//!
//! let config = SaveConfig::default().with_destination("local", "/data/runs");
//! let mut saver = Saver::new(&config, "gatesweep", true)?;
//! saver.append("/h", NumericArray::full_nan(&[3, 3]), None)?;
//! saver.append("/h", vec![1.0, 2.0, 3.0], Some(&sel![1, ..3]))?;
//! # Ok::<(), labsave::Error>(())
//! ```

mod config;
mod data;
mod dataset;
mod error;
mod format;
mod naming;
mod path;
mod sanitize;
mod saver;
mod selection;
mod tree;
mod value;

pub use config::{CONFIG_ENV_VAR, DEFAULT_EXTENSION, Destination, SaveConfig, TimestampMode};
pub use data::{Data, Entry, TextArray};
pub use dataset::{DIMENSION_SCALE_CLASS, Dataset};
pub use error::{Error, Result};
pub use numeric_array::{NumericArray, NumericBuffer, NumericKind};
pub use sanitize::{
    Degradation, DtypeHint, SanitizationChange, Sanitized, UnsanitizablePolicy, sanitize,
};
pub use saver::{LOCAL_DESTINATION, Saver};
pub use selection::{Selection, SelectionError, SliceElem};
pub use tree::DimLabel;
pub use value::{ObjectArray, Repr, Value};
