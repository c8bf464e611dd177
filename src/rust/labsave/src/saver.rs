// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Mirroring of every write to all configured destinations.

use std::fs;

use chrono::{Local, NaiveDateTime};
use indexmap::IndexMap;
use labsave_log::{info, warn};

use crate::config::SaveConfig;
use crate::data::Entry;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::naming::container_filename;
use crate::sanitize::{UnsanitizablePolicy, sanitize};
use crate::selection::Selection;
use crate::value::Value;

/// Destination read from when [`Saver::get`] is not told otherwise.
pub const LOCAL_DESTINATION: &str = "local";

/// One container per configured destination, all receiving the same writes.
///
/// Destinations are written one after the other in configuration order. A
/// failure stops the fan-out, so earlier destinations may already hold a
/// write that later ones never received.
#[derive(Debug)]
pub struct Saver {
    datasets: IndexMap<String, Dataset>,
    policy: UnsanitizablePolicy,
}

impl Saver {
    pub fn new(config: &SaveConfig, run_name: &str, add_timestamp: bool) -> Result<Self> {
        let started = add_timestamp.then(|| Local::now().naive_local());
        Self::with_timestamp(config, run_name, started)
    }

    /// Like [`Saver::new`] with an explicit start time for the file name
    /// prefix. `None` omits the prefix.
    pub fn with_timestamp(
        config: &SaveConfig,
        run_name: &str,
        started: Option<NaiveDateTime>,
    ) -> Result<Self> {
        let prefix = started.map(|at| config.timestamp.prefix(&at));
        let mut datasets = IndexMap::with_capacity(config.destinations.len());
        for (key, destination) in &config.destinations {
            fs::create_dir_all(&destination.directory)?;
            let filename = container_filename(
                &destination.directory,
                run_name,
                &config.extension,
                prefix.as_deref(),
            );
            let dataset = Dataset::open(filename)?.with_policy(config.unsanitizable.clone());
            datasets.insert(key.clone(), dataset);
        }
        if datasets.is_empty() {
            warn!("no save destinations configured, run '{}' is not stored", run_name);
        } else {
            info!("saving run '{}' to {} destination(s)", run_name, datasets.len());
        }
        Ok(Saver {
            datasets,
            policy: config.unsanitizable.clone(),
        })
    }

    /// Write `value` to every destination. The value is sanitized once.
    pub fn append(
        &mut self,
        path: &str,
        value: impl Into<Value>,
        slc: Option<&Selection>,
    ) -> Result<()> {
        let sanitized = sanitize(value.into(), &self.policy)?;
        for dataset in self.datasets.values_mut() {
            dataset.append_sanitized(path, &sanitized, slc)?;
        }
        Ok(())
    }

    /// Read from the destination `filetouse`; by default the `"local"`
    /// destination, or the first one if there is none named so.
    pub fn get(&self, path: &str, slc: Option<&Selection>, filetouse: Option<&str>) -> Result<Entry> {
        let dataset = match filetouse {
            Some(key) => self
                .datasets
                .get(key)
                .ok_or_else(|| Error::UnknownDestination(key.to_string()))?,
            None => match self
                .datasets
                .get(LOCAL_DESTINATION)
                .or_else(|| self.datasets.values().next())
            {
                Some(dataset) => dataset,
                None => return Err(Error::PathNotFound(path.to_string())),
            },
        };
        dataset.get(path, slc)
    }

    pub fn make_dim(
        &mut self,
        path: &str,
        axis: usize,
        label: &str,
        dim_path: &str,
        dim_name: &str,
    ) -> Result<()> {
        self.datasets
            .values_mut()
            .try_for_each(|dataset| dataset.make_dim(path, axis, label, dim_path, dim_name))
    }

    pub fn create_attr(&mut self, path: &str, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.datasets
            .values_mut()
            .try_for_each(|dataset| dataset.create_attr(path, name, value.clone()))
    }

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
        let mapping: Vec<(String, Value)> = mapping
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.datasets
            .values_mut()
            .try_for_each(|dataset| dataset.create_attr_dict(path, mapping.clone(), prefix))
    }

    pub fn dataset(&self, key: &str) -> Option<&Dataset> {
        self.datasets.get(key)
    }

    pub fn dataset_mut(&mut self, key: &str) -> Option<&mut Dataset> {
        self.datasets.get_mut(key)
    }

    pub fn datasets(&self) -> &IndexMap<String, Dataset> {
        &self.datasets
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
