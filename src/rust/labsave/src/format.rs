// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! On-disk representation of a container.
//!
//! A container is a JSON snapshot of the node tree plus a journal next to
//! it. Every mutation appends one line with its changes to the journal, so
//! the cost of a write follows the size of the written data. A line is only
//! replayed if it is complete and belongs to the current snapshot
//! generation; an interrupted write therefore leaves the previous state.
//!
//! Once the journal outgrows the snapshot, a new snapshot is written to a
//! sibling file, renamed over the old one and the journal is dropped.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use labsave_log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tree::{Change, Group};

const FORMAT_NAME: &str = "labsave";
const FORMAT_VERSION: u32 = 1;

/// Journals smaller than this are never compacted.
const MIN_COMPACTION_BYTES: u64 = 1 << 20;

#[derive(Serialize, Deserialize)]
struct FileImage<G> {
    format: String,
    version: u32,
    #[serde(default)]
    generation: u64,
    root: G,
}

#[derive(Serialize, Deserialize)]
struct JournalEntry<C> {
    generation: u64,
    changes: C,
}

/// The files backing one container.
#[derive(Debug)]
pub(crate) struct Storage {
    path: PathBuf,
    journal: PathBuf,
    generation: u64,
    /// `None` until the snapshot is first written.
    snapshot_len: Option<u64>,
    /// Length of the valid, replayed part of the journal.
    journal_len: u64,
}

impl Storage {
    /// Storage for a container that does not exist on disk yet.
    pub fn new(path: &Path) -> Self {
        Storage {
            path: path.to_path_buf(),
            journal: journal_path(path),
            generation: 0,
            snapshot_len: None,
            journal_len: 0,
        }
    }

    pub fn load(path: &Path) -> Result<(Self, Group)> {
        let bytes = fs::read(path)?;
        let malformed = |reason: String| Error::MalformedContainer {
            path: path.display().to_string(),
            reason,
        };
        let image: FileImage<Group> =
            serde_json::from_slice(&bytes).map_err(|e| malformed(e.to_string()))?;
        if image.format != FORMAT_NAME {
            return Err(malformed(format!("unknown format '{}'", image.format)));
        }
        if image.version != FORMAT_VERSION {
            return Err(malformed(format!(
                "unsupported version {} (expected {FORMAT_VERSION})",
                image.version
            )));
        }
        let mut storage = Storage {
            path: path.to_path_buf(),
            journal: journal_path(path),
            generation: image.generation,
            snapshot_len: Some(bytes.len() as u64),
            journal_len: 0,
        };
        let mut root = image.root;
        storage.replay(&mut root).map_err(malformed)?;
        root.validate("/").map_err(malformed)?;
        Ok((storage, root))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `changes` as a journal line.
    pub fn encode(&self, changes: &[Change]) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(&JournalEntry {
            generation: self.generation,
            changes,
        })?;
        line.push(b'\n');
        Ok(line)
    }

    /// Persist a journal line whose changes are already applied to `root`.
    pub fn persist(&mut self, root: &Group, line: &[u8]) -> Result<()> {
        match self.snapshot_len {
            Some(len) if self.journal_len <= len.max(MIN_COMPACTION_BYTES) => {
                self.append_journal(line)
            }
            _ => self.compact(root),
        }
    }

    fn replay(&mut self, root: &mut Group) -> Result<(), String> {
        let bytes = match fs::read(&self.journal) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(format!("cannot read the journal: {err}")),
        };
        let mut valid = 0;
        for line in bytes.split_inclusive(|&b| b == b'\n') {
            if !line.ends_with(b"\n") {
                warn!("discarding an incomplete entry at the end of '{}'", self.journal.display());
                break;
            }
            let Ok(entry) = serde_json::from_slice::<JournalEntry<Vec<Change>>>(line) else {
                warn!("discarding unreadable entries of '{}'", self.journal.display());
                break;
            };
            // Left over from before the last compaction.
            if entry.generation != self.generation {
                break;
            }
            for change in entry.changes {
                root.apply(change)?;
            }
            valid += line.len();
        }
        self.journal_len = valid as u64;
        Ok(())
    }

    fn append_journal(&mut self, line: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.journal)?;
        let written = file
            .set_len(self.journal_len)
            .and_then(|()| file.seek(SeekFrom::Start(self.journal_len)))
            .and_then(|_| file.write_all(line))
            .and_then(|()| file.sync_data());
        if let Err(err) = written {
            let _ = file.set_len(self.journal_len);
            return Err(err.into());
        }
        self.journal_len += line.len() as u64;
        Ok(())
    }

    /// Write `root` as the snapshot of a new generation and drop the journal.
    fn compact(&mut self, root: &Group) -> Result<()> {
        let generation = self.generation + 1;
        let len = store(&self.path, root, generation)?;
        self.generation = generation;
        self.snapshot_len = Some(len);
        self.journal_len = 0;
        match fs::remove_file(&self.journal) {
            Err(err) if err.kind() != ErrorKind::NotFound => {
                warn!(
                    "cannot remove '{}', its entries are ignored: {}",
                    self.journal.display(),
                    err
                );
            }
            _ => {}
        }
        Ok(())
    }
}

/// Write a snapshot atomically. Returns its size in bytes.
fn store(path: &Path, root: &Group, generation: u64) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let image = FileImage {
        format: FORMAT_NAME.to_string(),
        version: FORMAT_VERSION,
        generation,
        root,
    };
    let bytes = serde_json::to_vec(&image)?;
    let staging = sibling(path, ".partial");
    let written = File::create(&staging).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&staging, path)) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }
    Ok(bytes.len() as u64)
}

pub(crate) fn journal_path(path: &Path) -> PathBuf {
    sibling(path, ".journal")
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
