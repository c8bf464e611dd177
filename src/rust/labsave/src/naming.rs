// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::config::TimestampMode;

impl TimestampMode {
    /// File name prefix for a run started at `at`.
    pub fn prefix(&self, at: &NaiveDateTime) -> String {
        let pattern = match self {
            TimestampMode::Seconds => "%Y-%m-%d_%H%M%S_",
            TimestampMode::Day => "%Y-%m-%d_",
        };
        at.format(pattern).to_string()
    }
}

/// `<directory>/[<prefix>]<run_name>.<extension>`
pub(crate) fn container_filename(
    directory: &Path,
    run_name: &str,
    extension: &str,
    prefix: Option<&str>,
) -> PathBuf {
    let mut name = format!("{}{run_name}", prefix.unwrap_or_default());
    if !extension.is_empty() {
        name.push('.');
        name.push_str(extension.trim_start_matches('.'));
    }
    directory.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 2)
            .unwrap()
    }

    #[test]
    fn test_prefix() {
        assert_eq!(TimestampMode::Seconds.prefix(&at()), "2024-03-07_090502_");
        assert_eq!(TimestampMode::Day.prefix(&at()), "2024-03-07_");
    }

    #[test]
    fn test_container_filename() {
        let dir = Path::new("/data");
        assert_eq!(
            container_filename(dir, "gatesweep", "lsv", Some("2024-03-07_")),
            PathBuf::from("/data/2024-03-07_gatesweep.lsv")
        );
        assert_eq!(
            container_filename(dir, "gatesweep", ".lsv", None),
            PathBuf::from("/data/gatesweep.lsv")
        );
    }
}
