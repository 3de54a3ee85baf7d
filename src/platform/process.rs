//! Process enumeration and the working set exclusion list

use std::collections::HashSet;
use std::path::Path;
use sysinfo::{ProcessesToUpdate, System};

/// A running process as seen by the working set trim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

impl ProcessEntry {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// List all running processes with their image names.
pub fn list_processes() -> Vec<ProcessEntry> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let mut processes: Vec<ProcessEntry> = sys
        .processes()
        .iter()
        .map(|(pid, process)| {
            ProcessEntry::new(pid.as_u32(), process.name().to_string_lossy().into_owned())
        })
        .collect();
    processes.sort_by_key(|p| p.pid);
    processes
}

/// Lowercase image name without its extension: `"Chrome.EXE"` becomes `"chrome"`.
pub fn normalize_process_name(name: &str) -> String {
    let trimmed = name.trim();
    let stem = Path::new(trimmed)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| trimmed.to_string());
    stem.to_lowercase()
}

/// Process names excluded from the working set trim.
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    names: HashSet<String>,
}

impl ExclusionList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| normalize_process_name(n.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, process_name: &str) -> bool {
        !self.names.is_empty() && self.names.contains(&normalize_process_name(process_name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
