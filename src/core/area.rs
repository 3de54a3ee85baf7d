//! Memory areas the engine can reclaim

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// A set of memory areas requested for one optimization run.
    ///
    /// Serialized in the bitflags text form, e.g. `"STANDBY_LIST | WORKING_SET"`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MemoryArea: u32 {
        /// Page combining (Windows 8+)
        const COMBINED_PAGE_LIST = 1;
        /// Modified file cache (reclaimed through the file cache flush)
        const MODIFIED_FILE_CACHE = 1 << 1;
        /// Modified page list flush
        const MODIFIED_PAGE_LIST = 1 << 2;
        /// Registry cache (reclaimed through the modified list flush, Windows 8.1+)
        const REGISTRY_CACHE = 1 << 3;
        /// Standby list purge
        const STANDBY_LIST = 1 << 4;
        /// Low priority standby list purge
        const STANDBY_LIST_LOW_PRIORITY = 1 << 5;
        /// System file cache flush
        const SYSTEM_FILE_CACHE = 1 << 6;
        /// Per-process working set trim
        const WORKING_SET = 1 << 7;
    }
}

/// Execution order, label and command-line token of every area.
const AREA_TABLE: [(MemoryArea, &str, &str); 8] = [
    (MemoryArea::WORKING_SET, "Working Set", "WorkingSet"),
    (MemoryArea::SYSTEM_FILE_CACHE, "System File Cache", "SystemFileCache"),
    (MemoryArea::MODIFIED_PAGE_LIST, "Modified Page List", "ModifiedPageList"),
    (MemoryArea::STANDBY_LIST, "Standby List", "StandbyList"),
    (
        MemoryArea::STANDBY_LIST_LOW_PRIORITY,
        "Standby List (Low Priority)",
        "StandbyListLowPriority",
    ),
    (MemoryArea::COMBINED_PAGE_LIST, "Combined Page List", "CombinedPageList"),
    (MemoryArea::MODIFIED_FILE_CACHE, "Modified File Cache", "ModifiedFileCache"),
    (MemoryArea::REGISTRY_CACHE, "Registry Cache", "RegistryCache"),
];

/// Older token spellings accepted on the command line.
const TOKEN_ALIASES: [(&str, MemoryArea); 3] = [
    ("processesworkingset", MemoryArea::WORKING_SET),
    ("systemworkingset", MemoryArea::SYSTEM_FILE_CACHE),
    ("standbylistlow", MemoryArea::STANDBY_LIST_LOW_PRIORITY),
];

impl MemoryArea {
    /// Areas in the order the optimizer runs them.
    pub fn execution_order() -> impl Iterator<Item = MemoryArea> {
        AREA_TABLE.iter().map(|(area, _, _)| *area)
    }

    /// The single areas contained in `self`, in execution order.
    pub fn ordered(self) -> impl Iterator<Item = MemoryArea> {
        Self::execution_order().filter(move |area| self.contains(*area))
    }

    /// Number of distinct areas in the set.
    pub fn area_count(self) -> usize {
        self.ordered().count()
    }

    /// Human readable label of a single area.
    pub fn label(self) -> &'static str {
        AREA_TABLE
            .iter()
            .find(|(area, _, _)| *area == self)
            .map(|(_, label, _)| *label)
            .unwrap_or("Memory")
    }

    /// Command-line token of a single area, without the leading `/`.
    pub fn token(self) -> Option<&'static str> {
        AREA_TABLE
            .iter()
            .find(|(area, _, _)| *area == self)
            .map(|(_, _, token)| *token)
    }

    /// Parse one command-line token such as `/StandbyList` or `standby-list`.
    pub fn from_token(token: &str) -> Option<MemoryArea> {
        let normalized: String = token
            .trim()
            .trim_start_matches(['/', '-'])
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        AREA_TABLE
            .iter()
            .find(|(_, _, token)| token.eq_ignore_ascii_case(&normalized))
            .map(|(area, _, _)| *area)
            .or_else(|| {
                TOKEN_ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == normalized)
                    .map(|(_, area)| *area)
            })
    }

    /// Parse a list of tokens into a mask, returning the tokens that were not recognized.
    pub fn from_tokens<'a, I>(tokens: I) -> (MemoryArea, Vec<String>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut areas = MemoryArea::empty();
        let mut unknown = Vec::new();
        for token in tokens {
            match Self::from_token(token) {
                Some(area) => areas |= area,
                None => unknown.push(token.to_string()),
            }
        }
        (areas, unknown)
    }

    /// Comma separated labels, used in log headers.
    pub fn describe(self) -> String {
        if self.is_empty() {
            return "none".to_string();
        }
        self.ordered().map(MemoryArea::label).collect::<Vec<_>>().join(", ")
    }
}
