//! Which memory areas the running OS can reclaim

use serde::Serialize;
use std::fmt;

use super::area::MemoryArea;

/// Windows version as reported by the kernel (not the compatibility shim).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl OsVersion {
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self { major, minor, build }
    }

    /// True when this version is `major.minor` or later.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }

    /// Version of the running OS, `None` when it is not Windows.
    pub fn current() -> Option<Self> {
        crate::platform::os_version()
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Snapshot of what can be reclaimed on this machine.
///
/// Computed once, immutable afterwards. An unknown OS supports nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperatingSystemCapabilities {
    pub version: Option<OsVersion>,
    pub is_64bit: bool,
    pub has_combined_page_list: bool,
    pub has_modified_file_cache: bool,
    pub has_modified_page_list: bool,
    pub has_registry_cache: bool,
    pub has_standby_list: bool,
    pub has_standby_list_low_priority: bool,
    pub has_system_file_cache: bool,
    pub has_working_set: bool,
}

impl OperatingSystemCapabilities {
    pub fn new(version: Option<OsVersion>, is_64bit: bool) -> Self {
        let at_least = |major, minor| version.map_or(false, |v| v.at_least(major, minor));

        let xp = at_least(5, 1);
        let vista = at_least(6, 0);

        Self {
            version,
            is_64bit,
            has_combined_page_list: at_least(6, 2),
            has_modified_file_cache: xp,
            has_modified_page_list: vista,
            has_registry_cache: at_least(6, 3),
            has_standby_list: vista,
            has_standby_list_low_priority: vista,
            has_system_file_cache: xp,
            has_working_set: vista,
        }
    }

    /// Capabilities of the running process.
    ///
    /// Bitness is the pointer width of this process: it decides the layout of
    /// every pointer-sized field handed to the kernel.
    pub fn detect() -> Self {
        Self::new(OsVersion::current(), cfg!(target_pointer_width = "64"))
    }

    /// Whether a single area can be reclaimed. Composite or empty masks are `false`.
    pub fn supports(&self, area: MemoryArea) -> bool {
        if area == MemoryArea::COMBINED_PAGE_LIST {
            self.has_combined_page_list
        } else if area == MemoryArea::MODIFIED_FILE_CACHE {
            self.has_modified_file_cache
        } else if area == MemoryArea::MODIFIED_PAGE_LIST {
            self.has_modified_page_list
        } else if area == MemoryArea::REGISTRY_CACHE {
            self.has_registry_cache
        } else if area == MemoryArea::STANDBY_LIST {
            self.has_standby_list
        } else if area == MemoryArea::STANDBY_LIST_LOW_PRIORITY {
            self.has_standby_list_low_priority
        } else if area == MemoryArea::SYSTEM_FILE_CACHE {
            self.has_system_file_cache
        } else if area == MemoryArea::WORKING_SET {
            self.has_working_set
        } else {
            false
        }
    }

    /// Mask of every supported area.
    pub fn supported_areas(&self) -> MemoryArea {
        MemoryArea::execution_order()
            .filter(|area| self.supports(*area))
            .fold(MemoryArea::empty(), |mask, area| mask | area)
    }
}
