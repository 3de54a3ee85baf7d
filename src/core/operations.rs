//! The memory reclamation operations, one per area
//!
//! Every operation runs the same steps: check the OS supports the area,
//! enable the privilege the native call needs, build the packed structure,
//! submit it and turn the status into a result. Structures live on this
//! frame for exactly the duration of the call.

use tracing::debug;

use super::area::MemoryArea;
use super::capabilities::OperatingSystemCapabilities;
use super::error::{OptimizeError, OptimizeResult};
use crate::platform::layout::{
    Aligned, InformationBuffer, MemoryCombineInformationEx, MemoryListCommand, NativeLayout,
    SystemCacheInformation, SystemInformationClass,
};
use crate::platform::{ExclusionList, MemoryBackend};
use crate::security::privileges::Privilege;

/// `SetSystemFileCacheSize` arguments meaning "flush": `(SIZE_T)-1` for both limits.
const FLUSH_FILE_CACHE_SIZE: usize = usize::MAX;

pub struct NativeMemoryOperations<B> {
    backend: B,
    capabilities: OperatingSystemCapabilities,
}

impl<B: MemoryBackend> NativeMemoryOperations<B> {
    pub fn new(backend: B, capabilities: OperatingSystemCapabilities) -> Self {
        Self {
            backend,
            capabilities,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn capabilities(&self) -> &OperatingSystemCapabilities {
        &self.capabilities
    }

    /// Run the operation for one area.
    pub fn run(&self, area: MemoryArea, excluded: &ExclusionList) -> OptimizeResult {
        if area == MemoryArea::WORKING_SET {
            self.optimize_working_set(excluded)
        } else if area == MemoryArea::SYSTEM_FILE_CACHE {
            self.optimize_system_file_cache()
        } else if area == MemoryArea::MODIFIED_PAGE_LIST {
            self.optimize_modified_page_list()
        } else if area == MemoryArea::STANDBY_LIST {
            self.optimize_standby_list(false)
        } else if area == MemoryArea::STANDBY_LIST_LOW_PRIORITY {
            self.optimize_standby_list(true)
        } else if area == MemoryArea::COMBINED_PAGE_LIST {
            self.optimize_combined_page_list()
        } else if area == MemoryArea::MODIFIED_FILE_CACHE {
            self.optimize_modified_file_cache()
        } else if area == MemoryArea::REGISTRY_CACHE {
            self.optimize_registry_cache()
        } else {
            Err(OptimizeError::Unexpected(format!(
                "not a single memory area: {:#x}",
                area.bits()
            )))
        }
    }

    /// Empty the working set of every process not in `excluded`.
    ///
    /// Access denied is expected for protected processes and ignored, as is
    /// a process that exited since the listing. Any other per-process failure
    /// is collected and the loop carries on.
    pub fn optimize_working_set(&self, excluded: &ExclusionList) -> OptimizeResult {
        self.ensure_supported(MemoryArea::WORKING_SET)?;
        self.elevate(Privilege::Debug)?;

        let processes = self
            .backend
            .processes()
            .map_err(|source| OptimizeError::native("process enumeration", source))?;

        let mut trimmed = 0usize;
        let mut denied = 0usize;
        let mut gone = 0usize;
        let mut failures = Vec::new();

        for process in processes.iter().filter(|p| !excluded.contains(&p.name)) {
            match self.backend.empty_working_set(process.pid) {
                Ok(()) => trimmed += 1,
                Err(e) if e.is_access_denied() => denied += 1,
                Err(e) if e.is_process_gone() => gone += 1,
                Err(e) => {
                    debug!("EmptyWorkingSet failed for {} ({}): {}", process.name, process.pid, e);
                    failures.push(format!("{}: {}", process.name, e.message));
                }
            }
        }

        debug!(
            "Working set: {} trimmed, {} denied, {} exited, {} failed, {} excluded names",
            trimmed,
            denied,
            gone,
            failures.len(),
            excluded.len()
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(OptimizeError::ProcessFailures { failures })
        }
    }

    /// Flush the system file cache.
    pub fn optimize_system_file_cache(&self) -> OptimizeResult {
        self.ensure_supported(MemoryArea::SYSTEM_FILE_CACHE)?;
        self.flush_file_cache()
    }

    /// Write the modified page list back to disk.
    pub fn optimize_modified_page_list(&self) -> OptimizeResult {
        self.ensure_supported(MemoryArea::MODIFIED_PAGE_LIST)?;
        self.memory_list_command(MemoryListCommand::FlushModifiedList)
    }

    /// Purge the standby list, or only its low priority pages.
    pub fn optimize_standby_list(&self, low_priority: bool) -> OptimizeResult {
        let (area, command) = if low_priority {
            (
                MemoryArea::STANDBY_LIST_LOW_PRIORITY,
                MemoryListCommand::PurgeLowPriorityStandbyList,
            )
        } else {
            (MemoryArea::STANDBY_LIST, MemoryListCommand::PurgeStandbyList)
        };
        self.ensure_supported(area)?;
        self.memory_list_command(command)
    }

    /// Combine identical physical pages.
    pub fn optimize_combined_page_list(&self) -> OptimizeResult {
        self.ensure_supported(MemoryArea::COMBINED_PAGE_LIST)?;
        self.elevate(Privilege::ProfileSingleProcess)?;

        let info = MemoryCombineInformationEx::default();
        self.submit(
            SystemInformationClass::CombinePhysicalMemoryInformation,
            info,
            "memory combine",
        )
    }

    /// Modified file cache: reclaimed by the file cache flush.
    pub fn optimize_modified_file_cache(&self) -> OptimizeResult {
        self.ensure_supported(MemoryArea::MODIFIED_FILE_CACHE)?;
        self.flush_file_cache()
    }

    /// Registry cache: dirty hive pages leave through the modified list flush.
    pub fn optimize_registry_cache(&self) -> OptimizeResult {
        self.ensure_supported(MemoryArea::REGISTRY_CACHE)?;
        self.memory_list_command(MemoryListCommand::FlushModifiedList)
    }

    fn flush_file_cache(&self) -> OptimizeResult {
        self.elevate(Privilege::IncreaseQuota)?;

        match SystemCacheInformation::flush(self.capabilities.is_64bit) {
            SystemCacheInformation::X86(info) => {
                self.submit(SystemInformationClass::FileCacheInformation, info, "file cache")?
            }
            SystemCacheInformation::X64(info) => {
                self.submit(SystemInformationClass::FileCacheInformation, info, "file cache")?
            }
        }

        self.backend
            .set_system_file_cache_size(FLUSH_FILE_CACHE_SIZE, FLUSH_FILE_CACHE_SIZE, 0)
            .map_err(|source| OptimizeError::native("SetSystemFileCacheSize", source))
    }

    fn memory_list_command(&self, command: MemoryListCommand) -> OptimizeResult {
        self.elevate(Privilege::ProfileSingleProcess)?;
        self.submit(
            SystemInformationClass::MemoryListInformation,
            command as i32,
            "memory list command",
        )
    }

    fn submit<T: NativeLayout>(
        &self,
        class: SystemInformationClass,
        value: T,
        call: &'static str,
    ) -> OptimizeResult {
        let aligned = Aligned(value);
        let buffer = InformationBuffer::new(class, &aligned);
        self.backend
            .set_system_information(buffer)
            .map_err(|source| OptimizeError::native(call, source))
    }

    fn ensure_supported(&self, area: MemoryArea) -> OptimizeResult {
        if self.capabilities.supports(area) {
            Ok(())
        } else {
            Err(OptimizeError::Unsupported { area })
        }
    }

    fn elevate(&self, privilege: Privilege) -> OptimizeResult {
        self.backend
            .enable_privilege(privilege)
            .map_err(|source| OptimizeError::PrivilegeDenied { privilege, source })
    }
}
