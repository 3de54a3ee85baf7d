//! Platform layer for the memory optimization engine
//!
//! The engine never calls the OS directly. It talks to a [`MemoryBackend`],
//! which exposes the handful of native primitives the operations are built
//! from:
//!
//! ```text
//! core::operations  -- capability check, privilege, structure, outcome
//!        |
//!  MemoryBackend    -- this module (trait)
//!        |
//!   +----+--------------+
//!   |                   |
//! WindowsBackend   UnsupportedBackend
//! (ntdll/kernel32)  (every other OS)
//! ```

pub mod layout;
pub mod memory;
pub mod process;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(test)]
pub(crate) mod testing;

pub use layout::{InformationBuffer, MemoryListCommand, SystemInformationClass};
pub use memory::MemoryStatus;
pub use process::{ExclusionList, ProcessEntry};

use crate::core::capabilities::OsVersion;
use crate::core::error::NativeError;
use crate::security::privileges::Privilege;

/// Native memory primitives.
///
/// Implementations report failures as values; they must not panic on an OS
/// error. Each call acquires and releases its own handles.
pub trait MemoryBackend: Send + Sync {
    /// Enable one privilege on the current process token.
    fn enable_privilege(&self, privilege: Privilege) -> Result<(), NativeError>;

    /// Processes eligible for a working set trim.
    fn processes(&self) -> Result<Vec<ProcessEntry>, NativeError>;

    /// `EmptyWorkingSet` on one process.
    fn empty_working_set(&self, pid: u32) -> Result<(), NativeError>;

    /// `NtSetSystemInformation` with an aligned, packed buffer.
    fn set_system_information(&self, buffer: InformationBuffer<'_>) -> Result<(), NativeError>;

    /// `SetSystemFileCacheSize`
    fn set_system_file_cache_size(
        &self,
        minimum: usize,
        maximum: usize,
        flags: u32,
    ) -> Result<(), NativeError>;

    /// Release this process's own working set after a batch.
    fn trim_current_process(&self) -> Result<(), NativeError>;

    /// Physical memory snapshot, if the backend can take one.
    fn memory_status(&self) -> Option<MemoryStatus> {
        Some(MemoryStatus::current())
    }
}

impl<T: MemoryBackend + ?Sized> MemoryBackend for Box<T> {
    fn enable_privilege(&self, privilege: Privilege) -> Result<(), NativeError> {
        (**self).enable_privilege(privilege)
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>, NativeError> {
        (**self).processes()
    }

    fn empty_working_set(&self, pid: u32) -> Result<(), NativeError> {
        (**self).empty_working_set(pid)
    }

    fn set_system_information(&self, buffer: InformationBuffer<'_>) -> Result<(), NativeError> {
        (**self).set_system_information(buffer)
    }

    fn set_system_file_cache_size(
        &self,
        minimum: usize,
        maximum: usize,
        flags: u32,
    ) -> Result<(), NativeError> {
        (**self).set_system_file_cache_size(minimum, maximum, flags)
    }

    fn trim_current_process(&self) -> Result<(), NativeError> {
        (**self).trim_current_process()
    }

    fn memory_status(&self) -> Option<MemoryStatus> {
        (**self).memory_status()
    }
}

/// Backend for hosts without the Windows memory APIs.
///
/// The capability table reports nothing as supported on such hosts, so the
/// native primitives are never reached during a normal run.
#[derive(Debug, Default)]
pub struct UnsupportedBackend;

impl MemoryBackend for UnsupportedBackend {
    fn enable_privilege(&self, _privilege: Privilege) -> Result<(), NativeError> {
        Err(NativeError::unsupported_platform())
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>, NativeError> {
        Ok(process::list_processes())
    }

    fn empty_working_set(&self, _pid: u32) -> Result<(), NativeError> {
        Err(NativeError::unsupported_platform())
    }

    fn set_system_information(&self, _buffer: InformationBuffer<'_>) -> Result<(), NativeError> {
        Err(NativeError::unsupported_platform())
    }

    fn set_system_file_cache_size(
        &self,
        _minimum: usize,
        _maximum: usize,
        _flags: u32,
    ) -> Result<(), NativeError> {
        Err(NativeError::unsupported_platform())
    }

    fn trim_current_process(&self) -> Result<(), NativeError> {
        Err(NativeError::unsupported_platform())
    }
}

/// The backend for the platform this binary was built for.
pub fn create_backend() -> Box<dyn MemoryBackend> {
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::WindowsBackend::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(UnsupportedBackend)
    }
}

/// Kernel version of the running OS; `None` off Windows.
pub fn os_version() -> Option<OsVersion> {
    #[cfg(target_os = "windows")]
    {
        windows::os_version()
    }

    #[cfg(not(target_os = "windows"))]
    {
        None
    }
}

/// Returns the current platform name
pub fn platform_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else {
        "unsupported"
    }
}
