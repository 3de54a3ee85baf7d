//! Windows backend: the only place that talks to ntdll and kernel32
//!
//! Everything above this module deals in `Result<(), NativeError>`; the raw
//! status codes, handles and pointers stay here.

#![cfg(target_os = "windows")]

use std::ffi::c_void;
use tracing::debug;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Memory::SetSystemFileCacheSize;
use windows::Win32::System::ProcessStatus::EmptyWorkingSet;
use windows::Win32::System::SystemInformation::OSVERSIONINFOW;
use windows::Win32::System::Threading::{
    GetCurrentProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SET_QUOTA,
};

use super::layout::{InformationBuffer, STATUS_SUCCESS};
use super::process::{list_processes, ProcessEntry};
use super::MemoryBackend;
use crate::core::capabilities::OsVersion;
use crate::core::error::NativeError;
use crate::security::privileges::{Privilege, PrivilegeElevator};

#[link(name = "ntdll")]
extern "system" {
    fn NtSetSystemInformation(
        system_information_class: i32,
        system_information: *const c_void,
        system_information_length: u32,
    ) -> i32;

    fn RtlNtStatusToDosError(status: i32) -> u32;

    fn RtlGetVersion(version_information: *mut OSVERSIONINFOW) -> i32;
}

/// Closes a kernel handle when dropped.
pub(crate) struct HandleGuard(HANDLE);

impl HandleGuard {
    pub(crate) fn new(handle: HANDLE) -> Self {
        Self(handle)
    }

    pub(crate) fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// Convert a `windows` crate error into the Win32 code and its message.
pub(crate) fn native_error(err: windows::core::Error) -> NativeError {
    let hresult = err.code().0 as u32;
    // HRESULT_FROM_WIN32 wraps Win32 codes as 0x8007xxxx.
    let code = if hresult & 0xFFFF_0000 == 0x8007_0000 {
        hresult & 0xFFFF
    } else {
        hresult
    };
    NativeError::new(code, err.message().to_string().trim_end())
}

fn win32_error(code: u32) -> NativeError {
    native_error(windows::core::Error::from(windows::core::HRESULT::from_win32(code)))
}

/// Kernel version, bypassing the manifest-based version lie of `GetVersionEx`.
pub fn os_version() -> Option<OsVersion> {
    let mut info = OSVERSIONINFOW {
        dwOSVersionInfoSize: std::mem::size_of::<OSVERSIONINFOW>() as u32,
        ..Default::default()
    };
    let status = unsafe { RtlGetVersion(&mut info) };
    if status != STATUS_SUCCESS {
        return None;
    }
    Some(OsVersion::new(
        info.dwMajorVersion,
        info.dwMinorVersion,
        info.dwBuildNumber,
    ))
}

/// Real Win32 implementation of the memory primitives.
#[derive(Debug, Default)]
pub struct WindowsBackend {
    elevator: PrivilegeElevator,
}

impl WindowsBackend {
    pub fn new() -> Self {
        Self {
            elevator: PrivilegeElevator::new(),
        }
    }
}

impl MemoryBackend for WindowsBackend {
    fn enable_privilege(&self, privilege: Privilege) -> Result<(), NativeError> {
        self.elevator.try_enable(privilege)
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>, NativeError> {
        // PID 0 is the idle pseudo-process and never has a handle.
        Ok(list_processes().into_iter().filter(|p| p.pid != 0).collect())
    }

    fn empty_working_set(&self, pid: u32) -> Result<(), NativeError> {
        unsafe {
            let handle = OpenProcess(
                PROCESS_QUERY_LIMITED_INFORMATION | PROCESS_SET_QUOTA,
                false,
                pid,
            )
            .map_err(native_error)?;
            let handle = HandleGuard::new(handle);
            EmptyWorkingSet(handle.raw()).map_err(native_error)
        }
    }

    fn set_system_information(&self, buffer: InformationBuffer<'_>) -> Result<(), NativeError> {
        let status =
            unsafe { NtSetSystemInformation(buffer.class as i32, buffer.as_ptr(), buffer.len()) };
        if status == STATUS_SUCCESS {
            return Ok(());
        }

        let code = unsafe { RtlNtStatusToDosError(status) };
        debug!(
            "NtSetSystemInformation({:?}) returned {:#010x}",
            buffer.class, status as u32
        );
        Err(win32_error(code))
    }

    fn set_system_file_cache_size(
        &self,
        minimum: usize,
        maximum: usize,
        flags: u32,
    ) -> Result<(), NativeError> {
        unsafe { SetSystemFileCacheSize(minimum, maximum, flags) }.map_err(native_error)
    }

    fn trim_current_process(&self) -> Result<(), NativeError> {
        unsafe { EmptyWorkingSet(GetCurrentProcess()) }.map_err(native_error)
    }
}
