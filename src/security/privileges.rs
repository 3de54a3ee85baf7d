//! Token privilege elevation
//!
//! Every privileged memory call enables exactly the privilege it needs on the
//! current process token right before the call. The token handle is opened,
//! adjusted once and closed again; nothing is cached between calls.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::core::error::NativeError;

/// Privileges required by the memory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Privilege {
    /// Open and trim other processes
    Debug,
    /// Change the system file cache limits
    IncreaseQuota,
    /// Memory list commands and page combining
    ProfileSingleProcess,
}

impl Privilege {
    pub fn name(&self) -> &'static str {
        match self {
            Privilege::Debug => "SeDebugPrivilege",
            Privilege::IncreaseQuota => "SeIncreaseQuotaPrivilege",
            Privilege::ProfileSingleProcess => "SeProfileSingleProcessPrivilege",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enables named privileges on the current process token.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrivilegeElevator;

impl PrivilegeElevator {
    pub fn new() -> Self {
        Self
    }

    pub fn try_enable(&self, privilege: Privilege) -> Result<(), NativeError> {
        let result = self.try_enable_named(privilege.name());
        match &result {
            Ok(()) => debug!("Enabled {}", privilege),
            Err(e) => debug!("Could not enable {}: {}", privilege, e),
        }
        result
    }

    /// Enable a privilege by name, e.g. `"SeDebugPrivilege"`.
    ///
    /// Succeeds only when both the LUID lookup and the token adjustment
    /// succeed and the privilege was actually assigned.
    #[cfg(windows)]
    pub fn try_enable_named(&self, name: &str) -> Result<(), NativeError> {
        use windows::core::PCWSTR;
        use windows::Win32::Foundation::{GetLastError, ERROR_NOT_ALL_ASSIGNED, HANDLE, LUID};
        use windows::Win32::Security::{
            AdjustTokenPrivileges, LookupPrivilegeValueW, TOKEN_ADJUST_PRIVILEGES,
            TOKEN_PRIVILEGES, TOKEN_QUERY,
        };
        use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

        use crate::platform::layout::{luid_to_i64, Aligned, TokenPrivileges};
        use crate::platform::windows::{native_error, HandleGuard};

        let wide_name: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();

        unsafe {
            let mut token = HANDLE::default();
            OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_QUERY | TOKEN_ADJUST_PRIVILEGES,
                &mut token,
            )
            .map_err(native_error)?;
            let token = HandleGuard::new(token);

            let mut luid = LUID::default();
            LookupPrivilegeValueW(PCWSTR::null(), PCWSTR(wide_name.as_ptr()), &mut luid)
                .map_err(native_error)?;

            let state = Aligned(TokenPrivileges::enabled(luid_to_i64(luid.LowPart, luid.HighPart)));
            AdjustTokenPrivileges(
                token.raw(),
                false,
                Some((&state.0 as *const TokenPrivileges).cast::<TOKEN_PRIVILEGES>()),
                0,
                None,
                None,
            )
            .map_err(native_error)?;

            // The call "succeeds" without assigning a privilege the token does not hold.
            let last_error = GetLastError();
            if last_error == ERROR_NOT_ALL_ASSIGNED {
                return Err(NativeError::new(
                    last_error.0,
                    format!("{} is not held by this account", name),
                ));
            }
        }

        Ok(())
    }

    #[cfg(not(windows))]
    pub fn try_enable_named(&self, _name: &str) -> Result<(), NativeError> {
        Err(NativeError::unsupported_platform())
    }
}
