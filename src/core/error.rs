//! Error types for native calls and memory area operations

use thiserror::Error;

use super::area::MemoryArea;
use crate::security::privileges::Privilege;

/// A failed native call with its Win32 error code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (error {code})")]
pub struct NativeError {
    pub code: u32,
    pub message: String,
}

impl NativeError {
    pub const ACCESS_DENIED: u32 = 5;
    pub const INVALID_PARAMETER: u32 = 87;
    pub const NOT_SUPPORTED: u32 = 50;
    pub const NOT_ALL_ASSIGNED: u32 = 1300;

    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Raised by backends running on a platform without the native API.
    pub fn unsupported_platform() -> Self {
        Self::new(Self::NOT_SUPPORTED, "not available on this platform")
    }

    /// Protected and system processes refuse handles with this code.
    pub fn is_access_denied(&self) -> bool {
        self.code == Self::ACCESS_DENIED
    }

    /// `OpenProcess` on a pid that exited after the process snapshot.
    pub fn is_process_gone(&self) -> bool {
        self.code == Self::INVALID_PARAMETER
    }
}

/// Why a memory area could not be reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimizeError {
    /// The OS version lacks the facility. Reported as a warning.
    #[error("not supported on this OS version")]
    Unsupported { area: MemoryArea },

    #[error("administrator privilege required ({privilege}): {source}")]
    PrivilegeDenied {
        privilege: Privilege,
        #[source]
        source: NativeError,
    },

    #[error("{call} failed: {source}")]
    NativeCall {
        call: &'static str,
        #[source]
        source: NativeError,
    },

    /// Working set trim: one entry per process that failed for a reason
    /// other than access denied.
    #[error("{}", .failures.join("; "))]
    ProcessFailures { failures: Vec<String> },

    /// A panic caught at the area boundary.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl OptimizeError {
    pub fn native(call: &'static str, source: NativeError) -> Self {
        Self::NativeCall { call, source }
    }

    /// Unsupported areas are skipped, not failed.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Win32 code behind the failure, when there is exactly one.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::PrivilegeDenied { source, .. } | Self::NativeCall { source, .. } => {
                Some(source.code)
            }
            _ => None,
        }
    }
}

pub type OptimizeResult<T = ()> = Result<T, OptimizeError>;
