//! Memory Cleaner
//!
//! A memory optimization engine for Windows. It reclaims physical memory
//! from up to eight areas of the memory manager: process working sets, the
//! system file cache, the modified and standby page lists, identical-page
//! combining, the modified file cache and the registry cache.
//!
//! ## Layers
//!
//! - **Capabilities**: which areas the running OS version supports
//! - **Privileges**: enabling token privileges before each native call
//! - **Operations**: one reclamation routine per memory area
//! - **Optimizer**: runs a batch in fixed order, reports progress and
//!   aggregates the outcome into log records
//!
//! ## Safety
//!
//! - Areas the OS lacks are skipped with a warning, never called
//! - A failing or panicking area never stops the rest of the batch
//! - Excluded processes are never trimmed
//! - One run at a time through [`OptimizationGate`]

pub mod core;
pub mod platform;
pub mod security;

// Re-exports
pub use crate::core::area::MemoryArea;
pub use crate::core::capabilities::{OperatingSystemCapabilities, OsVersion};
pub use crate::core::config::{ConfigError, OptimizerConfig};
pub use crate::core::error::{NativeError, OptimizeError};
pub use crate::core::operations::NativeMemoryOperations;
pub use crate::core::optimizer::{MemoryOptimizer, OptimizationGate, OptimizationRequest, Progress};
pub use crate::core::report::{LogLevel, LogRecord, OptimizationReason, OptimizationReport};
pub use crate::core::scheduler::AutoOptimizer;
pub use crate::platform::{create_backend, MemoryBackend, MemoryStatus};
pub use crate::security::privileges::{Privilege, PrivilegeElevator};
