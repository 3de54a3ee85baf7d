//! Physical memory snapshots taken around each optimization run

use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryStatus {
    pub total_physical_mb: f64,
    pub available_physical_mb: f64,
    pub memory_load_percent: u32,
}

impl MemoryStatus {
    pub fn current() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self::from_bytes(sys.total_memory(), sys.available_memory())
    }

    pub fn from_bytes(total: u64, available: u64) -> Self {
        let total_mb = total as f64 / 1024.0 / 1024.0;
        let available_mb = available.min(total) as f64 / 1024.0 / 1024.0;
        let load = if total_mb > 0.0 {
            (((total_mb - available_mb) / total_mb) * 100.0).round() as u32
        } else {
            0
        };
        Self {
            total_physical_mb: total_mb,
            available_physical_mb: available_mb,
            memory_load_percent: load,
        }
    }

    pub fn used_physical_mb(&self) -> f64 {
        self.total_physical_mb - self.available_physical_mb
    }

    pub fn is_high_pressure(&self) -> bool {
        self.memory_load_percent > 80
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_from_bytes() {
        let status = MemoryStatus::from_bytes(16 * GB, 4 * GB);
        assert_eq!(status.total_physical_mb, 16384.0);
        assert_eq!(status.available_physical_mb, 4096.0);
        assert_eq!(status.used_physical_mb(), 12288.0);
        assert_eq!(status.memory_load_percent, 75);
        assert!(!status.is_high_pressure());
    }

    #[test]
    fn test_degenerate_values() {
        assert_eq!(MemoryStatus::from_bytes(0, 0).memory_load_percent, 0);
        assert_eq!(MemoryStatus::from_bytes(GB, 2 * GB).memory_load_percent, 0);
    }

    #[test]
    fn test_current_is_sane() {
        let status = MemoryStatus::current();
        assert!(status.total_physical_mb > 0.0);
        assert!(status.memory_load_percent <= 100);
    }
}
