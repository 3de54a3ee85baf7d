//! Bit-exact structures handed to the Windows kernel
//!
//! Every structure here is `#[repr(C, packed)]` with no padding and must match
//! the OS ABI byte for byte. They are plain data and compile on every target
//! so their layout can be checked anywhere; only `platform::windows` and
//! `security::privileges` actually submit them.

use std::ffi::c_void;
use std::mem::size_of;

/// `SE_PRIVILEGE_ENABLED`
pub const SE_PRIVILEGE_ENABLED: i32 = 2;

/// Status returned by a successful `NtSetSystemInformation` call.
pub const STATUS_SUCCESS: i32 = 0;

/// `SYSTEM_INFORMATION_CLASS` values used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SystemInformationClass {
    FileCacheInformation = 21,
    MemoryListInformation = 80,
    CombinePhysicalMemoryInformation = 130,
}

/// `SYSTEM_MEMORY_LIST_COMMAND` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MemoryListCommand {
    FlushModifiedList = 3,
    PurgeStandbyList = 4,
    PurgeLowPriorityStandbyList = 5,
}

/// Marker for types that may be viewed as raw bytes.
///
/// # Safety
///
/// Implementors must be `#[repr(C, packed)]` (or primitive) with no padding,
/// no invalid bit patterns and no interior references.
pub unsafe trait NativeLayout: Copy {}

unsafe impl NativeLayout for i32 {}

/// `TOKEN_PRIVILEGES` holding exactly one `LUID_AND_ATTRIBUTES` entry.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, packed)]
pub struct TokenPrivileges {
    pub privilege_count: i32,
    pub luid: i64,
    pub attributes: i32,
}

unsafe impl NativeLayout for TokenPrivileges {}

impl TokenPrivileges {
    /// A single privilege, enabled.
    pub fn enabled(luid: i64) -> Self {
        Self {
            privilege_count: 1,
            luid,
            attributes: SE_PRIVILEGE_ENABLED,
        }
    }
}

/// Pack a `LUID { LowPart: u32, HighPart: i32 }` into one 64-bit value.
pub fn luid_to_i64(low_part: u32, high_part: i32) -> i64 {
    ((high_part as i64) << 32) | low_part as i64
}

/// `MEMORY_COMBINE_INFORMATION_EX`
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct MemoryCombineInformationEx {
    pub handle: *mut c_void,
    pub pages_combined: usize,
    pub flags: u64,
}

unsafe impl NativeLayout for MemoryCombineInformationEx {}

impl Default for MemoryCombineInformationEx {
    fn default() -> Self {
        Self {
            handle: std::ptr::null_mut(),
            pages_combined: 0,
            flags: 0,
        }
    }
}

/// `SYSTEM_CACHE_INFORMATION` as seen by a 32-bit process.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, packed)]
pub struct SystemCacheInformation32 {
    pub current_size: u32,
    pub peak_size: u32,
    pub page_fault_count: u32,
    pub minimum_working_set: u32,
    pub maximum_working_set: u32,
    pub current_size_including_transition_in_pages: u32,
    pub peak_size_including_transition_in_pages: u32,
    pub transition_re_purpose_count: u32,
    pub flags: u32,
}

unsafe impl NativeLayout for SystemCacheInformation32 {}

/// `SYSTEM_CACHE_INFORMATION` as seen by a 64-bit process.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, packed)]
pub struct SystemCacheInformation64 {
    pub current_size: i64,
    pub peak_size: i64,
    pub page_fault_count: i64,
    pub minimum_working_set: i64,
    pub maximum_working_set: i64,
    pub current_size_including_transition_in_pages: i64,
    pub peak_size_including_transition_in_pages: i64,
    pub transition_re_purpose_count: i64,
    pub flags: i64,
}

unsafe impl NativeLayout for SystemCacheInformation64 {}

/// The cache structure for the running bitness, chosen once.
#[derive(Debug, Clone, Copy)]
pub enum SystemCacheInformation {
    X86(SystemCacheInformation32),
    X64(SystemCacheInformation64),
}

impl SystemCacheInformation {
    /// Minimum and maximum working set set to "no limit", which empties the cache.
    pub fn flush(is_64bit: bool) -> Self {
        if is_64bit {
            Self::X64(SystemCacheInformation64 {
                minimum_working_set: -1,
                maximum_working_set: -1,
                ..Default::default()
            })
        } else {
            Self::X86(SystemCacheInformation32 {
                minimum_working_set: u32::MAX,
                maximum_working_set: u32::MAX,
                ..Default::default()
            })
        }
    }
}

/// Forces 8-byte alignment on a packed structure for the duration of a call.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(8))]
pub struct Aligned<T>(pub T);

/// A borrowed, aligned buffer submitted with one information class.
///
/// The borrow keeps the underlying structure alive (pinned on the caller's
/// stack) until the call returns.
#[derive(Debug, Clone, Copy)]
pub struct InformationBuffer<'a> {
    pub class: SystemInformationClass,
    bytes: &'a [u8],
}

impl<'a> InformationBuffer<'a> {
    pub fn new<T: NativeLayout>(class: SystemInformationClass, value: &'a Aligned<T>) -> Self {
        Self {
            class,
            bytes: as_bytes(&value.0),
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.bytes.as_ptr().cast()
    }

    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn as_bytes<T: NativeLayout>(value: &T) -> &[u8] {
    // SAFETY: NativeLayout guarantees a padding-free plain-data layout.
    unsafe { std::slice::from_raw_parts((value as *const T).cast::<u8>(), size_of::<T>()) }
}
