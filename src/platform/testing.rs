//! Recording backend used by the engine tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::layout::{InformationBuffer, SystemInformationClass};
use super::{MemoryBackend, MemoryStatus, ProcessEntry};
use crate::core::error::NativeError;
use crate::security::privileges::Privilege;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    EnablePrivilege(Privilege),
    ListProcesses,
    EmptyWorkingSet(u32),
    SetSystemInformation {
        class: SystemInformationClass,
        bytes: Vec<u8>,
    },
    SetSystemFileCacheSize {
        minimum: usize,
        maximum: usize,
        flags: u32,
    },
    TrimCurrentProcess,
}

/// Every primitive succeeds unless configured otherwise; every call is recorded.
#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    pub denied_privileges: HashSet<Privilege>,
    pub processes: Vec<ProcessEntry>,
    pub process_errors: HashMap<u32, NativeError>,
    pub information_errors: HashMap<SystemInformationClass, NativeError>,
    pub panicking_class: Option<SystemInformationClass>,
    pub file_cache_size_error: Option<NativeError>,
    pub status: Option<MemoryStatus>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_processes(mut self, processes: &[(u32, &str)]) -> Self {
        self.processes = processes
            .iter()
            .map(|(pid, name)| ProcessEntry::new(*pid, *name))
            .collect();
        self
    }

    pub fn deny(mut self, privilege: Privilege) -> Self {
        self.denied_privileges.insert(privilege);
        self
    }

    pub fn fail_process(mut self, pid: u32, code: u32, message: &str) -> Self {
        self.process_errors.insert(pid, NativeError::new(code, message));
        self
    }

    pub fn fail_class(mut self, class: SystemInformationClass, code: u32) -> Self {
        self.information_errors
            .insert(class, NativeError::new(code, "The request is not supported."));
        self
    }

    pub fn panic_on(mut self, class: SystemInformationClass) -> Self {
        self.panicking_class = Some(class);
        self
    }

    pub fn fail_file_cache_size(mut self, code: u32) -> Self {
        self.file_cache_size_error = Some(NativeError::new(code, "Access is denied."));
        self
    }

    pub fn with_status(mut self, status: MemoryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn information_calls(&self) -> Vec<(SystemInformationClass, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SetSystemInformation { class, bytes } => Some((class, bytes)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MemoryBackend for RecordingBackend {
    fn enable_privilege(&self, privilege: Privilege) -> Result<(), NativeError> {
        self.record(Call::EnablePrivilege(privilege));
        if self.denied_privileges.contains(&privilege) {
            Err(NativeError::new(
                NativeError::NOT_ALL_ASSIGNED,
                "Not all privileges or groups referenced are assigned to the caller.",
            ))
        } else {
            Ok(())
        }
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>, NativeError> {
        self.record(Call::ListProcesses);
        Ok(self.processes.clone())
    }

    fn empty_working_set(&self, pid: u32) -> Result<(), NativeError> {
        self.record(Call::EmptyWorkingSet(pid));
        match self.process_errors.get(&pid) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn set_system_information(&self, buffer: InformationBuffer<'_>) -> Result<(), NativeError> {
        self.record(Call::SetSystemInformation {
            class: buffer.class,
            bytes: buffer.bytes().to_vec(),
        });
        if self.panicking_class == Some(buffer.class) {
            panic!("simulated fault in {:?}", buffer.class);
        }
        match self.information_errors.get(&buffer.class) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn set_system_file_cache_size(
        &self,
        minimum: usize,
        maximum: usize,
        flags: u32,
    ) -> Result<(), NativeError> {
        self.record(Call::SetSystemFileCacheSize {
            minimum,
            maximum,
            flags,
        });
        match &self.file_cache_size_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn trim_current_process(&self) -> Result<(), NativeError> {
        self.record(Call::TrimCurrentProcess);
        Ok(())
    }

    fn memory_status(&self) -> Option<MemoryStatus> {
        self.status
    }
}
