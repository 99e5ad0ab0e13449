/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{Fd, Pid, Tid};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export VmError from the address-space service
pub use crate::vm::VmError;

/// Process lifecycle errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Process {0} not found")]
    #[diagnostic(
        code(process::not_found),
        help("The process may have exited and been reaped. Check PID validity.")
    )]
    NotFound(Pid),

    #[error("Process table full ({0} slots)")]
    #[diagnostic(
        code(process::table_full),
        help("Reap zombie children with wait() to release descriptors.")
    )]
    TableFull(usize),

    #[error("Kernel stack pool exhausted")]
    #[diagnostic(
        code(process::kstack_exhausted),
        help("Every live descriptor owns one kernel stack. Reap finished processes.")
    )]
    KernelStackExhausted,

    #[error("Address space error: {0}")]
    #[diagnostic(code(process::address_space))]
    AddressSpace(#[from] VmError),

    #[error("Open file table full")]
    #[diagnostic(
        code(process::file_table_full),
        help("Close unused descriptors before installing new ones.")
    )]
    FileTableFull,

    #[error("Bad file descriptor {0}")]
    #[diagnostic(code(process::bad_descriptor))]
    BadDescriptor(Fd),

    #[error("No current process on this CPU")]
    #[diagnostic(code(process::no_current))]
    NoCurrent,
}

/// Scheduler-related errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SchedulerError {
    #[error("Process {0} not found in scheduler")]
    #[diagnostic(
        code(scheduler::process_not_found),
        help("Process may have exited or never existed.")
    )]
    ProcessNotFound(Pid),

    #[error("Priority out of range: {0}")]
    #[diagnostic(
        code(scheduler::invalid_priority),
        help("L2 priority must be zero or positive; 0 is the lowest rank.")
    )]
    InvalidPriority(i32),
}

/// Lightweight-thread errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ThreadError {
    #[error("Thread id {0} out of range")]
    #[diagnostic(
        code(thread::invalid_id),
        help("Thread ids are handed out by thread_create; the caller has been killed.")
    )]
    InvalidThread(Tid),

    #[error("Thread {0} not present")]
    #[diagnostic(
        code(thread::not_present),
        help("The thread was already joined or never created by this thread group.")
    )]
    NotPresent(Tid),

    #[error("Thread table full")]
    #[diagnostic(
        code(thread::table_full),
        help("Join finished threads before creating new ones.")
    )]
    TableFull,

    #[error("Thread creation failed: {0}")]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),
}

impl From<VmError> for ThreadError {
    fn from(err: VmError) -> Self {
        ThreadError::Process(ProcessError::AddressSpace(err))
    }
}

/// Unified kernel error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum KernelError {
    #[error("Process error: {0}")]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error("Scheduler error: {0}")]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Thread error: {0}")]
    #[diagnostic(transparent)]
    Thread(#[from] ThreadError),

    #[error("Address space error: {0}")]
    #[diagnostic(transparent)]
    Vm(#[from] VmError),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(kernel::configuration_error),
        help("Invalid configuration. Review KERNEL_* environment variables.")
    )]
    Configuration(String),

    #[error("Internal error: {0}")]
    #[diagnostic(
        code(kernel::internal_error),
        help("An unexpected internal error occurred. Please report this issue.")
    )]
    Internal(String),
}

/// Common result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl From<String> for KernelError {
    fn from(msg: String) -> Self {
        KernelError::Internal(msg)
    }
}

impl From<&str> for KernelError {
    fn from(msg: &str) -> Self {
        KernelError::Internal(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = ThreadError::NotPresent(3);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("not_present"));

        let back: ThreadError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_vm_error_conversion() {
        let err: ThreadError = VmError::OutOfMemory { requested: 2 }.into();
        assert!(matches!(
            err,
            ThreadError::Process(ProcessError::AddressSpace(VmError::OutOfMemory { .. }))
        ));
    }
}
