/*!
 * MLFQ Kernel Library
 * Multi-level feedback queue scheduler with an exclusive escape mode and
 * lightweight threads, hosted as a deterministic simulation
 */

pub mod core;
pub mod fs;
pub mod monitoring;
pub mod process;
pub mod vm;

// Re-exports
pub use crate::core::errors::*;
pub use crate::core::{KernelConfig, ProcName};
pub use fs::{DirHandle, FileHandle, FileService, RefCountedFiles};
pub use monitoring::{init_tracing, SchedulerStats};
pub use process::{
    Cpu, InitProgram, Kernel, KernelBuilder, Level, ProcHandle, ProcInfo, ProcState, Program,
    Schedule, SchedulerTask, Spin, SysContext, ThreadEntry, Trap, WaitChannel,
};
pub use vm::{AddressSpaces, PagedMemory};
