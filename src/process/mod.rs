/*!
 * Process Module
 * Process table, MLFQ scheduling, escape mode and lightweight threads
 */

mod escape;
mod kernel;
mod lifecycle;
mod program;
mod quantum;
mod queue;
pub mod scheduler;
mod syscall;
mod table;
mod thread;
pub mod types;

// Re-export for convenience
pub use kernel::{Kernel, KernelBuilder};
pub use program::{InitProgram, Program, Spin, ThreadEntry, Trap};
pub use queue::{ReadyQueues, Window};
pub use scheduler::{Cpu, Schedule, SchedulerCommand, SchedulerTask};
pub use syscall::SysContext;
pub use types::{Level, ProcHandle, ProcInfo, ProcState, WaitChannel};
