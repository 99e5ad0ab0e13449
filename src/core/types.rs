/*!
 * Core Types
 * Common types used across the kernel
 */

/// Process ID type
pub type Pid = u32;

/// Thread ID within a thread group (slot index in the owner's thread table)
pub type Tid = usize;

/// Timer ticks
pub type Ticks = u64;

/// CPU index
pub type CpuId = usize;

/// File descriptor type (index into a per-descriptor open-file table)
pub type Fd = usize;

/// User virtual address
pub type Address = usize;
