/*!
 * System Limits and Constants
 *
 * Centralized location for kernel-wide limits and magic numbers.
 * Runtime-adjustable values are defaults for `KernelConfig`.
 */

use super::types::Ticks;

// =============================================================================
// PROCESS TABLE
// =============================================================================

/// Process table capacity
pub const NPROC: usize = 64;

/// Thread table capacity per thread group (slot 0 is never handed out)
pub const NTHREAD: usize = 16;

/// Open files per descriptor
pub const NOFILE: usize = 16;

/// Maximum process name length in bytes
pub const PROC_NAME_MAX: usize = 16;

/// Number of CPUs driven by default
pub const NCPU: usize = 1;

// =============================================================================
// MEMORY
// =============================================================================

/// Page size in bytes
pub const PGSIZE: usize = 4096;

/// Word size of the simulated user stack
pub const WORD_SIZE: usize = 4;

/// Pages handed to each lightweight thread (stack page + guard page)
pub const THREAD_STACK_PAGES: usize = 2;

/// Fake return address pushed below a thread's argument
pub const THREAD_FAKE_RETURN_PC: usize = 0xffff_ffff;

/// Default kernel stack pool size (one stack per live descriptor)
pub const DEFAULT_KSTACK_POOL: usize = NPROC;

/// Default user page budget shared by all address spaces
pub const DEFAULT_USER_PAGES: usize = 4096;

// =============================================================================
// SCHEDULING
// =============================================================================

/// Global ticks between two priority boosts
pub const BOOST_INTERVAL: Ticks = 100;

/// Priority assigned on allocation, boost and unlock
pub const DEFAULT_PRIORITY: i32 = 3;

/// Pids at or below this bound are never demoted (init and the first shell)
pub const DEMOTION_EXEMPT_PIDS: u32 = 2;

/// Shared secret for the scheduler lock
pub const ESCAPE_PASSWORD: i32 = 2021031685;

/// Ticks a context may consume at feedback level `level` before demotion
#[inline]
pub const fn quantum(level: u32) -> u32 {
    2 * level + 4
}
