/*!
 * Data Structures
 *
 * Specialized data structures for kernel bookkeeping:
 * - Inline process names (bounded, stack-allocated)
 */

mod proc_name;

pub use proc_name::ProcName;
