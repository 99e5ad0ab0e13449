/*!
 * Monitoring
 * Scheduler counters and structured tracing
 */

mod stats;
mod tracer;

pub use stats::{AtomicSchedulerStats, SchedulerStats};
pub use tracer::{init_tracing, span_dispatch, DispatchSpan};
