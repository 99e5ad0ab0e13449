/*!
 * MLFQ Scheduler Loop
 *
 * One `Cpu` per processor. The loop is an explicit state machine so a single
 * `schedule_once` call can stop right after one dispatch and the next call
 * resumes the scan where it left off.
 */

use super::kernel::Kernel;
use crate::core::types::{CpuId, Pid};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

mod dispatch;
mod policy;
mod task;

pub use task::{SchedulerCommand, SchedulerTask};

/// Where the scan resumes on the next `schedule_once`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Start of a full pass
    Top,
    /// Serving the escape holder
    Special,
    L0Start,
    L0Scan(usize),
    L1Start,
    L1Scan(usize),
    L2,
}

/// Outcome of one scheduling step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Dispatched this pid once
    Ran(Pid),
    /// Nothing to run on this pass
    Idle,
}

/// Per-CPU scheduler state
pub struct Cpu {
    id: CpuId,
    phase: Phase,
    kernel: Arc<Kernel>,
}

impl Cpu {
    pub fn new(kernel: Arc<Kernel>, id: CpuId) -> Self {
        Self {
            id,
            phase: Phase::Top,
            kernel,
        }
    }

    #[inline]
    pub fn id(&self) -> CpuId {
        self.id
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Pick at most one context and run it until it traps
    pub fn schedule_once(&mut self) -> Schedule {
        let mut t = self.kernel.table.lock();
        let picked = policy::select(&mut self.phase, &mut t);
        match picked {
            Some(idx) => Schedule::Ran(self.kernel.dispatch(self.id, t, idx)),
            None => {
                drop(t);
                self.kernel.stats.inc_idle_passes();
                trace!(cpu = self.id, "Idle pass");
                Schedule::Idle
            }
        }
    }

    /// Run until `shutdown` is set
    pub fn run(&mut self, shutdown: &AtomicBool) {
        debug!(cpu = self.id, "Scheduler loop started");
        while !shutdown.load(Ordering::Acquire) {
            if self.schedule_once() == Schedule::Idle {
                std::thread::yield_now();
            }
        }
        debug!(cpu = self.id, "Scheduler loop stopped");
    }

    /// Dispatch until a pass finds nothing runnable or `limit` dispatches ran
    ///
    /// Returns the pids in dispatch order.
    pub fn run_until_idle(&mut self, limit: usize) -> Vec<Pid> {
        let mut order = Vec::new();
        while order.len() < limit {
            match self.schedule_once() {
                Schedule::Ran(pid) => order.push(pid),
                Schedule::Idle => break,
            }
        }
        order
    }
}
