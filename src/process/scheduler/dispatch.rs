/*!
 * Dispatch
 *
 * Switch into a selected context with the table lock released, then settle
 * the trap it came back with. Kill requests take effect here, before a
 * context is resumed and after it returns.
 */

use crate::core::limits::WORD_SIZE;
use crate::core::types::{CpuId, Pid};
use crate::monitoring::span_dispatch;
use crate::process::kernel::Kernel;
use crate::process::program::{Context, Program, Trap};
use crate::process::quantum::Demotion;
use crate::process::syscall::SysContext;
use crate::process::table::ProcTable;
use crate::process::types::{Level, ProcHandle, ProcState};
use crate::vm::SpaceId;
use parking_lot::MutexGuard;
use tracing::{debug, warn};

impl Kernel {
    /// Run slot `idx` once; the lock is released for the duration of the run
    pub(crate) fn dispatch(
        &self,
        cpu: CpuId,
        mut t: MutexGuard<'_, ProcTable>,
        idx: usize,
    ) -> Pid {
        let h = t.handle(idx);
        let p = &mut t.procs[idx];
        if p.state != ProcState::Runnable {
            panic!("dispatching a {} context (pid {})", p.state.label(), p.pid);
        }
        p.state = ProcState::Running;
        p.chan = None;
        let (pid, level, killed, space, sz) = (p.pid, p.queue, p.killed, p.space, p.sz);
        let context = p.context.take();
        self.stats.inc_dispatches();
        drop(t);

        if let Some(space) = space {
            self.vm.switch_to(space);
        }

        let span = span_dispatch(cpu, pid, level);
        let (program, trap) = if killed {
            (None, Trap::Exit)
        } else {
            match context.and_then(|c| self.materialize(c, space)) {
                Some(mut program) => {
                    let _entered = span.enter();
                    let mut cx = SysContext::new(self, cpu, h);
                    let trap = program.resume(&mut cx);
                    (Some(program), trap)
                }
                None => {
                    warn!(pid, sz, "Context could not be started; terminating");
                    (None, Trap::Exit)
                }
            }
        };
        span.record_trap(trap);
        drop(span);

        let mut t = self.table.lock();
        self.settle(&mut t, cpu, h, program, trap);
        pid
    }

    /// Turn a saved context into a runnable program
    fn materialize(
        &self,
        context: Context,
        space: Option<SpaceId>,
    ) -> Option<Box<dyn Program>> {
        match context {
            Context::Suspended(program) => Some(program),
            Context::Entry { entry, sp } => {
                let space = space?;
                match self.vm.read_word(space, sp + WORD_SIZE) {
                    Ok(arg) => Some(entry(arg)),
                    Err(e) => {
                        warn!(error = %e, sp, "Thread stack unreadable");
                        None
                    }
                }
            }
        }
    }

    /// Apply the trap a context returned with
    fn settle(
        &self,
        t: &mut ProcTable,
        cpu: CpuId,
        h: ProcHandle,
        program: Option<Box<dyn Program>>,
        trap: Trap,
    ) {
        let trap = if t.proc(h).killed && !matches!(trap, Trap::Exit | Trap::ThreadExit(_)) {
            Trap::Exit
        } else {
            trap
        };

        let program = match (trap, program) {
            (Trap::Exit, _) => return self.exit_locked(t, h),
            (Trap::ThreadExit(retval), _) => return self.thread_exit_locked(t, h, retval),
            (_, Some(program)) => program,
            (_, None) => panic!("trap {:?} without a resumable program", trap),
        };

        let p = t.proc_mut(h);
        p.context = Some(Context::Suspended(program));
        match trap {
            Trap::Tick => {
                p.state = ProcState::Runnable;
                p.chan = None;
                self.stats.inc_preemptions();
                self.timer_tick(t, cpu, h.index);
            }
            Trap::Yield => {
                p.state = ProcState::Runnable;
                p.chan = None;
                self.stats.inc_voluntary_yields();
            }
            Trap::YieldInEscapeLevel => {
                p.state = ProcState::Runnable;
                p.chan = None;
                self.stats.inc_voluntary_yields();
                if p.queue == Level::L2 {
                    pass_fcfs_turn(t, h.index);
                }
            }
            Trap::Sleep => {
                // A wakeup before this point cancelled the pending sleep
                p.state = if p.chan.is_some() {
                    ProcState::Sleeping
                } else {
                    ProcState::Runnable
                };
            }
            Trap::Exit | Trap::ThreadExit(_) => unreachable!(),
        }
    }

    /// Timer interrupt: advance the clock, charge the quantum, maybe boost
    fn timer_tick(&self, t: &mut ProcTable, cpu: CpuId, idx: usize) {
        if cpu == 0 {
            t.ticks += 1;
        }

        match t.elapse(idx, self.config.demotion_exempt_pids) {
            Some(Demotion::Level(level)) => {
                self.stats.inc_demotions();
                debug!(pid = t.procs[idx].pid, level = %level, "Demoted");
            }
            Some(Demotion::Priority(priority)) => {
                self.stats.inc_demotions();
                debug!(pid = t.procs[idx].pid, priority, "L2 priority lowered");
            }
            None => {}
        }

        if cpu == 0 && t.ticks % self.config.boost_interval == 0 {
            t.boost();
            self.stats.inc_boosts();
            debug!(ticks = t.ticks, "Priority boost");
        }
    }
}

/// Hand the L2 turn to the next runnable L2 peer after the current front
fn pass_fcfs_turn(t: &mut ProcTable, me: usize) {
    let back = t.queues.back(Level::L2);
    let mut cursor = t.queues.next(t.queues.front(Level::L2));
    while cursor != back {
        if cursor != me && t.is_candidate(cursor, Level::L2) {
            t.queues.set_front(Level::L2, cursor);
            return;
        }
        cursor = t.queues.next(cursor);
    }
}
