/*!
 * Programs and Execution Contexts
 *
 * A schedulable unit is a resumable computation. The scheduler resumes it;
 * it runs until it hands control back with a `Trap` naming why.
 */

use super::syscall::SysContext;
use super::types::WaitChannel;
use crate::core::types::Address;
use std::fmt;
use std::task::Poll;

/// Why a context handed the CPU back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// Consumed its whole tick; the timer interrupt preempts it
    Tick,
    /// Voluntary `yield`
    Yield,
    /// `yield_in_escape_level`: yield and pass the L2 FCFS turn to the next peer
    YieldInEscapeLevel,
    /// Block on the wait channel registered through `SysContext`
    Sleep,
    /// Process `exit`
    Exit,
    /// `thread_exit(result)`
    ThreadExit(usize),
}

/// A resumable computation
pub trait Program: Send {
    /// Run until the next trap
    fn resume(&mut self, cx: &mut SysContext<'_>) -> Trap;
}

impl<F> Program for F
where
    F: FnMut(&mut SysContext<'_>) -> Trap + Send,
{
    fn resume(&mut self, cx: &mut SysContext<'_>) -> Trap {
        self(cx)
    }
}

/// Thread entry point: builds the thread's program from its stack argument
pub type ThreadEntry = fn(usize) -> Box<dyn Program>;

/// Saved execution context
pub(crate) enum Context {
    /// Fresh thread: start at `entry`, argument on the user stack at `sp + WORD`
    Entry { entry: ThreadEntry, sp: Address },
    /// Previously suspended computation
    Suspended(Box<dyn Program>),
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Entry { sp, .. } => f.debug_struct("Entry").field("sp", sp).finish(),
            Context::Suspended(_) => f.write_str("Suspended"),
        }
    }
}

/// CPU-bound job: burns `ticks` timer ticks, then exits
#[derive(Debug, Clone)]
pub struct Spin {
    remaining: u64,
}

impl Spin {
    pub fn new(ticks: u64) -> Self {
        Self { remaining: ticks }
    }
}

impl Program for Spin {
    fn resume(&mut self, _cx: &mut SysContext<'_>) -> Trap {
        if self.remaining == 0 {
            return Trap::Exit;
        }
        self.remaining -= 1;
        Trap::Tick
    }
}

/// Boot process body: reaps orphans forever
#[derive(Debug, Default)]
pub struct InitProgram;

impl Program for InitProgram {
    fn resume(&mut self, cx: &mut SysContext<'_>) -> Trap {
        loop {
            match cx.wait() {
                Poll::Ready(Some(_)) => continue,
                Poll::Ready(None) => {
                    // No children: sleep until an orphan is handed over
                    cx.sleep_on(WaitChannel::Proc(cx.handle()));
                    return Trap::Sleep;
                }
                Poll::Pending => return Trap::Sleep,
            }
        }
    }
}
