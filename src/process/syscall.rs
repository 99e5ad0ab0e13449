/*!
 * System Call Surface
 *
 * What a running program can ask of the kernel. A `SysContext` is handed to
 * `Program::resume` and names the calling descriptor; each call takes the
 * table lock for its own duration only.
 *
 * Blocking calls (`wait`, `thread_join`) never block the host thread: they
 * return `Poll::Pending` after registering a sleep, and the program then
 * traps with `Trap::Sleep` and retries the call when resumed.
 */

use super::kernel::Kernel;
use super::program::{Program, ThreadEntry};
use super::types::{ProcHandle, WaitChannel};
use crate::core::errors::{ProcessError, SchedulerError, ThreadError};
use crate::core::types::{CpuId, Fd, Pid, Ticks, Tid};
use crate::fs::FileHandle;
use std::task::Poll;

/// Kernel entry points available to the running context
pub struct SysContext<'k> {
    kernel: &'k Kernel,
    cpu: CpuId,
    me: ProcHandle,
}

impl<'k> SysContext<'k> {
    pub(crate) fn new(kernel: &'k Kernel, cpu: CpuId, me: ProcHandle) -> Self {
        Self { kernel, cpu, me }
    }

    /// Handle of the calling descriptor
    #[inline]
    pub fn handle(&self) -> ProcHandle {
        self.me
    }

    /// CPU the caller is running on
    #[inline]
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    #[inline]
    pub fn kernel(&self) -> &'k Kernel {
        self.kernel
    }

    pub fn pid(&self) -> Pid {
        self.kernel.table.lock().proc(self.me).pid
    }

    /// Whether the caller has been flagged for termination
    pub fn killed(&self) -> bool {
        self.kernel.table.lock().proc(self.me).killed
    }

    /// Global tick clock
    pub fn uptime(&self) -> Ticks {
        self.kernel.ticks()
    }

    /// Create a child running `child`; returns the child's pid
    pub fn fork(&mut self, child: impl Program + 'static) -> Result<Pid, ProcessError> {
        self.kernel.fork(self.me, Box::new(child))
    }

    /// Reap one exited child
    pub fn wait(&mut self) -> Poll<Option<Pid>> {
        self.kernel.wait(self.me)
    }

    pub fn kill(&mut self, pid: Pid) -> Result<(), ProcessError> {
        self.kernel.kill(pid)
    }

    /// Take the escape slot; misuse kills the caller
    pub fn lock(&mut self, password: i32) {
        self.kernel.escape_lock(self.me, password)
    }

    /// Leave the escape slot; misuse kills the caller
    pub fn unlock(&mut self, password: i32) {
        self.kernel.escape_unlock(self.me, password)
    }

    /// Current queue level (3 for the escape level)
    pub fn get_level(&self) -> u32 {
        self.kernel.level_of(self.me)
    }

    pub fn set_priority(&mut self, pid: Pid, priority: i32) -> Result<(), SchedulerError> {
        self.kernel.set_priority(pid, priority)
    }

    /// Start a thread in the caller's group; returns its tid
    pub fn thread_create(&mut self, entry: ThreadEntry, arg: usize) -> Result<Tid, ThreadError> {
        self.kernel.thread_create(self.me, entry, arg)
    }

    /// Collect the return value of thread `tid`
    pub fn thread_join(&mut self, tid: Tid) -> Poll<Result<usize, ThreadError>> {
        self.kernel.thread_join(self.me, tid)
    }

    /// Register a sleep on `chan`, taking effect when the program traps with `Trap::Sleep`
    pub fn sleep_on(&mut self, chan: WaitChannel) {
        self.kernel.sleep_on(self.me, chan)
    }

    /// Register a sleep on `chan` and release `guard` without a lost-wakeup window
    pub fn sleep_with<G>(&mut self, chan: WaitChannel, guard: G) {
        self.kernel.sleep_with(self.me, chan, guard)
    }

    pub fn wakeup(&mut self, chan: WaitChannel) -> usize {
        self.kernel.wakeup(chan)
    }

    /// sbrk: grow or shrink the address space by `n` bytes; returns the old size
    pub fn grow_memory(&mut self, n: isize) -> Result<usize, ProcessError> {
        self.kernel.grow_memory(self.me, n)
    }

    /// Take ownership of one reference to `file` as a new descriptor
    pub fn install_file(&mut self, file: FileHandle) -> Result<Fd, ProcessError> {
        self.kernel.install_file(self.me, file)
    }

    pub fn close_file(&mut self, fd: Fd) -> Result<(), ProcessError> {
        self.kernel.close_file(self.me, fd)
    }
}
