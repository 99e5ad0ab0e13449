/*!
 * Lightweight Threads
 *
 * A thread is an ordinary descriptor that shares its group leader's address
 * space. Each gets a two-page stack at the top of the shared space (the lower
 * page is a guard) and is registered in the leader's thread table under the
 * first free tid.
 */

use super::kernel::Kernel;
use super::program::{Context, ThreadEntry};
use super::table::ProcTable;
use super::types::{Level, ProcHandle, ProcState, WaitChannel};
use crate::core::errors::{ProcessError, ThreadError};
use crate::core::limits::{PGSIZE, THREAD_FAKE_RETURN_PC, THREAD_STACK_PAGES, WORD_SIZE};
use crate::core::types::Tid;
use crate::fs::FileHandle;
use crate::vm::{SpaceId, VmError};
use std::task::Poll;
use tracing::{debug, info, warn};

impl Kernel {
    /// Start a thread running `entry(arg)` in the caller's thread group
    pub(crate) fn thread_create(
        &self,
        me: ProcHandle,
        entry: ThreadEntry,
        arg: usize,
    ) -> Result<Tid, ThreadError> {
        let mut guard = self.table.lock();
        let t = &mut *guard;

        let leader = t.leader_of(me);
        let tid = t
            .proc(leader)
            .threads
            .free_slot()
            .ok_or(ThreadError::TableFull)?;
        let idx = t.alloc(&self.kstacks)?;

        let owner = t.proc(leader);
        let (space, old_sz) = match owner.space {
            Some(space) => (space, owner.sz),
            None => {
                t.release(idx, &self.kstacks);
                return Err(ProcessError::NoCurrent.into());
            }
        };

        let sz = match self.map_thread_stack(space, old_sz, arg) {
            Ok(sz) => sz,
            Err(e) => {
                t.release(idx, &self.kstacks);
                warn!(error = %e, "Thread creation rolled back");
                return Err(e.into());
            }
        };
        t.set_group_size(leader, sz);

        let caller = t.proc(me);
        let ofile: Vec<Option<FileHandle>> = caller
            .ofile
            .iter()
            .map(|f| f.map(|f| self.fs.dup(f)))
            .collect();
        let cwd = caller.cwd.map(|d| self.fs.idup(d));
        let owner = t.proc(leader);
        let (name, parent, leader_pid) = (owner.name.clone(), owner.parent, owner.pid);

        let handle = t.handle(idx);
        let th = &mut t.procs[idx];
        th.space = Some(space);
        th.sz = sz;
        th.parent = parent;
        th.mother = Some(leader);
        th.tid = Some(tid);
        th.name = name;
        th.ofile = ofile;
        th.cwd = cwd;
        th.context = Some(Context::Entry {
            entry,
            sp: sz - 2 * WORD_SIZE,
        });
        let pid = th.pid;

        let group = &mut t.proc_mut(leader).threads;
        group.slots[tid] = Some(handle);
        group.live += 1;
        t.make_runnable(idx, Level::L0);

        info!(pid, tid, leader = leader_pid, "Thread created");
        Ok(tid)
    }

    /// Grow the shared space by the thread stack, guard its lower page and
    /// push `[fake return pc, arg]`; the space is restored on failure
    ///
    /// The stack starts on the first page boundary at or above `old_sz`, so
    /// the guard never covers a partially used heap page.
    fn map_thread_stack(
        &self,
        space: SpaceId,
        old_sz: usize,
        arg: usize,
    ) -> Result<usize, VmError> {
        let base = old_sz.next_multiple_of(PGSIZE);
        let sz = self
            .vm
            .grow(space, old_sz, base + THREAD_STACK_PAGES * PGSIZE)?;

        let installed = self.vm.install_guard_page(space, base).and_then(|()| {
            self.vm
                .copy_out(space, sz - 2 * WORD_SIZE, &[THREAD_FAKE_RETURN_PC, arg])
        });
        if let Err(e) = installed {
            if let Err(shrink) = self.vm.grow(space, sz, old_sz) {
                warn!(space = %space, error = %shrink, "Thread stack rollback failed");
            }
            return Err(e);
        }
        Ok(sz)
    }

    /// Reap thread `tid` of the caller's group once it has exited
    ///
    /// A tid outside the table kills the caller. `Pending` registers a sleep
    /// on the target; the caller must trap with `Trap::Sleep`.
    pub(crate) fn thread_join(
        &self,
        me: ProcHandle,
        tid: Tid,
    ) -> Poll<Result<usize, ThreadError>> {
        let mut guard = self.table.lock();
        let t = &mut *guard;
        let leader = t.leader_of(me);

        if tid == 0 || tid >= self.config.nthread {
            warn!(pid = t.proc(me).pid, tid, "Join on malformed thread id");
            t.mark_killed(me.index);
            return Poll::Ready(Err(ThreadError::InvalidThread(tid)));
        }

        let target = match t.proc(leader).threads.slots[tid] {
            Some(h) => h,
            None => return Poll::Ready(Err(ThreadError::NotPresent(tid))),
        };
        let state = match t.get(target) {
            Some(p) => p.state,
            None => {
                t.proc_mut(leader).threads.slots[tid] = None;
                return Poll::Ready(Err(ThreadError::NotPresent(tid)));
            }
        };

        if state != ProcState::Zombie {
            t.proc_mut(me).chan = Some(WaitChannel::Proc(target));
            return Poll::Pending;
        }

        let p = t.proc(target);
        let (retval, pid) = (p.retval, p.pid);
        t.proc_mut(leader).threads.slots[tid] = None;
        t.clear_escape(target);
        t.release(target.index, &self.kstacks);
        info!(pid, tid, retval, "Thread joined");
        Poll::Ready(Ok(retval))
    }

    /// Finish a thread with `retval`; the descriptor waits for its joiner
    pub(crate) fn thread_exit_locked(&self, t: &mut ProcTable, me: ProcHandle, retval: usize) {
        let leader = match t.proc(me).mother {
            Some(leader) => leader,
            None => return self.exit_locked(t, me),
        };

        self.release_files(t, me);
        t.proc_mut(me).retval = retval;

        let group = &mut t.proc_mut(leader).threads;
        group.live = group.live.saturating_sub(1);
        t.wakeup(WaitChannel::Proc(leader));
        t.wakeup(WaitChannel::Proc(me));
        t.reparent_children(me);
        t.clear_escape(me);

        let p = t.proc_mut(me);
        p.state = ProcState::Zombie;
        p.chan = None;
        p.context = None;
        info!(pid = p.pid, tid = ?p.tid, retval, "Thread exited");
    }

    /// Flag a group leader and all of its threads for termination
    pub(crate) fn kill_group(&self, t: &mut ProcTable, leader: ProcHandle) {
        let members: Vec<ProcHandle> = t
            .proc(leader)
            .threads
            .registered()
            .map(|(_, h)| h)
            .collect();
        t.mark_killed(leader.index);
        for h in members {
            if t.get(h).is_some() {
                t.mark_killed(h.index);
            }
        }
        debug!(leader = t.proc(leader).pid, "Thread group killed");
    }

    /// Dispose of every thread of an exiting leader
    ///
    /// Threads not currently running are reclaimed on the spot. A running
    /// thread is flagged killed and detached; it exits at its next safe point
    /// and is reaped by `wait` like an ordinary child.
    pub(crate) fn teardown_threads(&self, t: &mut ProcTable, leader: ProcHandle) {
        let members: Vec<(Tid, ProcHandle)> = t.proc(leader).threads.registered().collect();

        for (tid, h) in members {
            t.proc_mut(leader).threads.slots[tid] = None;
            let state = match t.get(h) {
                Some(p) => p.state,
                None => continue,
            };

            if state == ProcState::Running {
                let p = t.proc_mut(h);
                p.killed = true;
                p.mother = None;
                p.chan = None;
                debug!(pid = p.pid, tid, "Running thread detached from exiting leader");
                continue;
            }

            if state != ProcState::Zombie {
                self.release_files(t, h);
                t.reparent_children(h);
            }
            t.clear_escape(h);
            t.release(h.index, &self.kstacks);
        }
        t.proc_mut(leader).threads.live = 0;
    }
}
