/*!
 * Process Lifecycle
 *
 * Creation, exit, reaping, kill and sleep/wakeup. Every operation takes the
 * table lock for its whole duration; collaborator services (address spaces,
 * files, kernel stacks) are only ever called with the table lock held, never
 * the other way round.
 */

use super::kernel::Kernel;
use super::program::{Context, InitProgram, Program};
use super::table::ProcTable;
use super::types::{Level, ProcHandle, ProcInfo, ProcState, WaitChannel};
use crate::core::data_structures::ProcName;
use crate::core::errors::{KernelError, KernelResult, ProcessError, SchedulerError, VmError};
use crate::core::limits::PGSIZE;
use crate::core::types::{Fd, Pid};
use crate::fs::FileHandle;
use std::task::Poll;
use tracing::{debug, info};

impl ProcTable {
    /// Record a new address-space size on a group leader and all its threads
    pub fn set_group_size(&mut self, leader: ProcHandle, sz: usize) {
        let members: Vec<ProcHandle> = self
            .proc(leader)
            .threads
            .registered()
            .map(|(_, h)| h)
            .collect();
        self.proc_mut(leader).sz = sz;
        for h in members {
            if let Some(p) = self.get_mut(h) {
                p.sz = sz;
            }
        }
    }
}

impl Kernel {
    /// Create the boot process
    pub fn userinit(&self) -> KernelResult<Pid> {
        let mut guard = self.table.lock();
        let t = &mut *guard;
        if t.initproc.is_some() {
            return Err(KernelError::Internal("init process already exists".into()));
        }

        let idx = self.new_process(t, "initcode", None, Box::new(InitProgram))?;
        t.initproc = Some(t.handle(idx));
        let pid = t.procs[idx].pid;
        info!(pid, "Init process created");
        Ok(pid)
    }

    /// Create a process running `program` as a child of init
    pub fn spawn(&self, name: &str, program: impl Program + 'static) -> KernelResult<Pid> {
        let mut guard = self.table.lock();
        let t = &mut *guard;
        let parent = t.initproc;
        let idx = self.new_process(t, name, parent, Box::new(program))?;
        let pid = t.procs[idx].pid;
        info!(pid, name, "Process spawned");
        Ok(pid)
    }

    fn new_process(
        &self,
        t: &mut ProcTable,
        name: &str,
        parent: Option<ProcHandle>,
        program: Box<dyn Program>,
    ) -> Result<usize, ProcessError> {
        let idx = t.alloc(&self.kstacks)?;
        let space = match self.vm.create() {
            Ok(space) => space,
            Err(e) => {
                t.release(idx, &self.kstacks);
                return Err(e.into());
            }
        };

        let p = &mut t.procs[idx];
        p.space = Some(space);
        p.sz = PGSIZE;
        p.name = ProcName::from(name);
        p.parent = parent;
        p.cwd = Some(self.fs.idup(self.root));
        p.context = Some(Context::Suspended(program));
        t.make_runnable(idx, Level::L0);
        Ok(idx)
    }

    /// Duplicate `me` with `program` as the child's continuation
    pub(crate) fn fork(
        &self,
        me: ProcHandle,
        program: Box<dyn Program>,
    ) -> Result<Pid, ProcessError> {
        let mut guard = self.table.lock();
        let t = &mut *guard;
        let idx = t.alloc(&self.kstacks)?;

        let parent = t.proc(me);
        let sz = parent.sz;
        let copied = match parent.space {
            Some(space) => self.vm.copy(space, sz),
            None => self.vm.create(),
        };
        let space = match copied {
            Ok(space) => space,
            Err(e) => {
                t.release(idx, &self.kstacks);
                return Err(e.into());
            }
        };

        let parent = t.proc(me);
        let ofile: Vec<Option<FileHandle>> = parent
            .ofile
            .iter()
            .map(|f| f.map(|f| self.fs.dup(f)))
            .collect();
        let cwd = parent.cwd.map(|d| self.fs.idup(d));
        let name = parent.name.clone();
        let parent_pid = parent.pid;

        let child = &mut t.procs[idx];
        child.space = Some(space);
        child.sz = sz;
        child.parent = Some(me);
        child.ofile = ofile;
        child.cwd = cwd;
        child.name = name;
        child.context = Some(Context::Suspended(program));
        let pid = child.pid;

        t.make_runnable(idx, Level::L0);
        info!(pid, parent = parent_pid, "Process forked");
        Ok(pid)
    }

    /// Close every open file and drop the working directory of `h`
    pub(crate) fn release_files(&self, t: &mut ProcTable, h: ProcHandle) {
        let p = t.proc_mut(h);
        for slot in p.ofile.iter_mut() {
            if let Some(file) = slot.take() {
                self.fs.close(file);
            }
        }
        if let Some(cwd) = p.cwd.take() {
            self.fs.iput(cwd);
        }
    }

    /// Process exit; the descriptor becomes a ZOMBIE for its parent to reap
    pub(crate) fn exit_locked(&self, t: &mut ProcTable, me: ProcHandle) {
        if t.initproc == Some(me) {
            panic!("init exiting");
        }

        if let Some(leader) = t.proc(me).mother {
            // Exit from a thread takes the whole group down
            self.kill_group(t, leader);
            self.thread_exit_locked(t, me, 0);
            return;
        }

        self.teardown_threads(t, me);
        self.release_files(t, me);

        if let Some(parent) = t.proc(me).parent {
            t.wakeup(WaitChannel::Proc(parent));
        }
        t.reparent_children(me);
        t.clear_escape(me);

        let p = t.proc_mut(me);
        p.state = ProcState::Zombie;
        p.chan = None;
        p.context = None;
        info!(pid = p.pid, killed = p.killed, "Process exited");
    }

    /// Reap one zombie child of `me`
    ///
    /// `Ready(None)` when `me` has no children or has been killed. `Pending`
    /// registers a sleep on `me`; the caller must trap with `Trap::Sleep`.
    pub(crate) fn wait(&self, me: ProcHandle) -> Poll<Option<Pid>> {
        let mut guard = self.table.lock();
        let t = &mut *guard;

        let mut havekids = false;
        for idx in 0..t.len() {
            let p = &t.procs[idx];
            // Attached threads are joined, not waited for
            if p.state == ProcState::Unused || p.parent != Some(me) || p.mother.is_some() {
                continue;
            }
            havekids = true;
            if p.state == ProcState::Zombie {
                let pid = p.pid;
                if let Some(space) = p.space {
                    if !t.space_shared(space, idx) {
                        self.vm.free(space);
                    }
                }
                t.release(idx, &self.kstacks);
                info!(pid, parent = t.proc(me).pid, "Child reaped");
                return Poll::Ready(Some(pid));
            }
        }

        if !havekids || t.proc(me).killed {
            return Poll::Ready(None);
        }
        t.proc_mut(me).chan = Some(WaitChannel::Proc(me));
        Poll::Pending
    }

    /// Flag `pid` for termination at its next safe point
    pub fn kill(&self, pid: Pid) -> Result<(), ProcessError> {
        let mut t = self.table.lock();
        let idx = t.find_pid(pid).ok_or(ProcessError::NotFound(pid))?;
        t.mark_killed(idx);
        info!(pid, "Process killed");
        Ok(())
    }

    /// Wake everything sleeping on `chan`
    pub fn wakeup(&self, chan: WaitChannel) -> usize {
        self.table.lock().wakeup(chan)
    }

    /// Register a pending sleep on `chan`
    pub(crate) fn sleep_on(&self, me: ProcHandle, chan: WaitChannel) {
        self.table.lock().proc_mut(me).chan = Some(chan);
    }

    /// Register a pending sleep, releasing `guard` once the table lock is held
    pub(crate) fn sleep_with<G>(&self, me: ProcHandle, chan: WaitChannel, guard: G) {
        let mut t = self.table.lock();
        t.proc_mut(me).chan = Some(chan);
        drop(guard);
    }

    /// Set the L2 tie-break rank of `pid`
    pub fn set_priority(&self, pid: Pid, priority: i32) -> Result<(), SchedulerError> {
        if priority < 0 {
            return Err(SchedulerError::InvalidPriority(priority));
        }
        let mut t = self.table.lock();
        let idx = t
            .find_pid(pid)
            .ok_or(SchedulerError::ProcessNotFound(pid))?;
        t.procs[idx].priority = priority;
        debug!(pid, priority, "Priority set");
        Ok(())
    }

    pub(crate) fn level_of(&self, me: ProcHandle) -> u32 {
        self.table.lock().proc(me).queue.as_u32()
    }

    /// Grow (or shrink, for negative `n`) the group's address space; returns the old size
    pub(crate) fn grow_memory(&self, me: ProcHandle, n: isize) -> Result<usize, ProcessError> {
        let mut guard = self.table.lock();
        let t = &mut *guard;
        let leader = t.leader_of(me);
        let p = t.proc(leader);
        let space = p.space.ok_or(ProcessError::NoCurrent)?;
        let old = p.sz;

        let target = if n >= 0 {
            old + n.unsigned_abs()
        } else {
            old.checked_sub(n.unsigned_abs())
                .ok_or(VmError::BadAddress(old))?
        };
        let sz = self.vm.grow(space, old, target)?;
        t.set_group_size(leader, sz);
        self.vm.switch_to(space);
        Ok(old)
    }

    /// Install `file` in the lowest free descriptor slot of `me`
    pub(crate) fn install_file(&self, me: ProcHandle, file: FileHandle) -> Result<Fd, ProcessError> {
        let mut t = self.table.lock();
        let p = t.proc_mut(me);
        let fd = p
            .ofile
            .iter()
            .position(Option::is_none)
            .ok_or(ProcessError::FileTableFull)?;
        p.ofile[fd] = Some(file);
        Ok(fd)
    }

    pub(crate) fn close_file(&self, me: ProcHandle, fd: Fd) -> Result<(), ProcessError> {
        let mut t = self.table.lock();
        let file = t
            .proc_mut(me)
            .ofile
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(ProcessError::BadDescriptor(fd))?;
        self.fs.close(file);
        Ok(())
    }

    /// Listing of every live descriptor
    pub fn snapshot(&self) -> Vec<ProcInfo> {
        self.table.lock().snapshot()
    }

    /// Log one line per live descriptor
    pub fn procdump(&self) {
        for info in self.snapshot() {
            info!(
                pid = info.pid,
                level = %info.level,
                priority = info.priority,
                "{} {} {}",
                info.pid,
                info.state.label(),
                info.name
            );
        }
    }
}
