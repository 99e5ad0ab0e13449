/*!
 * Process Table
 *
 * Fixed-capacity arena of descriptors plus the ready-queue windows, the
 * escape slot and the global tick clock. Everything here is guarded by the
 * single table lock held in `Kernel`.
 */

use super::program::Context;
use super::queue::ReadyQueues;
use super::types::{Level, ProcHandle, ProcInfo, ProcState, WaitChannel};
use crate::core::config::KernelConfig;
use crate::core::data_structures::ProcName;
use crate::core::errors::ProcessError;
use crate::core::limits::DEFAULT_PRIORITY;
use crate::core::types::{Pid, Ticks, Tid};
use crate::fs::{DirHandle, FileHandle};
use crate::vm::{KernelStack, KernelStackPool, SpaceId};
use tracing::debug;

/// Per-group thread table; slot 0 is never handed out
#[derive(Debug, Default)]
pub(crate) struct ThreadTable {
    pub slots: Vec<Option<ProcHandle>>,
    pub live: usize,
}

impl ThreadTable {
    fn new(nthread: usize) -> Self {
        Self {
            slots: vec![None; nthread],
            live: 0,
        }
    }

    /// First free tid
    pub fn free_slot(&self) -> Option<Tid> {
        (1..self.slots.len()).find(|&tid| self.slots[tid].is_none())
    }

    pub fn registered(&self) -> impl Iterator<Item = (Tid, ProcHandle)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(tid, slot)| slot.map(|h| (tid, h)))
    }

    fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.live = 0;
    }
}

/// Process descriptor
#[derive(Debug)]
pub(crate) struct Proc {
    pub generation: u32,
    pub pid: Pid,
    pub name: ProcName,
    pub state: ProcState,
    pub space: Option<SpaceId>,
    pub sz: usize,
    pub context: Option<Context>,
    pub kstack: Option<KernelStack>,
    pub localtime: u32,
    pub priority: i32,
    pub queue: Level,
    pub parent: Option<ProcHandle>,
    pub killed: bool,
    pub chan: Option<WaitChannel>,
    pub ofile: Vec<Option<FileHandle>>,
    pub cwd: Option<DirHandle>,
    /// Group leader of a thread; `None` for processes and detached threads
    pub mother: Option<ProcHandle>,
    pub tid: Option<Tid>,
    pub threads: ThreadTable,
    pub retval: usize,
}

impl Proc {
    fn unused(nofile: usize, nthread: usize) -> Self {
        Self {
            generation: 0,
            pid: 0,
            name: ProcName::default(),
            state: ProcState::Unused,
            space: None,
            sz: 0,
            context: None,
            kstack: None,
            localtime: 0,
            priority: DEFAULT_PRIORITY,
            queue: Level::L0,
            parent: None,
            killed: false,
            chan: None,
            ofile: vec![None; nofile],
            cwd: None,
            mother: None,
            tid: None,
            threads: ThreadTable::new(nthread),
            retval: 0,
        }
    }

    #[inline]
    pub fn is_thread(&self) -> bool {
        self.tid.is_some()
    }

    /// Reset scheduling metadata to a fresh L0 placement
    #[inline]
    pub fn reset_level(&mut self) {
        self.queue = Level::L0;
        self.localtime = 0;
        self.priority = DEFAULT_PRIORITY;
    }

    fn clear(&mut self) {
        self.pid = 0;
        self.name.clear();
        self.space = None;
        self.sz = 0;
        self.context = None;
        self.reset_level();
        self.parent = None;
        self.killed = false;
        self.chan = None;
        self.ofile.iter_mut().for_each(|f| *f = None);
        self.cwd = None;
        self.mother = None;
        self.tid = None;
        self.threads.reset();
        self.retval = 0;
    }
}

/// The process table and everything scheduled through it
pub(crate) struct ProcTable {
    pub procs: Vec<Proc>,
    pub queues: ReadyQueues,
    pub escape: Option<ProcHandle>,
    pub ticks: Ticks,
    pub initproc: Option<ProcHandle>,
    next_pid: Pid,
}

impl ProcTable {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            procs: (0..config.nproc)
                .map(|_| Proc::unused(config.nofile, config.nthread))
                .collect(),
            queues: ReadyQueues::new(config.nproc),
            escape: None,
            ticks: 0,
            initproc: None,
            next_pid: 1,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.procs.len()
    }

    #[inline]
    pub fn handle(&self, index: usize) -> ProcHandle {
        ProcHandle {
            index,
            generation: self.procs[index].generation,
        }
    }

    /// Resolve a handle; stale handles and free slots yield `None`
    #[inline]
    pub fn get(&self, h: ProcHandle) -> Option<&Proc> {
        self.procs
            .get(h.index)
            .filter(|p| p.generation == h.generation && p.state != ProcState::Unused)
    }

    #[inline]
    pub fn get_mut(&mut self, h: ProcHandle) -> Option<&mut Proc> {
        self.procs
            .get_mut(h.index)
            .filter(|p| p.generation == h.generation && p.state != ProcState::Unused)
    }

    /// Descriptor of a handle the caller knows to be live
    ///
    /// Panics on a stale handle: the running context's own descriptor cannot
    /// be reclaimed underneath it.
    #[inline]
    pub fn proc(&self, h: ProcHandle) -> &Proc {
        match self.get(h) {
            Some(p) => p,
            None => panic!("stale process handle {:?}", h),
        }
    }

    #[inline]
    pub fn proc_mut(&mut self, h: ProcHandle) -> &mut Proc {
        match self.get_mut(h) {
            Some(p) => p,
            None => panic!("stale process handle {:?}", h),
        }
    }

    pub fn find_pid(&self, pid: Pid) -> Option<usize> {
        self.procs
            .iter()
            .position(|p| p.state != ProcState::Unused && p.pid == pid)
    }

    /// Whether slot `idx` is a scan candidate for `level`
    #[inline]
    pub fn is_candidate(&self, idx: usize, level: Level) -> bool {
        let p = &self.procs[idx];
        p.state == ProcState::Runnable && p.queue == level
    }

    /// Move `level`'s front onto its first scan candidate
    pub fn first_runnable(&mut self, level: Level) -> Option<usize> {
        let procs = &self.procs;
        self.queues.first_runnable(level, |i| {
            procs[i].state == ProcState::Runnable && procs[i].queue == level
        })
    }

    /// Thread-group leader of `h` (itself unless an attached thread)
    #[inline]
    pub fn leader_of(&self, h: ProcHandle) -> ProcHandle {
        self.proc(h).mother.unwrap_or(h)
    }

    /// Claim an UNUSED slot as an EMBRYO with a fresh pid and kernel stack
    ///
    /// The scan starts at the L0 back cursor so new descriptors land just
    /// after the current L0 window.
    pub fn alloc(&mut self, kstacks: &KernelStackPool) -> Result<usize, ProcessError> {
        let n = self.len();
        let start = self.queues.back(Level::L0);
        let idx = (0..n)
            .map(|off| (start + off) % n)
            .find(|&i| self.procs[i].state == ProcState::Unused)
            .ok_or(ProcessError::TableFull(n))?;

        let pid = self.next_pid;
        self.next_pid += 1;

        let p = &mut self.procs[idx];
        p.clear();
        p.state = ProcState::Embryo;
        p.pid = pid;

        match kstacks.alloc() {
            Some(stack) => {
                p.kstack = Some(stack);
                Ok(idx)
            }
            None => {
                p.state = ProcState::Unused;
                p.pid = 0;
                Err(ProcessError::KernelStackExhausted)
            }
        }
    }

    /// Return a slot to UNUSED, freeing its kernel stack
    ///
    /// The address space is left alone; callers decide whether it is still
    /// shared.
    pub fn release(&mut self, idx: usize, kstacks: &KernelStackPool) {
        let p = &mut self.procs[idx];
        if let Some(stack) = p.kstack.take() {
            kstacks.free(stack);
        }
        p.clear();
        p.state = ProcState::Unused;
        p.generation = p.generation.wrapping_add(1);
    }

    /// Whether any live descriptor other than `except` maps `space`
    pub fn space_shared(&self, space: SpaceId, except: usize) -> bool {
        self.procs.iter().enumerate().any(|(i, p)| {
            i != except && p.state != ProcState::Unused && p.space == Some(space)
        })
    }

    /// Mark `idx` RUNNABLE at `level` and make it discoverable
    pub fn make_runnable(&mut self, idx: usize, level: Level) {
        let p = &mut self.procs[idx];
        p.state = ProcState::Runnable;
        p.queue = level;
        p.chan = None;
        if level == Level::Special {
            return;
        }
        if self.queues.is_empty(level) {
            self.queues.set_front(level, idx);
        }
        self.queues.extend_back(level, idx);
    }

    /// Wake every context sleeping on `chan`
    ///
    /// A context still RUNNING with `chan` registered has not reached the
    /// scheduler yet; its pending sleep is cancelled instead.
    pub fn wakeup(&mut self, chan: WaitChannel) -> usize {
        let mut woken = 0;
        for idx in 0..self.len() {
            let p = &mut self.procs[idx];
            if p.chan != Some(chan) {
                continue;
            }
            let (state, level) = (p.state, p.queue);
            match state {
                ProcState::Sleeping => {
                    self.make_runnable(idx, level);
                    woken += 1;
                }
                ProcState::Running => {
                    self.procs[idx].chan = None;
                    woken += 1;
                }
                _ => {}
            }
        }
        woken
    }

    /// Set the kill flag and force a sleeper back onto its queue
    pub fn mark_killed(&mut self, idx: usize) {
        let p = &mut self.procs[idx];
        p.killed = true;
        let (state, level) = (p.state, p.queue);
        match state {
            ProcState::Sleeping => self.make_runnable(idx, level),
            ProcState::Running => self.procs[idx].chan = None,
            _ => {}
        }
    }

    /// Hand every child of `of` to init, waking init for adopted zombies
    pub fn reparent_children(&mut self, of: ProcHandle) {
        let init = self.initproc;
        let mut adopted_zombie = false;
        for p in self.procs.iter_mut() {
            if p.state != ProcState::Unused && p.parent == Some(of) {
                p.parent = init;
                adopted_zombie |= p.state == ProcState::Zombie;
            }
        }
        if adopted_zombie {
            if let Some(init) = init {
                self.wakeup(WaitChannel::Proc(init));
            }
        }
    }

    /// Drop `h` from the escape slot if it holds it
    pub fn clear_escape(&mut self, h: ProcHandle) {
        if self.escape == Some(h) {
            debug!(index = h.index, "Escape slot released by departing holder");
            self.escape = None;
        }
    }

    /// Current escape holder, if still live
    pub fn escape_holder(&self) -> Option<usize> {
        self.escape
            .filter(|&h| self.get(h).is_some())
            .map(|h| h.index)
    }

    pub fn info(&self, idx: usize) -> ProcInfo {
        let p = &self.procs[idx];
        ProcInfo {
            pid: p.pid,
            name: p.name.clone(),
            state: p.state,
            level: p.queue,
            localtime: p.localtime,
            priority: p.priority,
            killed: p.killed,
            parent: p.parent.and_then(|h| self.get(h)).map(|pp| pp.pid),
            tid: p.tid,
            threads: p.threads.live,
            size: p.sz,
        }
    }

    /// Listing of every live descriptor in table order
    pub fn snapshot(&self) -> Vec<ProcInfo> {
        (0..self.len())
            .filter(|&i| self.procs[i].state != ProcState::Unused)
            .map(|i| self.info(i))
            .collect()
    }
}
