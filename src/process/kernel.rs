/*!
 * Kernel
 * The process table behind its lock, wired to its collaborator services
 */

use super::table::ProcTable;
use super::types::{ProcInfo, ProcState};
use crate::core::config::KernelConfig;
use crate::core::errors::KernelResult;
use crate::core::types::{Pid, Ticks};
use crate::fs::{DirHandle, FileService, RefCountedFiles};
use crate::monitoring::{AtomicSchedulerStats, SchedulerStats};
use crate::vm::{AddressSpaces, KernelStackPool, PagedMemory};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Scheduler core shared by every CPU
pub struct Kernel {
    pub(crate) table: Mutex<ProcTable>,
    pub(crate) vm: Arc<dyn AddressSpaces>,
    pub(crate) fs: Arc<dyn FileService>,
    pub(crate) root: DirHandle,
    pub(crate) kstacks: KernelStackPool,
    pub(crate) config: KernelConfig,
    pub(crate) stats: AtomicSchedulerStats,
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Lock-free snapshot of the scheduler counters
    pub fn stats(&self) -> SchedulerStats {
        self.stats.snapshot()
    }

    /// Global tick clock
    pub fn ticks(&self) -> Ticks {
        self.table.lock().ticks
    }

    /// Pid holding the escape slot
    pub fn escape_holder(&self) -> Option<Pid> {
        let t = self.table.lock();
        t.escape_holder().map(|idx| t.procs[idx].pid)
    }

    /// Pid of the boot process
    pub fn init_pid(&self) -> Option<Pid> {
        let t = self.table.lock();
        t.initproc.and_then(|h| t.get(h)).map(|p| p.pid)
    }

    /// Listing entry for one pid
    pub fn process(&self, pid: Pid) -> Option<ProcInfo> {
        let t = self.table.lock();
        t.find_pid(pid).map(|idx| t.info(idx))
    }

    /// Whether any descriptor besides init is still alive (not a zombie)
    pub fn has_live_work(&self) -> bool {
        let t = self.table.lock();
        let init = t.initproc.map(|h| h.index);
        t.procs.iter().enumerate().any(|(i, p)| {
            Some(i) != init && !matches!(p.state, ProcState::Unused | ProcState::Zombie)
        })
    }

    pub fn kernel_stacks_available(&self) -> usize {
        self.kstacks.available()
    }
}

/// Builder for Kernel
pub struct KernelBuilder {
    config: Option<KernelConfig>,
    vm: Option<Arc<dyn AddressSpaces>>,
    files: Option<(Arc<dyn FileService>, DirHandle)>,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            vm: None,
            files: None,
        }
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a caller-provided address-space service
    pub fn with_address_spaces(mut self, vm: Arc<dyn AddressSpaces>) -> Self {
        self.vm = Some(vm);
        self
    }

    /// Use a caller-provided file service; `root` becomes init's cwd
    pub fn with_files(mut self, fs: Arc<dyn FileService>, root: DirHandle) -> Self {
        self.files = Some((fs, root));
        self
    }

    /// Build the kernel with an empty process table
    pub fn build(self) -> KernelResult<Arc<Kernel>> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let mut features = Vec::new();
        let vm = match self.vm {
            Some(vm) => {
                features.push("custom-vm");
                vm
            }
            None => Arc::new(PagedMemory::new(config.user_pages)) as Arc<dyn AddressSpaces>,
        };
        let (fs, root) = match self.files {
            Some(files) => {
                features.push("custom-fs");
                files
            }
            None => {
                let fs = RefCountedFiles::new();
                let root = fs.namei("/");
                (Arc::new(fs) as Arc<dyn FileService>, root)
            }
        };

        info!(
            nproc = config.nproc,
            ncpu = config.ncpu,
            boost_interval = config.boost_interval,
            "Kernel initialized{}{}",
            if features.is_empty() { "" } else { " with: " },
            features.join(", ")
        );

        Ok(Arc::new(Kernel {
            table: Mutex::new(ProcTable::new(&config)),
            vm,
            fs,
            root,
            kstacks: KernelStackPool::new(config.kstack_pool),
            stats: AtomicSchedulerStats::new(),
            config,
        }))
    }

    /// Build the kernel and create the boot process
    pub fn boot(self) -> KernelResult<Arc<Kernel>> {
        let kernel = self.build()?;
        kernel.userinit()?;
        Ok(kernel)
    }
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}
