/*!
 * Scheduler Task - One Loop per CPU
 *
 * Drives `config.ncpu` scheduler loops on dedicated OS threads. Each loop
 * owns a `Cpu` and a command channel; pause/resume/shutdown are broadcast to
 * every loop.
 */

use super::{Cpu, Schedule};
use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::CpuId;
use crate::process::kernel::Kernel;
use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long an idle or paused loop waits for a command before rescanning
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Control messages for the scheduler loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Stop dispatching; programs stay where they are
    Pause,
    /// Resume dispatching
    Resume,
    /// Leave the loop
    Shutdown,
}

/// Handle to the running scheduler loops
pub struct SchedulerTask {
    command_tx: Vec<Sender<SchedulerCommand>>,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerTask {
    /// Spawn one scheduler loop per configured CPU
    pub fn spawn(kernel: Arc<Kernel>) -> KernelResult<Self> {
        let ncpu = kernel.config().ncpu;
        let mut command_tx = Vec::with_capacity(ncpu);
        let mut handles = Vec::with_capacity(ncpu);

        for id in 0..ncpu {
            let (tx, rx) = flume::unbounded();
            let cpu = Cpu::new(Arc::clone(&kernel), id);
            let handle = std::thread::Builder::new()
                .name(format!("cpu{id}"))
                .spawn(move || run_scheduler_loop(cpu, rx))
                .map_err(|e| KernelError::Internal(format!("cannot start cpu{id}: {e}")))?;
            command_tx.push(tx);
            handles.push(handle);
        }

        info!(ncpu, "Scheduler task spawned");
        Ok(Self {
            command_tx,
            handles,
        })
    }

    pub fn cpus(&self) -> usize {
        self.command_tx.len()
    }

    fn broadcast(&self, cmd: SchedulerCommand) {
        for tx in &self.command_tx {
            let _ = tx.send(cmd);
        }
    }

    /// Pause dispatching on every CPU
    pub fn pause(&self) {
        self.broadcast(SchedulerCommand::Pause);
    }

    /// Resume dispatching on every CPU
    pub fn resume(&self) {
        self.broadcast(SchedulerCommand::Resume);
    }

    /// Stop every loop and wait for the threads to finish
    pub fn shutdown(mut self) {
        self.broadcast(SchedulerCommand::Shutdown);
        for (id, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(cpu = id, "Scheduler loop panicked");
            }
        }
        info!("Scheduler task shutdown complete");
    }
}

/// Apply one command; returns false on shutdown
fn apply(cpu: CpuId, cmd: SchedulerCommand, active: &mut bool) -> bool {
    match cmd {
        SchedulerCommand::Pause => {
            debug!(cpu, "Scheduler loop paused");
            *active = false;
        }
        SchedulerCommand::Resume => {
            debug!(cpu, "Scheduler loop resumed");
            *active = true;
        }
        SchedulerCommand::Shutdown => return false,
    }
    true
}

fn run_scheduler_loop(mut cpu: Cpu, command_rx: Receiver<SchedulerCommand>) {
    let id = cpu.id();
    let mut active = true;
    debug!(cpu = id, "Scheduler loop started");

    loop {
        match command_rx.try_recv() {
            Ok(cmd) => {
                if !apply(id, cmd, &mut active) {
                    break;
                }
                continue;
            }
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        if active {
            if let Schedule::Ran(_) = cpu.schedule_once() {
                continue;
            }
        }

        match command_rx.recv_timeout(IDLE_BACKOFF) {
            Ok(cmd) => {
                if !apply(id, cmd, &mut active) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(cpu = id, "Scheduler loop stopped");
}
