/*!
 * MLFQ Kernel - Demo Entry Point
 *
 * Boots the kernel and replays the classic scheduler workloads:
 * - longtime: a CPU hog sinking through the levels
 * - lock / unlock: a parent taking the escape slot while its child spins
 * - threads: create four threads and join them in order
 *
 * Usage: kernel [longtime|lock|unlock|threads|all]
 */

use mlfq_kernel::core::limits::ESCAPE_PASSWORD;
use mlfq_kernel::{
    init_tracing, Cpu, Kernel, KernelConfig, KernelError, Program, Schedule, SchedulerTask,
    SysContext, Trap,
};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use tracing::{info, warn};

/// CPU hog reporting its level every 100 ticks
struct LongTime {
    round: u32,
    rounds: u32,
}

impl Program for LongTime {
    fn resume(&mut self, cx: &mut SysContext<'_>) -> Trap {
        if self.round == self.rounds {
            return Trap::Exit;
        }
        if self.round % 100 == 0 {
            info!(pid = cx.pid(), level = cx.get_level(), round = self.round, "longtime");
        }
        self.round += 1;
        Trap::Tick
    }
}

/// Child half of the lock test
struct Counter {
    tag: &'static str,
    round: u32,
    rounds: u32,
}

impl Program for Counter {
    fn resume(&mut self, cx: &mut SysContext<'_>) -> Trap {
        if self.round == self.rounds {
            return Trap::Exit;
        }
        if self.round % 20 == 0 {
            info!(tag = self.tag, level = cx.get_level(), round = self.round, "counting");
        }
        self.round += 1;
        Trap::Tick
    }
}

#[derive(Clone, Copy)]
enum LockStage {
    Fork,
    Work(u32),
    Reap,
}

/// Parent half of the lock test
struct LockTest {
    lock: bool,
    stage: LockStage,
}

impl Program for LockTest {
    fn resume(&mut self, cx: &mut SysContext<'_>) -> Trap {
        loop {
            match self.stage {
                LockStage::Fork => {
                    let child = Counter {
                        tag: "child",
                        round: 0,
                        rounds: 60,
                    };
                    if let Err(e) = cx.fork(child) {
                        warn!(error = %e, "fork failed");
                        return Trap::Exit;
                    }
                    if self.lock {
                        cx.lock(ESCAPE_PASSWORD);
                    }
                    self.stage = LockStage::Work(0);
                }
                LockStage::Work(round) if round < 60 => {
                    if round % 20 == 0 {
                        info!(tag = "parent", level = cx.get_level(), round, "counting");
                    }
                    self.stage = LockStage::Work(round + 1);
                    return Trap::Tick;
                }
                LockStage::Work(_) => {
                    if self.lock {
                        cx.unlock(ESCAPE_PASSWORD);
                    }
                    self.stage = LockStage::Reap;
                }
                LockStage::Reap => {
                    return match cx.wait() {
                        Poll::Ready(_) => Trap::Exit,
                        Poll::Pending => Trap::Sleep,
                    };
                }
            }
        }
    }
}

const NTHREADS: usize = 4;

fn hello_thread(arg: usize) -> Box<dyn Program> {
    Box::new(move |cx: &mut SysContext<'_>| {
        info!(pid = cx.pid(), "Thread {}: Hello, world!", arg);
        Trap::ThreadExit(arg * 2)
    })
}

/// Create-then-join workload
struct ThreadTest {
    tids: Vec<usize>,
    joined: usize,
}

impl Program for ThreadTest {
    fn resume(&mut self, cx: &mut SysContext<'_>) -> Trap {
        while self.tids.len() < NTHREADS {
            match cx.thread_create(hello_thread, self.tids.len()) {
                Ok(tid) => self.tids.push(tid),
                Err(e) => {
                    warn!(error = %e, "Thread creation failed!");
                    return Trap::Exit;
                }
            }
        }
        while self.joined < NTHREADS {
            match cx.thread_join(self.tids[self.joined]) {
                Poll::Pending => return Trap::Sleep,
                Poll::Ready(Ok(retval)) => {
                    info!("Joined Thread {}, Return Value: {}", self.joined, retval);
                    self.joined += 1;
                }
                Poll::Ready(Err(e)) => {
                    warn!(error = %e, "Thread join failed!");
                    return Trap::Exit;
                }
            }
        }
        info!("Main thread exiting.");
        Trap::Exit
    }
}

fn spawn_workloads(kernel: &Kernel, which: &str) -> Result<(), KernelError> {
    let all = which == "all";
    if all || which == "longtime" {
        kernel.spawn("longtime", LongTime { round: 0, rounds: 400 })?;
    }
    if all || which == "lock" || which == "unlock" {
        kernel.spawn(
            "lock_test",
            LockTest {
                lock: which != "unlock",
                stage: LockStage::Fork,
            },
        )?;
    }
    if all || which == "threads" {
        kernel.spawn(
            "thread_test",
            ThreadTest {
                tids: Vec::new(),
                joined: 0,
            },
        )?;
    }
    Ok(())
}

fn drive(kernel: &Arc<Kernel>) -> Result<(), KernelError> {
    if kernel.config().ncpu == 1 {
        let mut cpu = Cpu::new(Arc::clone(kernel), 0);
        while kernel.has_live_work() {
            if cpu.schedule_once() == Schedule::Idle {
                warn!("Every remaining process is blocked");
                break;
            }
        }
        return Ok(());
    }

    let task = SchedulerTask::spawn(Arc::clone(kernel))?;
    while kernel.has_live_work() {
        std::thread::sleep(Duration::from_millis(5));
    }
    task.shutdown();
    Ok(())
}

fn main() -> miette::Result<()> {
    init_tracing();

    let which = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let config = KernelConfig::from_env()?;
    info!(?config, "MLFQ kernel starting");

    let kernel = Kernel::builder().with_config(config).boot()?;
    spawn_workloads(&kernel, &which)?;
    drive(&kernel)?;

    kernel.procdump();
    let report = serde_json::json!({
        "ticks": kernel.ticks(),
        "stats": kernel.stats(),
        "processes": kernel.snapshot(),
    });
    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|e| KernelError::Internal(format!("cannot render report: {e}")))?;
    println!("{rendered}");
    Ok(())
}
