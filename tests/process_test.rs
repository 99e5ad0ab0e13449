/*!
 * Process Lifecycle Tests
 * fork/wait, kill, reparenting, sleep/wakeup, memory growth and multi-CPU runs
 */

use mlfq_kernel::core::limits::PGSIZE;
use mlfq_kernel::{
    Cpu, Kernel, KernelConfig, KernelError, ProcState, ProcessError, SchedulerError,
    SchedulerTask, Spin, SysContext, Trap, WaitChannel,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::task::Poll;
use std::time::{Duration, Instant};

fn boot(config: KernelConfig) -> (Arc<Kernel>, Cpu) {
    let kernel = Kernel::builder().with_config(config).boot().unwrap();
    let cpu = Cpu::new(Arc::clone(&kernel), 0);
    (kernel, cpu)
}

fn sleeper(chan: u64) -> impl FnMut(&mut SysContext<'_>) -> Trap + Send + 'static {
    move |cx: &mut SysContext<'_>| {
        cx.sleep_on(WaitChannel::Custom(chan));
        Trap::Sleep
    }
}

#[test]
fn test_fork_then_wait_reaps_child() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let reaped = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&reaped);
    let mut forked = false;

    let parent = kernel
        .spawn("parent", move |cx: &mut SysContext<'_>| {
            if !forked {
                forked = true;
                if cx.fork(Spin::new(3)).is_err() {
                    return Trap::Exit;
                }
            }
            loop {
                match cx.wait() {
                    Poll::Ready(Some(pid)) => record.lock().push(pid),
                    Poll::Ready(None) => return Trap::Exit,
                    Poll::Pending => return Trap::Sleep,
                }
            }
        })
        .unwrap();

    assert_eq!(cpu.run_until_idle(2), vec![1, parent]);
    let child = parent + 1;
    let info = kernel.process(child).unwrap();
    assert_eq!(info.parent, Some(parent));
    assert_eq!(info.name.as_str(), "parent");
    assert_eq!(kernel.process(parent).unwrap().state, ProcState::Sleeping);

    cpu.run_until_idle(100);
    assert_eq!(*reaped.lock(), vec![child]);
    assert!(!kernel.has_live_work());
}

#[test]
fn test_wait_without_children_returns_none() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let seen = Arc::new(Mutex::new(None));
    let record = Arc::clone(&seen);
    kernel
        .spawn("lonely", move |cx: &mut SysContext<'_>| {
            *record.lock() = Some(cx.wait());
            Trap::Exit
        })
        .unwrap();

    cpu.run_until_idle(10);
    assert_eq!(*seen.lock(), Some(Poll::Ready(None)));
}

#[test]
fn test_kill_wakes_sleeper_and_terminates_it() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let pid = kernel.spawn("sleeper", sleeper(9)).unwrap();

    cpu.run_until_idle(10);
    assert_eq!(kernel.process(pid).unwrap().state, ProcState::Sleeping);

    kernel.kill(pid).unwrap();
    let info = kernel.process(pid).unwrap();
    assert!(info.killed);
    assert_eq!(info.state, ProcState::Runnable);

    cpu.run_until_idle(10);
    assert_eq!(kernel.process(pid), None);
    assert!(!kernel.has_live_work());
}

#[test]
fn test_kill_unknown_pid() {
    let (kernel, _cpu) = boot(KernelConfig::small());
    assert_eq!(kernel.kill(99), Err(ProcessError::NotFound(99)));
}

#[test]
fn test_set_priority_validation() {
    let (kernel, _cpu) = boot(KernelConfig::small());
    let pid = kernel.spawn("job", Spin::new(1)).unwrap();

    assert_eq!(
        kernel.set_priority(pid, -1),
        Err(SchedulerError::InvalidPriority(-1))
    );
    assert_eq!(
        kernel.set_priority(42, 1),
        Err(SchedulerError::ProcessNotFound(42))
    );
    assert_eq!(kernel.set_priority(pid, 0), Ok(()));
    assert_eq!(kernel.process(pid).unwrap().priority, 0);
}

#[test]
fn test_wakeup_before_sleep_is_not_lost() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let woken = Arc::new(Mutex::new(None));
    let record = Arc::clone(&woken);
    let pid = kernel
        .spawn("early", move |cx: &mut SysContext<'_>| {
            cx.sleep_on(WaitChannel::Custom(3));
            *record.lock() = Some(cx.wakeup(WaitChannel::Custom(3)));
            Trap::Sleep
        })
        .unwrap();

    assert_eq!(cpu.run_until_idle(2), vec![1, pid]);
    assert_eq!(*woken.lock(), Some(1));
    assert_eq!(kernel.process(pid).unwrap().state, ProcState::Runnable);
}

#[test]
fn test_sleep_with_releases_guard() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let shared = Arc::new(Mutex::new(0u32));
    let lock = Arc::clone(&shared);
    let pid = kernel
        .spawn("condvar", move |cx: &mut SysContext<'_>| {
            let mut guard = lock.lock();
            *guard += 1;
            cx.sleep_with(WaitChannel::Custom(11), guard);
            Trap::Sleep
        })
        .unwrap();

    cpu.run_until_idle(2);
    assert_eq!(*shared.lock(), 1);
    assert_eq!(kernel.process(pid).unwrap().state, ProcState::Sleeping);
}

#[test]
fn test_orphans_are_adopted_by_init() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let parent = kernel
        .spawn("parent", |cx: &mut SysContext<'_>| {
            let _ = cx.fork(sleeper(4));
            Trap::Exit
        })
        .unwrap();

    cpu.run_until_idle(2);
    let child = parent + 1;
    assert_eq!(kernel.process(child).unwrap().parent, Some(1));

    cpu.run_until_idle(100);
    assert_eq!(kernel.process(parent), None);

    // Killing the orphan lets init reap it as well
    kernel.kill(child).unwrap();
    cpu.run_until_idle(100);
    assert_eq!(kernel.process(child), None);
    assert_eq!(kernel.snapshot().len(), 1);
}

#[test]
fn test_grow_and_shrink_memory() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let results = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&results);
    let pid = kernel
        .spawn("sbrk", move |cx: &mut SysContext<'_>| {
            let mut log = record.lock();
            log.push(cx.grow_memory(2 * PGSIZE as isize));
            log.push(cx.grow_memory(-(PGSIZE as isize)));
            log.push(cx.grow_memory(-(100 * PGSIZE as isize)));
            drop(log);
            cx.sleep_on(WaitChannel::Custom(1));
            Trap::Sleep
        })
        .unwrap();

    cpu.run_until_idle(2);
    let log = results.lock();
    assert_eq!(log[0], Ok(PGSIZE));
    assert_eq!(log[1], Ok(3 * PGSIZE));
    assert!(log[2].is_err());
    assert_eq!(kernel.process(pid).unwrap().size, 2 * PGSIZE);
}

#[test]
fn test_file_descriptors() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let results = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&results);
    kernel
        .spawn("files", move |cx: &mut SysContext<'_>| {
            let mut log = record.lock();
            log.push(cx.install_file(mlfq_kernel::FileHandle(1)).map(|_| ()));
            log.push(cx.install_file(mlfq_kernel::FileHandle(2)).map(|_| ()));
            log.push(cx.close_file(0));
            log.push(cx.close_file(0));
            log.push(cx.close_file(99));
            Trap::Exit
        })
        .unwrap();

    cpu.run_until_idle(3);
    assert_eq!(
        *results.lock(),
        vec![
            Ok(()),
            Ok(()),
            Ok(()),
            Err(ProcessError::BadDescriptor(0)),
            Err(ProcessError::BadDescriptor(99)),
        ]
    );
}

#[test]
fn test_table_full() {
    let (kernel, _cpu) = boot(KernelConfig::small().with_nproc(3));
    kernel.spawn("a", Spin::new(1)).unwrap();
    kernel.spawn("b", Spin::new(1)).unwrap();

    let err = kernel.spawn("c", Spin::new(1)).unwrap_err();
    assert!(matches!(
        err,
        KernelError::Process(ProcessError::TableFull(3))
    ));
}

#[test]
fn test_second_userinit_rejected() {
    let (kernel, _cpu) = boot(KernelConfig::small());
    assert!(matches!(kernel.userinit(), Err(KernelError::Internal(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let err = Kernel::builder()
        .with_config(KernelConfig::small().with_ncpu(0))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, KernelError::Configuration(_)));
}

#[test]
fn test_snapshot_serializes() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    kernel.spawn("job", Spin::new(10)).unwrap();
    cpu.run_until_idle(3);

    let json = serde_json::to_value(kernel.snapshot()).unwrap();
    let procs = json.as_array().unwrap();
    assert_eq!(procs.len(), 2);
    assert_eq!(procs[0]["name"], "initcode");
    assert_eq!(procs[0]["state"], "sleeping");
    assert_eq!(procs[1]["level"], "l0");
}

#[test]
fn test_multi_cpu_drains_workload() {
    let config = KernelConfig::small().with_nproc(16).with_kstack_pool(16).with_ncpu(2);
    let kernel = Kernel::builder().with_config(config).boot().unwrap();
    for i in 0..6 {
        kernel.spawn(&format!("spin{i}"), Spin::new(30)).unwrap();
    }

    let task = SchedulerTask::spawn(Arc::clone(&kernel)).unwrap();
    assert_eq!(task.cpus(), 2);

    let deadline = Instant::now() + Duration::from_secs(10);
    while kernel.has_live_work() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    task.shutdown();

    assert!(!kernel.has_live_work());
    let stats = kernel.stats();
    assert!(stats.dispatches >= 6 * 30);
    assert!(stats.preemptions >= 6 * 30);
}

#[test]
fn test_paused_task_dispatches_nothing() {
    let config = KernelConfig::small().with_ncpu(2);
    let kernel = Kernel::builder().with_config(config).boot().unwrap();
    let task = SchedulerTask::spawn(Arc::clone(&kernel)).unwrap();
    task.pause();
    std::thread::sleep(Duration::from_millis(20));

    let before = kernel.stats().dispatches;
    kernel.spawn("job", Spin::new(5)).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(kernel.stats().dispatches, before);

    task.resume();
    let deadline = Instant::now() + Duration::from_secs(10);
    while kernel.has_live_work() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    task.shutdown();
    assert!(!kernel.has_live_work());
}
