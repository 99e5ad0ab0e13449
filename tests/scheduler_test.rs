/*!
 * Scheduler Tests
 * Level order, demotion, L2 priority selection and boosting
 */

use mlfq_kernel::{
    Cpu, Kernel, KernelConfig, Level, ProcState, Schedule, Spin, SysContext, Trap, WaitChannel,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Small single-CPU kernel where only init is exempt from demotion
fn boot(config: KernelConfig) -> (Arc<Kernel>, Cpu) {
    let config = KernelConfig {
        demotion_exempt_pids: 1,
        ..config
    };
    let kernel = Kernel::builder().with_config(config).boot().unwrap();
    let cpu = Cpu::new(Arc::clone(&kernel), 0);
    (kernel, cpu)
}

fn level(kernel: &Kernel, pid: u32) -> Level {
    kernel.process(pid).unwrap().level
}

#[test]
fn test_init_runs_first_and_sleeps() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    assert_eq!(kernel.init_pid(), Some(1));

    assert_eq!(cpu.schedule_once(), Schedule::Ran(1));
    assert_eq!(cpu.schedule_once(), Schedule::Idle);
    assert!(!kernel.has_live_work());
}

#[test]
fn test_l0_demotes_after_four_ticks() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let pid = kernel.spawn("spin", Spin::new(100)).unwrap();

    assert_eq!(cpu.run_until_idle(4), vec![1, pid, pid, pid]);
    assert_eq!(level(&kernel, pid), Level::L0);
    assert_eq!(kernel.process(pid).unwrap().localtime, 3);

    cpu.run_until_idle(1);
    assert_eq!(level(&kernel, pid), Level::L1);
    assert_eq!(kernel.process(pid).unwrap().localtime, 0);

    cpu.run_until_idle(6);
    assert_eq!(level(&kernel, pid), Level::L2);

    cpu.run_until_idle(8);
    let info = kernel.process(pid).unwrap();
    assert_eq!((info.level, info.priority), (Level::L2, 2));
    assert_eq!(kernel.ticks(), 18);
    assert_eq!(kernel.stats().demotions, 3);
}

#[test]
fn test_exempt_pid_never_demoted() {
    let kernel = Kernel::builder()
        .with_config(KernelConfig::small())
        .boot()
        .unwrap();
    let mut cpu = Cpu::new(Arc::clone(&kernel), 0);
    let pid = kernel.spawn("exempt", Spin::new(50)).unwrap();
    assert_eq!(pid, 2);

    cpu.run_until_idle(30);
    assert_eq!(level(&kernel, pid), Level::L0);
}

#[test]
fn test_round_robin_within_l0() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let a = kernel.spawn("a", Spin::new(100)).unwrap();
    let b = kernel.spawn("b", Spin::new(100)).unwrap();

    assert_eq!(cpu.run_until_idle(5), vec![1, a, b, a, b]);
}

#[test]
fn test_higher_level_always_preferred() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let hog = kernel.spawn("hog", Spin::new(1000)).unwrap();
    cpu.run_until_idle(5);
    assert_eq!(level(&kernel, hog), Level::L1);

    // A fresh L0 arrival runs until it too is demoted
    let fresh = kernel.spawn("fresh", Spin::new(1000)).unwrap();
    assert_eq!(cpu.run_until_idle(4), vec![fresh; 4]);
    assert_eq!(level(&kernel, fresh), Level::L1);
    assert_eq!(level(&kernel, hog), Level::L1);
}

#[test]
fn test_l2_prefers_lowest_priority() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let a = kernel.spawn("a", Spin::new(1000)).unwrap();
    let b = kernel.spawn("b", Spin::new(1000)).unwrap();
    kernel.set_priority(b, 1).unwrap();

    for _ in 0..100 {
        if level(&kernel, a) == Level::L2 && level(&kernel, b) == Level::L2 {
            break;
        }
        assert!(matches!(cpu.schedule_once(), Schedule::Ran(_)));
    }
    assert_eq!((level(&kernel, a), level(&kernel, b)), (Level::L2, Level::L2));
    assert!(kernel.ticks() < 50);

    assert_eq!(cpu.run_until_idle(10), vec![b; 10]);
    assert_eq!(kernel.process(b).unwrap().priority, 0);
    assert_eq!(kernel.process(a).unwrap().priority, 3);
}

#[test]
fn test_boost_resets_levels() {
    let (kernel, mut cpu) = boot(KernelConfig::small().with_boost_interval(20));
    let pid = kernel.spawn("spin", Spin::new(1000)).unwrap();

    cpu.run_until_idle(1 + 18);
    let info = kernel.process(pid).unwrap();
    assert_eq!((info.level, info.priority), (Level::L2, 2));

    cpu.run_until_idle(2);
    let info = kernel.process(pid).unwrap();
    assert_eq!(kernel.ticks(), 20);
    assert_eq!(
        (info.level, info.localtime, info.priority),
        (Level::L0, 0, 3)
    );
    assert_eq!(kernel.stats().boosts, 1);
}

#[test]
fn test_yield_does_not_charge_quantum() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let mut rounds = 0;
    let pid = kernel
        .spawn("yielder", move |_cx: &mut SysContext<'_>| {
            rounds += 1;
            if rounds > 10 {
                Trap::Exit
            } else {
                Trap::Yield
            }
        })
        .unwrap();

    cpu.run_until_idle(11);
    let info = kernel.process(pid).unwrap();
    assert_eq!((info.level, info.localtime), (Level::L0, 0));
    assert_eq!(kernel.ticks(), 0);
    assert_eq!(kernel.stats().voluntary_yields, 10);
}

#[test]
fn test_yield_in_escape_level_passes_l2_turn() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let mut turns = 0;
    let polite = kernel
        .spawn("polite", move |_cx: &mut SysContext<'_>| {
            turns += 1;
            if turns > 10 {
                Trap::YieldInEscapeLevel
            } else {
                Trap::Tick
            }
        })
        .unwrap();
    let other = kernel.spawn("other", Spin::new(1000)).unwrap();

    for _ in 0..100 {
        if level(&kernel, polite) == Level::L2 && level(&kernel, other) == Level::L2 {
            break;
        }
        cpu.schedule_once();
    }
    assert_eq!((level(&kernel, polite), level(&kernel, other)), (Level::L2, Level::L2));

    // Equal priorities: the front goes first, then hands its turn over
    assert_eq!(cpu.run_until_idle(3), vec![polite, other, other]);
}

#[test]
fn test_blocked_processes_leave_cpu_idle() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let pid = kernel
        .spawn("sleeper", |cx: &mut SysContext<'_>| {
            cx.sleep_on(WaitChannel::Custom(5));
            Trap::Sleep
        })
        .unwrap();

    assert_eq!(cpu.run_until_idle(10), vec![1, pid]);
    assert_eq!(cpu.schedule_once(), Schedule::Idle);

    assert_eq!(kernel.wakeup(WaitChannel::Custom(5)), 1);
    assert_eq!(cpu.schedule_once(), Schedule::Ran(pid));
}

#[test]
fn test_wakeup_into_higher_level_is_not_missed() {
    let (kernel, mut cpu) = boot(KernelConfig::small());
    let mut woken = false;
    let b = kernel
        .spawn("b", move |cx: &mut SysContext<'_>| {
            if woken {
                return Trap::Tick;
            }
            woken = true;
            cx.sleep_on(WaitChannel::Custom(5));
            Trap::Sleep
        })
        .unwrap();

    let mut rounds = 0;
    let a = kernel
        .spawn("a", move |cx: &mut SysContext<'_>| {
            rounds += 1;
            if rounds <= 4 {
                return Trap::Tick;
            }
            cx.wakeup(WaitChannel::Custom(5));
            cx.sleep_on(WaitChannel::Custom(6));
            Trap::Sleep
        })
        .unwrap();

    // a burns its L0 quantum, then wakes b from L1 and blocks
    assert_eq!(cpu.run_until_idle(7), vec![1, b, a, a, a, a, a]);
    let info = kernel.process(a).unwrap();
    assert_eq!((info.state, info.level), (ProcState::Sleeping, Level::L1));
    let info = kernel.process(b).unwrap();
    assert_eq!((info.state, info.level), (ProcState::Runnable, Level::L0));

    assert_eq!(cpu.schedule_once(), Schedule::Ran(b));
}
