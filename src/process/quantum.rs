/*!
 * Quantum, Demotion and Boost
 *
 * Timer-driven level migration. A context at level L owns a budget of
 * 2L + 4 ticks; exhausting it moves it one level down, or at L2 lowers its
 * tie-break priority. Every boost interval everything returns to L0.
 */

use super::table::ProcTable;
use super::types::{Level, ProcState};
use crate::core::types::Pid;

/// What crossing a quantum boundary did to a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Demotion {
    /// Moved down to this level
    Level(Level),
    /// Stayed in L2 with this priority
    Priority(i32),
}

impl ProcTable {
    /// Charge one tick to `idx`; returns the demotion it triggered, if any
    pub fn elapse(&mut self, idx: usize, exempt: Pid) -> Option<Demotion> {
        let p = &mut self.procs[idx];
        let quantum = p.queue.quantum()?;
        p.localtime += 1;
        if p.localtime >= quantum {
            self.demote(idx, exempt)
        } else {
            None
        }
    }

    /// Quantum exhausted: reset localtime and move one step down
    pub fn demote(&mut self, idx: usize, exempt: Pid) -> Option<Demotion> {
        let p = &mut self.procs[idx];
        p.localtime = 0;
        if p.pid <= exempt {
            return None;
        }

        match p.queue {
            Level::Special => None,
            Level::L2 => {
                p.priority = (p.priority - 1).max(0);
                Some(Demotion::Priority(p.priority))
            }
            level => {
                let target = level.demoted();
                p.queue = target;
                if self.queues.is_empty(target) {
                    self.queues.set_front(target, idx);
                }
                self.queues.extend_back(target, idx);
                Some(Demotion::Level(target))
            }
        }
    }

    /// Reset every descriptor to L0 and vacate the escape slot
    pub fn boost(&mut self) {
        self.escape = None;

        for idx in 0..self.len() {
            if self.procs[idx].queue == Level::Special {
                if self.queues.is_empty(Level::L0) {
                    let next = self.queues.next(idx);
                    self.queues.set_back(Level::L0, next);
                }
                self.queues.set_front(Level::L0, idx);
            }
            self.procs[idx].reset_level();
        }

        let n = self.len();
        let front = self.queues.front(Level::L0);
        for idx in (0..n).map(|off| (front + off) % n) {
            if self.procs[idx].state == ProcState::Runnable {
                if self.queues.is_empty(Level::L0) {
                    self.queues.set_front(Level::L0, idx);
                }
                self.queues.extend_back(Level::L0, idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::KernelConfig;
    use crate::core::limits::{DEFAULT_PRIORITY, DEMOTION_EXEMPT_PIDS};
    use crate::vm::KernelStackPool;
    use proptest::prelude::*;

    /// Table with `n` runnable L0 descriptors; pids 1..=2 are burned first
    fn table_with(n: usize) -> (ProcTable, Vec<usize>) {
        let config = KernelConfig::small().with_nproc(16).with_kstack_pool(16);
        let pool = KernelStackPool::new(config.kstack_pool);
        let mut t = ProcTable::new(&config);
        for _ in 0..2 {
            let idx = t.alloc(&pool).unwrap();
            t.make_runnable(idx, Level::L0);
        }
        let idxs = (0..n)
            .map(|_| {
                let idx = t.alloc(&pool).unwrap();
                t.make_runnable(idx, Level::L0);
                idx
            })
            .collect();
        (t, idxs)
    }

    #[test]
    fn test_l0_demotes_after_four_ticks() {
        let (mut t, idxs) = table_with(1);
        let p = idxs[0];
        for _ in 0..3 {
            assert_eq!(t.elapse(p, DEMOTION_EXEMPT_PIDS), None);
        }
        assert_eq!(
            t.elapse(p, DEMOTION_EXEMPT_PIDS),
            Some(Demotion::Level(Level::L1))
        );
        assert_eq!(t.procs[p].queue, Level::L1);
        assert_eq!(t.procs[p].localtime, 0);
        assert!(t.queues.window(Level::L1).contains(p));
    }

    #[test]
    fn test_l2_lowers_priority_to_floor() {
        let (mut t, idxs) = table_with(1);
        let p = idxs[0];
        t.procs[p].queue = Level::L2;
        for expected in [2, 1, 0, 0] {
            for _ in 0..7 {
                t.elapse(p, DEMOTION_EXEMPT_PIDS);
            }
            assert_eq!(
                t.elapse(p, DEMOTION_EXEMPT_PIDS),
                Some(Demotion::Priority(expected))
            );
        }
        assert_eq!(t.procs[p].queue, Level::L2);
    }

    #[test]
    fn test_low_pids_are_exempt() {
        let (mut t, _) = table_with(0);
        let init = t.find_pid(1).unwrap();
        for _ in 0..20 {
            t.elapse(init, DEMOTION_EXEMPT_PIDS);
        }
        assert_eq!(t.procs[init].queue, Level::L0);
        assert!(t.procs[init].localtime < 4);
    }

    #[test]
    fn test_special_is_not_accounted() {
        let (mut t, idxs) = table_with(1);
        let p = idxs[0];
        t.procs[p].queue = Level::Special;
        assert_eq!(t.elapse(p, DEMOTION_EXEMPT_PIDS), None);
        assert_eq!(t.procs[p].localtime, 0);
    }

    #[test]
    fn test_boost_resets_everything() {
        let (mut t, idxs) = table_with(3);
        t.procs[idxs[0]].queue = Level::L2;
        t.procs[idxs[0]].priority = 0;
        t.procs[idxs[1]].queue = Level::L1;
        t.procs[idxs[1]].localtime = 5;
        t.procs[idxs[2]].queue = Level::Special;
        t.escape = Some(t.handle(idxs[2]));

        t.boost();

        assert_eq!(t.escape, None);
        for &idx in &idxs {
            let p = &t.procs[idx];
            assert_eq!((p.queue, p.localtime, p.priority), (Level::L0, 0, DEFAULT_PRIORITY));
            assert_eq!(t.queues.front(Level::L0) == idx, idx == idxs[2]);
        }
        for &idx in &idxs {
            assert_eq!(t.queues.first_runnable(Level::L0, |i| i == idx), Some(idx));
        }
    }

    proptest! {
        #[test]
        fn prop_levels_never_rise_without_boost(ticks in proptest::collection::vec(0usize..3, 1..200)) {
            let (mut t, idxs) = table_with(3);
            let mut last: Vec<(Level, i32)> = idxs
                .iter()
                .map(|&i| (t.procs[i].queue, t.procs[i].priority))
                .collect();

            for pick in ticks {
                let idx = idxs[pick];
                t.elapse(idx, DEMOTION_EXEMPT_PIDS);
                let now = (t.procs[idx].queue, t.procs[idx].priority);
                let before = last[pick];
                prop_assert!(now.0 >= before.0);
                if now.0 == before.0 {
                    prop_assert!(now.1 <= before.1);
                }
                prop_assert!(now.1 >= 0);
                last[pick] = now;
            }
        }
    }
}
