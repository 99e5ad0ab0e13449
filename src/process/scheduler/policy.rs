/*!
 * Selection Policy
 *
 * Level order: escape holder, then L0 and L1 round-robin over their windows,
 * then L2 first-come-first-served by lowest priority. Higher levels are
 * re-checked before every lower-level dispatch.
 */

use super::Phase;
use crate::process::table::ProcTable;
use crate::process::types::{Level, ProcState};

/// Whether the escape holder is runnable or already running somewhere
fn escape_active(t: &ProcTable) -> bool {
    t.escape_holder().is_some_and(|idx| {
        matches!(
            t.procs[idx].state,
            ProcState::Runnable | ProcState::Running
        )
    })
}

/// Advance the state machine to the next slot to dispatch
///
/// `None` ends the pass idle and rewinds to `Phase::Top`. A pass resumed
/// mid-scan goes idle only after one rescan from the top.
pub(crate) fn select(phase: &mut Phase, t: &mut ProcTable) -> Option<usize> {
    let mut full_pass = *phase == Phase::Top;
    loop {
        match *phase {
            Phase::Top => {
                *phase = if escape_active(t) {
                    Phase::Special
                } else {
                    Phase::L0Start
                };
            }

            Phase::Special => match t.escape_holder().map(|idx| (idx, t.procs[idx].state)) {
                Some((idx, ProcState::Runnable)) => return Some(idx),
                Some((_, ProcState::Running)) => {
                    // Holder is on another CPU; nothing else may run
                    *phase = Phase::Top;
                    return None;
                }
                _ => *phase = Phase::L0Start,
            },

            Phase::L0Start => {
                *phase = match t.first_runnable(Level::L0) {
                    Some(front) => Phase::L0Scan(front),
                    None => Phase::L1Start,
                };
            }

            Phase::L0Scan(cursor) => {
                if cursor == t.queues.back(Level::L0) {
                    *phase = if t.queues.is_empty(Level::L0) {
                        Phase::L1Start
                    } else {
                        Phase::L0Start
                    };
                } else if !t.is_candidate(cursor, Level::L0) {
                    *phase = Phase::L0Scan(t.queues.next(cursor));
                } else if escape_active(t) {
                    *phase = Phase::Special;
                } else {
                    *phase = Phase::L0Scan(t.queues.next(cursor));
                    return Some(cursor);
                }
            }

            Phase::L1Start => {
                *phase = match t.first_runnable(Level::L1) {
                    Some(front) => Phase::L1Scan(front),
                    None => Phase::L2,
                };
            }

            Phase::L1Scan(cursor) => {
                if cursor == t.queues.back(Level::L1) {
                    *phase = if t.queues.is_empty(Level::L1) {
                        Phase::L2
                    } else {
                        Phase::L1Start
                    };
                } else if !t.is_candidate(cursor, Level::L1) {
                    *phase = Phase::L1Scan(t.queues.next(cursor));
                } else if escape_active(t) {
                    *phase = Phase::Special;
                } else if !t.queues.is_empty(Level::L0) {
                    // L0 arrival preempts the L1 round
                    *phase = Phase::L0Start;
                } else {
                    *phase = Phase::L1Scan(t.queues.next(cursor));
                    return Some(cursor);
                }
            }

            Phase::L2 => {
                let Some(front) = t.first_runnable(Level::L2) else {
                    if escape_active(t) {
                        *phase = Phase::Special;
                        continue;
                    }
                    *phase = Phase::Top;
                    if !full_pass {
                        full_pass = true;
                        continue;
                    }
                    return None;
                };

                let mut pick = front;
                let back = t.queues.back(Level::L2);
                let mut cursor = front;
                let mut preempted = None;
                while cursor != back {
                    if t.is_candidate(cursor, Level::L2) {
                        if escape_active(t) {
                            preempted = Some(Phase::Special);
                            break;
                        }
                        if !t.queues.is_empty(Level::L0) {
                            preempted = Some(Phase::L0Start);
                            break;
                        }
                        if !t.queues.is_empty(Level::L1) {
                            preempted = Some(Phase::L1Start);
                            break;
                        }
                        if t.procs[cursor].priority < t.procs[pick].priority {
                            pick = cursor;
                        }
                    }
                    cursor = t.queues.next(cursor);
                }

                match preempted {
                    Some(next) => *phase = next,
                    None => {
                        *phase = Phase::Top;
                        return Some(pick);
                    }
                }
            }
        }
    }
}
