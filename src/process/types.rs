/*!
 * Process Types
 * Common types for process management and scheduling
 */

use crate::core::data_structures::ProcName;
use crate::core::limits::quantum;
use crate::core::types::{Pid, Tid};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Descriptor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcState {
    /// Free slot
    Unused,
    /// Allocated, schedulable work not yet installed
    Embryo,
    /// Blocked on a wait channel
    Sleeping,
    /// Ready to run
    Runnable,
    /// Executing on some CPU
    Running,
    /// Exited, waiting to be reaped
    Zombie,
}

impl ProcState {
    /// Short label used by `procdump`
    pub const fn label(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Embryo => "embryo",
            ProcState::Sleeping => "sleep",
            ProcState::Runnable => "runble",
            ProcState::Running => "run",
            ProcState::Zombie => "zombie",
        }
    }
}

/// Queue membership: three feedback levels plus the escape level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    L0,
    L1,
    L2,
    Special,
}

impl Level {
    /// Feedback levels in scan priority order
    pub const FEEDBACK: [Level; 3] = [Level::L0, Level::L1, Level::L2];

    /// Numeric level as reported by `get_level`
    #[inline]
    pub const fn as_u32(self) -> u32 {
        match self {
            Level::L0 => 0,
            Level::L1 => 1,
            Level::L2 => 2,
            Level::Special => 3,
        }
    }

    /// Tick budget at this level; the escape level is not quantum-accounted
    #[inline]
    pub const fn quantum(self) -> Option<u32> {
        match self {
            Level::Special => None,
            level => Some(quantum(level.as_u32())),
        }
    }

    /// Next lower feedback level; L2 and the escape level stay put
    #[inline]
    pub const fn demoted(self) -> Level {
        match self {
            Level::L0 => Level::L1,
            Level::L1 => Level::L2,
            other => other,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Special => f.write_str("SPECIAL"),
            level => write!(f, "L{}", level.as_u32()),
        }
    }
}

/// Stable reference to a process-table slot
///
/// The generation changes every time the slot is reclaimed, so a handle to a
/// reaped descriptor never resolves to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcHandle {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl ProcHandle {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Something a context can sleep on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitChannel {
    /// A descriptor: parents wait on themselves, joiners on the thread
    Proc(ProcHandle),
    /// Caller-defined channel (device or lock address)
    Custom(u64),
}

/// Snapshot of one descriptor for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcInfo {
    pub pid: Pid,
    pub name: ProcName,
    pub state: ProcState,
    pub level: Level,
    pub localtime: u32,
    pub priority: i32,
    pub killed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Pid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<Tid>,
    pub threads: usize,
    pub size: usize,
}
