/*!
 * Address Space Types
 */

use crate::core::types::Address;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque handle to one user address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(pub u64);

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "as#{}", self.0)
    }
}

/// Address space result type
pub type VmResult<T> = Result<T, VmError>;

/// Address space errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum VmError {
    #[error("Out of memory: {requested} pages requested")]
    #[diagnostic(
        code(vm::out_of_memory),
        help("The user page budget is exhausted. Free address spaces or raise user_pages.")
    )]
    OutOfMemory { requested: usize },

    #[error("Unknown address space {0}")]
    #[diagnostic(code(vm::unknown_space))]
    UnknownSpace(SpaceId),

    #[error("Bad user address 0x{0:x}")]
    #[diagnostic(
        code(vm::bad_address),
        help("Address is unmapped or lies in a guard page.")
    )]
    BadAddress(Address),
}
