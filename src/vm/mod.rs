/*!
 * Address Space Service
 *
 * Collaborator contract for user address spaces and kernel stacks. The
 * scheduler core never inspects page contents; it only grows spaces for
 * thread stacks, copies them on fork and switches between them.
 */

pub mod kstack;
pub mod paged;
pub mod traits;
pub mod types;

pub use kstack::{KernelStack, KernelStackPool};
pub use paged::PagedMemory;
pub use traits::AddressSpaces;
pub use types::{SpaceId, VmError, VmResult};
