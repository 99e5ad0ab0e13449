/*!
 * Address Space Traits
 * Narrow contract consumed by the process and thread layers
 */

use super::types::{SpaceId, VmResult};
use crate::core::types::Address;

/// User address space service
pub trait AddressSpaces: Send + Sync {
    /// Create a fresh space holding the one-page boot image
    fn create(&self) -> VmResult<SpaceId>;

    /// Duplicate the first `size` bytes of `space` into a new space (fork)
    fn copy(&self, space: SpaceId, size: usize) -> VmResult<SpaceId>;

    /// Grow or shrink `space` from `old_size` to `new_size`, returning the new size
    ///
    /// Growth is all-or-nothing: on failure the space is left at `old_size`.
    fn grow(&self, space: SpaceId, old_size: usize, new_size: usize) -> VmResult<usize>;

    /// Make the page containing `addr` inaccessible to user code
    fn install_guard_page(&self, space: SpaceId, addr: Address) -> VmResult<()>;

    /// Copy words to user memory starting at `addr`
    fn copy_out(&self, space: SpaceId, addr: Address, words: &[usize]) -> VmResult<()>;

    /// Read one word of user memory
    fn read_word(&self, space: SpaceId, addr: Address) -> VmResult<usize>;

    /// Load `space` as the active translation
    fn switch_to(&self, space: SpaceId);

    /// Release every page of `space`
    fn free(&self, space: SpaceId);
}
