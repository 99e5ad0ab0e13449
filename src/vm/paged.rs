/*!
 * Paged Memory
 * In-memory address spaces backed by a shared page budget
 */

use super::traits::AddressSpaces;
use super::types::{SpaceId, VmError, VmResult};
use crate::core::limits::{PGSIZE, WORD_SIZE};
use crate::core::types::Address;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
struct Page {
    user: bool,
    words: HashMap<usize, usize>,
}

#[derive(Debug, Clone, Default)]
struct Space {
    pages: BTreeMap<usize, Page>,
}

#[derive(Debug)]
struct Inner {
    spaces: HashMap<SpaceId, Space>,
    next_id: u64,
    free_pages: usize,
    active: Option<SpaceId>,
}

/// Simulated page allocator and address spaces
///
/// Every space draws pages from one budget so tests can provoke growth
/// failures deterministically.
pub struct PagedMemory {
    inner: Mutex<Inner>,
}

#[inline]
fn page_round_up(bytes: usize) -> usize {
    bytes.div_ceil(PGSIZE)
}

impl PagedMemory {
    pub fn new(total_pages: usize) -> Self {
        info!(total_pages, "Paged memory initialized");
        Self {
            inner: Mutex::new(Inner {
                spaces: HashMap::new(),
                next_id: 1,
                free_pages: total_pages,
                active: None,
            }),
        }
    }

    /// Pages not yet handed to any space
    pub fn free_pages(&self) -> usize {
        self.inner.lock().free_pages
    }

    /// Number of live address spaces
    pub fn space_count(&self) -> usize {
        self.inner.lock().spaces.len()
    }

    /// Space most recently passed to `switch_to`
    pub fn active(&self) -> Option<SpaceId> {
        self.inner.lock().active
    }

    /// Whether the page containing `addr` is mapped and user-accessible
    pub fn is_user_page(&self, space: SpaceId, addr: Address) -> bool {
        let inner = self.inner.lock();
        inner
            .spaces
            .get(&space)
            .and_then(|s| s.pages.get(&(addr / PGSIZE)))
            .map(|p| p.user)
            .unwrap_or(false)
    }
}

impl Inner {
    fn space_mut(&mut self, space: SpaceId) -> VmResult<&mut Space> {
        self.spaces
            .get_mut(&space)
            .ok_or(VmError::UnknownSpace(space))
    }

    fn insert(&mut self, space: Space) -> SpaceId {
        let id = SpaceId(self.next_id);
        self.next_id += 1;
        self.spaces.insert(id, space);
        id
    }
}

impl AddressSpaces for PagedMemory {
    fn create(&self) -> VmResult<SpaceId> {
        let mut inner = self.inner.lock();
        if inner.free_pages == 0 {
            return Err(VmError::OutOfMemory { requested: 1 });
        }
        inner.free_pages -= 1;

        let mut space = Space::default();
        space.pages.insert(
            0,
            Page {
                user: true,
                words: HashMap::new(),
            },
        );
        let id = inner.insert(space);
        debug!(space = %id, "Address space created");
        Ok(id)
    }

    fn copy(&self, space: SpaceId, size: usize) -> VmResult<SpaceId> {
        let mut inner = self.inner.lock();
        let limit = page_round_up(size);
        let pages: BTreeMap<usize, Page> = inner
            .space_mut(space)?
            .pages
            .range(..limit)
            .map(|(n, p)| (*n, p.clone()))
            .collect();

        if pages.len() > inner.free_pages {
            return Err(VmError::OutOfMemory {
                requested: pages.len(),
            });
        }
        inner.free_pages -= pages.len();

        let id = inner.insert(Space { pages });
        debug!(from = %space, to = %id, "Address space copied");
        Ok(id)
    }

    fn grow(&self, space: SpaceId, old_size: usize, new_size: usize) -> VmResult<usize> {
        let mut inner = self.inner.lock();
        let first = page_round_up(old_size);
        let last = page_round_up(new_size);

        if new_size >= old_size {
            let wanted = last.saturating_sub(first);
            if wanted > inner.free_pages {
                return Err(VmError::OutOfMemory { requested: wanted });
            }
            let target = inner.space_mut(space)?;
            for n in first..last {
                target.pages.insert(
                    n,
                    Page {
                        user: true,
                        words: HashMap::new(),
                    },
                );
            }
            inner.free_pages -= wanted;
        } else {
            let target = inner.space_mut(space)?;
            let released = target.pages.split_off(&last).len();
            inner.free_pages += released;
        }

        Ok(new_size)
    }

    fn install_guard_page(&self, space: SpaceId, addr: Address) -> VmResult<()> {
        let mut inner = self.inner.lock();
        let page = inner
            .space_mut(space)?
            .pages
            .get_mut(&(addr / PGSIZE))
            .ok_or(VmError::BadAddress(addr))?;
        page.user = false;
        Ok(())
    }

    fn copy_out(&self, space: SpaceId, addr: Address, words: &[usize]) -> VmResult<()> {
        let mut inner = self.inner.lock();
        let target = inner.space_mut(space)?;

        // Validate the whole range before writing anything
        for i in 0..words.len() {
            let a = addr + i * WORD_SIZE;
            match target.pages.get(&(a / PGSIZE)) {
                Some(p) if p.user => {}
                _ => return Err(VmError::BadAddress(a)),
            }
        }

        for (i, word) in words.iter().enumerate() {
            let a = addr + i * WORD_SIZE;
            if let Some(page) = target.pages.get_mut(&(a / PGSIZE)) {
                page.words.insert(a % PGSIZE, *word);
            }
        }
        Ok(())
    }

    fn read_word(&self, space: SpaceId, addr: Address) -> VmResult<usize> {
        let mut inner = self.inner.lock();
        let page = inner
            .space_mut(space)?
            .pages
            .get(&(addr / PGSIZE))
            .filter(|p| p.user)
            .ok_or(VmError::BadAddress(addr))?;
        Ok(page.words.get(&(addr % PGSIZE)).copied().unwrap_or(0))
    }

    fn switch_to(&self, space: SpaceId) {
        self.inner.lock().active = Some(space);
    }

    fn free(&self, space: SpaceId) {
        let mut inner = self.inner.lock();
        if let Some(s) = inner.spaces.remove(&space) {
            inner.free_pages += s.pages.len();
            if inner.active == Some(space) {
                inner.active = None;
            }
            debug!(space = %space, pages = s.pages.len(), "Address space freed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_uses_one_page() {
        let vm = PagedMemory::new(4);
        let space = vm.create().unwrap();
        assert_eq!(vm.free_pages(), 3);
        assert!(vm.is_user_page(space, 0));
    }

    #[test]
    fn test_grow_is_all_or_nothing() {
        let vm = PagedMemory::new(3);
        let space = vm.create().unwrap();

        let err = vm.grow(space, PGSIZE, PGSIZE + 3 * PGSIZE).unwrap_err();
        assert_eq!(err, VmError::OutOfMemory { requested: 3 });
        assert_eq!(vm.free_pages(), 2);

        assert_eq!(vm.grow(space, PGSIZE, 3 * PGSIZE).unwrap(), 3 * PGSIZE);
        assert_eq!(vm.free_pages(), 0);
    }

    #[test]
    fn test_shrink_returns_pages() {
        let vm = PagedMemory::new(8);
        let space = vm.create().unwrap();
        vm.grow(space, PGSIZE, 4 * PGSIZE).unwrap();
        assert_eq!(vm.free_pages(), 4);

        vm.grow(space, 4 * PGSIZE, 2 * PGSIZE).unwrap();
        assert_eq!(vm.free_pages(), 6);
        assert!(!vm.is_user_page(space, 3 * PGSIZE));
    }

    #[test]
    fn test_guard_page_rejects_access() {
        let vm = PagedMemory::new(8);
        let space = vm.create().unwrap();
        vm.grow(space, PGSIZE, 3 * PGSIZE).unwrap();
        vm.install_guard_page(space, PGSIZE).unwrap();

        assert_eq!(
            vm.copy_out(space, PGSIZE + 8, &[1]),
            Err(VmError::BadAddress(PGSIZE + 8))
        );
        assert!(vm.copy_out(space, 2 * PGSIZE + 8, &[7, 9]).is_ok());
        assert_eq!(vm.read_word(space, 2 * PGSIZE + 12).unwrap(), 9);
    }

    #[test]
    fn test_copy_duplicates_contents() {
        let vm = PagedMemory::new(8);
        let space = vm.create().unwrap();
        vm.copy_out(space, 16, &[42]).unwrap();

        let child = vm.copy(space, PGSIZE).unwrap();
        vm.copy_out(space, 16, &[1]).unwrap();
        assert_eq!(vm.read_word(child, 16).unwrap(), 42);

        vm.free(child);
        assert_eq!(vm.space_count(), 1);
        assert_eq!(vm.free_pages(), 7);
    }
}
