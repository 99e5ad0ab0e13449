/*!
 * Kernel Stack Pool
 * Fixed pool of kernel stacks, one per live descriptor
 */

use parking_lot::Mutex;

/// Ownership token for one kernel stack
///
/// Not `Clone`: a stack returns to the pool exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct KernelStack {
    id: usize,
}

impl KernelStack {
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Kernel stack allocator
pub struct KernelStackPool {
    free: Mutex<Vec<usize>>,
    capacity: usize,
}

impl KernelStackPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new((0..capacity).rev().collect()),
            capacity,
        }
    }

    /// Take a stack, `None` when the pool is exhausted
    pub fn alloc(&self) -> Option<KernelStack> {
        self.free.lock().pop().map(|id| KernelStack { id })
    }

    /// Return a stack to the pool
    pub fn free(&self, stack: KernelStack) {
        self.free.lock().push(stack.id);
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
