//! Identifier Pools
//!
//! Hands out small integer identifiers and takes them back for reuse,
//! so long-running servers do not grow their ID space without bound.
//! Allocation and release are O(1) amortized via a free list.

/// Free-list identifier allocator.
#[derive(Debug, Clone)]
pub struct IdPool {
    first: u32,
    /// Exclusive upper bound.
    limit: u32,
    next: u32,
    free: Vec<u32>,
    /// Indexed by `id - first`.
    allocated: Vec<bool>,
}

impl IdPool {
    /// Pool starting at `first` with no practical upper bound.
    pub fn new(first: u32) -> Self {
        Self::bounded(first, u32::MAX - first)
    }

    /// Pool of exactly `capacity` identifiers starting at `first`.
    pub fn bounded(first: u32, capacity: u32) -> Self {
        Self {
            first,
            limit: first.saturating_add(capacity),
            next: first,
            free: Vec::new(),
            allocated: Vec::new(),
        }
    }

    /// Take an identifier, preferring recently released ones.
    pub fn allocate(&mut self) -> Option<u32> {
        let id = match self.free.pop() {
            Some(id) => id,
            None if self.next < self.limit => {
                let id = self.next;
                self.next += 1;
                self.allocated.push(false);
                id
            }
            None => return None,
        };
        self.allocated[(id - self.first) as usize] = true;
        Some(id)
    }

    /// Return an identifier. Unknown or already-free ids are ignored.
    pub fn release(&mut self, id: u32) -> bool {
        if id < self.first {
            return false;
        }
        match self.allocated.get_mut((id - self.first) as usize) {
            Some(slot) if *slot => {
                *slot = false;
                self.free.push(id);
                true
            }
            _ => false,
        }
    }

    /// Whether `id` is currently handed out.
    pub fn is_allocated(&self, id: u32) -> bool {
        id >= self.first
            && self
                .allocated
                .get((id - self.first) as usize)
                .copied()
                .unwrap_or(false)
    }

    /// Number of identifiers currently handed out.
    pub fn in_use(&self) -> usize {
        self.allocated.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_then_reuse() {
        let mut pool = IdPool::new(1);
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), Some(3));
        assert!(pool.release(2));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), Some(4));
        assert_eq!(pool.in_use(), 4);
    }

    #[test]
    fn test_bounded_exhaustion() {
        let mut pool = IdPool::bounded(0, 2);
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), None);
        pool.release(0);
        assert_eq!(pool.allocate(), Some(0));
    }

    #[test]
    fn test_double_release_ignored() {
        let mut pool = IdPool::new(10);
        let id = pool.allocate().unwrap();
        assert!(pool.release(id));
        assert!(!pool.release(id));
        assert!(!pool.release(9));
        assert!(!pool.release(500));
        assert_eq!(pool.in_use(), 0);
        assert!(!pool.is_allocated(id));
    }
}
