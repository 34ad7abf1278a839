use crate::vm::{Page, Pid};

/// Fixed-capacity ring of prefetched pages. The probe protocol only ever
/// reads it; population is up to an external prefetcher.
#[derive(Debug)]
pub struct PrefetchBuffer {
    entries: Vec<Page>,
    head: usize,
    capacity: usize,
}

impl PrefetchBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            head: 0,
            capacity: capacity.max(1),
        }
    }

    /// Insert a page, overwriting the oldest slot once full.
    pub fn fill(&mut self, page: Page) {
        if self.entries.len() < self.capacity {
            self.entries.push(page);
        } else {
            self.entries[self.head] = page;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Linear scan for a valid (pid, vaddr) match.
    pub fn find(&self, pid: Pid, vaddr: u64) -> Option<Page> {
        self.entries
            .iter()
            .find(|page| page.pid == pid && page.vaddr == vaddr && page.valid)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
