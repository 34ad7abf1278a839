use std::collections::HashMap;

use crate::vm::{Page, Pid};

/// Lookup oracle from (pid, page base) to a translation. Reads and writes
/// are serial within a tick; the GMMU owns the only mutable handle.
pub struct PageTable {
    log2_page_size: u64,
    pages: HashMap<(Pid, u64), Page>,
}

impl PageTable {
    pub fn new(log2_page_size: u64) -> Self {
        Self {
            log2_page_size,
            pages: HashMap::new(),
        }
    }

    pub fn page_base(&self, vaddr: u64) -> u64 {
        vaddr & !((1u64 << self.log2_page_size) - 1)
    }

    pub fn find(&self, pid: Pid, vaddr: u64) -> Option<Page> {
        self.pages.get(&(pid, self.page_base(vaddr))).copied()
    }

    pub fn update(&mut self, page: Page) {
        self.pages.insert((page.pid, self.page_base(page.vaddr)), page);
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
