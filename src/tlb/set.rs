use crate::vm::{Page, Pid};

/// Set-associative translation array. Each way holds at most one page,
/// identified by (pid, vaddr); per-set LRU order decides eviction.
#[derive(Debug)]
pub struct TlbArray {
    sets: usize,
    ways: usize,
    entries: Vec<Option<Page>>,
    lru: Vec<Vec<usize>>,
}

impl TlbArray {
    fn build_lru(sets: usize, ways: usize) -> Vec<Vec<usize>> {
        let mut lru = Vec::with_capacity(sets);
        for _ in 0..sets {
            lru.push((0..ways).collect());
        }
        lru
    }

    pub fn new(sets: usize, ways: usize) -> Self {
        let sets = sets.max(1);
        let ways = ways.max(1);
        let entries = vec![None; sets * ways];
        let lru = Self::build_lru(sets, ways);
        Self {
            sets,
            ways,
            entries,
            lru,
        }
    }

    pub fn num_sets(&self) -> usize {
        self.sets
    }

    fn idx(&self, set_idx: usize, way: usize) -> usize {
        set_idx * self.ways + way
    }

    fn bounds_ok(&self, set_idx: usize, way: usize) -> bool {
        set_idx < self.sets && way < self.ways
    }

    pub fn get(&self, set_idx: usize, way: usize) -> Option<Page> {
        debug_assert!(self.bounds_ok(set_idx, way));
        self.entries[self.idx(set_idx, way)]
    }

    /// Way and page matching (pid, vaddr) in the set, if present.
    /// Recency is not touched; callers decide whether the access counts
    /// as a visit.
    pub fn lookup(&self, set_idx: usize, pid: Pid, vaddr: u64) -> Option<(usize, Page)> {
        for way in 0..self.ways {
            if let Some(page) = self.get(set_idx, way) {
                if page.pid == pid && page.vaddr == vaddr {
                    return Some((way, page));
                }
            }
        }
        None
    }

    pub fn update(&mut self, set_idx: usize, way: usize, page: Page) {
        debug_assert!(self.bounds_ok(set_idx, way));
        let idx = self.idx(set_idx, way);
        self.entries[idx] = Some(page);
    }

    /// Move the way to the front of the set's recency order.
    pub fn visit(&mut self, set_idx: usize, way: usize) {
        let order = &mut self.lru[set_idx];
        if let Some(pos) = order.iter().position(|&idx| idx == way) {
            order.remove(pos);
        }
        order.insert(0, way);
    }

    /// Pick a victim way: an invalid way if one exists, else the least
    /// recently visited. Returns None only for a zero-way set.
    pub fn evict(&mut self, set_idx: usize) -> Option<usize> {
        for way in 0..self.ways {
            if self.get(set_idx, way).is_none() {
                return Some(way);
            }
        }
        self.lru[set_idx].last().copied()
    }

    pub fn invalidate_all(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
        self.lru = Self::build_lru(self.sets, self.ways);
    }
}
