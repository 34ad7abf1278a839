use crate::base::msg::TranslationReq;
use crate::vm::Pid;

/// One outstanding miss. All client requests for the same (pid, vaddr)
/// coalesce here; `req_to_bottom` records the escalation already sent
/// below so a second probe expiry cannot escalate twice.
#[derive(Debug)]
pub struct MshrEntry {
    pub pid: Pid,
    pub vaddr: u64,
    pub requests: Vec<TranslationReq>,
    pub req_to_bottom: Option<TranslationReq>,
}

impl MshrEntry {
    fn new(pid: Pid, vaddr: u64) -> Self {
        Self {
            pid,
            vaddr,
            requests: Vec::new(),
            req_to_bottom: None,
        }
    }
}

/// Miss status holding registers, bounded by capacity. At most one entry
/// per (pid, vaddr).
#[derive(Debug)]
pub struct Mshr {
    capacity: usize,
    entries: Vec<MshrEntry>,
}

impl Mshr {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn entry(&self, pid: Pid, vaddr: u64) -> Option<&MshrEntry> {
        self.entries
            .iter()
            .find(|entry| entry.pid == pid && entry.vaddr == vaddr)
    }

    pub fn entry_mut(&mut self, pid: Pid, vaddr: u64) -> Option<&mut MshrEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.pid == pid && entry.vaddr == vaddr)
    }

    /// Allocate a fresh entry. Returns None when the table is full or an
    /// entry for the key already exists; callers must check.
    pub fn add(&mut self, pid: Pid, vaddr: u64) -> Option<&mut MshrEntry> {
        if self.is_full() || self.entry(pid, vaddr).is_some() {
            return None;
        }
        self.entries.push(MshrEntry::new(pid, vaddr));
        self.entries.last_mut()
    }

    pub fn remove(&mut self, pid: Pid, vaddr: u64) -> Option<MshrEntry> {
        let idx = self
            .entries
            .iter()
            .position(|entry| entry.pid == pid && entry.vaddr == vaddr)?;
        Some(self.entries.swap_remove(idx))
    }
}
