use std::collections::hash_map::DefaultHasher;
use std::sync::Mutex;

use cuckoofilter::CuckooFilter;
use log::warn;

use crate::vm::Pid;

/// Little-endian (vaddr ‖ pid) filter key.
pub fn encode_key(vaddr: u64, pid: Pid) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..8].copy_from_slice(&vaddr.to_le_bytes());
    key[8..].copy_from_slice(&pid.to_le_bytes());
    key
}

pub fn decode_key(key: &[u8; 12]) -> (u64, Pid) {
    let mut vaddr = [0u8; 8];
    let mut pid = [0u8; 4];
    vaddr.copy_from_slice(&key[..8]);
    pid.copy_from_slice(&key[8..]);
    (u64::from_le_bytes(vaddr), Pid::from_le_bytes(pid))
}

/// Approximate membership over translation keys. Lookups may report
/// absent keys as present; the page table stays authoritative. All
/// operations serialize on a mutex so the filter can be shared across
/// ticking components.
pub struct TranslationFilter {
    name: String,
    capacity: usize,
    inner: Mutex<CuckooFilter<DefaultHasher>>,
}

impl TranslationFilter {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            inner: Mutex::new(CuckooFilter::with_capacity(capacity)),
        }
    }

    pub fn lookup(&self, vaddr: u64, pid: Pid) -> bool {
        let filter = self.inner.lock().expect("filter lock poisoned");
        filter.contains(&encode_key(vaddr, pid)[..])
    }

    pub fn insert(&self, vaddr: u64, pid: Pid) -> bool {
        let mut filter = self.inner.lock().expect("filter lock poisoned");
        filter.add(&encode_key(vaddr, pid)[..]).is_ok()
    }

    pub fn reset(&self) {
        let mut filter = self.inner.lock().expect("filter lock poisoned");
        *filter = CuckooFilter::with_capacity(self.capacity);
    }

    /// Insert, recovering from a full filter by resetting and retrying
    /// once. Dropped membership is tolerated; the page table is the
    /// source of truth.
    pub fn insert_or_reset(&self, vaddr: u64, pid: Pid) {
        let key = encode_key(vaddr, pid);
        let mut filter = self.inner.lock().expect("filter lock poisoned");
        if filter.add(&key[..]).is_err() {
            warn!(
                "{}: failed to insert vaddr {:#x} pid {}, resetting",
                self.name, vaddr, pid
            );
            *filter = CuckooFilter::with_capacity(self.capacity);
            let _ = filter.add(&key[..]);
        }
    }
}
