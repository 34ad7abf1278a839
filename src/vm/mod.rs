mod page_table;

pub use page_table::PageTable;

pub type Pid = u32;

/// A single virtual-to-physical translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub pid: Pid,
    pub vaddr: u64,
    pub paddr: u64,
    pub device_id: u64,
    pub valid: bool,
}
