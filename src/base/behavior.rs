pub type Cycle = u64;

/// Cooperative tick behavior. Every component runs to completion within a
/// tick and reports whether it made progress, so the engine can quiesce
/// when a full cycle goes by with nothing to do.
pub trait Ticking {
    fn tick(&mut self, now: Cycle) -> bool;

    fn reset(&mut self) {}
}
