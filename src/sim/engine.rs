use crate::base::behavior::{Cycle, Ticking};

#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    pub cycles: Cycle,
    /// True when the run stopped because a full cycle made no progress.
    pub quiesced: bool,
}

/// Serial discrete-event driver. Everything advances on the same clock
/// edge; the run ends at the first cycle where no component reports
/// progress, or at the timeout.
pub struct SerialEngine {
    now: Cycle,
}

impl SerialEngine {
    pub fn new() -> Self {
        Self { now: 0 }
    }

    pub fn now(&self) -> Cycle {
        self.now
    }

    pub fn run(&mut self, top: &mut dyn Ticking, max_cycles: Cycle) -> RunOutcome {
        self.run_with(max_cycles, |now| top.tick(now))
    }

    pub fn run_with(
        &mut self,
        max_cycles: Cycle,
        mut tick: impl FnMut(Cycle) -> bool,
    ) -> RunOutcome {
        let mut executed = 0;
        while executed < max_cycles {
            let made_progress = tick(self.now);
            self.now += 1;
            executed += 1;
            if !made_progress {
                return RunOutcome {
                    cycles: executed,
                    quiesced: true,
                };
            }
        }
        RunOutcome {
            cycles: executed,
            quiesced: false,
        }
    }
}

impl Default for SerialEngine {
    fn default() -> Self {
        Self::new()
    }
}
