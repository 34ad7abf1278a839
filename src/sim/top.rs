use std::sync::Arc;

use crate::base::behavior::{Cycle, Ticking};
use crate::gmmu::GmmuComp;
use crate::sim::config::{GmmuConfig, SimConfig, TlbConfig};
use crate::sim::remote::RemoteMmu;
use crate::tlb::RingNoc;

#[derive(Debug, Clone, Default)]
pub struct RingTlbTopConfig {
    pub sim: SimConfig,
    pub tlb: TlbConfig,
    pub gmmu: GmmuConfig,
}

/// Full system: one probing ring per Shader Engine, a shared GMMU, and
/// the remote translation authority below it.
pub struct RingTlbTop {
    pub rings: Vec<RingNoc>,
    pub gmmu: GmmuComp,
    pub remote: RemoteMmu,
    pub timeout: u64,
}

impl RingTlbTop {
    pub fn new(config: &RingTlbTopConfig) -> Self {
        let remote = RemoteMmu::new(
            "RemoteMMU",
            config.gmmu.device_id,
            config.sim.remote_latency,
            config.gmmu.log2_page_size,
        );
        let gmmu = GmmuComp::new(
            "GMMU",
            Arc::new(config.gmmu),
            None,
            remote.top_port(),
        );
        let rings = RingNoc::initialize_rings(
            config.sim.num_ses,
            Arc::new(config.tlb),
            gmmu.top_port(),
        );
        Self {
            rings,
            gmmu,
            remote,
            timeout: config.sim.timeout,
        }
    }
}

impl Ticking for RingTlbTop {
    fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        for ring in &mut self.rings {
            made_progress |= ring.tick(now);
        }
        made_progress |= self.gmmu.tick(now);
        made_progress |= self.remote.tick(now);
        made_progress
    }

    fn reset(&mut self) {
        for ring in &mut self.rings {
            ring.reset();
        }
        self.gmmu.reset();
        self.remote.reset();
    }
}
