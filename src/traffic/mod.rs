use std::collections::HashMap;

use log::{info, warn};
use serde::Deserialize;

use crate::base::behavior::Cycle;
use crate::base::msg::{Msg, TranslationReq};
use crate::base::port::{Port, DEFAULT_PORT_CAPACITY};
use crate::sim::config::Config;
use crate::tlb::{RingNoc, TLBS_PER_RING};
use crate::vm::Pid;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TrafficConfig {
    pub requests: usize,
    pub base_vaddr: u64,
    pub stride: u64,
    /// Distinct pages cycled through; later requests revisit earlier
    /// pages so ring probes and coalescing get exercised.
    pub unique_pages: u64,
    pub num_pids: u32,
    pub device_id: u64,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            requests: 256,
            base_vaddr: 0x1000,
            stride: 0x1000,
            unique_pages: 16,
            num_pids: 1,
            device_id: 1,
        }
    }
}

/// Synthetic translation workload: issues one request per cycle,
/// round-robin across every TLB of every ring, and collects responses.
pub struct TranslationTraffic {
    config: TrafficConfig,
    reply_port: Port,
    issued: usize,
    completed: usize,
    outstanding: HashMap<u64, Cycle>,
    latency_total: u64,
    latency_max: u64,
}

impl TranslationTraffic {
    pub fn new(config: TrafficConfig) -> Self {
        Self {
            config,
            reply_port: Port::new("Traffic.ReplyPort", DEFAULT_PORT_CAPACITY),
            issued: 0,
            completed: 0,
            outstanding: HashMap::new(),
            latency_total: 0,
            latency_max: 0,
        }
    }

    pub fn done(&self) -> bool {
        self.completed >= self.config.requests
    }

    pub fn issued(&self) -> usize {
        self.issued
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    fn request_vaddr(&self, idx: usize) -> u64 {
        let page = idx as u64 % self.config.unique_pages.max(1);
        self.config.base_vaddr + page * self.config.stride
    }

    pub fn tick(&mut self, now: Cycle, rings: &mut [RingNoc]) -> bool {
        let mut made_progress = false;

        if self.issued < self.config.requests && !rings.is_empty() {
            let idx = self.issued;
            let vaddr = self.request_vaddr(idx);
            let pid = (idx as u32 % self.config.num_pids.max(1)) as Pid;
            let target = idx % (rings.len() * TLBS_PER_RING);
            let (se, tlb_id) = (target / TLBS_PER_RING, target % TLBS_PER_RING);
            let req = TranslationReq::new(
                pid,
                vaddr,
                self.config.device_id,
                self.reply_port.clone(),
                now,
            );
            let top = rings[se].tlb(tlb_id).tlb.top_port();
            let req_id = req.meta.id;
            if top.deliver(Msg::TranslationReq(req), now).is_ok() {
                self.outstanding.insert(req_id, now);
                self.issued += 1;
                made_progress = true;
            }
        }

        while let Some(msg) = self.reply_port.retrieve(now) {
            match msg {
                Msg::TranslationRsp(rsp) => {
                    if let Some(issued_at) = self.outstanding.remove(&rsp.rsp_to) {
                        let latency = now.saturating_sub(issued_at);
                        self.latency_total += latency;
                        self.latency_max = self.latency_max.max(latency);
                        self.completed += 1;
                    } else {
                        warn!(
                            "traffic: response for unknown request id {}, dropping",
                            rsp.rsp_to
                        );
                    }
                    made_progress = true;
                }
                other => panic!(
                    "Traffic: cannot handle message of type {} on the reply port",
                    other.kind()
                ),
            }
        }

        made_progress
    }

    pub fn report(&self, cycles: Cycle) {
        let avg = if self.completed > 0 {
            self.latency_total / self.completed as u64
        } else {
            0
        };
        info!(
            "traffic: {}/{} translations completed in {} cycles (latency avg {} max {})",
            self.completed, self.issued, cycles, avg, self.latency_max
        );
    }
}
