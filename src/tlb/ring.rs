use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::base::behavior::{Cycle, Ticking};
use crate::base::msg::{
    Direction, Msg, MsgMeta, ProbeRequest, ProbeResponse, PROBE_REQ_BITS, PROBE_RSP_BITS,
};
use crate::base::port::Port;
use crate::sim::config::TlbConfig;
use crate::tlb::comp::TlbComp;
use crate::tlb::prefetch::PrefetchBuffer;
use crate::vm::Pid;

/// Ring population is fixed per Shader Engine.
pub const TLBS_PER_RING: usize = 16;
pub const CLOCKWISE_TTL: u32 = 15;
pub const COUNTERCLOCKWISE_TTL: u32 = 4;

const PREFETCH_BUFFER_ENTRIES: usize = 24;
const PROBE_QUEUE_ENTRIES: usize = 16;

/// One-cycle switched connection between ring stops.
struct RingConn {
    in_flight: VecDeque<(Cycle, Msg)>,
}

impl RingConn {
    fn new() -> Self {
        Self {
            in_flight: VecDeque::new(),
        }
    }

    fn send(&mut self, msg: Msg, now: Cycle) {
        self.in_flight.push_back((now + 1, msg));
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    fn drain_ready(&mut self, now: Cycle) -> Vec<Msg> {
        let mut ready = Vec::new();
        let mut rest = VecDeque::new();
        while let Some((deliver_at, msg)) = self.in_flight.pop_front() {
            if deliver_at <= now {
                ready.push(msg);
            } else {
                rest.push_back((deliver_at, msg));
            }
        }
        self.in_flight = rest;
        ready
    }
}

/// A TLB component plus its ring-side state: a probe queue drained one
/// message per cycle, and the read-only prefetch buffer probes may scan.
pub struct L1Tlb {
    pub tlb: TlbComp,
    pub id: usize,
    pub prefetch: PrefetchBuffer,
    probe_queue: VecDeque<ProbeRequest>,
}

impl L1Tlb {
    pub fn probe_queue_len(&self) -> usize {
        self.probe_queue.len()
    }

    pub fn queued_probe(&self, idx: usize) -> Option<&ProbeRequest> {
        self.probe_queue.get(idx)
    }
}

/// Bidirectional ring of 16 L1-TLBs within one Shader Engine. The ring
/// owns its TLBs; they refer to each other only by id.
pub struct RingNoc {
    name: String,
    seid: usize,
    tlbs: Vec<L1Tlb>,
    conn: RingConn,
}

impl RingNoc {
    pub fn new(name: impl Into<String>, seid: usize, config: Arc<TlbConfig>, low_module: Port) -> Self {
        let name = name.into();
        let tlbs = (0..TLBS_PER_RING)
            .map(|id| L1Tlb {
                tlb: TlbComp::new(
                    format!("{name}.L1TLB{id}"),
                    Arc::clone(&config),
                    low_module.clone(),
                ),
                id,
                prefetch: PrefetchBuffer::new(PREFETCH_BUFFER_ENTRIES),
                probe_queue: VecDeque::with_capacity(PROBE_QUEUE_ENTRIES),
            })
            .collect();
        Self {
            name,
            seid,
            tlbs,
            conn: RingConn::new(),
        }
    }

    /// One ring per Shader Engine.
    pub fn initialize_rings(
        num_ses: usize,
        config: Arc<TlbConfig>,
        low_module: Port,
    ) -> Vec<RingNoc> {
        (0..num_ses)
            .map(|seid| {
                RingNoc::new(
                    format!("RingNoC_SE{seid}"),
                    seid,
                    Arc::clone(&config),
                    low_module.clone(),
                )
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seid(&self) -> usize {
        self.seid
    }

    pub fn tlb(&self, id: usize) -> &L1Tlb {
        &self.tlbs[id]
    }

    pub fn tlb_mut(&mut self, id: usize) -> &mut L1Tlb {
        &mut self.tlbs[id]
    }

    pub fn next_tlb_id(id: usize, direction: Direction) -> usize {
        match direction {
            Direction::Clockwise => (id + 1) % TLBS_PER_RING,
            Direction::CounterClockwise => (id + TLBS_PER_RING - 1) % TLBS_PER_RING,
        }
    }

    /// Queue the clockwise and counterclockwise probes for a fresh miss.
    pub fn initiate_probing(&mut self, tlb_id: usize, pid: Pid, vaddr: u64, now: Cycle) {
        let seid = self.seid;
        let tlb = &mut self.tlbs[tlb_id];
        tlb.probe_queue.push_back(ProbeRequest {
            meta: MsgMeta::new(now, PROBE_REQ_BITS),
            pid,
            vaddr,
            ttl: CLOCKWISE_TTL,
            direction: Direction::Clockwise,
            source_tlb: tlb_id,
            dst_tlb: tlb_id,
            seid,
        });
        tlb.probe_queue.push_back(ProbeRequest {
            meta: MsgMeta::new(now, PROBE_REQ_BITS),
            pid,
            vaddr,
            ttl: COUNTERCLOCKWISE_TTL,
            direction: Direction::CounterClockwise,
            source_tlb: tlb_id,
            dst_tlb: tlb_id,
            seid,
        });
    }

    /// Forward a probe one hop, or let it die and tell the originator.
    fn send_probe_request(&mut self, at: usize, mut req: ProbeRequest, now: Cycle) {
        if req.ttl == 0 {
            let source = req.source_tlb;
            self.tlbs[source].tlb.notify_miss(req.pid, req.vaddr, now);
            return;
        }
        req.ttl -= 1;
        req.dst_tlb = Self::next_tlb_id(at, req.direction);
        req.meta.send_time = now;
        req.meta.payload_bits = PROBE_REQ_BITS;
        self.conn.send(Msg::ProbeReq(req), now);
    }

    /// Probe arriving at an intermediate stop: answer from the set or the
    /// prefetch buffer, else queue it for forwarding.
    fn receive_probe_request(&mut self, at: usize, req: ProbeRequest, now: Cycle) {
        let stop = &mut self.tlbs[at];
        let hit = stop
            .tlb
            .probe(req.pid, req.vaddr)
            .or_else(|| stop.prefetch.find(req.pid, req.vaddr));
        if let Some(page) = hit {
            debug!(
                "{}: probe hit at L1TLB{} for pid {} vaddr {:#x}",
                self.name, at, req.pid, req.vaddr
            );
            let rsp = ProbeResponse {
                meta: MsgMeta::new(now, PROBE_RSP_BITS),
                pid: req.pid,
                vaddr: req.vaddr,
                page: Some(page),
                source_tlb: req.source_tlb,
                seid: req.seid,
            };
            self.conn.send(Msg::ProbeRsp(rsp), now);
            return;
        }
        stop.probe_queue.push_back(req);
    }

    /// Probe response arriving back at the originator. The first response
    /// installs the page and drains the MSHR; later ones find the entry
    /// gone and do nothing.
    fn receive_probe_response(&mut self, at: usize, rsp: ProbeResponse, now: Cycle) {
        match rsp.page.filter(|page| page.valid) {
            Some(page) => {
                let tlb = &mut self.tlbs[at].tlb;
                tlb.install(page);
                if tlb.respond_mshr(page, now) {
                    tlb.stats.probe_fills += 1;
                }
            }
            None => {
                self.tlbs[at].tlb.notify_miss(rsp.pid, rsp.vaddr, now);
            }
        }
    }

    /// Route one connection message. Probe requests go to the next hop,
    /// responses back to their originator; anything else is refused.
    pub fn deliver_message(&mut self, msg: Msg, now: Cycle) -> bool {
        match msg {
            Msg::ProbeReq(req) => {
                let dst = req.dst_tlb;
                self.receive_probe_request(dst, req, now);
                true
            }
            Msg::ProbeRsp(rsp) => {
                let dst = rsp.source_tlb;
                self.receive_probe_response(dst, rsp, now);
                true
            }
            _ => false,
        }
    }

    /// Drain at most one probe per TLB, then advance the connection.
    pub fn cycle(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        for i in 0..self.tlbs.len() {
            if let Some(req) = self.tlbs[i].probe_queue.pop_front() {
                self.send_probe_request(i, req, now);
                made_progress = true;
            }
        }
        made_progress |= !self.conn.is_idle();
        for msg in self.conn.drain_ready(now) {
            self.deliver_message(msg, now);
        }
        made_progress
    }
}

impl Ticking for RingNoc {
    /// Full per-cycle update: tick every TLB component, start probing for
    /// the misses they discovered, then run the ring itself.
    fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        for i in 0..self.tlbs.len() {
            made_progress |= self.tlbs[i].tlb.tick(now);
            for (pid, vaddr) in self.tlbs[i].tlb.take_new_misses() {
                self.initiate_probing(i, pid, vaddr, now);
                made_progress = true;
            }
        }
        self.cycle(now) || made_progress
    }

    fn reset(&mut self) {
        for tlb in &mut self.tlbs {
            tlb.tlb.reset();
            tlb.probe_queue.clear();
        }
        self.conn.in_flight.clear();
    }
}
