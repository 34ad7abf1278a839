use std::sync::Arc;

use log::debug;

use crate::base::behavior::Cycle;
use crate::base::msg::{Msg, TranslationReq, TranslationRsp};
use crate::base::port::{BufferedSender, Port, DEFAULT_PORT_CAPACITY};
use crate::sim::config::TlbConfig;
use crate::tlb::mshr::Mshr;
use crate::tlb::set::TlbArray;
use crate::vm::{Page, Pid};

#[derive(Debug, Default, Clone, Copy)]
pub struct TlbStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub probe_fills: u64,
    pub bottom_fills: u64,
    pub escalations: u64,
}

impl TlbStats {
    pub fn merge(&mut self, other: &TlbStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.coalesced += other.coalesced;
        self.probe_fills += other.probe_fills;
        self.bottom_fills += other.bottom_fills;
        self.escalations += other.escalations;
    }
}

/// First-level TLB. The top port faces clients, the bottom port receives
/// resolved translations from below; escalations go out to `low_module`.
/// Ring probing is orchestrated by the ring that owns this component:
/// fresh misses are parked in an outbox the ring drains every cycle.
pub struct TlbComp {
    name: String,
    config: Arc<TlbConfig>,
    top_port: Port,
    bottom_port: Port,
    top_sender: BufferedSender,
    low_module: Port,
    array: TlbArray,
    mshr: Mshr,
    new_misses: Vec<(Pid, u64)>,
    pub stats: TlbStats,
}

impl TlbComp {
    pub fn new(name: impl Into<String>, config: Arc<TlbConfig>, low_module: Port) -> Self {
        let name = name.into();
        let top_port = Port::new(format!("{name}.TopPort"), DEFAULT_PORT_CAPACITY);
        let bottom_port = Port::new(format!("{name}.BottomPort"), DEFAULT_PORT_CAPACITY);
        let top_sender = BufferedSender::new(format!("{name}.TopSender"), DEFAULT_PORT_CAPACITY);
        let array = TlbArray::new(config.num_sets, config.num_ways);
        let mshr = Mshr::new(config.num_mshr_entry);
        Self {
            name,
            config,
            top_port,
            bottom_port,
            top_sender,
            low_module,
            array,
            mshr,
            new_misses: Vec::new(),
            stats: TlbStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn top_port(&self) -> Port {
        self.top_port.clone()
    }

    pub fn bottom_port(&self) -> Port {
        self.bottom_port.clone()
    }

    pub fn mshr(&self) -> &Mshr {
        &self.mshr
    }

    pub fn mshr_mut(&mut self) -> &mut Mshr {
        &mut self.mshr
    }

    fn vaddr_to_set_id(&self, vaddr: u64) -> usize {
        ((vaddr >> self.config.log2_page_size) as usize) % self.array.num_sets()
    }

    pub fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = self.top_sender.tick(now);
        made_progress = self.parse_bottom(now) || made_progress;
        for _ in 0..self.config.num_req_per_cycle {
            made_progress = self.lookup(now) || made_progress;
        }
        made_progress
    }

    /// Serve one client request from the top port. Stalls (leaves the
    /// message in the port) when the response path or a fresh MSHR entry
    /// is unavailable.
    fn lookup(&mut self, now: Cycle) -> bool {
        let Some(msg) = self.top_port.peek(now) else {
            return false;
        };
        let req = match msg {
            Msg::TranslationReq(req) => req,
            other => panic!(
                "{}: cannot handle message of type {} on the top port",
                self.name,
                other.kind()
            ),
        };

        let set_id = self.vaddr_to_set_id(req.vaddr);
        if let Some((way, page)) = self.array.lookup(set_id, req.pid, req.vaddr) {
            if page.valid {
                if !self.top_sender.can_send(1) {
                    return false;
                }
                self.top_port.retrieve(now);
                self.array.visit(set_id, way);
                self.top_sender
                    .send(TranslationRsp::new(page, req.meta.id, req.reply_to, now));
                self.stats.hits += 1;
                return true;
            }
        }

        if let Some(entry) = self.mshr.entry_mut(req.pid, req.vaddr) {
            self.top_port.retrieve(now);
            entry.requests.push(req);
            self.stats.coalesced += 1;
            return true;
        }

        if self.mshr.is_full() {
            return false;
        }
        self.top_port.retrieve(now);
        let (pid, vaddr) = (req.pid, req.vaddr);
        match self.mshr.add(pid, vaddr) {
            Some(entry) => entry.requests.push(req),
            None => panic!("{}: MSHR rejected an entry it had room for", self.name),
        }
        self.new_misses.push((pid, vaddr));
        self.stats.misses += 1;
        debug!("{}: miss for pid {} vaddr {:#x}", self.name, pid, vaddr);
        true
    }

    /// Resolved translations arriving from the level below.
    fn parse_bottom(&mut self, now: Cycle) -> bool {
        let Some(msg) = self.bottom_port.retrieve(now) else {
            return false;
        };
        match msg {
            Msg::TranslationRsp(rsp) => {
                if rsp.page.valid {
                    self.install(rsp.page);
                    self.respond_mshr(rsp.page, now);
                    self.stats.bottom_fills += 1;
                } else {
                    // Unresolved below: escalate once, drop if a request
                    // is already outstanding.
                    self.notify_miss(rsp.page.pid, rsp.page.vaddr, now);
                }
                true
            }
            other => panic!(
                "{}: cannot handle message of type {} on the bottom port",
                self.name,
                other.kind()
            ),
        }
    }

    /// Set lookup on behalf of a ring probe. Does not touch recency.
    pub fn probe(&self, pid: Pid, vaddr: u64) -> Option<Page> {
        let set_id = self.vaddr_to_set_id(vaddr);
        self.array
            .lookup(set_id, pid, vaddr)
            .map(|(_, page)| page)
            .filter(|page| page.valid)
    }

    /// Install a page into the set, evicting a way if needed.
    pub fn install(&mut self, page: Page) {
        let set_id = self.vaddr_to_set_id(page.vaddr);
        let way = self
            .array
            .evict(set_id)
            .unwrap_or_else(|| panic!("{}: failed to evict a way", self.name));
        self.array.update(set_id, way, page);
        self.array.visit(set_id, way);
    }

    /// Answer every request coalesced under (page.pid, page.vaddr) and
    /// retire the entry. A missing entry is fine: a faster probe response
    /// has already drained it.
    pub fn respond_mshr(&mut self, page: Page, now: Cycle) -> bool {
        let Some(entry) = self.mshr.remove(page.pid, page.vaddr) else {
            return false;
        };
        for req in &entry.requests {
            self.top_sender
                .send(TranslationRsp::new(page, req.meta.id, req.reply_to.clone(), now));
        }
        true
    }

    /// Both probes died without a hit: forward the pending requests to the
    /// low module. Idempotent through `req_to_bottom`.
    pub fn notify_miss(&mut self, pid: Pid, vaddr: u64, now: Cycle) -> bool {
        let Some(entry) = self.mshr.entry_mut(pid, vaddr) else {
            return false;
        };
        if entry.req_to_bottom.is_some() {
            return false;
        }
        let mut escalated = false;
        let pending = entry.requests.clone();
        for req in &pending {
            let fetch = TranslationReq::new(
                req.pid,
                vaddr,
                req.device_id,
                self.bottom_port.clone(),
                now,
            );
            if self
                .low_module
                .deliver(Msg::TranslationReq(fetch.clone()), now)
                .is_ok()
            {
                if entry.req_to_bottom.is_none() {
                    entry.req_to_bottom = Some(fetch);
                }
                escalated = true;
            }
        }
        if escalated {
            self.stats.escalations += 1;
            debug!(
                "{}: probing exhausted, escalated pid {} vaddr {:#x}",
                self.name, pid, vaddr
            );
        }
        escalated
    }

    /// Misses discovered since the last call, for the ring to probe.
    pub fn take_new_misses(&mut self) -> Vec<(Pid, u64)> {
        std::mem::take(&mut self.new_misses)
    }

    pub fn reset(&mut self) {
        self.array.invalidate_all();
        self.new_misses.clear();
        self.stats = TlbStats::default();
    }
}
