use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::base::behavior::{Cycle, Ticking};
use crate::base::msg::{Msg, TranslationReq, TranslationRsp};
use crate::base::port::{BufferedSender, Port, DEFAULT_PORT_CAPACITY};
use crate::gmmu::filter::TranslationFilter;
use crate::sim::config::GmmuConfig;
use crate::vm::{Page, PageTable};

#[derive(Debug, Default, Clone, Copy)]
pub struct GmmuStats {
    pub translations: u64,
    pub fast_hits: u64,
    pub filter_false_positives: u64,
    pub walks_started: u64,
    pub remote_fetches: u64,
    pub remote_fills: u64,
}

#[derive(Debug, Clone)]
struct Transaction {
    req: TranslationReq,
    page: Page,
    cycle_left: u64,
}

/// Graphics MMU: the shared translation authority below the L1 rings.
/// Requests either hit the cuckoo-filter fast path, take a fixed-latency
/// page walk, or escalate to the low module when the page lives on
/// another device.
pub struct GmmuComp {
    name: String,
    device_id: u64,
    top_port: Port,
    bottom_port: Port,
    top_sender: BufferedSender,
    low_module: Port,
    page_table: PageTable,
    latency: u64,
    max_reqs_in_flight: usize,
    walking: Vec<Transaction>,
    remote_mem_reqs: HashMap<u64, Transaction>,
    to_remove_from_walk: Vec<usize>,
    filter: TranslationFilter,
    pub stats: GmmuStats,
}

impl GmmuComp {
    pub fn new(
        name: impl Into<String>,
        config: Arc<GmmuConfig>,
        page_table: Option<PageTable>,
        low_module: Port,
    ) -> Self {
        let name = name.into();
        let top_port = Port::new(format!("{name}.TopPort"), DEFAULT_PORT_CAPACITY);
        let bottom_port = Port::new(format!("{name}.BottomPort"), DEFAULT_PORT_CAPACITY);
        let top_sender = BufferedSender::new(format!("{name}.TopSender"), DEFAULT_PORT_CAPACITY);
        let page_table = page_table.unwrap_or_else(|| PageTable::new(config.log2_page_size));
        let filter = TranslationFilter::new(
            format!("{name}.Filter"),
            config.cuckoo_filter_capacity,
        );
        Self {
            name,
            device_id: config.device_id,
            top_port,
            bottom_port,
            top_sender,
            low_module,
            page_table,
            latency: config.page_walk_latency,
            max_reqs_in_flight: config.max_reqs_in_flight,
            walking: Vec::new(),
            remote_mem_reqs: HashMap::new(),
            to_remove_from_walk: Vec::new(),
            filter,
            stats: GmmuStats::default(),
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

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }

    pub fn filter(&self) -> &TranslationFilter {
        &self.filter
    }

    pub fn walking_len(&self) -> usize {
        self.walking.len()
    }

    pub fn remote_pending(&self) -> usize {
        self.remote_mem_reqs.len()
    }

    /// One translation request from above. Stalls while the walking list
    /// is at its in-flight budget. A filter hit confirmed by the page
    /// table answers immediately; everything else starts a walk.
    fn parse_from_top(&mut self, now: Cycle) -> bool {
        if self.walking.len() >= self.max_reqs_in_flight {
            return false;
        }
        let Some(msg) = self.top_port.retrieve(now) else {
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

        self.stats.translations += 1;
        if self.filter.lookup(req.vaddr, req.pid) {
            match self.page_table.find(req.pid, req.vaddr) {
                Some(page) => {
                    if page.device_id == self.device_id && self.top_sender.can_send(1) {
                        self.top_sender.send(TranslationRsp::new(
                            page,
                            req.meta.id,
                            req.reply_to,
                            now,
                        ));
                        self.stats.fast_hits += 1;
                        return true;
                    }
                }
                None => self.stats.filter_false_positives += 1,
            }
        }
        self.start_walking(req);
        true
    }

    fn start_walking(&mut self, req: TranslationReq) {
        self.walking.push(Transaction {
            req,
            page: Page::default(),
            cycle_left: self.latency,
        });
        self.stats.walks_started += 1;
    }

    /// Advance every in-flight walk by one cycle; completed walks resolve
    /// locally or escalate to the low module, then the list is compacted.
    fn walk_page_table(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        for i in 0..self.walking.len() {
            if self.walking[i].cycle_left > 0 {
                self.walking[i].cycle_left -= 1;
                made_progress = true;
                continue;
            }
            let req = &self.walking[i].req;
            let page = self
                .page_table
                .find(req.pid, req.vaddr)
                .unwrap_or_default();
            if page.device_id == self.device_id {
                made_progress |= self.finalize_page_walk(now, i);
            } else {
                made_progress |= self.process_remote_mem_req(now, i);
            }
        }

        if !self.to_remove_from_walk.is_empty() {
            let mut kept = Vec::with_capacity(self.walking.len());
            for (i, txn) in self.walking.drain(..).enumerate() {
                if !self.to_remove_from_walk.contains(&i) {
                    kept.push(txn);
                }
            }
            self.walking = kept;
            self.to_remove_from_walk.clear();
        }

        made_progress
    }

    fn finalize_page_walk(&mut self, now: Cycle, walking_index: usize) -> bool {
        let req = &self.walking[walking_index].req;
        let page = self
            .page_table
            .find(req.pid, req.vaddr)
            .unwrap_or_default();
        self.walking[walking_index].page = page;
        self.do_page_walk_hit(now, walking_index)
    }

    /// The transaction leaves the walking list only once its response is
    /// accepted by the top sender; otherwise it retries next tick.
    fn do_page_walk_hit(&mut self, now: Cycle, walking_index: usize) -> bool {
        if !self.top_sender.can_send(1) {
            return false;
        }
        let walking = &self.walking[walking_index];
        let rsp = TranslationRsp::new(
            walking.page,
            walking.req.meta.id,
            walking.req.reply_to.clone(),
            now,
        );
        self.top_sender.send(rsp);
        self.to_remove_from_walk.push(walking_index);
        true
    }

    /// The page lives on another device: hand the request to the low
    /// module and park the transaction until its response returns.
    fn process_remote_mem_req(&mut self, now: Cycle, walking_index: usize) -> bool {
        let walking = &self.walking[walking_index].req;
        let req = TranslationReq::new(
            walking.pid,
            walking.vaddr,
            walking.device_id,
            self.bottom_port.clone(),
            now,
        );
        if self.low_module.deliver(Msg::TranslationReq(req), now).is_err() {
            return false;
        }
        let txn = self.walking[walking_index].clone();
        debug!(
            "{}: remote fetch for pid {} vaddr {:#x}",
            self.name, txn.req.pid, txn.req.vaddr
        );
        self.remote_mem_reqs.insert(txn.req.vaddr, txn);
        self.to_remove_from_walk.push(walking_index);
        self.stats.remote_fetches += 1;
        true
    }

    /// One resolved translation from the low module, gated on upstream
    /// response capacity. Installs the page, records it in the filter,
    /// and answers the original requester.
    fn fetch_from_bottom(&mut self, now: Cycle) -> bool {
        if !self.top_sender.can_send(1) {
            return false;
        }
        let Some(msg) = self.bottom_port.retrieve(now) else {
            return false;
        };
        match msg {
            Msg::TranslationRsp(rsp) => self.handle_translation_rsp(now, rsp),
            other => panic!(
                "{}: cannot handle message of type {} on the bottom port",
                self.name,
                other.kind()
            ),
        }
    }

    fn handle_translation_rsp(&mut self, now: Cycle, rsp: TranslationRsp) -> bool {
        let Some(txn) = self.remote_mem_reqs.remove(&rsp.page.vaddr) else {
            // A duplicate escalation for the same vaddr overwrote the
            // transaction; its response already went out.
            warn!(
                "{}: translation response for unknown vaddr {:#x}, dropping",
                self.name, rsp.page.vaddr
            );
            return true;
        };

        self.page_table.update(rsp.page);
        self.filter.insert_or_reset(rsp.page.vaddr, rsp.page.pid);

        // Correlate on the stashed client request, not the low module's
        // own response id.
        self.top_sender.send(TranslationRsp::new(
            rsp.page,
            txn.req.meta.id,
            txn.req.reply_to,
            now,
        ));
        self.stats.remote_fills += 1;
        true
    }
}

impl Ticking for GmmuComp {
    fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = self.top_sender.tick(now);
        made_progress = self.parse_from_top(now) || made_progress;
        made_progress = self.walk_page_table(now) || made_progress;
        made_progress = self.fetch_from_bottom(now) || made_progress;
        made_progress
    }

    fn reset(&mut self) {
        self.walking.clear();
        self.remote_mem_reqs.clear();
        self.to_remove_from_walk.clear();
        self.filter.reset();
        self.stats = GmmuStats::default();
    }
}
