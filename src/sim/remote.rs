use log::debug;

use crate::base::behavior::{Cycle, Ticking};
use crate::base::msg::{Msg, TranslationReq, TranslationRsp};
use crate::base::port::{Port, DEFAULT_PORT_CAPACITY};
use crate::vm::{Page, PageTable};

/// Base of the fabricated physical address space.
const PADDR_BASE: u64 = 0x8000_0000;

/// Stand-in for the component below the GMMU: off-device memory or a
/// peer device's MMU. Answers translation requests after a fixed latency
/// from its own table, minting a device-local mapping on first touch.
pub struct RemoteMmu {
    name: String,
    top_port: Port,
    device_id: u64,
    latency: u64,
    pages: PageTable,
    pending: Vec<(u64, TranslationReq)>,
    pub served: u64,
}

impl RemoteMmu {
    pub fn new(
        name: impl Into<String>,
        device_id: u64,
        latency: u64,
        log2_page_size: u64,
    ) -> Self {
        let name = name.into();
        let top_port = Port::new(format!("{name}.TopPort"), DEFAULT_PORT_CAPACITY);
        Self {
            name,
            top_port,
            device_id,
            latency,
            pages: PageTable::new(log2_page_size),
            pending: Vec::new(),
            served: 0,
        }
    }

    pub fn top_port(&self) -> Port {
        self.top_port.clone()
    }

    /// Pre-seed a mapping, overriding the minted default.
    pub fn map(&mut self, page: Page) {
        self.pages.update(page);
    }

    fn resolve(&mut self, req: &TranslationReq) -> Page {
        if let Some(page) = self.pages.find(req.pid, req.vaddr) {
            return page;
        }
        let base = self.pages.page_base(req.vaddr);
        let page = Page {
            pid: req.pid,
            vaddr: base,
            paddr: PADDR_BASE + base,
            device_id: self.device_id,
            valid: true,
        };
        self.pages.update(page);
        page
    }
}

impl Ticking for RemoteMmu {
    fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;

        for entry in &mut self.pending {
            if entry.0 > 0 {
                entry.0 -= 1;
                made_progress = true;
            }
        }

        while let Some(pos) = self.pending.iter().position(|(left, _)| *left == 0) {
            let (_, req) = self.pending.remove(pos);
            let page = self.resolve(&req);
            let rsp = TranslationRsp::new(page, req.meta.id, req.reply_to.clone(), now);
            if req
                .reply_to
                .deliver(Msg::TranslationRsp(rsp), now)
                .is_err()
            {
                self.pending.push((0, req));
                break;
            }
            debug!(
                "{}: served pid {} vaddr {:#x}",
                self.name, req.pid, req.vaddr
            );
            self.served += 1;
            made_progress = true;
        }

        if let Some(msg) = self.top_port.retrieve(now) {
            match msg {
                Msg::TranslationReq(req) => self.pending.push((self.latency, req)),
                other => panic!(
                    "{}: cannot handle message of type {} on the top port",
                    self.name,
                    other.kind()
                ),
            }
            made_progress = true;
        }

        made_progress
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.served = 0;
    }
}
