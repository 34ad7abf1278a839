use std::sync::Arc;

use crate::base::behavior::Ticking;
use crate::base::msg::{
    Direction, Msg, MsgMeta, ProbeRequest, ProbeResponse, TranslationReq, TranslationRsp,
    PROBE_REQ_BITS, PROBE_RSP_BITS,
};
use crate::base::port::Port;
use crate::sim::config::TlbConfig;
use crate::tlb::{
    Mshr, PrefetchBuffer, RingNoc, TlbArray, CLOCKWISE_TTL, COUNTERCLOCKWISE_TTL,
};
use crate::vm::Page;

fn test_config() -> Arc<TlbConfig> {
    Arc::new(TlbConfig {
        num_mshr_entry: 4,
        num_sets: 1,
        num_ways: 64,
        num_req_per_cycle: 4,
        ..TlbConfig::default()
    })
}

fn page(pid: u32, vaddr: u64, paddr: u64) -> Page {
    Page {
        pid,
        vaddr,
        paddr,
        device_id: 1,
        valid: true,
    }
}

fn test_ring(low_module: Port) -> RingNoc {
    RingNoc::new("TestRing", 0, test_config(), low_module)
}

fn drain_responses(port: &Port) -> Vec<TranslationRsp> {
    let mut rsps = Vec::new();
    while let Some(msg) = port.retrieve(u64::MAX - 1) {
        match msg {
            Msg::TranslationRsp(rsp) => rsps.push(rsp),
            other => panic!("unexpected {} on client port", other.kind()),
        }
    }
    rsps
}

#[test]
fn ring_probe_finds_peer_translation() {
    let low = Port::new("MockLow", 16);
    let mut ring = test_ring(low);
    ring.tlb_mut(1).tlb.install(page(0, 0x1000, 0x2000));

    let client = Port::new("Client", 16);
    let req = TranslationReq::new(0, 0x1000, 1, client.clone(), 0);
    let req_id = req.meta.id;
    ring.tlb(0)
        .tlb
        .top_port()
        .deliver(Msg::TranslationReq(req), 0)
        .unwrap();

    for now in 0..10 {
        ring.tick(now);
    }

    let installed = ring
        .tlb(0)
        .tlb
        .probe(0, 0x1000)
        .expect("translation not installed at the requester");
    assert_eq!(installed.paddr, 0x2000);
    assert!(ring.tlb(0).tlb.mshr().entry(0, 0x1000).is_none());

    let rsps = drain_responses(&client);
    assert_eq!(rsps.len(), 1);
    assert_eq!(rsps[0].page, page(0, 0x1000, 0x2000));
    assert_eq!(rsps[0].rsp_to, req_id);
}

#[test]
fn probe_exhaustion_escalates_to_low_module() {
    let low = Port::new("MockLow", 16);
    let mut ring = test_ring(low.clone());

    let client = Port::new("Client", 16);
    let req = TranslationReq::new(0, 0x1000, 1, client.clone(), 0);
    ring.tlb(0)
        .tlb
        .top_port()
        .deliver(Msg::TranslationReq(req), 0)
        .unwrap();

    for now in 0..20 {
        ring.tick(now);
    }

    let mut found = false;
    while let Some(msg) = low.retrieve(u64::MAX - 1) {
        if let Msg::TranslationReq(req) = msg {
            if req.pid == 0 && req.vaddr == 0x1000 {
                found = true;
            }
        }
    }
    assert!(found, "no translation request reached the low module");

    let entry = ring
        .tlb(0)
        .tlb
        .mshr()
        .entry(0, 0x1000)
        .expect("MSHR entry gone");
    assert!(entry.req_to_bottom.is_some());
}

#[test]
fn deliver_message_accepts_probe_variants() {
    let low = Port::new("MockLow", 16);
    let mut ring = test_ring(low);

    let req = ProbeRequest {
        meta: MsgMeta::new(1, PROBE_REQ_BITS),
        pid: 0,
        vaddr: 0x1000,
        ttl: 4,
        direction: Direction::CounterClockwise,
        source_tlb: 0,
        dst_tlb: 15,
        seid: 0,
    };
    assert!(ring.deliver_message(Msg::ProbeReq(req), 1));

    let rsp = ProbeResponse {
        meta: MsgMeta::new(1, PROBE_RSP_BITS),
        pid: 0,
        vaddr: 0x1000,
        page: None,
        source_tlb: 0,
        seid: 0,
    };
    assert!(ring.deliver_message(Msg::ProbeRsp(rsp), 1));

    let client = Port::new("Client", 16);
    let stray = TranslationReq::new(0, 0x1000, 1, client, 1);
    assert!(!ring.deliver_message(Msg::TranslationReq(stray), 1));
}

#[test]
fn coalesced_requests_share_one_probe_round() {
    let low = Port::new("MockLow", 16);
    let mut ring = test_ring(low);
    ring.tlb_mut(1).tlb.install(page(0, 0x1000, 0x2000));

    let client = Port::new("Client", 16);
    let first = TranslationReq::new(0, 0x1000, 1, client.clone(), 0);
    let second = TranslationReq::new(0, 0x1000, 1, client.clone(), 0);
    let ids = [first.meta.id, second.meta.id];
    let top = ring.tlb(0).tlb.top_port();
    top.deliver(Msg::TranslationReq(first), 0).unwrap();
    top.deliver(Msg::TranslationReq(second), 0).unwrap();

    for now in 0..10 {
        ring.tick(now);
    }

    let stats = ring.tlb(0).tlb.stats;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced, 1);

    let mut rsps = drain_responses(&client);
    rsps.sort_by_key(|rsp| rsp.rsp_to);
    let mut expected = ids;
    expected.sort_unstable();
    assert_eq!(rsps.len(), 2);
    assert_eq!([rsps[0].rsp_to, rsps[1].rsp_to], expected);
    assert!(rsps.iter().all(|rsp| rsp.page.paddr == 0x2000));
}

#[test]
fn initiate_probing_queues_both_directions() {
    let low = Port::new("MockLow", 16);
    let mut ring = test_ring(low);
    ring.initiate_probing(3, 0, 0x2000, 0);

    let l1 = ring.tlb(3);
    assert_eq!(l1.probe_queue_len(), 2);
    let cw = l1.queued_probe(0).unwrap();
    assert_eq!(cw.direction, Direction::Clockwise);
    assert_eq!(cw.ttl, CLOCKWISE_TTL);
    assert_eq!(cw.source_tlb, 3);
    let ccw = l1.queued_probe(1).unwrap();
    assert_eq!(ccw.direction, Direction::CounterClockwise);
    assert_eq!(ccw.ttl, COUNTERCLOCKWISE_TTL);
}

#[test]
fn probe_hits_prefetch_buffer() {
    let low = Port::new("MockLow", 16);
    let mut ring = test_ring(low);
    ring.tlb_mut(1).prefetch.fill(page(0, 0x3000, 0x9000));

    let client = Port::new("Client", 16);
    let req = TranslationReq::new(0, 0x3000, 1, client.clone(), 0);
    ring.tlb(0)
        .tlb
        .top_port()
        .deliver(Msg::TranslationReq(req), 0)
        .unwrap();

    for now in 0..10 {
        ring.tick(now);
    }

    let installed = ring.tlb(0).tlb.probe(0, 0x3000).expect("no fill");
    assert_eq!(installed.paddr, 0x9000);
}

#[test]
fn late_probe_response_without_mshr_entry_is_ignored() {
    let low = Port::new("MockLow", 16);
    let mut ring = test_ring(low);

    let rsp = ProbeResponse {
        meta: MsgMeta::new(1, PROBE_RSP_BITS),
        pid: 0,
        vaddr: 0x4000,
        page: Some(page(0, 0x4000, 0x5000)),
        source_tlb: 2,
        seid: 0,
    };
    assert!(ring.deliver_message(Msg::ProbeRsp(rsp), 1));

    // The page still installs, but nothing was waiting on it.
    assert!(ring.tlb(2).tlb.probe(0, 0x4000).is_some());
    assert_eq!(ring.tlb(2).tlb.stats.probe_fills, 0);
}

#[test]
fn invalid_bottom_response_escalates_once_then_drops() {
    let low = Port::new("MockLow", 16);
    let mut ring = test_ring(low.clone());

    let client = Port::new("Client", 16);
    let req = TranslationReq::new(0, 0x1000, 1, client.clone(), 0);
    ring.tlb(0)
        .tlb
        .top_port()
        .deliver(Msg::TranslationReq(req), 0)
        .unwrap();
    for now in 0..4 {
        ring.tick(now);
    }
    assert!(ring.tlb(0).tlb.mshr().entry(0, 0x1000).is_some());

    let invalid = Page {
        pid: 0,
        vaddr: 0x1000,
        paddr: 0,
        device_id: 0,
        valid: false,
    };
    let bottom = ring.tlb(0).tlb.bottom_port();
    let rsp = TranslationRsp::new(invalid, 0, bottom.clone(), 4);
    bottom.deliver(Msg::TranslationRsp(rsp), 4).unwrap();
    for now in 5..8 {
        ring.tick(now);
    }

    let mut escalations = 0;
    while let Some(msg) = low.retrieve(u64::MAX - 1) {
        if matches!(msg, Msg::TranslationReq(_)) {
            escalations += 1;
        }
    }
    assert_eq!(escalations, 1);

    // Already escalated: a second invalid response is absorbed.
    let rsp = TranslationRsp::new(invalid, 0, bottom.clone(), 8);
    bottom.deliver(Msg::TranslationRsp(rsp), 8).unwrap();
    for now in 9..12 {
        ring.tick(now);
    }
    assert!(low.is_empty());
}

#[test]
fn mshr_full_stalls_new_misses() {
    let config = Arc::new(TlbConfig {
        num_mshr_entry: 1,
        num_sets: 1,
        num_ways: 64,
        num_req_per_cycle: 4,
        ..TlbConfig::default()
    });
    let low = Port::new("MockLow", 16);
    let mut ring = RingNoc::new("TestRing", 0, config, low);

    let client = Port::new("Client", 16);
    let top = ring.tlb(0).tlb.top_port();
    top.deliver(
        Msg::TranslationReq(TranslationReq::new(0, 0x1000, 1, client.clone(), 0)),
        0,
    )
    .unwrap();
    top.deliver(
        Msg::TranslationReq(TranslationReq::new(0, 0x2000, 1, client.clone(), 0)),
        0,
    )
    .unwrap();

    for now in 0..30 {
        ring.tick(now);
    }

    let tlb = &ring.tlb(0).tlb;
    assert_eq!(tlb.mshr().len(), 1);
    assert!(tlb.mshr().entry(0, 0x1000).is_some());
    assert_eq!(tlb.stats.misses, 1);
    // The second request is still parked on the top port.
    assert_eq!(tlb.top_port().len(), 1);
}

#[test]
fn tlb_array_prefers_empty_way() {
    let mut array = TlbArray::new(1, 2);
    array.update(0, 0, page(0, 0x1000, 0x1));
    array.visit(0, 0);
    assert_eq!(array.evict(0), Some(1));
}

#[test]
fn tlb_array_evicts_least_recently_visited() {
    let mut array = TlbArray::new(1, 2);
    array.update(0, 0, page(0, 0x1000, 0x1));
    array.visit(0, 0);
    array.update(0, 1, page(0, 0x2000, 0x2));
    array.visit(0, 1);
    array.visit(0, 0);
    assert_eq!(array.evict(0), Some(1));
}

#[test]
fn tlb_array_lookup_matches_pid_and_vaddr() {
    let mut array = TlbArray::new(2, 2);
    array.update(0, 0, page(1, 0x0000, 0xA));
    assert!(array.lookup(0, 1, 0x0000).is_some());
    assert!(array.lookup(0, 2, 0x0000).is_none());
    assert!(array.lookup(0, 1, 0x1000).is_none());
}

#[test]
fn mshr_single_entry_per_key() {
    let mut mshr = Mshr::new(4);
    assert!(mshr.add(0, 0x1000).is_some());
    assert!(mshr.add(0, 0x1000).is_none());
    assert_eq!(mshr.len(), 1);
}

#[test]
fn mshr_capacity_bounds_entries() {
    let mut mshr = Mshr::new(1);
    assert!(mshr.add(0, 0x1000).is_some());
    assert!(mshr.is_full());
    assert!(mshr.add(0, 0x2000).is_none());
    assert!(mshr.remove(0, 0x1000).is_some());
    assert!(mshr.add(0, 0x2000).is_some());
}

#[test]
fn mshr_remove_returns_queued_requests() {
    let mut mshr = Mshr::new(4);
    let client = Port::new("Client", 16);
    let entry = mshr.add(7, 0x3000).unwrap();
    entry
        .requests
        .push(TranslationReq::new(7, 0x3000, 1, client.clone(), 0));
    entry
        .requests
        .push(TranslationReq::new(7, 0x3000, 1, client, 0));
    let entry = mshr.remove(7, 0x3000).unwrap();
    assert_eq!(entry.requests.len(), 2);
    assert!(mshr.is_empty());
}

#[test]
fn prefetch_buffer_wraps_at_capacity() {
    let mut buffer = PrefetchBuffer::new(2);
    buffer.fill(page(0, 0x1000, 0x1));
    buffer.fill(page(0, 0x2000, 0x2));
    buffer.fill(page(0, 0x3000, 0x3));
    assert!(buffer.find(0, 0x1000).is_none());
    assert!(buffer.find(0, 0x2000).is_some());
    assert!(buffer.find(0, 0x3000).is_some());
}

#[test]
fn prefetch_buffer_ignores_invalid_entries() {
    let mut buffer = PrefetchBuffer::new(4);
    let mut stale = page(0, 0x1000, 0x1);
    stale.valid = false;
    buffer.fill(stale);
    assert!(buffer.find(0, 0x1000).is_none());
}
