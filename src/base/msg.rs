use std::sync::atomic::{AtomicU64, Ordering};

use crate::base::behavior::Cycle;
use crate::base::port::Port;
use crate::vm::{Page, Pid};

/// Modeled payload sizes, in bits.
pub const TRANSLATION_REQ_BITS: u32 = 64;
pub const TRANSLATION_RSP_BITS: u32 = 128;
pub const PROBE_REQ_BITS: u32 = 64;
pub const PROBE_RSP_BITS: u32 = 128;

static NEXT_MSG_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide monotonic message id.
pub fn next_msg_id() -> u64 {
    NEXT_MSG_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy)]
pub struct MsgMeta {
    pub id: u64,
    pub send_time: Cycle,
    pub payload_bits: u32,
}

impl MsgMeta {
    pub fn new(now: Cycle, payload_bits: u32) -> Self {
        Self {
            id: next_msg_id(),
            send_time: now,
            payload_bits,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslationReq {
    pub meta: MsgMeta,
    pub pid: Pid,
    pub vaddr: u64,
    pub device_id: u64,
    /// Port the eventual response is delivered to.
    pub reply_to: Port,
}

impl TranslationReq {
    pub fn new(pid: Pid, vaddr: u64, device_id: u64, reply_to: Port, now: Cycle) -> Self {
        Self {
            meta: MsgMeta::new(now, TRANSLATION_REQ_BITS),
            pid,
            vaddr,
            device_id,
            reply_to,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslationRsp {
    pub meta: MsgMeta,
    pub page: Page,
    /// Id of the request this answers.
    pub rsp_to: u64,
    pub dst: Port,
}

impl TranslationRsp {
    pub fn new(page: Page, rsp_to: u64, dst: Port, now: Cycle) -> Self {
        Self {
            meta: MsgMeta::new(now, TRANSLATION_RSP_BITS),
            page,
            rsp_to,
            dst,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub meta: MsgMeta,
    pub pid: Pid,
    pub vaddr: u64,
    pub ttl: u32,
    pub direction: Direction,
    pub source_tlb: usize,
    pub dst_tlb: usize,
    pub seid: usize,
}

#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub meta: MsgMeta,
    pub pid: Pid,
    pub vaddr: u64,
    pub page: Option<Page>,
    pub source_tlb: usize,
    pub seid: usize,
}

/// Every port and connection carries this sum. Dispatch is an exhaustive
/// match; a variant a component cannot handle is a protocol violation.
#[derive(Debug, Clone)]
pub enum Msg {
    TranslationReq(TranslationReq),
    TranslationRsp(TranslationRsp),
    ProbeReq(ProbeRequest),
    ProbeRsp(ProbeResponse),
}

impl Msg {
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::TranslationReq(_) => "TranslationReq",
            Msg::TranslationRsp(_) => "TranslationRsp",
            Msg::ProbeReq(_) => "ProbeRequest",
            Msg::ProbeRsp(_) => "ProbeResponse",
        }
    }
}
