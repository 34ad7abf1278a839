/// `Port` models a finite-capacity message buffer owned by a component.
/// Senders push into the destination's port; a message becomes visible to
/// `retrieve` one cycle after delivery.
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::base::behavior::Cycle;
use crate::base::msg::{Msg, TranslationRsp};

pub const DEFAULT_PORT_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    Busy,
}

struct Envelope {
    msg: Msg,
    arrive_at: Cycle,
}

struct PortInner {
    name: String,
    capacity: usize,
    queue: Mutex<VecDeque<Envelope>>,
}

/// Shared handle to a port. Messages carry clones of these so a responder
/// can reach the requester without owning it.
#[derive(Clone)]
pub struct Port(Arc<PortInner>);

impl Port {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Port(Arc::new(PortInner {
            name: name.into(),
            capacity,
            queue: Mutex::new(VecDeque::new()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Non-blocking send. The message becomes retrievable next cycle.
    pub fn deliver(&self, msg: Msg, now: Cycle) -> Result<(), SendError> {
        let mut queue = self.0.queue.lock().expect("port lock poisoned");
        if queue.len() >= self.0.capacity {
            return Err(SendError::Busy);
        }
        queue.push_back(Envelope {
            msg,
            arrive_at: now + 1,
        });
        Ok(())
    }

    /// Next message that has arrived by `now`, removing it from the buffer.
    pub fn retrieve(&self, now: Cycle) -> Option<Msg> {
        let mut queue = self.0.queue.lock().expect("port lock poisoned");
        match queue.front() {
            Some(env) if env.arrive_at <= now => queue.pop_front().map(|env| env.msg),
            _ => None,
        }
    }

    /// Like `retrieve`, but leaves the message in place.
    pub fn peek(&self, now: Cycle) -> Option<Msg> {
        let queue = self.0.queue.lock().expect("port lock poisoned");
        match queue.front() {
            Some(env) if env.arrive_at <= now => Some(env.msg.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.queue.lock().expect("port lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port({})", self.0.name)
    }
}

/// Outbound response queue. Responses accumulate here and drain toward
/// their destination ports once per tick, stopping at the first busy one.
pub struct BufferedSender {
    name: String,
    capacity: usize,
    queue: VecDeque<TranslationRsp>,
}

impl BufferedSender {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            queue: VecDeque::new(),
        }
    }

    pub fn can_send(&self, n: usize) -> bool {
        self.queue.len() + n <= self.capacity
    }

    /// Callers must check `can_send` first; overflowing the sender is a
    /// component-invariant violation.
    pub fn send(&mut self, rsp: TranslationRsp) {
        assert!(
            self.queue.len() < self.capacity,
            "{}: buffered sender overflow",
            self.name
        );
        self.queue.push_back(rsp);
    }

    pub fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        while let Some(rsp) = self.queue.front() {
            let dst = rsp.dst.clone();
            let rsp = rsp.clone();
            if dst.deliver(Msg::TranslationRsp(rsp), now).is_err() {
                break;
            }
            self.queue.pop_front();
            made_progress = true;
        }
        made_progress
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
