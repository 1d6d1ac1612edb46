/// Single-flight operation queue for the master role
///
/// The head of the queue is the operation on the wire. It stays there until its reply
/// arrives or its timeout fires, and only then is it popped and the next one started.
/// The scheduler owns timer ids but never builds or sends frames itself; the master
/// core asks it what to run next and reports back.
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use super::clock::{Clock, TimerId};
use crate::error::SchedulerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Poll the whole block with 0x03.
    Read,
    /// Write one register with 0x06.
    Write { index: u16, value: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub block: String,
    pub kind: OperationKind,
    pub repeat: Option<Duration>,
}

impl Operation {
    pub fn read(block: impl Into<String>, repeat: Option<Duration>) -> Self {
        Self {
            block: block.into(),
            kind: OperationKind::Read,
            repeat,
        }
    }

    pub fn write(block: impl Into<String>, index: u16, value: u16) -> Self {
        Self {
            block: block.into(),
            kind: OperationKind::Write { index, value },
            repeat: None,
        }
    }
}

/// The exchange currently on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub op: Operation,
    pub request: Vec<u8>,
}

/// What a fired timer meant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// The outstanding exchange got no reply in time.
    Timeout(Pending),
    /// A repeating operation is due again.
    Repeat(Operation),
    /// Cancelled or foreign id.
    Stale,
}

pub struct MasterScheduler {
    clock: Arc<dyn Clock>,
    queue: VecDeque<Operation>,
    timeout: Option<TimerId>,
    pending: Option<Pending>,
    repeats: HashMap<TimerId, Operation>,
}

impl MasterScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            queue: VecDeque::new(),
            timeout: None,
            pending: None,
            repeats: HashMap::new(),
        }
    }

    /// Append `op`. Returns it back when the queue was empty and it must run now.
    pub fn enqueue(&mut self, op: Operation) -> Option<Operation> {
        let was_empty = self.queue.is_empty();
        self.queue.push_back(op);
        if was_empty {
            self.queue.front().cloned()
        } else {
            None
        }
    }

    /// Record that `request` went out for the head operation and start its timeout.
    pub fn arm(&mut self, request: Vec<u8>, timeout: Duration) -> Result<TimerId, SchedulerError> {
        if self.timeout.is_some() || self.pending.is_some() {
            return Err(SchedulerError::ExchangeInFlight);
        }
        let op = self
            .queue
            .front()
            .cloned()
            .ok_or(SchedulerError::NothingQueued)?;
        let id = self.clock.schedule(timeout);
        self.timeout = Some(id);
        self.pending = Some(Pending { op, request });
        Ok(id)
    }

    /// Claim the outstanding exchange for a received frame. `None` means nothing was
    /// waiting for one.
    pub fn take_reply(&mut self) -> Option<Pending> {
        if let Some(id) = self.timeout.take() {
            self.clock.cancel(id);
        }
        self.pending.take()
    }

    pub fn on_timer(&mut self, id: TimerId) -> TimerEvent {
        if self.timeout == Some(id) {
            self.timeout = None;
            return match self.pending.take() {
                Some(pending) => TimerEvent::Timeout(pending),
                None => TimerEvent::Stale,
            };
        }
        match self.repeats.remove(&id) {
            Some(op) => TimerEvent::Repeat(op),
            None => TimerEvent::Stale,
        }
    }

    /// Pop the finished head, arm its repeat timer and hand back the next operation to run.
    pub fn dequeue(&mut self) -> Option<Operation> {
        if let Some(done) = self.queue.pop_front() {
            if let Some(repeat) = done.repeat {
                let id = self.clock.schedule(repeat);
                self.repeats.insert(id, done);
            }
        }
        self.queue.front().cloned()
    }

    /// Cancel every timer and forget all work. The scheduler can be reused afterwards.
    pub fn stop(&mut self) {
        if let Some(id) = self.timeout.take() {
            self.clock.cancel(id);
        }
        for (id, _) in self.repeats.drain() {
            self.clock.cancel(id);
        }
        self.pending = None;
        self.queue.clear();
    }

    pub fn in_flight(&self) -> bool {
        self.pending.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn armed_repeats(&self) -> usize {
        self.repeats.len()
    }
}
