//! Waiting on asynchronous network events
//!
//! [`EventQueue`] is the one blocking primitive of the engine: the provider's
//! delivery task pushes, a test task waits with a timeout. A
//! [`PendingExchange`] pairs a sent request with the queue its responses and
//! timeout marker land in.
//!
//! At most one task waits on a given queue at a time. Several concurrent
//! waiters are not detected; each push releases one of them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use sipevent_sip_core::Request;

use crate::error::{UaError, UaResult};
use crate::transport::{ExchangeId, ResponseEvent, TimeoutEvent};

/// FIFO queue with an async, time-bounded `wait`
#[derive(Debug)]
pub struct EventQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append an event and wake one waiter
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop everything queued
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let count = items.len();
        items.clear();
        count
    }

    /// Pop the next event, waiting up to `timeout_ms` (0 waits forever).
    /// `None` means the wait timed out.
    pub async fn wait(&self, timeout_ms: u64) -> Option<T> {
        let deadline = Deadline::after(timeout_ms);
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            // notify_one stores a permit when nobody waits, so a push between
            // try_pop and here is not lost
            let notified = self.notify.notified();
            match deadline.at() {
                None => notified.await,
                Some(at) => {
                    if tokio::time::timeout_at(at, notified).await.is_err() {
                        return self.try_pop();
                    }
                }
            }
        }
    }
}

/// Absolute deadline for a multi-step operation
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    timeout_ms: u64,
}

impl Deadline {
    /// `timeout_ms == 0` never expires
    pub fn after(timeout_ms: u64) -> Self {
        Self {
            at: (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms)),
            timeout_ms,
        }
    }

    pub fn at(&self) -> Option<Instant> {
        self.at
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Milliseconds left in the form `EventQueue::wait` takes: 0 when
    /// unbounded, at least 1 otherwise. Fails once the deadline has passed.
    pub fn remaining_ms(&self, what: &str) -> UaResult<u64> {
        match self.at {
            None => Ok(0),
            Some(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(UaError::timeout(what, self.timeout_ms))
                } else {
                    Ok((left.as_millis() as u64).max(1))
                }
            }
        }
    }
}

/// What an outstanding request can receive
#[derive(Debug, Clone)]
pub enum ExchangeEvent {
    Response(ResponseEvent),
    Timeout(TimeoutEvent),
}

impl ExchangeEvent {
    /// A final response or a timeout; nothing follows it on the exchange
    pub fn is_final(&self) -> bool {
        match self {
            ExchangeEvent::Response(event) => event.response.status().is_final(),
            ExchangeEvent::Timeout(_) => true,
        }
    }
}

/// One request awaiting its responses
#[derive(Debug)]
pub struct PendingExchange {
    id: ExchangeId,
    request: Request,
    events: EventQueue<ExchangeEvent>,
    finished: AtomicBool,
}

impl PendingExchange {
    pub fn new(id: ExchangeId, request: Request) -> Self {
        Self {
            id,
            request,
            events: EventQueue::new(),
            finished: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn push(&self, event: ExchangeEvent) {
        if event.is_final() {
            self.finished.store(true, Ordering::Release);
        }
        self.events.push(event);
    }

    /// True once a final response or the timeout marker arrived
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub async fn wait(&self, timeout_ms: u64) -> Option<ExchangeEvent> {
        self.events.wait(timeout_ms).await
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}
