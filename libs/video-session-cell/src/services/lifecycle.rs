// libs/video-session-cell/src/services/lifecycle.rs
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Mount-lifetime bookkeeping for one driver instance.
///
/// Every suspension point in a join captures a [`JoinTicket`]; teardown bumps
/// the generation so continuations that resume afterwards see a stale ticket.
#[derive(Debug, Default)]
pub struct Lifecycle {
    generation: AtomicU64,
    join_started: AtomicBool,
    torn_down: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claims the single join slot of this instance.
    /// Returns `None` when a join already started or the instance is torn down.
    pub fn begin_join(self: &Arc<Self>) -> Option<JoinTicket> {
        if self.is_torn_down() {
            return None;
        }
        if self
            .join_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        Some(self.ticket())
    }

    /// Ticket for the current generation, used by event handlers.
    pub fn ticket(self: &Arc<Self>) -> JoinTicket {
        JoinTicket {
            lifecycle: Arc::clone(self),
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    /// Marks the instance torn down. Returns `false` if it already was.
    pub fn tear_down(&self) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Invalidates outstanding tickets without tearing the instance down.
    /// Used when a failure ends the session but `leave` has not run yet.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    pub fn join_started(&self) -> bool {
        self.join_started.load(Ordering::Acquire)
    }
}

/// Captured generation checked after every await.
#[derive(Debug, Clone)]
pub struct JoinTicket {
    lifecycle: Arc<Lifecycle>,
    generation: u64,
}

impl JoinTicket {
    pub fn is_current(&self) -> bool {
        !self.lifecycle.is_torn_down()
            && self.lifecycle.generation.load(Ordering::Acquire) == self.generation
    }
}
