//! Request generations for superseding async work.
//!
//! Every request (mood recommendation, artwork lookup, daily fact) takes a
//! ticket before it is sent.  Issuing a new ticket invalidates all earlier
//! ones, so a slow response that lands after a newer request was made is
//! dropped instead of overwriting the newer state.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket(u64);

impl Ticket {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct Generation {
    latest: AtomicU64,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::Relaxed) == ticket.0
    }

    /// Invalidate any outstanding ticket without issuing a new one.
    pub fn cancel(&self) {
        self.latest.fetch_add(1, Ordering::Relaxed);
    }
}
