//! Static placement rules.
//!
//! Neither rule looks at liveness: a request placed on a dead slot is dropped by
//! the caller, never re-placed.

/// Load Balancer placement: `client_id mod count`.
///
/// Uses the Euclidean remainder so negative client ids still land in `0..count`.
#[inline]
pub fn route_by_client(client_id: i32, count: usize) -> usize {
    if count <= 1 {
        return 0;
    }
    (client_id as i64).rem_euclid(count as i64) as usize
}

/// Result of offering one request to the slot chosen by a placement rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Written in full to the slot's channel.
    Delivered,
    /// The slot was already dead; nothing was written.
    Dropped,
    /// The write to a live slot failed.
    Failed,
}

/// Reverse Proxy placement: a persistent cursor over worker slots.
///
/// The cursor moves on every request, whatever happened to the delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundRobin {
    cursor: usize,
    fanout: usize,
}

impl RoundRobin {
    pub fn new(fanout: usize) -> Self {
        Self {
            cursor: 0,
            fanout: fanout.max(1),
        }
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Slot for the current request; advances the cursor.
    #[inline]
    pub fn next_slot(&mut self) -> usize {
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % self.fanout;
        slot
    }
}
