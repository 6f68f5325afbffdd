use thiserror::Error;

/// Lifecycle of one child slot. Transitions are `Vacant -> Live -> Dead` only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Vacant,
    Live,
    Dead,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot {slot} out of range (fanout {fanout})")]
    OutOfRange { slot: usize, fanout: usize },

    #[error("slot {0} is dead and cannot be reopened")]
    Dead(usize),

    #[error("slot {0} is already live")]
    AlreadyLive(usize),
}

#[derive(Debug)]
struct Slot<C> {
    state: SlotState,
    channel: Option<C>,
    pid: Option<u32>,
}

impl<C> Default for Slot<C> {
    fn default() -> Self {
        Self {
            state: SlotState::Vacant,
            channel: None,
            pid: None,
        }
    }
}

/// Fixed-size child table of one supervisor, indexed by local slot.
///
/// `C` is whatever the owning tier uses as a channel handle. The table never grows
/// and a dead slot is never revived.
#[derive(Debug)]
pub struct SlotTable<C> {
    slots: Vec<Slot<C>>,
}

impl<C> SlotTable<C> {
    pub fn new(fanout: usize) -> Self {
        let mut slots = Vec::with_capacity(fanout);
        for _ in 0..fanout {
            slots.push(Slot::default());
        }
        Self { slots }
    }

    #[inline]
    pub fn fanout(&self) -> usize {
        self.slots.len()
    }

    /// Attach a freshly spawned child.
    pub fn open(&mut self, slot: usize, channel: C, pid: Option<u32>) -> Result<(), SlotError> {
        let fanout = self.fanout();
        let s = self
            .slots
            .get_mut(slot)
            .ok_or(SlotError::OutOfRange { slot, fanout })?;
        match s.state {
            SlotState::Dead => Err(SlotError::Dead(slot)),
            SlotState::Live => Err(SlotError::AlreadyLive(slot)),
            SlotState::Vacant => {
                s.state = SlotState::Live;
                s.channel = Some(channel);
                s.pid = pid;
                Ok(())
            }
        }
    }

    pub fn state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    #[inline]
    pub fn is_live(&self, slot: usize) -> bool {
        self.state(slot) == Some(SlotState::Live)
    }

    pub fn pid(&self, slot: usize) -> Option<u32> {
        self.slots.get(slot).and_then(|s| s.pid)
    }

    pub fn channel_mut(&mut self, slot: usize) -> Option<&mut C> {
        self.slots.get_mut(slot).and_then(|s| s.channel.as_mut())
    }

    /// Close a slot for good and hand back its channel.
    ///
    /// Idempotent: a second call (or a call on a vacant slot) returns `None` and
    /// leaves the slot dead. The recorded pid is kept for reporting.
    pub fn mark_dead(&mut self, slot: usize) -> Option<C> {
        let s = self.slots.get_mut(slot)?;
        s.state = SlotState::Dead;
        s.channel.take()
    }

    /// Live slots with their channels, in slot order.
    pub fn live(&self) -> impl Iterator<Item = (usize, &C)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.channel.as_ref().map(|c| (i, c)))
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state == SlotState::Live).count()
    }

    /// Close every slot, dropping the channels.
    pub fn close_all(&mut self) {
        for slot in 0..self.fanout() {
            drop(self.mark_dead(slot));
        }
    }
}
