use std::fmt;
use std::sync::{Arc, Weak};

use peerlink_transport::{ChannelHandle, ChannelId, SharedChannel};
use serde::Serialize;

use crate::error::{PeerError, Result};
use crate::registry::ChannelRegistry;

/// Identity of a slot, a UI-addressable position holding at most one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SlotId(usize);

impl SlotId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Zero-based index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0 + 1)
    }
}

/// Binding state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Bound,
}

/// What a binder did with a channel-open event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The slot now holds the channel.
    Bound,
    /// The slot wanted the channel but its name is bound elsewhere.
    Duplicate,
    /// The event is not for this slot.
    NotForThisSlot,
}

/// The live association between a slot and a channel.
#[derive(Debug)]
pub struct Binding {
    slot: SlotId,
    channel: SharedChannel,
}

impl Binding {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn name(&self) -> &str {
        self.channel.name()
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    pub fn send(&self, data: &str) -> Result<()> {
        self.channel.send(data).map_err(PeerError::from)
    }
}

/// Weak reference to a binding, held across suspension points.
///
/// Once the slot unbinds, every send through the lease fails with
/// [`PeerError::StaleChannel`].
#[derive(Debug, Clone)]
pub struct ChannelLease {
    id: ChannelId,
    name: String,
    binding: Weak<Binding>,
}

impl ChannelLease {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the binding is still in place.
    pub fn is_live(&self) -> bool {
        self.binding.strong_count() > 0
    }

    pub fn send(&self, data: &str) -> Result<()> {
        let binding = self.binding.upgrade().ok_or(PeerError::StaleChannel)?;
        binding.send(data)
    }
}

/// Per-slot binding state machine.
///
/// | event                     | condition                            | effect                      |
/// |---------------------------|--------------------------------------|-----------------------------|
/// | channel open              | unbound, name equals channel name    | claim via registry          |
/// | channel open              | unbound, name empty                  | claim and adopt the name    |
/// | channel open              | otherwise                            | ignored                     |
/// | channel closed            | it is the bound channel              | unbind, clear name          |
/// | connection lost           | always                               | unbind, clear name          |
#[derive(Debug)]
pub struct ChannelBinder {
    slot: SlotId,
    name: String,
    binding: Option<Arc<Binding>>,
}

impl ChannelBinder {
    pub fn new(slot: SlotId) -> Self {
        Self {
            slot,
            name: String::new(),
            binding: None,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Current slot name. Empty means unnamed.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BindingState {
        if self.binding.is_some() {
            BindingState::Bound
        } else {
            BindingState::Unbound
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn binding(&self) -> Option<&Arc<Binding>> {
        self.binding.as_ref()
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.binding.as_ref().map(|binding| binding.channel_id())
    }

    /// Weak handle for work that outlives the current event.
    pub fn lease(&self) -> Option<ChannelLease> {
        self.binding.as_ref().map(|binding| ChannelLease {
            id: binding.channel_id(),
            name: binding.name().to_string(),
            binding: Arc::downgrade(binding),
        })
    }

    /// Whether this slot would claim a channel with this name by name match.
    pub fn expects(&self, name: &str) -> bool {
        !self.is_bound() && !self.name.is_empty() && self.name == name
    }

    /// Whether this slot would claim any freshly named channel.
    pub fn is_vacant(&self) -> bool {
        !self.is_bound() && self.name.is_empty()
    }

    /// Edit the slot name. Refused while bound.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if self.is_bound() {
            return Err(PeerError::SlotBound(self.slot));
        }
        self.name = name.to_string();
        Ok(())
    }

    /// Offer a newly opened channel to this slot.
    pub fn on_channel_open(
        &mut self,
        channel: SharedChannel,
        registry: &mut ChannelRegistry,
    ) -> BindOutcome {
        let channel_name = channel.name();
        if channel_name.is_empty() || self.is_bound() {
            return BindOutcome::NotForThisSlot;
        }
        let adopt_name = if self.name.is_empty() {
            true
        } else if self.name == channel_name {
            false
        } else {
            return BindOutcome::NotForThisSlot;
        };

        if !registry.try_add(channel_name, channel.clone()) {
            tracing::warn!(
                slot = %self.slot,
                name = channel_name,
                channel = %channel.id(),
                "channel name already bound; ignoring channel"
            );
            return BindOutcome::Duplicate;
        }

        if adopt_name {
            self.name = channel_name.to_string();
        }
        tracing::info!(
            slot = %self.slot,
            name = channel_name,
            channel = %channel.id(),
            "channel bound"
        );
        self.binding = Some(Arc::new(Binding {
            slot: self.slot,
            channel,
        }));
        BindOutcome::Bound
    }

    /// Handle a channel close. Returns true if it was this slot's channel.
    pub fn on_channel_closed(&mut self, id: ChannelId, registry: &mut ChannelRegistry) -> bool {
        if self.channel_id() != Some(id) {
            return false;
        }
        tracing::info!(slot = %self.slot, name = %self.name, channel = %id, "channel closed");
        self.unbind(registry);
        true
    }

    /// Connection-level teardown: unbind whatever is bound.
    pub fn on_connection_lost(&mut self, registry: &mut ChannelRegistry) {
        if self.is_bound() {
            tracing::info!(slot = %self.slot, name = %self.name, "connection lost; unbinding");
        }
        self.unbind(registry);
    }

    fn unbind(&mut self, registry: &mut ChannelRegistry) {
        if self.binding.take().is_some() {
            registry.remove(&self.name);
        }
        self.name.clear();
    }
}

#[cfg(test)]
mod tests {
    use peerlink_transport::{event_queue, MemoryChannel};

    use super::*;

    fn channel(name: &str) -> SharedChannel {
        let (local, _local_rx) = event_queue();
        let (remote, _remote_rx) = event_queue();
        let (near, _far) = MemoryChannel::pair(name, local, remote);
        near
    }

    #[test]
    fn vacant_slot_adopts_channel_name() {
        let mut registry = ChannelRegistry::new();
        let mut binder = ChannelBinder::new(SlotId::new(0));

        let outcome = binder.on_channel_open(channel("room1"), &mut registry);

        assert_eq!(outcome, BindOutcome::Bound);
        assert_eq!(binder.state(), BindingState::Bound);
        assert_eq!(binder.name(), "room1");
        assert!(registry.contains("room1"));
    }

    #[test]
    fn named_slot_binds_matching_channel_only() {
        let mut registry = ChannelRegistry::new();
        let mut binder = ChannelBinder::new(SlotId::new(0));
        binder.set_name("room2").expect("unbound slot should accept a name");

        assert_eq!(
            binder.on_channel_open(channel("room1"), &mut registry),
            BindOutcome::NotForThisSlot
        );
        assert!(registry.is_empty());

        assert_eq!(
            binder.on_channel_open(channel("room2"), &mut registry),
            BindOutcome::Bound
        );
        assert_eq!(binder.name(), "room2");
    }

    #[test]
    fn bound_slot_ignores_further_channels() {
        let mut registry = ChannelRegistry::new();
        let mut binder = ChannelBinder::new(SlotId::new(0));
        let first = channel("room1");
        let first_id = first.id();
        binder.on_channel_open(first, &mut registry);

        assert_eq!(
            binder.on_channel_open(channel("room1"), &mut registry),
            BindOutcome::NotForThisSlot
        );
        assert_eq!(binder.channel_id(), Some(first_id));
    }

    #[test]
    fn racing_vacant_slots_bind_exactly_once() {
        let mut registry = ChannelRegistry::new();
        let mut first = ChannelBinder::new(SlotId::new(0));
        let mut second = ChannelBinder::new(SlotId::new(1));
        let shared = channel("room1");

        assert_eq!(
            first.on_channel_open(shared.clone(), &mut registry),
            BindOutcome::Bound
        );
        assert_eq!(
            second.on_channel_open(shared.clone(), &mut registry),
            BindOutcome::Duplicate
        );

        assert_eq!(registry.len(), 1);
        assert!(!second.is_bound());
        assert_eq!(second.name(), "");
        // registry + first binder + this test
        assert_eq!(Arc::strong_count(&shared), 3);
    }

    #[test]
    fn empty_channel_name_is_never_bound() {
        let mut registry = ChannelRegistry::new();
        let mut binder = ChannelBinder::new(SlotId::new(0));
        assert_eq!(
            binder.on_channel_open(channel(""), &mut registry),
            BindOutcome::NotForThisSlot
        );
        assert!(!binder.is_bound());
    }

    #[test]
    fn close_of_bound_channel_unbinds_and_clears_name() {
        let mut registry = ChannelRegistry::new();
        let mut binder = ChannelBinder::new(SlotId::new(0));
        let ch = channel("room1");
        let id = ch.id();
        binder.on_channel_open(ch, &mut registry);

        assert!(!binder.on_channel_closed(ChannelId::next(), &mut registry));
        assert!(binder.is_bound());

        assert!(binder.on_channel_closed(id, &mut registry));
        assert_eq!(binder.state(), BindingState::Unbound);
        assert_eq!(binder.name(), "");
        assert!(registry.is_empty());
    }

    #[test]
    fn connection_loss_unbinds_regardless_of_channel() {
        let mut registry = ChannelRegistry::new();
        let mut binder = ChannelBinder::new(SlotId::new(0));
        binder.on_channel_open(channel("room1"), &mut registry);

        binder.on_connection_lost(&mut registry);

        assert!(!binder.is_bound());
        assert_eq!(binder.name(), "");
        assert!(registry.is_empty());
    }

    #[test]
    fn connection_loss_clears_pending_name_on_unbound_slot() {
        let mut registry = ChannelRegistry::new();
        let mut binder = ChannelBinder::new(SlotId::new(0));
        binder.set_name("room1").expect("unbound slot should accept a name");

        binder.on_connection_lost(&mut registry);

        assert!(binder.is_vacant());
    }

    #[test]
    fn set_name_refused_while_bound() {
        let mut registry = ChannelRegistry::new();
        let mut binder = ChannelBinder::new(SlotId::new(0));
        binder.on_channel_open(channel("room1"), &mut registry);

        assert!(matches!(
            binder.set_name("room9"),
            Err(PeerError::SlotBound(_))
        ));
        assert_eq!(binder.name(), "room1");
    }

    #[test]
    fn lease_goes_stale_after_unbind() {
        let mut registry = ChannelRegistry::new();
        let mut binder = ChannelBinder::new(SlotId::new(0));
        binder.on_channel_open(channel("room1"), &mut registry);
        let lease = binder.lease().expect("bound slot should lend a lease");
        assert!(lease.is_live());

        binder.on_connection_lost(&mut registry);

        assert!(!lease.is_live());
        assert!(matches!(lease.send("late"), Err(PeerError::StaleChannel)));
    }

    #[test]
    fn slot_display_is_one_based() {
        assert_eq!(SlotId::new(0).to_string(), "slot 1");
    }
}
