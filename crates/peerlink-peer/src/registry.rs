use std::collections::hash_map::Entry;
use std::collections::HashMap;

use peerlink_transport::SharedChannel;

/// Name → channel table enforcing at most one binding per name.
///
/// Owned by the session and lent to each binder. `try_add` checks and
/// inserts in one call, so two binders can never both claim a name.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, SharedChannel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `channel` under `name`.
    ///
    /// Returns false, leaving the existing entry untouched, when the name is
    /// already taken. Callers must reject the channel rather than retry.
    pub fn try_add(&mut self, name: &str, channel: SharedChannel) -> bool {
        match self.channels.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(channel);
                true
            }
        }
    }

    /// Forget `name`. Absent names are a no-op.
    pub fn remove(&mut self, name: &str) {
        self.channels.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SharedChannel> {
        self.channels.get(name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}
