//! Online presence tracking
//!
//! The endpoint broadcasts presence deltas when participants join or leave a
//! conversation's socket. Because only deltas arrive, the set is cleared on
//! link loss; it repopulates from the broadcasts after reconnection.

use std::collections::HashSet;

use crate::types::UserId;

/// Online participants of one conversation
#[derive(Debug, Default)]
pub struct PresenceSet {
    online: HashSet<UserId>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a presence delta; returns true when the set changed
    pub fn observe(&mut self, user: UserId, is_online: bool) -> bool {
        if is_online {
            self.online.insert(user)
        } else {
            self.online.remove(&user)
        }
    }

    /// Whether a participant is currently online
    pub fn is_online(&self, user: UserId) -> bool {
        self.online.contains(&user)
    }

    /// Online participants, in stable order
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<_> = self.online.iter().copied().collect();
        users.sort();
        users
    }

    /// Forget everything (link loss); returns true when the set changed
    pub fn clear(&mut self) -> bool {
        let changed = !self.online.is_empty();
        self.online.clear();
        changed
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_deltas() {
        let mut presence = PresenceSet::new();
        let user = UserId::generate();

        assert!(presence.observe(user, true));
        assert!(presence.is_online(user));
        assert!(!presence.observe(user, true));

        assert!(presence.observe(user, false));
        assert!(!presence.is_online(user));
    }

    #[test]
    fn test_clear_on_link_loss() {
        let mut presence = PresenceSet::new();
        presence.observe(UserId::generate(), true);
        assert!(presence.clear());
        assert!(!presence.clear());
        assert!(presence.online_users().is_empty());
    }
}
