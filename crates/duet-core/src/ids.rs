//! Participant, conversation, and message identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a participant id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can take part in a conversation.
    ///
    /// Must be non-empty and free of [`ConversationId::SEPARATOR`] and `/`:
    /// a separator would let two different pairs join to the same
    /// conversation id, and `/` would break store paths.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && !self.0.contains([ConversationId::SEPARATOR, '/'])
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of the conversation between two participants.
///
/// # Invariants
///
/// - Identical regardless of which participant computes it: the two ids are
///   joined in lexicographic order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Separator placed between the two ordered participant ids.
    pub const SEPARATOR: char = '_';

    /// Conversation id for a pair of participants, in either order.
    pub fn for_participants(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}{}{second}", Self::SEPARATOR))
    }

    /// Wrap an id read back from a store.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-conversation message ordering key assigned by the synchronized store.
///
/// Display order follows this key, independent of decrypt completion order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_is_order_independent() {
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert_eq!(
            ConversationId::for_participants(&alice, &bob),
            ConversationId::for_participants(&bob, &alice)
        );
    }

    #[test]
    fn conversation_id_orders_lexicographically() {
        let id = ConversationId::for_participants(&UserId::from("zoe"), &UserId::from("adam"));
        assert_eq!(id.as_str(), "adam_zoe");
    }

    #[test]
    fn distinct_pairs_get_distinct_ids() {
        let ab = ConversationId::for_participants(&"a".into(), &"b".into());
        let ac = ConversationId::for_participants(&"a".into(), &"c".into());
        assert_ne!(ab, ac);
    }

    #[test]
    fn ids_that_could_collide_are_not_well_formed() {
        let a = ConversationId::for_participants(&"a_b".into(), &"c".into());
        let b = ConversationId::for_participants(&"a".into(), &"b_c".into());
        assert_eq!(a, b);

        assert!(!UserId::from("a_b").is_well_formed());
        assert!(!UserId::from("b_c").is_well_formed());
        assert!(!UserId::from("a/b").is_well_formed());
        assert!(!UserId::from("").is_well_formed());
        assert!(UserId::from("alice").is_well_formed());
    }

    #[test]
    fn message_ids_order_numerically() {
        assert!(MessageId(2) < MessageId(10));
    }
}
