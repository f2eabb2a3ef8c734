//! Topic predicates and the subscription set used by SUB portals.

use bytes::Bytes;
use portal_core::error::{PortalError, Result};
use std::fmt;
use std::sync::Arc;

/// Custom topic predicate over a message value.
pub type TopicFn = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// A predicate selecting which published values a subscriber receives.
#[derive(Clone)]
pub enum Topic {
    /// Every value
    All,
    /// No value
    None,
    /// Every non-empty value
    NonEmpty,
    /// Values starting with the given bytes (empty prefix = every value)
    Prefix(Bytes),
    /// Arbitrary predicate; two custom topics are equal only if they share
    /// the same closure
    Custom(TopicFn),
}

impl Topic {
    pub fn prefix(prefix: impl Into<Bytes>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn custom(predicate: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    #[must_use]
    pub fn matches(&self, value: &[u8]) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::NonEmpty => !value.is_empty(),
            Self::Prefix(prefix) => value.starts_with(prefix),
            Self::Custom(predicate) => predicate(value),
        }
    }
}

impl PartialEq for Topic {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::All, Self::All) | (Self::None, Self::None) | (Self::NonEmpty, Self::NonEmpty) => {
                true
            }
            (Self::Prefix(a), Self::Prefix(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::None => f.write_str("None"),
            Self::NonEmpty => f.write_str("NonEmpty"),
            Self::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Set of subscribed topics with match-any semantics.
#[derive(Debug, Default)]
pub struct Subscriptions {
    topics: Vec<Topic>,
}

impl Subscriptions {
    #[must_use]
    pub const fn new() -> Self {
        Self { topics: Vec::new() }
    }

    /// Add a topic.
    ///
    /// # Errors
    ///
    /// `AlreadySubscribed` if an equal topic is already in the set.
    pub fn subscribe(&mut self, topic: Topic) -> Result<()> {
        if self.topics.contains(&topic) {
            return Err(PortalError::AlreadySubscribed);
        }
        self.topics.push(topic);
        Ok(())
    }

    /// Remove a topic. No-op if absent.
    pub fn unsubscribe(&mut self, topic: &Topic) {
        self.topics.retain(|t| t != topic);
    }

    /// Check if a value matches any subscription.
    ///
    /// No subscriptions = nothing matches.
    #[must_use]
    pub fn matches(&self, value: &[u8]) -> bool {
        self.topics.iter().any(|t| t.matches(value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matching() {
        assert!(Topic::All.matches(b""));
        assert!(!Topic::None.matches(b"anything"));
        assert!(Topic::NonEmpty.matches(b"x"));
        assert!(!Topic::NonEmpty.matches(b""));
        assert!(Topic::prefix("news.").matches(b"news.sport"));
        assert!(!Topic::prefix("news.").matches(b"weather"));
        assert!(Topic::prefix("").matches(b"weather"));
        assert!(Topic::custom(|v| v.len() == 3).matches(b"abc"));
    }

    #[test]
    fn test_topic_equality() {
        let custom = Topic::custom(|_| true);
        assert_eq!(custom, custom.clone());
        assert_ne!(custom, Topic::custom(|_| true));
        assert_eq!(Topic::prefix("a"), Topic::prefix("a"));
        assert_ne!(Topic::All, Topic::prefix(""));
    }

    #[test]
    fn test_duplicate_subscribe_rejected() {
        let mut subs = Subscriptions::new();
        subs.subscribe(Topic::All).unwrap();
        assert_eq!(subs.subscribe(Topic::All), Err(PortalError::AlreadySubscribed));
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let mut subs = Subscriptions::new();
        assert!(!subs.matches(b"x"));

        subs.subscribe(Topic::prefix("x")).unwrap();
        assert!(subs.matches(b"xy"));

        subs.unsubscribe(&Topic::prefix("x"));
        subs.unsubscribe(&Topic::prefix("x"));
        assert!(subs.is_empty());
        assert!(!subs.matches(b"xy"));
    }
}
