//! Node identifiers and their generator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_ID_PREFIX: &str = "n";
pub const DEFAULT_SCOPE_LEN: usize = 8;

/// Opaque node identifier, unique among the nodes of one tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Produces `prefix-scope-counter` identifiers.
///
/// The scope is a random hex fragment drawn once per generator, the counter is
/// monotonic. Two ids from the same generator never collide; ids from different
/// generators only collide if their random scopes do.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    scope: Option<String>,
    counter: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_PREFIX, DEFAULT_SCOPE_LEN)
    }
}

impl IdGenerator {
    /// `scope_len` is capped at 32 hex chars (one v4 uuid); 0 disables the scope.
    pub fn new(prefix: impl Into<String>, scope_len: usize) -> Self {
        let scope = (scope_len > 0).then(|| {
            Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(scope_len)
                .collect::<String>()
        });
        Self {
            prefix: prefix.into(),
            scope,
            counter: AtomicU64::new(0),
        }
    }

    /// New generator with the same prefix and scope length but a fresh scope.
    /// The counter continues from this one.
    pub fn fork(&self) -> Self {
        let forked = Self::new(self.prefix.clone(), self.scope.as_ref().map_or(0, |s| s.len()));
        forked
            .counter
            .store(self.counter.load(Ordering::Relaxed), Ordering::Relaxed);
        forked
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Creates a fresh identifier.
    pub fn next_id(&self) -> NodeId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let id = [Some(self.prefix.clone()), self.scope.clone(), Some(n.to_string())]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .join("-");
        NodeId(id)
    }

    /// Advances the counter past `id` when it has this generator's shape, so
    /// ids adopted from a snapshot or another tree are never issued again.
    pub fn observe(&self, id: &NodeId) {
        let head = [Some(self.prefix.as_str()), self.scope.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .join("-");
        let tail = if head.is_empty() {
            Some(id.as_str())
        } else {
            id.as_str()
                .strip_prefix(head.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
        };
        if let Some(n) = tail.and_then(|t| t.parse::<u64>().ok()) {
            self.counter.fetch_max(n, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn given_generator_when_creating_ids_then_all_are_distinct() {
        let ids = IdGenerator::default();
        let created: HashSet<NodeId> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(created.len(), 1000);
    }

    #[test]
    fn given_prefix_and_scope_when_creating_id_then_has_three_parts() {
        let ids = IdGenerator::new("key", 4);
        let id = ids.next_id();
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "key");
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2], "1");
    }

    #[test]
    fn given_zero_scope_when_creating_ids_then_counter_follows_prefix() {
        let ids = IdGenerator::new("n", 0);
        assert!(ids.scope().is_none());
        assert_eq!(ids.next_id(), "n-1");
        assert_eq!(ids.next_id(), "n-2");
    }

    #[test]
    fn given_empty_prefix_when_creating_id_then_prefix_is_skipped() {
        let ids = IdGenerator::new("", 0);
        assert_eq!(ids.next_id().as_str(), "1");
    }

    #[test]
    fn given_two_generators_when_comparing_scopes_then_they_differ() {
        let a = IdGenerator::default();
        let b = IdGenerator::default();
        assert_ne!(a.scope(), b.scope());
    }

    #[test]
    fn given_generator_when_forking_then_keeps_shape_with_fresh_scope() {
        let parent = IdGenerator::new("key", 6);
        let child = parent.fork();
        assert_eq!(child.prefix(), "key");
        assert_eq!(child.scope().map(str::len), Some(6));
        assert_ne!(child.scope(), parent.scope());
    }

    #[test]
    fn given_adopted_ids_when_observing_then_counter_skips_past_them() {
        let ids = IdGenerator::new("k", 0);
        ids.observe(&NodeId::from("k-7"));
        ids.observe(&NodeId::from("k-3"));
        ids.observe(&NodeId::from("other-99"));
        assert_eq!(ids.next_id(), "k-8");
    }

    #[test]
    fn given_used_generator_when_forking_then_counter_continues() {
        let parent = IdGenerator::new("k", 0);
        parent.next_id();
        parent.next_id();
        assert_eq!(parent.fork().next_id(), "k-3");
    }
}
