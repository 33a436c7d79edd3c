//! Hierarchical channel trie.
//!
//! Each node is keyed by one path segment and carries the subscription
//! records registered at exactly that path. Delivery for `a.b.c` visits the
//! root's `a` node, then `a.b`, then `a.b.c`, yielding records ancestor
//! first.

use crate::handler::SharedHandler;
use std::collections::HashMap;

/// A subscriber stored in the trie or in the manager registry.
#[derive(Clone)]
pub struct SubscriptionRecord {
    pub handler: SharedHandler,
    /// Logical recipient, used for dedup and targeted delivery.
    pub recipient: Option<String>,
}

impl std::fmt::Debug for SubscriptionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("recipient", &self.recipient)
            .finish_non_exhaustive()
    }
}

/// Outcome of removing a key from the trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Every segment existed; `removed` tells whether the key was present.
    Resolved { removed: bool },
    /// Some segment along the path was missing.
    Unresolved,
}

/// Record plus its insertion position within the node.
struct Slot {
    order: u64,
    record: SubscriptionRecord,
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    records: HashMap<String, Slot>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.records.is_empty()
    }

    /// Records in insertion order.
    fn ordered_records(&self) -> Vec<(&String, &Slot)> {
        let mut entries: Vec<_> = self.records.iter().collect();
        entries.sort_by_key(|(_, slot)| slot.order);
        entries
    }

    fn count_nodes(&self) -> usize {
        1 + self.children.values().map(TrieNode::count_nodes).sum::<usize>()
    }
}

/// Tree of subscriptions keyed by channel segment.
#[derive(Default)]
pub struct ChannelTrie {
    root: TrieNode,
    /// Monotonic counter giving records a stable enumeration order.
    next_order: u64,
    len: usize,
}

impl ChannelTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` under `key` at `segments`, creating nodes as needed.
    ///
    /// An existing record with the same key is replaced in place and keeps
    /// its enumeration position.
    pub fn insert(&mut self, segments: &[String], key: String, record: SubscriptionRecord) {
        let mut node = &mut self.root;
        for segment in segments {
            node = node.children.entry(segment.clone()).or_default();
        }

        match node.records.get_mut(&key) {
            Some(slot) => slot.record = record,
            None => {
                let order = self.next_order;
                self.next_order += 1;
                node.records.insert(key, Slot { order, record });
                self.len += 1;
            }
        }
    }

    /// Remove `key` from the node at `segments` without creating nodes.
    ///
    /// With `prune` set, nodes left with no records and no children are
    /// deleted on the way back up.
    pub fn remove(&mut self, segments: &[String], key: &str, prune: bool) -> RemoveOutcome {
        let outcome = Self::remove_in(&mut self.root, segments, key, prune);
        if outcome == (RemoveOutcome::Resolved { removed: true }) {
            self.len -= 1;
        }
        outcome
    }

    fn remove_in(node: &mut TrieNode, segments: &[String], key: &str, prune: bool) -> RemoveOutcome {
        let Some((head, rest)) = segments.split_first() else {
            return RemoveOutcome::Resolved {
                removed: node.records.remove(key).is_some(),
            };
        };

        let Some(child) = node.children.get_mut(head) else {
            return RemoveOutcome::Unresolved;
        };

        let outcome = Self::remove_in(child, rest, key, prune);
        if prune && outcome == (RemoveOutcome::Resolved { removed: true }) && child.is_empty() {
            node.children.remove(head);
        }
        outcome
    }

    /// Look up a single record.
    pub fn get(&self, segments: &[String], key: &str) -> Option<&SubscriptionRecord> {
        let mut node = &self.root;
        for segment in segments {
            node = node.children.get(segment)?;
        }
        node.records.get(key).map(|slot| &slot.record)
    }

    /// Records stored at exactly `segments`, in insertion order.
    ///
    /// `None` when some segment has no node. Publishing walks the chain one
    /// level at a time with this, so changes a handler makes to deeper
    /// levels are seen when the walk gets there.
    pub fn records_at(&self, segments: &[String]) -> Option<Vec<(String, SubscriptionRecord)>> {
        let mut node = &self.root;
        for segment in segments {
            node = node.children.get(segment)?;
        }
        Some(
            node.ordered_records()
                .into_iter()
                .map(|(key, slot)| (key.clone(), slot.record.clone()))
                .collect(),
        )
    }

    /// All records along the ancestor chain of `segments`, shallowest first.
    ///
    /// The walk stops at the first missing segment. Records within one node
    /// come out in insertion order. The returned records are clones, so the
    /// trie may be mutated while the caller works through them.
    pub fn collect_along_path(&self, segments: &[String]) -> Vec<(String, SubscriptionRecord)> {
        let mut collected = Vec::new();
        let mut node = &self.root;
        for segment in segments {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => break,
            }
            for (key, slot) in node.ordered_records() {
                collected.push((key.clone(), slot.record.clone()));
            }
        }
        collected
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of nodes below the root.
    pub fn node_count(&self) -> usize {
        self.root.count_nodes() - 1
    }
}
