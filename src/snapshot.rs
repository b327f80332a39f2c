//! Serialized form: `{ "id", "value", "children": [...] }`, recursively.
//!
//! The only wire/disk format of a tree. `restore(dump())` reproduces every
//! id, value and sibling position.

use std::collections::HashSet;

use generational_arena::Index;
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, instrument};

use crate::arena::NodeArena;
use crate::error::{TreeError, TreeResult};
use crate::id::NodeId;
use crate::tree::Tree;

/// Remaining stack below which deep (de)serialization moves to a new segment.
pub(crate) const RED_ZONE: usize = 64 * 1024;
pub(crate) const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// Owned snapshot of a (sub)tree. Parent and tree links are not stored;
/// they are derived again on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub id: NodeId,
    pub value: T,
    #[serde(default = "Vec::new")]
    pub children: Vec<Snapshot<T>>,
}

impl<T> Snapshot<T> {
    pub fn leaf(id: impl Into<NodeId>, value: T) -> Self {
        Self {
            id: id.into(),
            value,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Snapshot<T>>) -> Self {
        self.children = children;
        self
    }

    /// Fails with `DuplicateNode` on the first id that appears twice.
    pub fn check_unique_ids(&self) -> TreeResult<()> {
        let mut seen = HashSet::new();
        let mut pending = vec![self];
        while let Some(current) = pending.pop() {
            if !seen.insert(&current.id) {
                return Err(TreeError::DuplicateNode(current.id.clone()));
            }
            pending.extend(current.children.iter());
        }
        Ok(())
    }
}

/// Borrowing serializer so `dump` does not clone values.
struct SnapshotRef<'a, T> {
    nodes: &'a NodeArena<T>,
    index: Index,
}

struct ChildrenRef<'a, T> {
    nodes: &'a NodeArena<T>,
    children: &'a [Index],
}

impl<T: Serialize> Serialize for SnapshotRef<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = self
            .nodes
            .get(self.index)
            .ok_or_else(|| serde::ser::Error::custom("dangling node index"))?;
        stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || {
            let mut state = serializer.serialize_struct("Snapshot", 3)?;
            state.serialize_field("id", &node.id)?;
            state.serialize_field("value", &node.value)?;
            state.serialize_field(
                "children",
                &ChildrenRef {
                    nodes: self.nodes,
                    children: &node.children,
                },
            )?;
            state.end()
        })
    }
}

impl<T: Serialize> Serialize for ChildrenRef<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.children.iter().map(|&index| SnapshotRef {
            nodes: self.nodes,
            index,
        }))
    }
}

/// An empty tree serializes as `null`.
impl<T: Serialize> Serialize for Tree<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.nodes.root() {
            Some(index) => SnapshotRef {
                nodes: &self.nodes,
                index,
            }
            .serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Tree<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let snapshot =
            Option::<Snapshot<T>>::deserialize(serde_stacker::Deserializer::new(deserializer))?;
        let mut tree = Tree::new();
        if let Some(snapshot) = snapshot {
            tree.restore(snapshot).map_err(serde::de::Error::custom)?;
        }
        Ok(tree)
    }
}

impl<T> Tree<T> {
    /// Restores from a snapshot; ids are taken verbatim from it.
    pub fn from_snapshot(snapshot: Snapshot<T>, readonly: bool) -> TreeResult<Self> {
        let mut tree = Tree::new();
        tree.readonly = readonly;
        tree.restore(snapshot)?;
        Ok(tree)
    }

    /// Restores from a string produced by [`Tree::dump`].
    pub fn factory(dump: &str, readonly: bool) -> TreeResult<Self>
    where
        T: DeserializeOwned,
    {
        let mut tree = Tree::new();
        tree.readonly = readonly;
        tree.restore_str(dump)?;
        Ok(tree)
    }

    /// Owned snapshot of the whole tree, `None` when empty.
    pub fn to_snapshot(&self) -> Option<Snapshot<T>>
    where
        T: Clone,
    {
        self.root().map(|root| root.to_snapshot())
    }

    /// JSON encoding of the snapshot.
    pub fn dump(&self) -> TreeResult<String>
    where
        T: Serialize,
    {
        Ok(serde_json::to_string(self)?)
    }

    pub fn dump_pretty(&self) -> TreeResult<String>
    where
        T: Serialize,
    {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Replaces the content of this tree with `snapshot`.
    ///
    /// The tree is rebuilt writable, then stamped readonly in one post-order
    /// pass if the tree is marked readonly. Handles issued before the call no
    /// longer resolve.
    #[instrument(level = "debug", skip(self, snapshot))]
    pub fn restore(&mut self, snapshot: Snapshot<T>) -> TreeResult<&mut Self> {
        snapshot.check_unique_ids()?;

        let mut nodes = NodeArena::new();
        let mut stack: Vec<(Snapshot<T>, Option<Index>)> = vec![(snapshot, None)];
        while let Some((current, parent)) = stack.pop() {
            let Snapshot {
                id,
                value,
                children,
            } = current;
            let idx = match parent {
                Some(p) => {
                    let idx = nodes.insert_detached(value, id);
                    nodes.link(p, idx, None);
                    idx
                }
                None => nodes.insert_root(value, id),
            };
            for child in children.into_iter().rev() {
                stack.push((child, Some(idx)));
            }
        }

        for (_, node) in nodes.iter_preorder(None) {
            self.ids.observe(&node.id);
        }

        if self.readonly {
            let order: Vec<Index> = nodes.iter_postorder(None).map(|(idx, _)| idx).collect();
            for idx in order {
                if let Some(node) = nodes.get_mut(idx) {
                    node.readonly = true;
                }
            }
        }

        self.nodes = nodes;
        debug!("restored {} nodes", self.nodes.len());
        Ok(self)
    }

    /// Restores from a JSON dump; `null` yields an empty tree.
    /// Nesting depth is not limited.
    pub fn restore_str(&mut self, dump: &str) -> TreeResult<&mut Self>
    where
        T: DeserializeOwned,
    {
        let mut json = serde_json::Deserializer::from_str(dump);
        json.disable_recursion_limit();
        let parsed =
            Option::<Snapshot<T>>::deserialize(serde_stacker::Deserializer::new(&mut json))?;
        json.end()?;
        match parsed {
            Some(snapshot) => self.restore(snapshot),
            None => {
                self.nodes = NodeArena::new();
                Ok(self)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_snapshot_without_children_key_when_parsing_then_defaults_to_empty() {
        let tree: Tree<String> = Tree::factory(r#"{"id":"r","value":"root"}"#, false).unwrap();
        assert_eq!(tree.size(None), 1);
        assert_eq!(tree.root().unwrap().id(), "r");
    }

    #[test]
    fn given_duplicate_ids_when_restoring_then_rejects_and_keeps_tree() {
        let mut tree = Tree::with_root("keep".to_string());
        let snapshot = Snapshot::leaf("x", "a".to_string())
            .with_children(vec![Snapshot::leaf("x", "b".to_string())]);

        let err = tree.restore(snapshot).unwrap_err();

        assert!(matches!(err, TreeError::DuplicateNode(id) if id == "x"));
        assert_eq!(tree.root().unwrap().value(), "keep");
    }

    #[test]
    fn given_null_dump_when_restoring_then_tree_is_empty() {
        let mut tree = Tree::with_root(1);
        tree.restore_str("null").unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.dump().unwrap(), "null");
    }

    #[test]
    fn given_invalid_json_when_restoring_then_serialization_error() {
        let result = Tree::<i32>::factory("{not json", false);
        assert!(matches!(result, Err(TreeError::Serialization(_))));
    }

    #[test]
    fn given_restored_ids_when_appending_then_generator_skips_them() {
        let settings = crate::Settings {
            id_prefix: "k".into(),
            id_scope_len: 0,
            ..crate::Settings::default()
        };
        let mut tree = Tree::with_settings(&settings);
        tree.restore(Snapshot::leaf("k-1", 0).with_children(vec![Snapshot::leaf("k-2", 1)]))
            .unwrap();

        let added = tree.append_child(2).unwrap();

        assert_eq!(tree.node(added).unwrap().id(), "k-3");
    }

    #[test]
    fn given_tree_when_serializing_then_field_order_is_id_value_children() {
        let tree = Tree::from_snapshot(Snapshot::leaf("a", 1), false).unwrap();
        assert_eq!(tree.dump().unwrap(), r#"{"id":"a","value":1,"children":[]}"#);
    }
}
