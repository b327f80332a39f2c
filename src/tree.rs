//! Tree: owns the arena, resolves ids and delegates to node primitives.

use std::collections::HashMap;
use std::fmt;

use generational_arena::Index;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::arena::NodeArena;
use crate::config::Settings;
use crate::error::{TreeError, TreeResult};
use crate::id::{IdGenerator, NodeId};
use crate::node::{NodeHandle, NodeMut, NodeRef};

pub const DEFAULT_INDENT: usize = 4;

/// Mutable ordered N-ary tree with stable node ids.
///
/// Holds at most one root. When `readonly` is set, every structural
/// mutation on the tree or any of its nodes fails with `ReadonlyViolation`.
#[derive(Debug)]
pub struct Tree<T> {
    pub(crate) nodes: NodeArena<T>,
    pub(crate) readonly: bool,
    pub(crate) ids: IdGenerator,
    indent: usize,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        Self {
            nodes: NodeArena::new(),
            readonly: false,
            ids: IdGenerator::default(),
            indent: DEFAULT_INDENT,
        }
    }

    pub fn with_settings(settings: &Settings) -> Self {
        Self {
            nodes: NodeArena::new(),
            readonly: settings.readonly,
            ids: IdGenerator::new(settings.id_prefix.clone(), settings.id_scope_len),
            indent: settings.indent,
        }
    }

    /// Single-node tree holding `value` as root.
    pub fn with_root(value: T) -> Self {
        let mut tree = Self::new();
        let id = tree.ids.next_id();
        tree.nodes.insert_root(value, id);
        tree
    }

    /// Takes ownership of a detached subtree and stamps `readonly` on all of it.
    /// Handles issued by `subtree` stay valid.
    pub fn from_subtree(subtree: Tree<T>, readonly: bool) -> Self {
        let mut tree = subtree;
        tree.set_readonly(readonly);
        tree
    }

    /// Wraps an arena split off this tree; inherits id settings and indent.
    /// The new generator never reissues an id the arena already carries.
    pub(crate) fn detached(&self, nodes: NodeArena<T>) -> Tree<T> {
        let ids = self.ids.fork();
        for (_, node) in nodes.iter_preorder(None) {
            ids.observe(&node.id);
        }
        Tree {
            nodes,
            readonly: false,
            ids,
            indent: self.indent,
        }
    }

    pub(crate) fn into_arena(self) -> NodeArena<T> {
        self.nodes
    }

    pub(crate) fn node_at(&self, index: Index) -> Option<NodeRef<'_, T>> {
        self.nodes
            .get(index)
            .map(|node| NodeRef::new(self, index, node))
    }

    pub(crate) fn handle_of(&self, index: Index) -> NodeHandle {
        NodeHandle {
            tree: self.nodes.key(),
            index,
        }
    }

    /// Keeps this tree's generator clear of ids carried in by `other`.
    pub(crate) fn adopt_ids(&self, other: &Tree<T>) {
        for node in other.pre_order() {
            self.ids.observe(node.id());
        }
    }

    /// Arena index for a handle of this tree that still resolves.
    fn local(&self, handle: NodeHandle) -> Option<Index> {
        (handle.tree == self.nodes.key() && self.nodes.get(handle.index).is_some())
            .then_some(handle.index)
    }

    fn ensure_writable(&self) -> TreeResult<()> {
        if self.readonly {
            return Err(TreeError::ReadonlyViolation("tree".to_string()));
        }
        Ok(())
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// Toggles the flag and cascades it through every attached node.
    #[instrument(level = "debug", skip(self))]
    pub fn set_readonly(&mut self, readonly: bool) -> &mut Self {
        self.readonly = readonly;
        if let Some(root) = self.nodes.root() {
            self.nodes.stamp_readonly(root, readonly);
        }
        self
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn root(&self) -> Option<NodeRef<'_, T>> {
        self.nodes.root().and_then(|idx| self.node_at(idx))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.root().is_none()
    }

    /// Resolves a handle; `None` if it is stale or from another tree.
    pub fn node(&self, handle: NodeHandle) -> Option<NodeRef<'_, T>> {
        self.local(handle).and_then(|idx| self.node_at(idx))
    }

    pub fn node_mut(&mut self, handle: NodeHandle) -> TreeResult<NodeMut<'_, T>> {
        if handle.tree != self.nodes.key() {
            return Err(TreeError::CrossTreeReference(handle.to_string()));
        }
        let idx = self
            .local(handle)
            .ok_or_else(|| TreeError::not_found(handle))?;
        Ok(NodeMut::new(self, idx))
    }

    /// Appends under the root; the first call establishes the root.
    #[instrument(level = "debug", skip(self, value))]
    pub fn append_child(&mut self, value: T) -> TreeResult<NodeHandle> {
        self.ensure_writable()?;
        match self.nodes.root() {
            Some(root) => NodeMut::new(self, root).append_child(value),
            None => {
                let id = self.ids.next_id();
                debug!("new root {}", id);
                let root = self.nodes.insert_root(value, id);
                Ok(self.handle_of(root))
            }
        }
    }

    // https://en.wikipedia.org/wiki/Tree_traversal
    pub fn pre_order(&self) -> impl Iterator<Item = NodeRef<'_, T>> + '_ {
        self.nodes
            .iter_preorder(None)
            .map(move |(idx, node)| NodeRef::new(self, idx, node))
    }

    pub fn pre_order_from(&self, from: NodeHandle) -> impl Iterator<Item = NodeRef<'_, T>> + '_ {
        self.local(from)
            .into_iter()
            .flat_map(move |idx| self.nodes.iter_preorder(Some(idx)))
            .map(move |(idx, node)| NodeRef::new(self, idx, node))
    }

    pub fn post_order(&self) -> impl Iterator<Item = NodeRef<'_, T>> + '_ {
        self.nodes
            .iter_postorder(None)
            .map(move |(idx, node)| NodeRef::new(self, idx, node))
    }

    pub fn post_order_from(&self, from: NodeHandle) -> impl Iterator<Item = NodeRef<'_, T>> + '_ {
        self.local(from)
            .into_iter()
            .flat_map(move |idx| self.nodes.iter_postorder(Some(idx)))
            .map(move |(idx, node)| NodeRef::new(self, idx, node))
    }

    pub fn level_order(&self) -> impl Iterator<Item = NodeRef<'_, T>> + '_ {
        self.nodes
            .iter_levelorder(None)
            .map(move |(idx, node)| NodeRef::new(self, idx, node))
    }

    pub fn level_order_from(&self, from: NodeHandle) -> impl Iterator<Item = NodeRef<'_, T>> + '_ {
        self.local(from)
            .into_iter()
            .flat_map(move |idx| self.nodes.iter_levelorder(Some(idx)))
            .map(move |(idx, node)| NodeRef::new(self, idx, node))
    }

    pub fn find(&self, id: &str) -> Option<NodeRef<'_, T>> {
        self.pre_order().find(|n| n.id() == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<NodeMut<'_, T>> {
        let idx = self.find(id)?.handle().index;
        Some(NodeMut::new(self, idx))
    }

    pub fn find_by(&self, value: &T) -> Option<NodeRef<'_, T>>
    where
        T: PartialEq,
    {
        self.find_by_with(value, |a, b| a == b)
    }

    pub fn find_by_with<F>(&self, value: &T, compare: F) -> Option<NodeRef<'_, T>>
    where
        F: Fn(&T, &T) -> bool,
    {
        self.pre_order().find(|n| compare(n.value(), value))
    }

    /// First node whose projected property equals `prop`.
    /// A projection returning `None` never matches.
    pub fn find_by_prop<K, F>(&self, prop: &K, project: F) -> Option<NodeRef<'_, T>>
    where
        K: PartialEq + ?Sized,
        F: Fn(&T) -> Option<&K>,
    {
        self.pre_order()
            .find(|n| project(n.value()).is_some_and(|p| p == prop))
    }

    /// Lowest common ancestor of two nodes.
    ///
    /// A node counts as its own ancestor: both ancestor chains include the node
    /// itself, so `find_lca(D, E)` with `E` below `D` yields `D`. Comparing
    /// parent-only paths would yield `D`'s parent instead.
    #[instrument(level = "debug", skip(self))]
    pub fn find_lca(&self, id1: &str, id2: &str) -> TreeResult<NodeRef<'_, T>> {
        let n1 = self.find(id1).ok_or_else(|| TreeError::not_found(id1))?;
        let n2 = self.find(id2).ok_or_else(|| TreeError::not_found(id2))?;
        if n1 == n2 {
            return Ok(n1);
        }

        let mut chain1 = n1.path();
        chain1.push(n1);
        let lookup: HashMap<&NodeId, NodeRef<'_, T>> =
            chain1.into_iter().map(|n| (n.id(), n)).collect();

        let mut chain2 = n2.path();
        chain2.push(n2);
        let mut lca = None;
        for node in chain2 {
            match lookup.get(node.id()) {
                Some(&hit) => lca = Some(hit),
                None => break,
            }
        }
        lca.ok_or_else(|| TreeError::not_found(format!("common ancestor of {id1} and {id2}")))
    }

    /// Appends `value` under the node `parent_id`.
    #[instrument(level = "debug", skip(self, value))]
    pub fn insert(&mut self, parent_id: &str, value: T) -> TreeResult<NodeHandle> {
        self.ensure_writable()?;
        let mut parent = self
            .find_mut(parent_id)
            .ok_or_else(|| TreeError::not_found(parent_id))?;
        parent.append_child(value)
    }

    /// Excises `id` and its subtree, returned as a detached tree.
    /// Removing the root empties the tree.
    #[instrument(level = "debug", skip(self))]
    pub fn remove(&mut self, id: &str) -> TreeResult<Tree<T>> {
        self.ensure_writable()?;
        let node = self.find(id).ok_or_else(|| TreeError::not_found(id))?;
        match node.parent().map(|p| p.handle().index) {
            Some(parent) => NodeMut::new(self, parent).remove_child(id),
            None => {
                let root = node.handle().index;
                let detached = self.nodes.extract(root);
                debug!("removed root {}", id);
                Ok(self.detached(detached))
            }
        }
    }

    /// Resolves `src` and `target` for a move or copy; `None` target means
    /// the move is already in place.
    fn resolve_transfer(
        &self,
        src_id: &str,
        target_id: &str,
        is_move: bool,
    ) -> TreeResult<(Index, Option<Index>)> {
        self.ensure_writable()?;
        let src = self.find(src_id).ok_or_else(|| TreeError::not_found(src_id))?;
        if is_move && src.contains(target_id, 0) {
            return Err(TreeError::CyclicReference {
                node: src.id().clone(),
                target: NodeId::from(target_id),
            });
        }
        let target = self
            .find(target_id)
            .ok_or_else(|| TreeError::not_found(target_id))?;
        if is_move {
            if target == src {
                return Err(TreeError::SelfMove(src.id().clone()));
            }
            if src.parent() == Some(target) {
                return Ok((src.handle().index, None));
            }
        }
        Ok((src.handle().index, Some(target.handle().index)))
    }

    /// Moves `src_id` (with its subtree) to be the last child of `target_id`.
    #[instrument(level = "debug", skip(self))]
    pub fn move_node(&mut self, src_id: &str, target_id: &str) -> TreeResult<NodeHandle> {
        let (src, target) = self.resolve_transfer(src_id, target_id, true)?;
        let Some(target) = target else {
            debug!("{} already under {}", src_id, target_id);
            return Ok(self.handle_of(src));
        };
        self.nodes.unlink(src);
        self.nodes.link(target, src, None);
        self.nodes.sync(src);
        Ok(self.handle_of(src))
    }

    /// Appends a deep clone of `src_id` under `target_id`; the original stays.
    #[instrument(level = "debug", skip(self))]
    pub fn copy_node(&mut self, src_id: &str, target_id: &str) -> TreeResult<NodeHandle>
    where
        T: Serialize + DeserializeOwned,
    {
        let (src, target) = self.resolve_transfer(src_id, target_id, false)?;
        let target = target.ok_or_else(|| TreeError::not_found(target_id))?;
        let clone = self
            .node_at(src)
            .ok_or_else(|| TreeError::not_found(src_id))?
            .deep_clone()?;
        let copied = self
            .nodes
            .graft(Some(target), clone.into_arena())
            .ok_or_else(|| TreeError::not_found(src_id))?;
        Ok(self.handle_of(copied))
    }

    /// Node count of the subtree at `from` (root when `None`), inclusive.
    /// Stale or foreign handles count 0.
    pub fn size(&self, from: Option<NodeHandle>) -> usize {
        match from {
            None => self.pre_order().count(),
            Some(handle) => self.pre_order_from(handle).count(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.size(None)
    }

    /// Levels in the tree, 0 when empty.
    pub fn height(&self) -> usize {
        self.nodes.root().map_or(0, |root| self.nodes.height(root))
    }

    /// Leaf handles in pre-order.
    pub fn leaves(&self) -> Vec<NodeHandle> {
        self.pre_order()
            .filter(|n| n.is_leaf())
            .map(|n| n.handle())
            .collect()
    }

    /// Identifiers in pre-order.
    pub fn ids(&self) -> Vec<&NodeId> {
        self.pre_order().map(|n| n.id()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.root().is_some_and(|root| root.contains(id, 0))
    }

    pub fn has(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.root().is_some_and(|root| root.has(value, 0))
    }

    pub fn has_with<F>(&self, value: &T, compare: F) -> bool
    where
        F: Fn(&T, &T) -> bool,
    {
        self.root().is_some_and(|root| root.has_with(value, 0, compare))
    }
}

/// Indented plain-text dump, one node per line in pre-order.
impl<T: fmt::Display> fmt::Display for Tree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pre_order().join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_empty_tree_when_appending_then_first_value_becomes_root() {
        let mut tree = Tree::new();
        assert!(tree.root().is_none());
        assert_eq!(tree.size(None), 0);

        let a = tree.append_child("A").unwrap();
        let aa = tree.append_child("AA").unwrap();

        assert_eq!(tree.root().unwrap().handle(), a);
        assert_eq!(tree.node(aa).unwrap().parent().unwrap().handle(), a);
        assert_eq!(tree.to_string(), "A\n    AA");
    }

    #[test]
    fn given_custom_indent_when_displaying_then_uses_it() {
        let settings = Settings {
            indent: 2,
            ..Settings::default()
        };
        let mut tree = Tree::with_settings(&settings);
        let root = tree.append_child("r").unwrap();
        let child = tree.node_mut(root).unwrap().append_child("c").unwrap();
        tree.node_mut(child).unwrap().append_child("g").unwrap();
        assert_eq!(tree.to_string(), "r\n  c\n    g");
    }

    #[test]
    fn given_handle_from_other_tree_when_resolving_then_rejects() {
        let mut a = Tree::with_root(1);
        let b = Tree::with_root(2);
        let foreign = b.root().unwrap().handle();

        assert!(a.node(foreign).is_none());
        assert_eq!(a.size(Some(foreign)), 0);
        assert!(matches!(
            a.node_mut(foreign),
            Err(TreeError::CrossTreeReference(_))
        ));
    }

    #[test]
    fn given_projection_when_finding_by_prop_then_skips_absent() {
        #[derive(Debug, PartialEq)]
        struct Item {
            name: &'static str,
            tag: Option<&'static str>,
        }
        let mut tree = Tree::new();
        tree.append_child(Item { name: "root", tag: None }).unwrap();
        tree.append_child(Item { name: "a", tag: Some("x") }).unwrap();
        tree.append_child(Item { name: "b", tag: Some("y") }).unwrap();

        let hit = tree.find_by_prop("y", |v: &Item| v.tag).unwrap();
        assert_eq!(hit.value().name, "b");
        assert!(tree.find_by_prop("z", |v: &Item| v.tag).is_none());
        let by_name = tree.find_by_prop("a", |v: &Item| Some(v.name)).unwrap();
        assert_eq!(by_name.value().tag, Some("x"));
    }
}
