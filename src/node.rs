//! Node views over a tree's arena.
//!
//! `NodeRef` carries every read-only query, `NodeMut` every structural
//! primitive. Both are short-lived borrows of the owning [`Tree`]; keep a
//! [`NodeHandle`] to refer to a node across mutations.

use std::collections::HashSet;
use std::fmt;

use generational_arena::Index;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::arena::{Node, NodeArena, TreeKey};
use crate::error::{TreeError, TreeResult};
use crate::id::NodeId;
use crate::snapshot::{Snapshot, RED_ZONE, STACK_SEGMENT};
use crate::tree::Tree;

/// Copyable reference to a node of one specific tree.
///
/// A handle whose node has since been excised (or whose tree was restored)
/// no longer resolves; it never aliases another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub(crate) tree: TreeKey,
    pub(crate) index: Index,
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.index.into_raw_parts();
        write!(f, "#{}.{}", slot, generation)
    }
}

/// Something to place as a child: a fresh value, an existing node of the
/// same tree, or a detached subtree.
#[derive(Debug)]
pub enum Child<T> {
    Value(T),
    Node(NodeHandle),
    Subtree(Tree<T>),
}

/// Shared view of one node.
pub struct NodeRef<'a, T> {
    tree: &'a Tree<T>,
    index: Index,
    node: &'a Node<T>,
}

impl<T> Clone for NodeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for NodeRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.node.id)
            .field("value", &self.node.value)
            .field("children", &self.node.children.len())
            .field("readonly", &self.node.readonly)
            .finish()
    }
}

impl<T> PartialEq for NodeRef<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle() == other.handle()
    }
}

impl<'a, T> NodeRef<'a, T> {
    pub(crate) fn new(tree: &'a Tree<T>, index: Index, node: &'a Node<T>) -> Self {
        Self { tree, index, node }
    }

    fn at(&self, index: Index) -> Option<NodeRef<'a, T>> {
        self.tree.node_at(index)
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            tree: self.node.tree,
            index: self.index,
        }
    }

    pub fn id(&self) -> &'a NodeId {
        &self.node.id
    }

    pub fn value(&self) -> &'a T {
        &self.node.value
    }

    pub fn readonly(&self) -> bool {
        self.node.readonly
    }

    pub fn parent(&self) -> Option<NodeRef<'a, T>> {
        self.node.parent.and_then(|p| self.at(p))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a, T>> + 'a {
        let tree = self.tree;
        let node = self.node;
        node.children
            .iter()
            .filter_map(move |&child| tree.node_at(child))
    }

    pub fn child_count(&self) -> usize {
        self.node.children.len()
    }

    pub fn child(&self, position: usize) -> Option<NodeRef<'a, T>> {
        self.node.children.get(position).and_then(|&c| self.at(c))
    }

    /// Number of ancestors; the root has depth 0.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.node.parent;
        while let Some(p) = current {
            depth += 1;
            current = self.tree.nodes.get(p).and_then(|n| n.parent);
        }
        depth
    }

    /// Top of the parent chain, `None` if this node is itself the root.
    pub fn root(&self) -> Option<NodeRef<'a, T>> {
        let mut top = self.parent()?;
        while let Some(parent) = top.parent() {
            top = parent;
        }
        Some(top)
    }

    /// Ancestors from the root down to the immediate parent.
    pub fn path(&self) -> Vec<NodeRef<'a, T>> {
        let mut path = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            path.push(node);
        }
        path.reverse();
        path
    }

    pub fn is_leaf(&self) -> bool {
        self.node.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    /// The parent's children, self included; empty for the root.
    pub fn siblings(&self) -> Vec<NodeRef<'a, T>> {
        self.parent()
            .map(|p| p.children().collect())
            .unwrap_or_default()
    }

    /// Position among the siblings, `None` for the root.
    pub fn sibling_index(&self) -> Option<usize> {
        let parent = self.tree.nodes.get(self.node.parent?)?;
        parent.children.iter().position(|&c| c == self.index)
    }

    pub fn previous_sibling(&self) -> Option<NodeRef<'a, T>> {
        let pos = self.sibling_index()?.checked_sub(1)?;
        self.parent()?.child(pos)
    }

    pub fn next_sibling(&self) -> Option<NodeRef<'a, T>> {
        let pos = self.sibling_index()? + 1;
        self.parent()?.child(pos)
    }

    /// Searches the descendants (self excluded) for `id`.
    /// `max_depth` of 0 means unlimited.
    pub fn contains(&self, id: &str, max_depth: usize) -> bool {
        if id.is_empty() {
            return false;
        }
        self.tree
            .nodes
            .any_descendant(self.index, max_depth, |n| n.id == id)
    }

    /// Searches the descendants (self excluded) for an equal value.
    pub fn has(&self, value: &T, max_depth: usize) -> bool
    where
        T: PartialEq,
    {
        self.has_with(value, max_depth, |a, b| a == b)
    }

    pub fn has_with<F>(&self, value: &T, max_depth: usize, compare: F) -> bool
    where
        F: Fn(&T, &T) -> bool,
    {
        self.tree
            .nodes
            .any_descendant(self.index, max_depth, |n| compare(&n.value, value))
    }

    /// Independent copy of this subtree with fresh identifiers throughout.
    ///
    /// Values are copied through a serde round trip, so `T` must be plain data.
    /// The copy is detached; attach it with [`NodeMut::append_subtree`].
    #[instrument(level = "debug", skip(self), fields(id = %self.node.id))]
    pub fn deep_clone(&self) -> TreeResult<Tree<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut cloned = NodeArena::new();
        let mut stack: Vec<(Index, Option<Index>)> = vec![(self.index, None)];
        while let Some((idx, new_parent)) = stack.pop() {
            let Some(node) = self.tree.nodes.get(idx) else {
                continue;
            };
            let value: T = serde_json::from_value(serde_json::to_value(&node.value)?)?;
            let id = self.tree.ids.next_id();
            let new_idx = match new_parent {
                Some(p) => {
                    let new_idx = cloned.insert_detached(value, id);
                    cloned.link(p, new_idx, None);
                    new_idx
                }
                None => cloned.insert_root(value, id),
            };
            for &child in node.children.iter().rev() {
                stack.push((child, Some(new_idx)));
            }
        }
        Ok(self.tree.detached(cloned))
    }

    /// Owned `{id, value, children}` snapshot of this subtree.
    pub fn to_snapshot(&self) -> Snapshot<T>
    where
        T: Clone,
    {
        stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || Snapshot {
            id: self.node.id.clone(),
            value: self.node.value.clone(),
            children: self.children().map(|c| c.to_snapshot()).collect(),
        })
    }
}

/// One indented line: `indent * depth` spaces followed by the value.
impl<T: fmt::Display> fmt::Display for NodeRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = self.tree.indent() * self.depth();
        write!(f, "{:pad$}{}", "", self.node.value, pad = pad)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Annex {
    Append,
    Replace,
}

/// Exclusive view of one node; all structural primitives live here.
pub struct NodeMut<'a, T> {
    tree: &'a mut Tree<T>,
    index: Index,
}

impl<'a, T> NodeMut<'a, T> {
    pub(crate) fn new(tree: &'a mut Tree<T>, index: Index) -> Self {
        Self { tree, index }
    }

    fn node(&self) -> TreeResult<&Node<T>> {
        self.tree
            .nodes
            .get(self.index)
            .ok_or_else(|| TreeError::not_found(self.handle()))
    }

    pub fn view(&self) -> Option<NodeRef<'_, T>> {
        self.tree.node_at(self.index)
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            tree: self.tree.nodes.key(),
            index: self.index,
        }
    }

    pub fn id(&self) -> TreeResult<NodeId> {
        Ok(self.node()?.id.clone())
    }

    pub fn sibling_index(&self) -> Option<usize> {
        self.view().and_then(|n| n.sibling_index())
    }

    /// Mutable access to the payload; refused while readonly.
    pub fn value_mut(&mut self) -> TreeResult<&mut T> {
        self.ensure_writable()?;
        let handle = self.handle();
        self.tree
            .nodes
            .get_mut(self.index)
            .map(|n| &mut n.value)
            .ok_or_else(|| TreeError::not_found(handle))
    }

    fn ensure_writable(&self) -> TreeResult<()> {
        let node = self.node()?;
        if node.readonly {
            return Err(TreeError::ReadonlyViolation(node.id.to_string()));
        }
        Ok(())
    }

    fn position_of(&self, id: &str) -> TreeResult<(usize, Index)> {
        let node = self.node()?;
        let pos = node
            .children
            .iter()
            .position(|&c| self.tree.nodes.get(c).is_some_and(|n| n.id == id))
            .ok_or_else(|| TreeError::not_found(id))?;
        Ok((pos, node.children[pos]))
    }

    /// Checks that `handle` may be annexed by this node.
    fn check_annex(&self, handle: NodeHandle, mode: Annex) -> TreeResult<()> {
        let nodes = &self.tree.nodes;
        if handle.tree != nodes.key() {
            return Err(TreeError::CrossTreeReference(handle.to_string()));
        }
        let candidate = nodes
            .get(handle.index)
            .ok_or_else(|| TreeError::not_found(handle))?;
        let this = self.node()?;
        if handle.index == self.index || nodes.is_ancestor(handle.index, self.index) {
            return Err(TreeError::CyclicReference {
                node: candidate.id.clone(),
                target: this.id.clone(),
            });
        }
        if nodes.is_ancestor(self.index, handle.index) {
            return Err(TreeError::DuplicateNode(candidate.id.clone()));
        }
        if mode == Annex::Append && candidate.parent.is_some() && candidate.parent == this.parent {
            return Err(TreeError::DuplicateNode(candidate.id.clone()));
        }
        Ok(())
    }

    /// Checks that none of `subtree`'s ids are already taken.
    fn check_subtree(&self, subtree: &Tree<T>, taken: &mut HashSet<NodeId>) -> TreeResult<()> {
        if subtree.is_empty() {
            return Err(TreeError::not_found("root of detached subtree"));
        }
        for node in subtree.pre_order() {
            if !taken.insert(node.id().clone()) {
                return Err(TreeError::DuplicateNode(node.id().clone()));
            }
        }
        Ok(())
    }

    fn taken_ids(&self) -> HashSet<NodeId> {
        self.tree.pre_order().map(|n| n.id().clone()).collect()
    }

    /// Wraps `value` in a new node appended as the last child.
    #[instrument(level = "debug", skip(self, value))]
    pub fn append_child(&mut self, value: T) -> TreeResult<NodeHandle> {
        self.ensure_writable()?;
        let id = self.tree.ids.next_id();
        debug!("append {} under {}", id, self.node()?.id);
        let child = self.tree.nodes.insert_detached(value, id);
        self.tree.nodes.link(self.index, child, None);
        Ok(self.tree.handle_of(child))
    }

    /// Re-parents an existing node of this tree as the last child.
    #[instrument(level = "debug", skip(self))]
    pub fn append_node(&mut self, node: NodeHandle) -> TreeResult<NodeHandle> {
        self.ensure_writable()?;
        self.check_annex(node, Annex::Append)?;
        let nodes = &mut self.tree.nodes;
        nodes.unlink(node.index);
        nodes.link(self.index, node.index, None);
        nodes.sync(node.index);
        Ok(node)
    }

    /// Moves a detached subtree in as the last child, keeping its ids.
    #[instrument(level = "debug", skip(self, subtree))]
    pub fn append_subtree(&mut self, subtree: Tree<T>) -> TreeResult<NodeHandle> {
        self.ensure_writable()?;
        let mut taken = self.taken_ids();
        self.check_subtree(&subtree, &mut taken)?;
        self.tree.adopt_ids(&subtree);
        let grafted = self
            .tree
            .nodes
            .graft(Some(self.index), subtree.into_arena())
            .ok_or_else(|| TreeError::not_found("root of detached subtree"))?;
        Ok(self.tree.handle_of(grafted))
    }

    /// Removes the direct child `id` and hands it back as a detached tree.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_child(&mut self, id: &str) -> TreeResult<Tree<T>> {
        self.ensure_writable()?;
        let (_, child) = self.position_of(id)?;
        self.tree.nodes.unlink(child);
        let detached = self.tree.nodes.extract(child);
        debug!("removed {} ({} nodes)", id, detached.len());
        Ok(self.tree.detached(detached))
    }

    /// Swaps the direct child `id` for `replacement`, keeping its sibling index.
    #[instrument(level = "debug", skip(self, replacement))]
    pub fn replace_child(&mut self, id: &str, replacement: Child<T>) -> TreeResult<NodeHandle> {
        self.ensure_writable()?;
        let (_, old) = self.position_of(id)?;
        match &replacement {
            Child::Value(_) => {}
            Child::Node(handle) => self.check_annex(*handle, Annex::Replace)?,
            Child::Subtree(subtree) => {
                let mut taken = self.taken_ids();
                self.check_subtree(subtree, &mut taken)?;
            }
        }

        let new = self.prepare(replacement)?;
        let nodes = &mut self.tree.nodes;
        let pos = nodes.unlink(old);
        nodes.link(self.index, new, pos);
        nodes.sync(new);
        nodes.extract(old);
        debug!("replaced {} at {:?}", id, pos);
        Ok(self.tree.handle_of(new))
    }

    /// Clears the children and re-appends `children` in order, syncing once.
    ///
    /// Former children that are not re-listed are dropped.
    #[instrument(level = "debug", skip(self, children))]
    pub fn reset_children(&mut self, children: Vec<Child<T>>) -> TreeResult<Vec<NodeHandle>> {
        self.ensure_writable()?;
        let mut taken = self.taken_ids();
        let mut listed = HashSet::new();
        for child in &children {
            match child {
                Child::Value(_) => {}
                Child::Node(handle) => {
                    self.check_reset_node(*handle)?;
                    if !listed.insert(*handle) {
                        let id = self.tree.nodes.get(handle.index).map(|n| n.id.clone());
                        return Err(id.map_or_else(
                            || TreeError::not_found(handle),
                            TreeError::DuplicateNode,
                        ));
                    }
                }
                Child::Subtree(subtree) => self.check_subtree(subtree, &mut taken)?,
            }
        }

        let former = match self.tree.nodes.get_mut(self.index) {
            Some(node) => std::mem::take(&mut node.children),
            None => return Err(TreeError::not_found(self.handle())),
        };
        for &idx in &former {
            if let Some(node) = self.tree.nodes.get_mut(idx) {
                node.parent = None;
            }
        }

        let mut handles = Vec::with_capacity(children.len());
        for child in children {
            let idx = self.prepare(child)?;
            let nodes = &mut self.tree.nodes;
            let node = nodes.get_mut(idx).ok_or_else(|| TreeError::not_found("child"))?;
            node.parent = Some(self.index);
            if let Some(this) = nodes.get_mut(self.index) {
                this.children.push(idx);
            }
            handles.push(self.tree.handle_of(idx));
        }

        for idx in former {
            let orphaned = self
                .tree
                .nodes
                .get(idx)
                .is_some_and(|n| n.parent.is_none());
            if orphaned {
                self.tree.nodes.extract(idx);
            }
        }
        self.tree.nodes.sync(self.index);
        debug!("reset {} children", handles.len());
        Ok(handles)
    }

    /// Former children may be re-listed; other nodes follow the append rules.
    fn check_reset_node(&self, handle: NodeHandle) -> TreeResult<()> {
        let is_former_child = handle.tree == self.tree.nodes.key()
            && self
                .tree
                .nodes
                .get(handle.index)
                .is_some_and(|n| n.parent == Some(self.index));
        if is_former_child {
            return Ok(());
        }
        match self.check_annex(handle, Annex::Append) {
            // descendants of former children are detached from them first
            Err(TreeError::DuplicateNode(_)) if self.tree.nodes.is_ancestor(self.index, handle.index) => {
                Ok(())
            }
            other => other,
        }
    }

    /// Turns a validated `Child` into an unlinked arena index.
    fn prepare(&mut self, child: Child<T>) -> TreeResult<Index> {
        match child {
            Child::Value(value) => {
                let id = self.tree.ids.next_id();
                Ok(self.tree.nodes.insert_detached(value, id))
            }
            Child::Node(handle) => {
                self.tree.nodes.unlink(handle.index);
                Ok(handle.index)
            }
            Child::Subtree(subtree) => {
                self.tree.adopt_ids(&subtree);
                self.tree
                    .nodes
                    .graft(None, subtree.into_arena())
                    .ok_or_else(|| TreeError::not_found("root of detached subtree"))
            }
        }
    }

    /// Relocates this node within its sibling list.
    ///
    /// `to_index` is clamped to the last position; a negative value counts back
    /// from the last position (`-2` lands two slots before the end).
    #[instrument(level = "debug", skip(self))]
    pub fn move_sibling_index(&mut self, to_index: isize) -> TreeResult<&mut Self> {
        self.ensure_writable()?;
        let Some(parent) = self.node()?.parent else {
            return Ok(self);
        };
        let index = self.index;
        if let Some(p) = self.tree.nodes.get_mut(parent) {
            let siblings = &mut p.children;
            if siblings.len() >= 2 {
                let last = siblings.len() as isize - 1;
                let mut target = to_index.min(last);
                if target < 0 {
                    target = (last + target).max(0);
                }
                if let Some(current) = siblings.iter().position(|&c| c == index) {
                    let moved = siblings.remove(current);
                    siblings.insert(target as usize, moved);
                    debug!("moved sibling {} -> {}", current, target);
                }
            }
        }
        Ok(self)
    }
}
