use std::collections::VecDeque;

use generational_arena::{Arena, Index};
use tracing::{instrument, trace};
use uuid::Uuid;

use crate::id::NodeId;

/// Identity of one arena. Stamped on every node it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeKey(Uuid);

impl TreeKey {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Tree vertex stored in the arena.
#[derive(Debug)]
pub struct Node<T> {
    /// Payload
    pub(crate) value: T,
    /// Stable identifier, preserved by snapshots
    pub(crate) id: NodeId,
    /// Index of parent node in the arena, None for the root
    pub(crate) parent: Option<Index>,
    /// Indices of child nodes in sibling order
    pub(crate) children: Vec<Index>,
    /// Arena this node currently lives in
    pub(crate) tree: TreeKey,
    /// Mirrors the owning tree's flag after every sync pass
    pub(crate) readonly: bool,
}

/// Arena storage for one tree.
///
/// Every node held by the arena is reachable from `root`: excised subtrees are
/// moved out into their own arena, so a generational index that no longer
/// resolves identifies a stale handle.
#[derive(Debug)]
pub struct NodeArena<T> {
    arena: Arena<Node<T>>,
    root: Option<Index>,
    key: TreeKey,
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeArena<T> {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
            key: TreeKey::new(),
        }
    }

    pub fn key(&self) -> TreeKey {
        self.key
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn get(&self, idx: Index) -> Option<&Node<T>> {
        self.arena.get(idx)
    }

    pub fn get_mut(&mut self, idx: Index) -> Option<&mut Node<T>> {
        self.arena.get_mut(idx)
    }

    /// Inserts a node without linking it anywhere.
    #[instrument(level = "trace", skip(self, value))]
    pub fn insert_detached(&mut self, value: T, id: NodeId) -> Index {
        let key = self.key;
        self.arena.insert(Node {
            value,
            id,
            parent: None,
            children: Vec::new(),
            tree: key,
            readonly: false,
        })
    }

    /// Inserts the root of an empty arena.
    pub fn insert_root(&mut self, value: T, id: NodeId) -> Index {
        let idx = self.insert_detached(value, id);
        self.root = Some(idx);
        idx
    }

    /// Links a detached node under `parent`, at `position` or at the end.
    /// Stamps parent/tree/readonly on the child only; callers sync deeper levels.
    pub fn link(&mut self, parent: Index, child: Index, position: Option<usize>) {
        let (key, readonly) = match self.arena.get_mut(parent) {
            Some(p) => {
                match position {
                    Some(pos) if pos <= p.children.len() => p.children.insert(pos, child),
                    _ => p.children.push(child),
                }
                (p.tree, p.readonly)
            }
            None => return,
        };
        if let Some(c) = self.arena.get_mut(child) {
            c.parent = Some(parent);
            c.tree = key;
            c.readonly = readonly;
        }
    }

    /// Removes `idx` from its parent's child list. Returns its former position.
    pub fn unlink(&mut self, idx: Index) -> Option<usize> {
        let parent = self.arena.get_mut(idx)?.parent.take()?;
        let siblings = &mut self.arena.get_mut(parent)?.children;
        let pos = siblings.iter().position(|&c| c == idx)?;
        siblings.remove(pos);
        Some(pos)
    }

    /// Re-synchronizes parent, tree and readonly top-down below `idx`.
    #[instrument(level = "trace", skip(self))]
    pub fn sync(&mut self, idx: Index) {
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let (children, key, readonly) = match self.arena.get(current) {
                Some(node) => (node.children.clone(), node.tree, node.readonly),
                None => continue,
            };
            for child in children {
                if let Some(node) = self.arena.get_mut(child) {
                    node.parent = Some(current);
                    node.tree = key;
                    node.readonly = readonly;
                    stack.push(child);
                }
            }
        }
        trace!("synced subtree below {:?}", idx);
    }

    /// Sets the readonly flag on `idx` and cascades it through its subtree.
    pub fn stamp_readonly(&mut self, idx: Index, readonly: bool) {
        if let Some(node) = self.arena.get_mut(idx) {
            node.readonly = readonly;
            self.sync(idx);
        }
    }

    /// True if `ancestor` lies on the parent chain of `idx` (self excluded).
    pub fn is_ancestor(&self, ancestor: Index, idx: Index) -> bool {
        let mut current = self.get(idx).and_then(|n| n.parent);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.get(p).and_then(|n| n.parent);
        }
        false
    }

    /// Depth-first search of the descendants of `idx` (self excluded).
    /// `max_depth` of 0 means unlimited; 1 checks direct children only.
    pub fn any_descendant<F>(&self, idx: Index, max_depth: usize, mut pred: F) -> bool
    where
        F: FnMut(&Node<T>) -> bool,
    {
        let mut stack: Vec<(Index, usize)> = match self.get(idx) {
            Some(node) => node.children.iter().rev().map(|&c| (c, 1)).collect(),
            None => return false,
        };
        while let Some((current, depth)) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            if pred(node) {
                return true;
            }
            if max_depth == 0 || depth < max_depth {
                for &child in node.children.iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
        false
    }

    /// Moves the subtree rooted at `idx` out into a new arena.
    /// `idx` must already be unlinked (or be the root).
    #[instrument(level = "debug", skip(self))]
    pub fn extract(&mut self, idx: Index) -> NodeArena<T> {
        let mut detached = NodeArena::new();
        if self.root == Some(idx) {
            self.root = None;
        }
        let mut stack: Vec<(Index, Option<Index>)> = vec![(idx, None)];
        while let Some((old_idx, new_parent)) = stack.pop() {
            let Some(node) = self.arena.remove(old_idx) else {
                continue;
            };
            let Node {
                value,
                id,
                children,
                ..
            } = node;
            let new_idx = match new_parent {
                Some(p) => {
                    let new_idx = detached.insert_detached(value, id);
                    detached.link(p, new_idx, None);
                    new_idx
                }
                None => detached.insert_root(value, id),
            };
            // reverse push keeps left-to-right sibling order on pop
            for &child in children.iter().rev() {
                stack.push((child, Some(new_idx)));
            }
        }
        detached
    }

    /// Moves every node of `other` into this arena, under `parent` (or left
    /// detached for the caller to link). Returns the new index of `other`'s root.
    #[instrument(level = "debug", skip(self, other))]
    pub fn graft(&mut self, parent: Option<Index>, mut other: NodeArena<T>) -> Option<Index> {
        let other_root = other.root?;
        let mut grafted_root = None;
        let mut stack: Vec<(Index, Option<Index>)> = vec![(other_root, parent)];
        while let Some((old_idx, new_parent)) = stack.pop() {
            let Some(node) = other.arena.remove(old_idx) else {
                continue;
            };
            let Node {
                value,
                id,
                children,
                ..
            } = node;
            let new_idx = match new_parent {
                Some(p) => {
                    let new_idx = self.insert_detached(value, id);
                    self.link(p, new_idx, None);
                    new_idx
                }
                None => self.insert_detached(value, id),
            };
            grafted_root.get_or_insert(new_idx);
            for &child in children.iter().rev() {
                stack.push((child, Some(new_idx)));
            }
        }
        if let Some(idx) = grafted_root {
            self.sync(idx);
        }
        grafted_root
    }

    pub fn iter_preorder(&self, start: Option<Index>) -> PreOrderIterator<'_, T> {
        PreOrderIterator::new(self, start)
    }

    pub fn iter_postorder(&self, start: Option<Index>) -> PostOrderIterator<'_, T> {
        PostOrderIterator::new(self, start)
    }

    pub fn iter_levelorder(&self, start: Option<Index>) -> LevelOrderIterator<'_, T> {
        LevelOrderIterator::new(self, start)
    }

    /// Number of levels below and including `start`.
    #[instrument(level = "trace", skip(self))]
    pub fn height(&self, start: Index) -> usize {
        let mut height = 0;
        let mut stack = vec![(start, 1)];
        while let Some((idx, level)) = stack.pop() {
            let Some(node) = self.get(idx) else {
                continue;
            };
            height = height.max(level);
            stack.extend(node.children.iter().map(|&child| (child, level + 1)));
        }
        height
    }
}

pub struct PreOrderIterator<'a, T> {
    arena: &'a NodeArena<T>,
    stack: Vec<Index>,
}

impl<'a, T> PreOrderIterator<'a, T> {
    fn new(arena: &'a NodeArena<T>, start: Option<Index>) -> Self {
        let stack = start.or(arena.root()).into_iter().collect();
        Self { arena, stack }
    }
}

impl<'a, T> Iterator for PreOrderIterator<'a, T> {
    type Item = (Index, &'a Node<T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a, T> {
    arena: &'a NodeArena<T>,
    stack: Vec<(Index, bool)>,
}

impl<'a, T> PostOrderIterator<'a, T> {
    fn new(arena: &'a NodeArena<T>, start: Option<Index>) -> Self {
        let stack = start.or(arena.root()).map(|idx| (idx, false)).into_iter().collect();
        Self { arena, stack }
    }
}

impl<'a, T> Iterator for PostOrderIterator<'a, T> {
    type Item = (Index, &'a Node<T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}

/// Breadth-first walk driven by a FIFO queue.
pub struct LevelOrderIterator<'a, T> {
    arena: &'a NodeArena<T>,
    queue: VecDeque<Index>,
}

impl<'a, T> LevelOrderIterator<'a, T> {
    fn new(arena: &'a NodeArena<T>, start: Option<Index>) -> Self {
        let queue = start.or(arena.root()).into_iter().collect();
        Self { arena, queue }
    }
}

impl<'a, T> Iterator for LevelOrderIterator<'a, T> {
    type Item = (Index, &'a Node<T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.queue.pop_front() {
            if let Some(node) = self.arena.get(current_idx) {
                self.queue.extend(node.children.iter().copied());
                return Some((current_idx, node));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    //      r
    //    /   \
    //   a     b
    //   |
    //   c
    fn sample() -> (NodeArena<&'static str>, [Index; 4]) {
        let mut arena = NodeArena::new();
        let r = arena.insert_root("r", NodeId::from("r"));
        let a = arena.insert_detached("a", NodeId::from("a"));
        arena.link(r, a, None);
        let b = arena.insert_detached("b", NodeId::from("b"));
        arena.link(r, b, None);
        let c = arena.insert_detached("c", NodeId::from("c"));
        arena.link(a, c, None);
        (arena, [r, a, b, c])
    }

    fn values<'a>(it: impl Iterator<Item = (Index, &'a Node<&'static str>)>) -> String {
        it.map(|(_, n)| n.value).collect()
    }

    #[test]
    fn given_arena_when_iterating_then_orders_match() {
        let (arena, _) = sample();
        assert_eq!(values(arena.iter_preorder(None)), "racb");
        assert_eq!(values(arena.iter_postorder(None)), "carb");
        assert_eq!(values(arena.iter_levelorder(None)), "rabc");
        assert_eq!(arena.height(arena.root().unwrap()), 3);
    }

    #[test]
    fn given_subtree_when_extracting_then_indices_go_stale() {
        let (mut arena, [r, a, _, c]) = sample();
        assert_eq!(arena.unlink(a), Some(0));
        let detached = arena.extract(a);

        assert_eq!(arena.len(), 2);
        assert!(arena.get(a).is_none());
        assert!(arena.get(c).is_none());
        assert_eq!(values(arena.iter_preorder(Some(r))), "rb");

        assert_eq!(detached.len(), 2);
        assert_eq!(values(detached.iter_preorder(None)), "ac");
        let child = detached.iter_preorder(None).nth(1).unwrap().1;
        assert_eq!(child.tree, detached.key());
    }

    #[test]
    fn given_detached_arena_when_grafting_then_links_and_stamps() {
        let (mut arena, [_, _, b, _]) = sample();
        arena.stamp_readonly(arena.root().unwrap(), true);
        let mut other = NodeArena::new();
        let x = other.insert_root("x", NodeId::from("x"));
        let y = other.insert_detached("y", NodeId::from("y"));
        other.link(x, y, None);

        let grafted = arena.graft(Some(b), other).unwrap();

        assert_eq!(values(arena.iter_preorder(None)), "racbxy");
        assert!(arena.iter_preorder(Some(grafted)).all(|(_, n)| n.readonly));
        assert!(arena.iter_preorder(None).all(|(_, n)| n.tree == arena.key()));
        assert!(arena.is_ancestor(b, grafted));
    }

    #[test]
    fn given_max_depth_when_searching_descendants_then_respects_cap() {
        let (arena, [r, ..]) = sample();
        assert!(arena.any_descendant(r, 0, |n| n.value == "c"));
        assert!(!arena.any_descendant(r, 1, |n| n.value == "c"));
        assert!(arena.any_descendant(r, 2, |n| n.value == "c"));
        assert!(!arena.any_descendant(r, 0, |n| n.value == "r"));
    }
}
