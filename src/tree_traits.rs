use std::fmt::Display;

use termtree::Tree as TermTree;
use tracing::instrument;

use crate::node::NodeRef;
use crate::snapshot::{RED_ZONE, STACK_SEGMENT};
use crate::tree::Tree;

/// Box-drawing rendering for debugging output.
pub trait ToTermTree {
    fn to_term_tree(&self) -> TermTree<String>;
}

impl<T: Display> ToTermTree for NodeRef<'_, T> {
    fn to_term_tree(&self) -> TermTree<String> {
        stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || {
            let leaves: Vec<_> = self.children().map(|c| c.to_term_tree()).collect();
            TermTree::new(self.value().to_string()).with_leaves(leaves)
        })
    }
}

impl<T: Display> ToTermTree for Tree<T> {
    #[instrument(level = "trace", skip(self))]
    fn to_term_tree(&self) -> TermTree<String> {
        match self.root() {
            Some(root) => root.to_term_tree(),
            None => TermTree::new("Empty tree".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_empty_tree_when_rendering_then_placeholder() {
        let tree: Tree<String> = Tree::new();
        assert_eq!(tree.to_term_tree().to_string(), "Empty tree\n");
    }

    #[test]
    fn given_nested_tree_when_rendering_then_draws_branches() {
        let mut tree = Tree::new();
        let root = tree.append_child("root").unwrap();
        let a = tree.node_mut(root).unwrap().append_child("a").unwrap();
        tree.node_mut(a).unwrap().append_child("a1").unwrap();
        tree.node_mut(root).unwrap().append_child("b").unwrap();

        let rendered = tree.to_term_tree().to_string();

        assert_eq!(rendered, "root\n├── a\n│   └── a1\n└── b\n");
    }
}
