#![allow(dead_code)]

use ntree::util::testing;
use ntree::{NodeHandle, Tree};

//            F
//        /     \
//      B         G
//    /   \         \
//  A       D        I
//        /   \        \
//      C       E       H
pub const EXPECTED: &str = "F
    B
        A
        D
            C
            E
    G
        I
            H";

pub struct Sample {
    pub tree: Tree<String>,
    pub a: NodeHandle,
    pub b: NodeHandle,
    pub c: NodeHandle,
    pub d: NodeHandle,
    pub e: NodeHandle,
    pub f: NodeHandle,
    pub g: NodeHandle,
    pub h: NodeHandle,
    pub i: NodeHandle,
}

impl Sample {
    /// Id of a node that is still attached.
    pub fn id(&self, handle: NodeHandle) -> String {
        self.tree.node(handle).unwrap().id().to_string()
    }
}

fn add(tree: &mut Tree<String>, parent: NodeHandle, value: &str) -> NodeHandle {
    tree.node_mut(parent)
        .unwrap()
        .append_child(value.to_string())
        .unwrap()
}

pub fn sample_tree(readonly: bool) -> Sample {
    testing::init_test_setup();
    let mut tree = Tree::new();
    let f = tree.append_child("F".to_string()).unwrap();
    let b = add(&mut tree, f, "B");
    let g = add(&mut tree, f, "G");
    let a = add(&mut tree, b, "A");
    let d = add(&mut tree, b, "D");
    let c = add(&mut tree, d, "C");
    let e = add(&mut tree, d, "E");
    let i = add(&mut tree, g, "I");
    let h = add(&mut tree, i, "H");
    let tree = Tree::from_subtree(tree, readonly);
    Sample {
        tree,
        a,
        b,
        c,
        d,
        e,
        f,
        g,
        h,
        i,
    }
}

pub fn values<'a>(nodes: impl Iterator<Item = ntree::NodeRef<'a, String>>) -> String {
    nodes.map(|n| n.value().as_str()).collect()
}
