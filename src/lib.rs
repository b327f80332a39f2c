//! Mutable, ordered N-ary tree.
//!
//! A [`Tree`] owns its nodes in a generational arena. Nodes are addressed by
//! stable string ids ([`NodeId`]) or by copyable [`NodeHandle`]s, and support
//! structural mutation (insert, remove, move, copy, reorder), traversal and
//! search, and a lossless `{id, value, children}` snapshot format.
//!
//! ```
//! use ntree::Tree;
//!
//! let mut tree = Tree::new();
//! let a = tree.append_child("A").unwrap();
//! let aa = tree.append_child("AA").unwrap();
//! let aaa = tree.node_mut(aa).unwrap().append_child("AAA").unwrap();
//!
//! let id = tree.node(aaa).unwrap().id().clone();
//! assert_eq!(tree.find_lca(id.as_str(), id.as_str()).unwrap().handle(), aaa);
//! assert_eq!(tree.size(Some(a)), 3);
//! assert_eq!(tree.to_string(), "A\n    AA\n        AAA");
//! ```

pub mod arena;
pub mod config;
pub mod error;
pub mod id;
pub mod node;
pub mod snapshot;
pub mod tree;
pub mod tree_traits;
pub mod util;

pub use config::Settings;
pub use error::{TreeError, TreeResult};
pub use id::{IdGenerator, NodeId};
pub use node::{Child, NodeHandle, NodeMut, NodeRef};
pub use snapshot::Snapshot;
pub use tree::Tree;
pub use tree_traits::ToTermTree;
