//! Handles addressing one output slot of a node.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::hashing::{hash_combine, hash_value, HashValue};
use super::node::{Node, NodePtr};

fn node_addr(node: &dyn Node) -> *const () {
    node as *const dyn Node as *const ()
}

/// Owning edge to the `index`-th output of a node.
///
/// Values keep their node alive; a node lives as long as any value or downstream node refers to
/// it. Two values are equal when they point at the same node and slot.
#[derive(Clone)]
pub struct Value {
    node: NodePtr,
    index: usize,
}

impl Value {
    /// Addresses output slot 0.
    pub fn new(node: NodePtr) -> Self {
        Value { node, index: 0 }
    }

    /// Addresses output slot `index`.
    ///
    /// Panics when the node has no such slot.
    pub fn with_index(node: NodePtr, index: usize) -> Self {
        assert!(
            index < node.num_outputs(),
            "output index {index} out of range for {} with {} outputs",
            node.op(),
            node.num_outputs()
        );
        Value { node, index }
    }

    pub fn node(&self) -> &NodePtr {
        &self.node
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Subgraph fingerprint of the producing node mixed with the output slot.
    pub fn hash(&self) -> HashValue {
        output_hash(&*self.node, self.index)
    }

    /// Borrowed, non-owning view of this value.
    pub fn output(&self) -> Output<'_> {
        Output {
            node: &*self.node,
            index: self.index,
        }
    }
}

impl<T: Node> From<Arc<T>> for Value {
    fn from(node: Arc<T>) -> Self {
        Value::new(node)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.output() == other.output()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(Value::hash(self).raw());
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("op", self.node.op())
            .field("index", &self.index)
            .field("hash", &Value::hash(self))
            .finish()
    }
}

/// Non-owning `(node, index)` key, used for lookups keyed by output rather than by node.
#[derive(Clone, Copy)]
pub struct Output<'a> {
    node: &'a dyn Node,
    index: usize,
}

impl<'a> Output<'a> {
    pub fn new(node: &'a dyn Node, index: usize) -> Self {
        Output { node, index }
    }

    pub fn node(&self) -> &'a dyn Node {
        self.node
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn hash(&self) -> HashValue {
        output_hash(self.node, self.index)
    }
}

impl PartialEq for Output<'_> {
    fn eq(&self, other: &Self) -> bool {
        node_addr(self.node) == node_addr(other.node) && self.index == other.index
    }
}

impl Eq for Output<'_> {}

impl Hash for Output<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(Output::hash(self).raw());
    }
}

impl fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output({}, index={})", self.node.op(), self.index)
    }
}

impl fmt::Display for Output<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, index={}", self.node.describe(), self.index)
    }
}

fn output_hash(node: &dyn Node, index: usize) -> HashValue {
    hash_combine(Node::hash(node), hash_value(&(index as u64)))
}

pub(crate) fn node_key(node: &dyn Node) -> usize {
    node_addr(node) as usize
}
