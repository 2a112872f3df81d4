//! Checked conversions from generic node references to the shape-carrying node family.
//!
//! Graph edges are typed as [`dyn Node`](Node), and nodes contributed by other graph producers
//! need not carry a [`GraphNode`] core. These helpers return [`IrError::NotGraphNode`] in that
//! case rather than an absent result.

use crate::error::IrError;

use super::node::{GraphNode, Node, NodePtr};
use super::shape::{Shape, ShapeDescriptor};
use super::value::{Output, Value};

/// Returns the [`GraphNode`] core of `node`.
pub fn graph_node(node: &dyn Node) -> Result<&GraphNode, IrError> {
    node.as_graph_node().ok_or_else(|| IrError::NotGraphNode {
        op: node.op().to_string(),
    })
}

/// Downcasts `node` to the concrete operator type `T`.
pub fn downcast_node<T: Node>(node: &dyn Node) -> Result<&T, IrError> {
    node.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| IrError::UnexpectedOperator {
            op: node.op().to_string(),
            expected: std::any::type_name::<T>(),
        })
}

pub fn shape_of_node(node: &dyn Node) -> Result<&ShapeDescriptor, IrError> {
    graph_node(node)?.try_shape()
}

pub fn shape_of_output<'a>(output: &Output<'a>) -> Result<&'a Shape, IrError> {
    graph_node(output.node())?.try_output_shape(output.index())
}

pub fn shape_of_value(value: &Value) -> Result<&Shape, IrError> {
    graph_node(&**value.node())?.try_output_shape(value.index())
}

/// Installs a deferred shape closure on a node built without a shape source.
pub fn set_shape_deferred<F>(node: &NodePtr, shape_fn: F) -> Result<(), IrError>
where
    F: FnOnce() -> anyhow::Result<ShapeDescriptor> + Send + 'static,
{
    graph_node(&**node)?.set_shape_deferred(shape_fn)
}
