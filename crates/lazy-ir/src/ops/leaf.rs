//! Operand-less nodes through which data enters a graph.

use std::fmt;
use std::sync::Arc;

use crate::error::IrError;
use crate::ir::hashing::hash_value;
use crate::ir::node::{GraphNode, NodeBuilder, NodePtr, Operator};
use crate::ir::{IrContext, OpKind, Shape, Value};

pub const CONSTANT: &str = "prim::Constant";
pub const DEVICE_DATA: &str = "lazy::device_data";

/// Scalar literal broadcast to `shape`.
#[derive(Debug)]
pub struct Constant {
    node: GraphNode,
    value: f64,
}

impl Constant {
    #[track_caller]
    pub fn new(ctx: &IrContext, value: f64, shape: Shape) -> Result<Arc<Self>, IrError> {
        let node = NodeBuilder::leaf(OpKind::new(CONSTANT), shape)
            .hash_seed(hash_value(&value.to_bits()))
            .build(ctx)?;
        Ok(Arc::new(Constant { node, value }))
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Operator for Constant {
    fn graph_node(&self) -> &GraphNode {
        &self.node
    }

    /// Panics when given any operand.
    fn with_operands(&self, operands: Vec<Value>) -> Result<NodePtr, IrError> {
        assert!(operands.is_empty(), "{CONSTANT} takes no operands");
        let node = NodeBuilder::leaf(self.node.op().clone(), self.node.output_shape(0).clone())
            .hash_seed(hash_value(&self.value.to_bits()))
            .metadata(self.node.metadata().clone())
            .build(self.node.context())?;
        Ok(Arc::new(Constant {
            node,
            value: self.value,
        }))
    }

    fn fmt_attributes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ", value={}", self.value)
    }
}

/// Reference to a tensor already resident on a device, identified by its handle id.
#[derive(Debug)]
pub struct DeviceData {
    node: GraphNode,
    handle: u64,
}

impl DeviceData {
    #[track_caller]
    pub fn new(ctx: &IrContext, handle: u64, shape: Shape) -> Result<Arc<Self>, IrError> {
        let node = NodeBuilder::leaf(OpKind::new(DEVICE_DATA), shape)
            .hash_seed(hash_value(&handle))
            .build(ctx)?;
        Ok(Arc::new(DeviceData { node, handle }))
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }
}

impl Operator for DeviceData {
    fn graph_node(&self) -> &GraphNode {
        &self.node
    }

    /// Panics when given any operand.
    fn with_operands(&self, operands: Vec<Value>) -> Result<NodePtr, IrError> {
        assert!(operands.is_empty(), "{DEVICE_DATA} takes no operands");
        let node = NodeBuilder::leaf(self.node.op().clone(), self.node.output_shape(0).clone())
            .hash_seed(hash_value(&self.handle))
            .metadata(self.node.metadata().clone())
            .build(self.node.context())?;
        Ok(Arc::new(DeviceData {
            node,
            handle: self.handle,
        }))
    }

    fn fmt_attributes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ", device_data=#{}", self.handle)
    }
}
