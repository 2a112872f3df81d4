//! Catch-all operator driven by a shareable shape rule.

use std::fmt;
use std::sync::Arc;

use crate::error::IrError;
use crate::ir::hashing::HashValue;
use crate::ir::lookup::shape_of_value;
use crate::ir::node::{GraphNode, NodeBuilder, NodePtr, Operator};
use crate::ir::{IrContext, OpKind, ShapeDescriptor, Value};

/// Shape inference rule evaluated over a node's operands.
pub type ShapeRule = Arc<dyn Fn(&[Value]) -> anyhow::Result<ShapeDescriptor> + Send + Sync>;

/// Rule returning the shape of operand `index`.
pub fn same_as_operand(index: usize) -> ShapeRule {
    Arc::new(move |operands: &[Value]| -> anyhow::Result<ShapeDescriptor> {
        let operand = operands
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("operand {index} missing ({} given)", operands.len()))?;
        Ok(shape_of_value(operand)?.clone().into())
    })
}

/// Operator whose identity is just an [`OpKind`] plus an attribute seed.
///
/// Its shape is deferred: the rule runs the first time the shape is queried, unless the shape
/// cache already holds a shape for the same subgraph hash.
pub struct Generic {
    node: GraphNode,
    rule: ShapeRule,
    hash_seed: HashValue,
}

impl Generic {
    #[track_caller]
    pub fn new(
        ctx: &IrContext,
        op: OpKind,
        operands: Vec<Value>,
        rule: ShapeRule,
        num_outputs: usize,
        hash_seed: HashValue,
    ) -> Result<Arc<Self>, IrError> {
        Self::build(NodeBuilder::new(op), ctx, operands, rule, num_outputs, hash_seed)
    }

    /// Single-operand op whose output shape equals its input shape.
    #[track_caller]
    pub fn unary(ctx: &IrContext, op: OpKind, operand: Value) -> Result<Arc<Self>, IrError> {
        Self::new(
            ctx,
            op,
            vec![operand],
            same_as_operand(0),
            1,
            HashValue::default(),
        )
    }

    fn build(
        builder: NodeBuilder,
        ctx: &IrContext,
        operands: Vec<Value>,
        rule: ShapeRule,
        num_outputs: usize,
        hash_seed: HashValue,
    ) -> Result<Arc<Self>, IrError> {
        let deferred_rule = Arc::clone(&rule);
        let deferred_operands = operands.clone();
        let node = builder
            .operands(operands)
            .num_outputs(num_outputs)
            .hash_seed(hash_seed)
            .shape_fn(move || deferred_rule(&deferred_operands))
            .build(ctx)?;
        Ok(Arc::new(Generic {
            node,
            rule,
            hash_seed,
        }))
    }

    pub fn hash_seed(&self) -> HashValue {
        self.hash_seed
    }
}

impl Operator for Generic {
    fn graph_node(&self) -> &GraphNode {
        &self.node
    }

    fn with_operands(&self, operands: Vec<Value>) -> Result<NodePtr, IrError> {
        let builder =
            NodeBuilder::new(self.node.op().clone()).metadata(self.node.metadata().clone());
        let node = Self::build(
            builder,
            self.node.context(),
            operands,
            Arc::clone(&self.rule),
            self.node.num_outputs(),
            self.hash_seed,
        )?;
        Ok(node as NodePtr)
    }
}

impl fmt::Debug for Generic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generic")
            .field("node", &self.node)
            .field("hash_seed", &self.hash_seed)
            .finish()
    }
}
