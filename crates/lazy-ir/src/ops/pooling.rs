use std::fmt;
use std::sync::Arc;

use anyhow::ensure;

use crate::error::IrError;
use crate::ir::hashing::hash_value;
use crate::ir::lookup::shape_of_value;
use crate::ir::node::{GraphNode, NodeBuilder, NodePtr, Operator};
use crate::ir::{IrContext, OpKind, Value};

pub const MAX_UNPOOL2D_BACKWARD: &str = "aten::max_unpool2d_backward";
pub const MAX_UNPOOL3D_BACKWARD: &str = "aten::max_unpool3d_backward";

/// Gradient of 2d/3d max-unpooling with respect to its input.
///
/// Operands are `grad_output, input, indices`; the spatial rank follows `output_size`.
#[derive(Debug)]
pub struct MaxUnpoolNdBackward {
    node: GraphNode,
    output_size: Vec<usize>,
}

impl MaxUnpoolNdBackward {
    #[track_caller]
    pub fn new(
        ctx: &IrContext,
        grad_output: Value,
        input: Value,
        indices: Value,
        output_size: Vec<usize>,
    ) -> Result<Arc<Self>, IrError> {
        let builder = NodeBuilder::new(op_for(&output_size));
        Self::build(builder, ctx, vec![grad_output, input, indices], output_size)
    }

    fn build(
        builder: NodeBuilder,
        ctx: &IrContext,
        operands: Vec<Value>,
        output_size: Vec<usize>,
    ) -> Result<Arc<Self>, IrError> {
        let inputs = operands.clone();
        let spatial = output_size.clone();
        let node = builder
            .operands(operands)
            .hash_seed(hash_value(&output_size))
            .shape_fn(move || {
                ensure!(
                    matches!(spatial.len(), 2 | 3),
                    "output_size must have 2 or 3 entries, got {spatial:?}"
                );
                let grad_output = shape_of_value(&inputs[0])?;
                let input = shape_of_value(&inputs[1])?;
                let indices = shape_of_value(&inputs[2])?;
                ensure!(
                    input.rank() > spatial.len(),
                    "input shape {input} has too few dims for output_size {spatial:?}"
                );
                ensure!(
                    indices.dims() == input.dims(),
                    "indices shape {indices} does not match input shape {input}"
                );
                ensure!(
                    grad_output.rank() == input.rank(),
                    "grad_output shape {grad_output} does not match input rank {}",
                    input.rank()
                );
                Ok(input.clone().into())
            })
            .build_resolved(ctx)?;
        Ok(Arc::new(MaxUnpoolNdBackward { node, output_size }))
    }

    pub fn output_size(&self) -> &[usize] {
        &self.output_size
    }
}

impl Operator for MaxUnpoolNdBackward {
    fn graph_node(&self) -> &GraphNode {
        &self.node
    }

    /// Panics unless given exactly three operands.
    fn with_operands(&self, operands: Vec<Value>) -> Result<NodePtr, IrError> {
        assert_eq!(
            operands.len(),
            3,
            "{} takes 3 operands",
            self.node.op()
        );
        let builder =
            NodeBuilder::new(self.node.op().clone()).metadata(self.node.metadata().clone());
        let node = Self::build(
            builder,
            self.node.context(),
            operands,
            self.output_size.clone(),
        )?;
        Ok(node as NodePtr)
    }

    fn fmt_attributes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ", output_size={:?}", self.output_size)
    }
}

fn op_for(output_size: &[usize]) -> OpKind {
    if output_size.len() == 3 {
        OpKind::new(MAX_UNPOOL3D_BACKWARD)
    } else {
        OpKind::new(MAX_UNPOOL2D_BACKWARD)
    }
}
