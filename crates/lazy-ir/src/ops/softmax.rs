use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, ensure};

use crate::error::IrError;
use crate::ir::hashing::hash_value;
use crate::ir::lookup::shape_of_value;
use crate::ir::node::{GraphNode, NodeBuilder, NodePtr, Operator};
use crate::ir::{IrContext, OpKind, Value};

pub const LOG_SOFTMAX_BACKWARD: &str = "aten::_log_softmax_backward_data";

/// Gradient of `log_softmax` along `dim`.
///
/// Operands are `grad_output, output, self`. Negative dims count from the back.
#[derive(Debug)]
pub struct LogSoftmaxBackward {
    node: GraphNode,
    dim: i64,
}

impl LogSoftmaxBackward {
    #[track_caller]
    pub fn new(
        ctx: &IrContext,
        grad_output: Value,
        output: Value,
        dim: i64,
        input: Value,
    ) -> Result<Arc<Self>, IrError> {
        let builder = NodeBuilder::new(OpKind::new(LOG_SOFTMAX_BACKWARD));
        Self::build(builder, ctx, vec![grad_output, output, input], dim)
    }

    fn build(
        builder: NodeBuilder,
        ctx: &IrContext,
        operands: Vec<Value>,
        dim: i64,
    ) -> Result<Arc<Self>, IrError> {
        let inputs = operands.clone();
        let node = builder
            .operands(operands)
            .hash_seed(hash_value(&dim))
            .shape_fn(move || {
                let grad_output = shape_of_value(&inputs[0])?;
                let output = shape_of_value(&inputs[1])?;
                ensure!(
                    grad_output == output,
                    "grad_output shape {grad_output} does not match output shape {output}"
                );
                canonical_dim(dim, grad_output.rank())?;
                Ok(grad_output.clone().into())
            })
            .build_resolved(ctx)?;
        Ok(Arc::new(LogSoftmaxBackward { node, dim }))
    }

    pub fn dim(&self) -> i64 {
        self.dim
    }
}

impl Operator for LogSoftmaxBackward {
    fn graph_node(&self) -> &GraphNode {
        &self.node
    }

    /// Panics unless given exactly three operands.
    fn with_operands(&self, operands: Vec<Value>) -> Result<NodePtr, IrError> {
        assert_eq!(operands.len(), 3, "{LOG_SOFTMAX_BACKWARD} takes 3 operands");
        let builder =
            NodeBuilder::new(self.node.op().clone()).metadata(self.node.metadata().clone());
        let node = Self::build(builder, self.node.context(), operands, self.dim)?;
        Ok(node as NodePtr)
    }

    fn fmt_attributes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ", dim={}", self.dim)
    }
}

/// Maps `dim` into `0..rank`, treating rank-0 tensors as having one axis.
fn canonical_dim(dim: i64, rank: usize) -> anyhow::Result<usize> {
    let extent = rank.max(1) as i64;
    let canonical = if dim < 0 { dim + extent } else { dim };
    if !(0..extent).contains(&canonical) {
        return Err(anyhow!(
            "dim {dim} out of range for rank {rank} (expected [{}, {}])",
            -extent,
            extent - 1
        ));
    }
    Ok(canonical as usize)
}
