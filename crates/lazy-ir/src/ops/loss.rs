//! Gradient nodes of loss functions.

use std::fmt;
use std::sync::Arc;

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::error::IrError;
use crate::ir::hashing::hash_value;
use crate::ir::lookup::shape_of_value;
use crate::ir::node::{GraphNode, NodeBuilder, NodePtr, Operator};
use crate::ir::{IrContext, OpKind, Value};

pub const BINARY_CROSS_ENTROPY_BACKWARD: &str = "aten::binary_cross_entropy_backward";

/// How a loss reduces per-element values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionMode {
    None,
    Mean,
    Sum,
}

impl fmt::Display for ReductionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReductionMode::None => "none",
            ReductionMode::Mean => "mean",
            ReductionMode::Sum => "sum",
        };
        f.write_str(name)
    }
}

/// Gradient of binary cross entropy with respect to `logits`.
///
/// Operands are `grad_output, logits, labels` and an optional trailing `weight`.
#[derive(Debug)]
pub struct BinaryCrossEntropyBackward {
    node: GraphNode,
    reduction: ReductionMode,
}

impl BinaryCrossEntropyBackward {
    #[track_caller]
    pub fn new(
        ctx: &IrContext,
        grad_output: Value,
        logits: Value,
        labels: Value,
        weight: Option<Value>,
        reduction: ReductionMode,
    ) -> Result<Arc<Self>, IrError> {
        let mut operands = vec![grad_output, logits, labels];
        operands.extend(weight);
        let builder = NodeBuilder::new(OpKind::new(BINARY_CROSS_ENTROPY_BACKWARD));
        Self::build(builder, ctx, operands, reduction)
    }

    fn build(
        builder: NodeBuilder,
        ctx: &IrContext,
        operands: Vec<Value>,
        reduction: ReductionMode,
    ) -> Result<Arc<Self>, IrError> {
        let inputs = operands.clone();
        let node = builder
            .operands(operands)
            .hash_seed(hash_value(&reduction))
            .shape_fn(move || {
                let grad_output = shape_of_value(&inputs[0])?;
                let logits = shape_of_value(&inputs[1])?;
                let labels = shape_of_value(&inputs[2])?;
                ensure!(
                    logits == labels,
                    "logits shape {logits} does not match labels shape {labels}"
                );
                if let Some(weight) = inputs.get(3) {
                    let weight = shape_of_value(weight)?;
                    ensure!(
                        weight.rank() <= logits.rank(),
                        "weight shape {weight} cannot broadcast to logits shape {logits}"
                    );
                }
                match reduction {
                    ReductionMode::None => ensure!(
                        grad_output == logits,
                        "unreduced grad_output shape {grad_output} does not match logits shape {logits}"
                    ),
                    ReductionMode::Mean | ReductionMode::Sum => ensure!(
                        grad_output.rank() == 0,
                        "reduced grad_output must be a scalar, got {grad_output}"
                    ),
                }
                Ok(logits.clone().into())
            })
            .build_resolved(ctx)?;
        Ok(Arc::new(BinaryCrossEntropyBackward { node, reduction }))
    }

    pub fn reduction(&self) -> ReductionMode {
        self.reduction
    }

    pub fn weight(&self) -> Option<&Value> {
        self.node.operands().get(3)
    }
}

impl Operator for BinaryCrossEntropyBackward {
    fn graph_node(&self) -> &GraphNode {
        &self.node
    }

    /// Panics unless given three operands, or four with a weight.
    fn with_operands(&self, operands: Vec<Value>) -> Result<NodePtr, IrError> {
        assert!(
            matches!(operands.len(), 3 | 4),
            "{BINARY_CROSS_ENTROPY_BACKWARD} takes 3 or 4 operands, got {}",
            operands.len()
        );
        let builder =
            NodeBuilder::new(self.node.op().clone()).metadata(self.node.metadata().clone());
        let node = Self::build(builder, self.node.context(), operands, self.reduction)?;
        Ok(node as NodePtr)
    }

    fn fmt_attributes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ", reduction={}", self.reduction)
    }
}
