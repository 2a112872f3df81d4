use std::any::Any;
use std::sync::Arc;

use anyhow::Result;
use lazy_ir::ir::hashing::{hash_str, HashValue};
use lazy_ir::ir::lookup::{self, downcast_node, graph_node, shape_of_node};
use lazy_ir::ir::{
    DType, GraphNode, IrContext, Node, NodeBuilder, NodeMetadata, NodePtr, OpKind, Operator,
    Shape, Value,
};
use lazy_ir::ops::{
    BinaryCrossEntropyBackward, DeviceData, Generic, LogSoftmaxBackward, MaxUnpoolNdBackward,
    ReductionMode, MAX_UNPOOL2D_BACKWARD, MAX_UNPOOL3D_BACKWARD,
};
use lazy_ir::IrError;

fn data(ctx: &IrContext, handle: u64, dtype: DType, dims: &[usize]) -> Result<Value> {
    Ok(DeviceData::new(ctx, handle, Shape::from_static(dtype, dims))?.into())
}

fn scalar_grad(ctx: &IrContext) -> Result<Value> {
    Ok(DeviceData::new(ctx, 0, Shape::scalar(DType::F32))?.into())
}

fn assert_inference_error(err: IrError, needle: &str) {
    match err {
        IrError::ShapeInference { message, .. } => {
            assert!(message.contains(needle), "{message:?} lacks {needle:?}")
        }
        other => panic!("expected a shape inference error, got {other:?}"),
    }
}

#[test]
fn bce_backward_takes_the_logits_shape() -> Result<()> {
    let ctx = IrContext::default();
    let logits = data(&ctx, 1, DType::F32, &[8, 4])?;
    let labels = data(&ctx, 2, DType::F32, &[8, 4])?;

    let mean = BinaryCrossEntropyBackward::new(
        &ctx,
        scalar_grad(&ctx)?,
        logits.clone(),
        labels.clone(),
        None,
        ReductionMode::Mean,
    )?;
    assert_eq!(
        mean.graph_node().output_shape(0),
        &Shape::from_static(DType::F32, &[8, 4])
    );
    assert!(mean.weight().is_none());

    let weighted = BinaryCrossEntropyBackward::new(
        &ctx,
        data(&ctx, 3, DType::F32, &[8, 4])?,
        logits,
        labels,
        Some(data(&ctx, 4, DType::F32, &[4])?),
        ReductionMode::None,
    )?;
    assert_eq!(weighted.operands().len(), 4);
    assert!(weighted.weight().is_some());
    assert_eq!(weighted.reduction(), ReductionMode::None);
    Ok(())
}

#[test]
fn bce_backward_rejects_inconsistent_operands() -> Result<()> {
    let ctx = IrContext::default();
    let logits = data(&ctx, 1, DType::F32, &[8, 4])?;

    let err = BinaryCrossEntropyBackward::new(
        &ctx,
        scalar_grad(&ctx)?,
        logits.clone(),
        data(&ctx, 2, DType::F32, &[8, 3])?,
        None,
        ReductionMode::Sum,
    )
    .unwrap_err();
    assert_inference_error(err, "does not match labels shape");

    let err = BinaryCrossEntropyBackward::new(
        &ctx,
        data(&ctx, 3, DType::F32, &[8, 4])?,
        logits.clone(),
        logits.clone(),
        None,
        ReductionMode::Mean,
    )
    .unwrap_err();
    assert_inference_error(err, "must be a scalar");

    let err = BinaryCrossEntropyBackward::new(
        &ctx,
        scalar_grad(&ctx)?,
        logits.clone(),
        logits,
        Some(data(&ctx, 4, DType::F32, &[2, 8, 4])?),
        ReductionMode::Mean,
    )
    .unwrap_err();
    assert_inference_error(err, "cannot broadcast");
    Ok(())
}

#[test]
fn reduction_mode_is_part_of_the_hash() -> Result<()> {
    let ctx = IrContext::default();
    let logits = data(&ctx, 1, DType::F32, &[8])?;
    let labels = data(&ctx, 2, DType::F32, &[8])?;
    let build = |reduction| {
        BinaryCrossEntropyBackward::new(
            &ctx,
            scalar_grad(&ctx).unwrap(),
            logits.clone(),
            labels.clone(),
            None,
            reduction,
        )
    };

    let mean = build(ReductionMode::Mean)?;
    let sum = build(ReductionMode::Sum)?;
    assert_ne!(mean.node_hash(), sum.node_hash());
    assert_eq!(mean.hash(), build(ReductionMode::Mean)?.hash());
    Ok(())
}

#[test]
fn log_softmax_backward_validates_dim() -> Result<()> {
    let ctx = IrContext::default();
    let grad = data(&ctx, 1, DType::F32, &[2, 5])?;
    let output = data(&ctx, 2, DType::F32, &[2, 5])?;
    let input = data(&ctx, 3, DType::F32, &[2, 5])?;

    let last = LogSoftmaxBackward::new(&ctx, grad.clone(), output.clone(), -1, input.clone())?;
    assert_eq!(last.dim(), -1);
    assert_eq!(
        last.graph_node().output_shape(0),
        &Shape::from_static(DType::F32, &[2, 5])
    );
    let first = LogSoftmaxBackward::new(&ctx, grad.clone(), output.clone(), 0, input.clone())?;
    assert_ne!(first.hash(), last.hash());

    let err = LogSoftmaxBackward::new(&ctx, grad.clone(), output, 2, input.clone()).unwrap_err();
    assert_inference_error(err, "dim 2 out of range for rank 2");

    let other = data(&ctx, 4, DType::F32, &[5, 2])?;
    let err = LogSoftmaxBackward::new(&ctx, grad, other, 1, input).unwrap_err();
    assert_inference_error(err, "does not match output shape");
    Ok(())
}

#[test]
fn max_unpool_backward_picks_op_from_spatial_rank() -> Result<()> {
    let ctx = IrContext::default();
    let input = data(&ctx, 1, DType::F32, &[1, 3, 4, 4])?;
    let indices = data(&ctx, 2, DType::Si64, &[1, 3, 4, 4])?;
    let grad = data(&ctx, 3, DType::F32, &[1, 3, 8, 8])?;

    let unpool2d =
        MaxUnpoolNdBackward::new(&ctx, grad, input.clone(), indices.clone(), vec![8, 8])?;
    assert_eq!(unpool2d.op().name(), MAX_UNPOOL2D_BACKWARD);
    assert_eq!(unpool2d.output_size(), &[8, 8]);
    assert_eq!(
        unpool2d.graph_node().output_shape(0),
        &Shape::from_static(DType::F32, &[1, 3, 4, 4])
    );

    let volume = data(&ctx, 4, DType::F32, &[1, 2, 2, 2, 2])?;
    let volume_indices = data(&ctx, 5, DType::Si64, &[1, 2, 2, 2, 2])?;
    let volume_grad = data(&ctx, 6, DType::F32, &[1, 2, 4, 4, 4])?;
    let unpool3d = MaxUnpoolNdBackward::new(
        &ctx,
        volume_grad,
        volume,
        volume_indices,
        vec![4, 4, 4],
    )?;
    assert_eq!(unpool3d.op().name(), MAX_UNPOOL3D_BACKWARD);
    Ok(())
}

#[test]
fn max_unpool_backward_rejects_bad_operands() -> Result<()> {
    let ctx = IrContext::default();
    let input = data(&ctx, 1, DType::F32, &[1, 3, 4, 4])?;
    let grad = data(&ctx, 3, DType::F32, &[1, 3, 8, 8])?;

    let err = MaxUnpoolNdBackward::new(
        &ctx,
        grad.clone(),
        input.clone(),
        data(&ctx, 2, DType::Si64, &[1, 3, 2, 2])?,
        vec![8, 8],
    )
    .unwrap_err();
    assert_inference_error(err, "indices shape");

    let err = MaxUnpoolNdBackward::new(&ctx, grad, input.clone(), input, vec![8]).unwrap_err();
    assert_inference_error(err, "output_size must have 2 or 3 entries");
    Ok(())
}

#[test]
fn clone_with_operands_matches_a_fresh_build() -> Result<()> {
    let ctx = IrContext::default();
    let logits = data(&ctx, 1, DType::F32, &[8])?;
    let labels = data(&ctx, 2, DType::F32, &[8])?;
    let bce = BinaryCrossEntropyBackward::new(
        &ctx,
        scalar_grad(&ctx)?,
        logits.clone(),
        labels.clone(),
        None,
        ReductionMode::Sum,
    )?;

    let same = bce.clone_with_operands(bce.operands().to_vec())?;
    assert_eq!(same.hash(), bce.hash());
    assert_eq!(same.node_hash(), bce.node_hash());
    let same = downcast_node::<BinaryCrossEntropyBackward>(&*same)?;
    assert_eq!(same.reduction(), ReductionMode::Sum);

    let swapped = bce.clone_with_operands(vec![scalar_grad(&ctx)?, labels, logits])?;
    assert_eq!(swapped.node_hash(), bce.node_hash());
    assert_ne!(swapped.hash(), bce.hash());

    let relu = Generic::unary(&ctx, OpKind::new("aten::relu"), data(&ctx, 9, DType::F32, &[3])?)?;
    let rebuilt = relu.clone_with_operands(vec![data(&ctx, 9, DType::F32, &[3])?])?;
    assert_eq!(rebuilt.hash(), relu.hash());
    assert_eq!(rebuilt.metadata(), relu.metadata());
    Ok(())
}

#[test]
fn downcast_reports_unexpected_operator() -> Result<()> {
    let ctx = IrContext::default();
    let x = data(&ctx, 1, DType::F32, &[2, 3])?;
    let softmax = LogSoftmaxBackward::new(&ctx, x.clone(), x.clone(), 1, x)?;
    let node: NodePtr = softmax;

    assert_eq!(downcast_node::<LogSoftmaxBackward>(&*node)?.dim(), 1);
    match downcast_node::<Generic>(&*node) {
        Err(IrError::UnexpectedOperator { op, expected }) => {
            assert_eq!(op, "aten::_log_softmax_backward_data");
            assert!(expected.ends_with("Generic"), "{expected}");
        }
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

/// Node produced outside the graph node family: it carries no shape.
#[derive(Debug)]
struct ForeignNode {
    op: OpKind,
    metadata: NodeMetadata,
}

impl ForeignNode {
    fn new() -> Arc<Self> {
        Arc::new(ForeignNode {
            op: OpKind::new("ext::opaque"),
            metadata: NodeMetadata::default(),
        })
    }
}

impl Node for ForeignNode {
    fn op(&self) -> &OpKind {
        &self.op
    }

    fn operands(&self) -> &[Value] {
        &[]
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn node_hash(&self) -> HashValue {
        hash_str("ext::opaque")
    }

    fn hash(&self) -> HashValue {
        self.node_hash()
    }

    fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_with_operands(&self, _operands: Vec<Value>) -> Result<NodePtr, IrError> {
        Ok(ForeignNode::new())
    }

    fn describe(&self) -> String {
        self.op.to_string()
    }
}

#[test]
fn foreign_nodes_have_no_shape() -> Result<()> {
    let ctx = IrContext::default();
    let foreign: NodePtr = ForeignNode::new();

    assert_eq!(
        graph_node(&*foreign).unwrap_err(),
        IrError::NotGraphNode {
            op: "ext::opaque".to_string()
        }
    );
    assert!(matches!(
        shape_of_node(&*foreign),
        Err(IrError::NotGraphNode { .. })
    ));
    assert!(matches!(
        lookup::set_shape_deferred(&foreign, || Ok(Shape::scalar(DType::F32).into())),
        Err(IrError::NotGraphNode { .. })
    ));

    let consumer = Generic::unary(&ctx, OpKind::new("aten::abs"), Value::new(foreign))?;
    let err = consumer.graph_node().try_shape().unwrap_err();
    assert_inference_error(err, "not part of the lazy IR node family");
    Ok(())
}

/// Operator whose shape is assigned after construction.
#[derive(Debug)]
struct Reshape {
    node: GraphNode,
}

impl Reshape {
    fn new(ctx: &IrContext, input: Value) -> Result<Arc<Self>> {
        let node = NodeBuilder::new(OpKind::new("aten::view"))
            .operand(input)
            .build(ctx)?;
        Ok(Arc::new(Reshape { node }))
    }
}

impl Operator for Reshape {
    fn graph_node(&self) -> &GraphNode {
        &self.node
    }

    fn with_operands(&self, mut operands: Vec<Value>) -> Result<NodePtr, IrError> {
        let node = NodeBuilder::new(self.node.op().clone())
            .operand(operands.remove(0))
            .build(self.node.context())?;
        Ok(Arc::new(Reshape { node }))
    }
}

#[test]
fn shape_can_be_installed_through_a_node_pointer() -> Result<()> {
    let ctx = IrContext::default();
    let x = data(&ctx, 1, DType::F32, &[2, 6])?;
    let view: NodePtr = Reshape::new(&ctx, x)?;

    assert!(matches!(
        shape_of_node(&*view),
        Err(IrError::ShapeUnavailable { .. })
    ));

    lookup::set_shape_deferred(&view, || Ok(Shape::from_static(DType::F32, &[3, 4]).into()))?;
    assert_eq!(
        shape_of_node(&*view)?.output(0),
        &Shape::from_static(DType::F32, &[3, 4])
    );
    assert!(matches!(
        lookup::set_shape_deferred(&view, || Ok(Shape::scalar(DType::F32).into())),
        Err(IrError::ShapeAlreadySet { .. })
    ));
    Ok(())
}

#[test]
#[should_panic(expected = "takes 3 operands")]
fn rebuilding_with_too_few_operands_panics() {
    let ctx = IrContext::default();
    let x = data(&ctx, 1, DType::F32, &[2, 3]).unwrap();
    let softmax = LogSoftmaxBackward::new(&ctx, x.clone(), x.clone(), 1, x.clone()).unwrap();
    let _ = softmax.clone_with_operands(vec![x.clone(), x]);
}

#[test]
#[should_panic(expected = "takes no operands")]
fn rebuilding_a_leaf_with_operands_panics() {
    let ctx = IrContext::default();
    let x = data(&ctx, 1, DType::F32, &[2]).unwrap();
    let leaf = DeviceData::new(&ctx, 2, Shape::from_static(DType::F32, &[2])).unwrap();
    let _ = leaf.clone_with_operands(vec![x]);
}
