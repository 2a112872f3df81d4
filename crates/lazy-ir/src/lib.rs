//! Structurally hashed IR nodes for lazy tensor graphs.
//!
//! Tensor operations are recorded as [`Node`]s instead of executing eagerly. Each node carries a
//! subgraph hash identifying the computation rooted at it; that hash keys a bounded cache of
//! inferred shapes so that retracing the same computation never reruns shape inference.
//!
//! ```rust,ignore
//! let ctx = IrContext::default();
//! let x = DeviceData::new(&ctx, 0, Shape::from_static(DType::F32, &[2, 3]))?;
//! let y = Generic::unary(&ctx, OpKind::new("aten::neg"), x.into())?;
//! assert_eq!(y.graph_node().output_shape(0).rank(), 2);
//! ```
pub mod config;
pub mod error;
pub mod ir;
pub mod ops;

pub use config::IrConfig;
pub use error::{IrError, IrResult};
pub use ir::{
    DType, GraphNode, HashValue, IrContext, Node, NodeBuilder, NodePtr, OpKind, Operator, Output,
    Shape, ShapeCache, ShapeDescriptor, Value,
};
