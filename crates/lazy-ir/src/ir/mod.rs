//! IR node core for deferred tensor computation.
//!
//! Operations on lazy tensors are recorded as nodes of a DAG instead of running immediately.
//! This module provides what every recorded operator shares:
//!
//! - [`hashing`]: order-sensitive fingerprint combinators;
//! - [`node`]: the [`GraphNode`] core with structural hashes and deferred shape resolution;
//! - [`cache`]: the bounded [`ShapeCache`] that lets structurally identical subgraphs share
//!   inferred shapes;
//! - [`value`]: [`Value`] edges and [`Output`] lookup keys addressing one output slot;
//! - [`lookup`]: checked access to shapes through generic node references;
//! - [`dump`]: post-order traversal and text rendering for diagnostics.
pub mod cache;
pub mod context;
pub mod dump;
pub mod hashing;
pub mod lookup;
pub mod metadata;
pub mod node;
pub mod op;
pub mod shape;
pub mod value;

pub use cache::{CacheStats, ShapeCache, DEFAULT_SHAPE_CACHE_CAPACITY};
pub use context::IrContext;
pub use hashing::HashValue;
pub use metadata::{current_scope, push_scope, with_scope, FrameInfo, NodeMetadata, ScopeGuard};
pub use node::{GraphNode, Node, NodeBuilder, NodePtr, OpList, Operator, ShapeFn, ShapeSource};
pub use op::OpKind;
pub use shape::{DType, DimSymbol, Dimension, Shape, ShapeDescriptor};
pub use value::{Output, Value};
