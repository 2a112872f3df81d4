//! Graph node core shared by every lazily recorded operator.
//!
//! A [`GraphNode`] owns its operand edges, two structural fingerprints, an output shape, and
//! diagnostic metadata. Fingerprints are computed eagerly at construction:
//!
//! - the local hash mixes the operator tag with an operator-specific attribute seed;
//! - the subgraph hash folds every operand's [`Value::hash`] into the local hash, in argument
//!   order, so it identifies the entire computation rooted at the node.
//!
//! Shapes may be supplied up front or through a closure that runs on first access. Resolution goes
//! through the context's [`ShapeCache`](super::cache::ShapeCache) keyed by subgraph hash, so a
//! closure never runs when a structurally identical node already produced a shape. The subgraph
//! hash never depends on the shape, which means a shape closure must be a pure function of inputs
//! that are already folded into the hash.
//!
//! Concrete operators embed a `GraphNode` and implement [`Operator`]; the blanket [`Node`] impl then
//! exposes them through the generic node interface used for edges.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;
use once_cell::sync::OnceCell;
use smallvec::SmallVec;

use crate::error::IrError;

use super::context::IrContext;
use super::hashing::{hash_combine, hash_sequence, HashValue};
use super::metadata::NodeMetadata;
use super::op::OpKind;
use super::shape::{Shape, ShapeDescriptor};
use super::value::Value;

/// Shared pointer through which nodes reference each other.
pub type NodePtr = Arc<dyn Node>;

/// Deferred shape-inference rule. Runs at most once per node.
pub type ShapeFn = Box<dyn FnOnce() -> anyhow::Result<ShapeDescriptor> + Send>;

/// Operand list; most operators take at most four inputs.
pub type OpList = SmallVec<[Value; 4]>;

/// Generic interface of any node that can appear in a lazy graph.
pub trait Node: Any + Send + Sync + fmt::Debug {
    fn op(&self) -> &OpKind;

    fn operands(&self) -> &[Value];

    fn num_outputs(&self) -> usize;

    /// Local hash: operator identity plus attributes, independent of operands.
    fn node_hash(&self) -> HashValue;

    /// Subgraph hash identifying the whole computation rooted at this node.
    fn hash(&self) -> HashValue;

    fn metadata(&self) -> &NodeMetadata;

    fn as_any(&self) -> &dyn Any;

    /// Capability check for membership in the shape-carrying node family.
    fn as_graph_node(&self) -> Option<&GraphNode> {
        None
    }

    /// Builds an equivalent node (same operator and attributes) over different operands.
    ///
    /// Errors come from shape validation of the new operands. Passing an operand count the
    /// operator cannot take is a contract violation and panics.
    fn clone_with_operands(&self, operands: Vec<Value>) -> Result<NodePtr, IrError>;

    /// Human-readable summary used in diagnostics and graph dumps.
    fn describe(&self) -> String;
}

impl fmt::Display for dyn Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Implemented by concrete operators; each only supplies its attributes and a rebuild rule.
pub trait Operator: Any + Send + Sync + fmt::Debug {
    fn graph_node(&self) -> &GraphNode;

    /// Re-creates this operator over `operands`, keeping every attribute.
    ///
    /// Implementations panic when `operands` has a length the operator cannot take.
    fn with_operands(&self, operands: Vec<Value>) -> Result<NodePtr, IrError>;

    /// Writes operator attributes as `, name=value` pairs.
    fn fmt_attributes(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

impl<T: Operator> Node for T {
    fn op(&self) -> &OpKind {
        self.graph_node().op()
    }

    fn operands(&self) -> &[Value] {
        self.graph_node().operands()
    }

    fn num_outputs(&self) -> usize {
        self.graph_node().num_outputs()
    }

    fn node_hash(&self) -> HashValue {
        self.graph_node().node_hash()
    }

    fn hash(&self) -> HashValue {
        self.graph_node().hash()
    }

    fn metadata(&self) -> &NodeMetadata {
        self.graph_node().metadata()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_graph_node(&self) -> Option<&GraphNode> {
        Some(self.graph_node())
    }

    fn clone_with_operands(&self, operands: Vec<Value>) -> Result<NodePtr, IrError> {
        self.with_operands(operands)
    }

    fn describe(&self) -> String {
        OperatorSummary(self).to_string()
    }
}

struct OperatorSummary<'a, T: Operator>(&'a T);

impl<T: Operator> fmt::Display for OperatorSummary<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0
            .graph_node()
            .fmt_summary(f, |f| self.0.fmt_attributes(f))
    }
}

/// How a node obtains its output shape.
pub enum ShapeSource {
    /// Shape already known at construction.
    Known(ShapeDescriptor),
    /// Closure run on first shape access.
    Deferred(ShapeFn),
    /// No shape yet; one may be installed once via [`GraphNode::set_shape_deferred`].
    Unset,
}

impl ShapeSource {
    pub fn deferred<F>(shape_fn: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<ShapeDescriptor> + Send + 'static,
    {
        ShapeSource::Deferred(Box::new(shape_fn))
    }
}

impl fmt::Debug for ShapeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeSource::Known(shape) => f.debug_tuple("Known").field(shape).finish(),
            ShapeSource::Deferred(_) => f.write_str("Deferred"),
            ShapeSource::Unset => f.write_str("Unset"),
        }
    }
}

impl From<ShapeDescriptor> for ShapeSource {
    fn from(shape: ShapeDescriptor) -> Self {
        ShapeSource::Known(shape)
    }
}

impl From<Shape> for ShapeSource {
    fn from(shape: Shape) -> Self {
        ShapeSource::Known(shape.into())
    }
}

/// Assembles a [`GraphNode`]: operands, attribute seed, output count, and shape source.
#[derive(Debug)]
pub struct NodeBuilder {
    op: OpKind,
    operands: OpList,
    num_outputs: usize,
    hash_seed: HashValue,
    shape: ShapeSource,
    metadata: NodeMetadata,
    leaf: bool,
}

impl NodeBuilder {
    /// Starts a node for `op`, capturing the current scope and the caller's location.
    #[track_caller]
    pub fn new(op: OpKind) -> Self {
        NodeBuilder {
            op,
            operands: OpList::new(),
            num_outputs: 1,
            hash_seed: HashValue::default(),
            shape: ShapeSource::Unset,
            metadata: NodeMetadata::capture(),
            leaf: false,
        }
    }

    /// Starts an operand-less node whose local hash also covers `shape`.
    ///
    /// Leaves stand for data entering the graph, so two leaves only share a fingerprint when their
    /// shapes agree (or, in dynamic-shape mode, their ranks).
    #[track_caller]
    pub fn leaf(op: OpKind, shape: impl Into<ShapeDescriptor>) -> Self {
        let shape = shape.into();
        let num_outputs = shape.num_outputs();
        NodeBuilder {
            num_outputs,
            shape: ShapeSource::Known(shape),
            leaf: true,
            ..NodeBuilder::new(op)
        }
    }

    pub fn operand(mut self, operand: Value) -> Self {
        self.operands.push(operand);
        self
    }

    pub fn operands<I>(mut self, operands: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.operands.extend(operands);
        self
    }

    /// Sets the number of output slots. Panics on zero.
    pub fn num_outputs(mut self, num_outputs: usize) -> Self {
        assert!(num_outputs >= 1, "a node must produce at least one output");
        self.num_outputs = num_outputs;
        self
    }

    /// Operator-specific attribute hash (reduction mode, axis, sizes, ...).
    pub fn hash_seed(mut self, seed: HashValue) -> Self {
        self.hash_seed = seed;
        self
    }

    pub fn shape(mut self, shape: impl Into<ShapeDescriptor>) -> Self {
        self.shape = ShapeSource::Known(shape.into());
        self
    }

    pub fn shape_fn<F>(mut self, shape_fn: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<ShapeDescriptor> + Send + 'static,
    {
        self.shape = ShapeSource::deferred(shape_fn);
        self
    }

    pub fn shape_source(mut self, shape: ShapeSource) -> Self {
        self.shape = shape;
        self
    }

    pub fn metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Hashes the node and stores its shape source. Deferred shapes stay unresolved.
    ///
    /// Fails only when a known shape disagrees with the declared output count.
    pub fn build(self, ctx: &IrContext) -> Result<GraphNode, IrError> {
        let NodeBuilder {
            op,
            operands,
            num_outputs,
            hash_seed,
            shape,
            metadata,
            leaf,
        } = self;

        let (node_hash, dag_hash) = if leaf {
            assert!(operands.is_empty(), "leaf node {op} cannot take operands");
            let ShapeSource::Known(known) = &shape else {
                panic!("leaf node {op} requires a known shape");
            };
            let node_hash = hash_combine(
                hash_combine(op.hash(), known.fingerprint(ctx.dynamic_shapes())),
                hash_seed,
            );
            (node_hash, node_hash)
        } else {
            let node_hash = hash_combine(op.hash(), hash_seed);
            let dag_hash = hash_sequence(node_hash, operands.iter().map(Value::hash));
            (node_hash, dag_hash)
        };

        let (resolved, pending) = match shape {
            ShapeSource::Known(shape) => {
                check_arity(&op, num_outputs, &shape)?;
                (
                    OnceCell::with_value(Ok(Arc::new(shape))),
                    PendingShape {
                        shape_fn: None,
                        assigned: true,
                    },
                )
            }
            ShapeSource::Deferred(shape_fn) => (
                OnceCell::new(),
                PendingShape {
                    shape_fn: Some(shape_fn),
                    assigned: true,
                },
            ),
            ShapeSource::Unset => (
                OnceCell::new(),
                PendingShape {
                    shape_fn: None,
                    assigned: false,
                },
            ),
        };

        trace!("recorded {op} with hash {dag_hash}");
        Ok(GraphNode {
            op,
            operands,
            num_outputs,
            node_hash,
            dag_hash,
            context: ctx.clone(),
            metadata,
            pending: Mutex::new(pending),
            shape: resolved,
        })
    }

    /// Builds the node and resolves its shape immediately, surfacing inference failures.
    pub fn build_resolved(self, ctx: &IrContext) -> Result<GraphNode, IrError> {
        let node = self.build(ctx)?;
        node.ensure_shape()?;
        Ok(node)
    }
}

struct PendingShape {
    shape_fn: Option<ShapeFn>,
    assigned: bool,
}

pub struct GraphNode {
    op: OpKind,
    operands: OpList,
    num_outputs: usize,
    node_hash: HashValue,
    dag_hash: HashValue,
    context: IrContext,
    metadata: NodeMetadata,
    pending: Mutex<PendingShape>,
    shape: OnceCell<Result<Arc<ShapeDescriptor>, IrError>>,
}

impl GraphNode {
    pub fn op(&self) -> &OpKind {
        &self.op
    }

    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> &Value {
        &self.operands[index]
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn node_hash(&self) -> HashValue {
        self.node_hash
    }

    pub fn hash(&self) -> HashValue {
        self.dag_hash
    }

    pub fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    pub fn context(&self) -> &IrContext {
        &self.context
    }

    pub fn is_shape_resolved(&self) -> bool {
        matches!(self.shape.get(), Some(Ok(_)))
    }

    /// Resolves the output shape, running the deferred closure on a cache miss.
    ///
    /// A failed resolution is remembered: the closure is not retried and every later call
    /// returns the same error.
    pub fn try_shape(&self) -> Result<&ShapeDescriptor, IrError> {
        if self.shape.get().is_none() && !self.lock_pending().assigned {
            return Err(IrError::ShapeUnavailable {
                op: self.op.to_string(),
            });
        }
        match self.shape.get_or_init(|| self.resolve()) {
            Ok(shape) => Ok(shape.as_ref()),
            Err(err) => Err(err.clone()),
        }
    }

    /// Output shape of the node.
    ///
    /// Panics if the shape cannot be resolved; use [`GraphNode::try_shape`] where construction
    /// errors must be handled.
    pub fn shape(&self) -> &ShapeDescriptor {
        match self.try_shape() {
            Ok(shape) => shape,
            Err(err) => panic!("{err}"),
        }
    }

    /// Shape of output slot `index`.
    ///
    /// Panics when `index` is not a valid slot: only 0 for single-output nodes, `0..num_outputs`
    /// for tuple-shaped ones.
    pub fn output_shape(&self, index: usize) -> &Shape {
        self.shape().output(index)
    }

    pub fn try_output_shape(&self, index: usize) -> Result<&Shape, IrError> {
        Ok(self.try_shape()?.output(index))
    }

    /// Forces shape resolution, for constructors that must fail fast.
    pub fn ensure_shape(&self) -> Result<(), IrError> {
        self.try_shape().map(|_| ())
    }

    /// Installs the deferred shape closure of a node built without a shape source.
    ///
    /// A shape can be assigned only once; later attempts fail with
    /// [`IrError::ShapeAlreadySet`].
    pub fn set_shape_deferred<F>(&self, shape_fn: F) -> Result<(), IrError>
    where
        F: FnOnce() -> anyhow::Result<ShapeDescriptor> + Send + 'static,
    {
        let mut pending = self.lock_pending();
        if pending.assigned {
            return Err(IrError::ShapeAlreadySet {
                op: self.op.to_string(),
            });
        }
        pending.shape_fn = Some(Box::new(shape_fn));
        pending.assigned = true;
        Ok(())
    }

    /// Shape as rendered in summaries: the shape itself, `<invalid>` after a failed resolution, or
    /// `?` while still pending. Never triggers resolution.
    pub fn shape_label(&self) -> String {
        match self.shape.get() {
            Some(Ok(shape)) => shape.to_string(),
            Some(Err(_)) => "<invalid>".to_string(),
            None => "?".to_string(),
        }
    }

    /// Writes `shape op[, num_outputs=N]<attributes>[, scope=..][, location=..]`.
    ///
    /// Unresolved shapes render as `?`; rendering never triggers resolution.
    pub fn fmt_summary<F>(&self, f: &mut fmt::Formatter<'_>, attributes: F) -> fmt::Result
    where
        F: FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
    {
        write!(f, "{} {}", self.shape_label(), self.op)?;
        if self.num_outputs > 1 {
            write!(f, ", num_outputs={}", self.num_outputs)?;
        }
        attributes(f)?;
        self.metadata.write_summary(f)
    }

    fn resolve(&self) -> Result<Arc<ShapeDescriptor>, IrError> {
        let shape_fn = self.lock_pending().shape_fn.take();
        let shape_fn = shape_fn.ok_or_else(|| IrError::ShapeUnavailable {
            op: self.op.to_string(),
        })?;
        let shape = self
            .context
            .shape_cache()
            .get_or_try_insert_with(self.dag_hash, || {
                let shape = shape_fn().map_err(|err| IrError::ShapeInference {
                    op: self.op.to_string(),
                    message: format!("{err:#}"),
                })?;
                check_arity(&self.op, self.num_outputs, &shape)?;
                Ok(shape)
            })?;
        check_arity(&self.op, self.num_outputs, &shape)?;
        Ok(shape)
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingShape> {
        self.pending.lock().expect("pending shape poisoned")
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_summary(f, |_| Ok(()))
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("op", &self.op)
            .field("operands", &self.operands.len())
            .field("num_outputs", &self.num_outputs)
            .field("node_hash", &self.node_hash)
            .field("hash", &self.dag_hash)
            .field("shape", &self.shape.get())
            .finish()
    }
}

fn check_arity(op: &OpKind, num_outputs: usize, shape: &ShapeDescriptor) -> Result<(), IrError> {
    if shape.num_outputs() != num_outputs {
        return Err(IrError::OutputArity {
            op: op.to_string(),
            num_outputs,
            tuple_len: shape.num_outputs(),
        });
    }
    Ok(())
}
