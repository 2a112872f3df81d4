//! Operator nodes built on the shared [`GraphNode`](crate::ir::GraphNode) core.
//!
//! Each operator supplies only its attribute seed, its shape rule, and how to rebuild itself over
//! new operands. Hashing, shape caching, and diagnostics come from the core. Operators with
//! validation rules resolve their shape during construction so inconsistent operands are
//! rejected immediately; [`Generic`] keeps its shape deferred until first use.
mod generic;
mod leaf;
mod loss;
mod pooling;
mod softmax;

pub use generic::{same_as_operand, Generic, ShapeRule};
pub use leaf::{Constant, DeviceData, CONSTANT, DEVICE_DATA};
pub use loss::{BinaryCrossEntropyBackward, ReductionMode, BINARY_CROSS_ENTROPY_BACKWARD};
pub use pooling::{MaxUnpoolNdBackward, MAX_UNPOOL2D_BACKWARD, MAX_UNPOOL3D_BACKWARD};
pub use softmax::{LogSoftmaxBackward, LOG_SOFTMAX_BACKWARD};
