//! Shape descriptors attached to graph nodes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::hashing::{hash_combine, hash_str, hash_value, HashValue};

/// Scalar element types a lazy tensor can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum DType {
    I1,
    Si8,
    Ui8,
    Si16,
    Si32,
    Si64,
    Bf16,
    F16,
    F32,
    F64,
}

impl DType {
    pub fn as_str(self) -> &'static str {
        match self {
            DType::I1 => "i1",
            DType::Si8 => "si8",
            DType::Ui8 => "ui8",
            DType::Si16 => "si16",
            DType::Si32 => "si32",
            DType::Si64 => "si64",
            DType::Bf16 => "bf16",
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names a symbolic dynamic dimension (e.g. `?B`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimSymbol(Arc<str>);

impl DimSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for DimSymbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DimSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(DimSymbol::new(name))
    }
}

/// Represents a single axis extent in a tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic(DimSymbol),
}

impl Dimension {
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self::Dynamic(DimSymbol::new(name))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Static(value) => write!(f, "{value}"),
            Dimension::Dynamic(symbol) => write!(f, "?{}", symbol.as_str()),
        }
    }
}

/// Element type plus an ordered list of extents. Rank zero is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dtype: DType,
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dtype: DType, dims: impl Into<Vec<Dimension>>) -> Self {
        Shape {
            dtype,
            dims: dims.into(),
        }
    }

    pub fn scalar(dtype: DType) -> Self {
        Shape::new(dtype, Vec::new())
    }

    pub fn from_static(dtype: DType, dims: &[usize]) -> Self {
        Shape::new(
            dtype,
            dims.iter()
                .copied()
                .map(Dimension::Static)
                .collect::<Vec<_>>(),
        )
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (index, dim) in self.dims.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// Output shape of a node: a single array shape, or one shape per output slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeDescriptor {
    Array(Shape),
    Tuple(Vec<Shape>),
}

impl ShapeDescriptor {
    pub fn is_tuple(&self) -> bool {
        matches!(self, ShapeDescriptor::Tuple(_))
    }

    /// Number of output slots described.
    pub fn num_outputs(&self) -> usize {
        match self {
            ShapeDescriptor::Array(_) => 1,
            ShapeDescriptor::Tuple(shapes) => shapes.len(),
        }
    }

    pub fn tuple_shapes(&self) -> Option<&[Shape]> {
        match self {
            ShapeDescriptor::Array(_) => None,
            ShapeDescriptor::Tuple(shapes) => Some(shapes),
        }
    }

    /// Returns the shape of output slot `index`.
    ///
    /// Panics when `index` does not address an existing slot: a non-tuple descriptor only has
    /// slot 0, a tuple has `0..len`.
    pub fn output(&self, index: usize) -> &Shape {
        match self {
            ShapeDescriptor::Array(shape) => {
                assert_eq!(
                    index, 0,
                    "output index {index} requested from non-tuple shape {shape}"
                );
                shape
            }
            ShapeDescriptor::Tuple(shapes) => {
                assert!(
                    index < shapes.len(),
                    "output index {index} out of range for tuple shape with {} elements",
                    shapes.len()
                );
                &shapes[index]
            }
        }
    }

    /// Fingerprint used by leaf nodes, whose identity includes the data they were built from.
    ///
    /// With `rank_only`, dynamic-shape tracing hashes only ranks so that graphs recorded for
    /// different extents share a fingerprint.
    pub fn fingerprint(&self, rank_only: bool) -> HashValue {
        if !rank_only {
            return hash_str(&self.to_string());
        }
        match self {
            ShapeDescriptor::Array(shape) => hash_value(&shape.rank()),
            ShapeDescriptor::Tuple(shapes) => shapes.iter().fold(
                hash_value(&shapes.len()),
                |acc, shape| hash_combine(acc, hash_value(&shape.rank())),
            ),
        }
    }
}

impl From<Shape> for ShapeDescriptor {
    fn from(shape: Shape) -> Self {
        ShapeDescriptor::Array(shape)
    }
}

impl From<Vec<Shape>> for ShapeDescriptor {
    fn from(shapes: Vec<Shape>) -> Self {
        ShapeDescriptor::Tuple(shapes)
    }
}

impl fmt::Display for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeDescriptor::Array(shape) => write!(f, "{shape}"),
            ShapeDescriptor::Tuple(shapes) => {
                f.write_str("(")?;
                for (index, shape) in shapes.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{shape}")?;
                }
                f.write_str(")")
            }
        }
    }
}
