//! Error types for tenq

use crate::shape::{Category, Shape};
use thiserror::Error;

/// Result type alias using tenq's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tenq operations
#[derive(Error, Debug)]
pub enum Error {
    /// Shape mismatch between an expected and an actual shape
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Shape,
        /// Actual shape
        got: Shape,
    },

    /// Leading index past the outer extent of a container
    #[error("Index {index} out of bounds for outer extent {extent}")]
    IndexOutOfBounds {
        /// The invalid index
        index: usize,
        /// Outer extent (batch size, step count, pages, or rows)
        extent: usize,
    },

    /// One coordinate of a multi-index past its axis extent
    #[error("Coordinate {index} out of bounds for axis {axis} with extent {extent}")]
    CoordOutOfBounds {
        /// Axis position within the multi-index
        axis: usize,
        /// The invalid coordinate
        index: usize,
        /// Extent of the axis
        extent: usize,
    },

    /// Multi-index with the wrong number of coordinates for a shape
    #[error("Coordinate rank mismatch: shape expects {expected} coordinates, got {got}")]
    CoordRank {
        /// Coordinates required by the shape
        expected: usize,
        /// Coordinates supplied
        got: usize,
    },

    /// A batch or sequence wrapper was given a non-cardinal item shape
    #[error("Category {category:?} cannot be the cardinal of a batch or sequence")]
    NonCardinalShape {
        /// Category of the offending shape
        category: Category,
    },

    /// Device mismatch between operands
    #[error("Device mismatch: containers must live on the same device")]
    DeviceMismatch,

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// A handle's result was read before the plan evaluated its node
    #[error("Node not evaluated: run EvalPlan::eval() before reading the handle")]
    NotEvaluated,

    /// A handle refers to a node the plan has never registered
    #[error("Unknown node: handle does not belong to this plan")]
    UnknownNode,

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &Shape, got: &Shape) -> Self {
        Self::ShapeMismatch {
            expected: expected.clone(),
            got: got.clone(),
        }
    }

    /// Create an out-of-bounds error for a leading index
    pub fn index_oob(index: usize, extent: usize) -> Self {
        Self::IndexOutOfBounds { index, extent }
    }

    /// Create an internal error from any displayable value
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
