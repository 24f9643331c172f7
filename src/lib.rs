//! # tenq
//!
//! **A lazy tensor-evaluation substrate.**
//!
//! tenq provides category-tagged numeric containers (scalars, matrices, 3-D
//! arrays, and their batched / variable-length sequence counterparts), a
//! growable batch container, and a deferred evaluation engine that turns
//! expressions over these containers into explicitly scheduled computations.
//!
//! ## Why tenq?
//!
//! - **Closed category model**: Scalar, Matrix, ThreeDArray and their Batch /
//!   Sequence wrappers share one [`Shape`](shape::Shape) type, so rank-polymorphic
//!   code is written once against capability predicates instead of per-rank.
//! - **Lazy by default**: expressions register work with an
//!   [`EvalPlan`](eval::EvalPlan); nothing is materialized until the plan runs,
//!   and every unique node is computed at most once per plan.
//! - **Zero-copy views**: indexing a batch, sequence, or 3-D array yields a
//!   view sharing the underlying reference-counted storage.
//! - **Explicit write gating**: storage mutation is only permitted through a
//!   uniquely owned handle, checked before every write.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tenq::prelude::*;
//!
//! let device = CpuDevice::new();
//! let mut batch = DynamicBatch::<f32, CpuRuntime>::uniform(Shape::matrix(10, 20), &device)?;
//! batch.push_back(&m0)?;
//! batch.push_back(&m1)?;
//!
//! let mut plan = EvalPlan::new();
//! let handle = batch.eval_register(&mut plan);
//! plan.eval()?;
//! let realized = handle.data(&plan)?;
//! assert_eq!(realized.shape().batch_num(), Some(2));
//! ```
//!
//! ## Feature Flags
//!
//! - `cpu` (default): the reference in-process compute backend

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod dtype;
pub mod error;
pub mod eval;
pub mod ops;
pub mod runtime;
pub mod shape;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::DynamicBatch;
    pub use crate::dtype::Element;
    pub use crate::error::{Error, Result};
    pub use crate::eval::{EvalHandle, EvalPlan, EvalSource, ExprNode};
    pub use crate::runtime::{Device, Runtime};
    pub use crate::shape::{Category, Shape};
    pub use crate::tensor::{NodeId, StaticArray};

    #[cfg(feature = "cpu")]
    pub use crate::runtime::cpu::{CpuDevice, CpuRuntime};
}

/// Default runtime based on enabled features
#[cfg(feature = "cpu")]
pub type DefaultRuntime = runtime::cpu::CpuRuntime;
