//! Deferred evaluation engine
//!
//! Expressions over containers are not computed where they are written.
//! Instead, every node — a leaf container, a growable batch, or an operator
//! node — registers interest in being evaluated with an [`EvalPlan`] and
//! gets back an [`EvalHandle`]. Running the plan walks the registered
//! dependency DAG once, materializing each node into fresh storage exactly
//! once no matter how many downstream expressions reference it.
//!
//! Per node, the plan tracks a three-state machine:
//! Unregistered (no entry) → Registered (enqueued) → Evaluated (cached).
//! Registration is post-order (operands before dependents) and idempotent
//! by node identity; reading a handle before the plan has run fails with
//! [`crate::error::Error::NotEvaluated`] rather than auto-running, so
//! callers decide when a batch of work executes.

mod node;
mod plan;

pub use node::ExprNode;
pub use plan::{EvalHandle, EvalPlan};

use crate::dtype::Element;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::shape::Shape;
use crate::tensor::StaticArray;
use std::rc::Rc;

/// Compute closure of an operator node
///
/// Invoked by the plan exactly once, after every operand has been
/// Evaluated; receives the operands in registration order and materializes
/// the result into freshly allocated storage.
pub type Kernel<T, R> = Rc<dyn Fn(&[StaticArray<T, R>]) -> Result<StaticArray<T, R>>>;

/// Anything that can participate in a lazy expression
///
/// Implemented by [`StaticArray`] (leaves), [`crate::batch::DynamicBatch`]
/// (snapshot gathers), and [`ExprNode`] (operator nodes). Implementations
/// must register their operands before themselves and must hand back the
/// existing handle when already registered.
pub trait EvalSource<T: Element, R: Runtime> {
    /// Shape of the value this source evaluates to
    fn shape(&self) -> Shape;

    /// Register this source (and, recursively, its operands) with the plan
    fn eval_register(&self, plan: &mut EvalPlan<T, R>) -> EvalHandle;
}
