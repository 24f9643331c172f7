//! Operator nodes: lazy composition of expressions

use super::{EvalHandle, EvalPlan, EvalSource, Kernel};
use crate::dtype::Element;
use crate::runtime::Runtime;
use crate::shape::Shape;
use crate::tensor::NodeId;
use std::rc::Rc;

/// An operator node in a lazy expression
///
/// Holds shared handles to its operands (any [`EvalSource`], including
/// other `ExprNode`s) plus the kernel closure to apply once they are
/// Evaluated. The output shape is fixed at construction: conformance and
/// broadcast rules belong to whoever builds the node (see [`crate::ops`]),
/// not to the engine.
///
/// Wrapping an `ExprNode` in an [`Rc`] and using it as the operand of
/// several downstream nodes forms a DAG; the shared node is still computed
/// only once per plan because registration is keyed on its identity.
pub struct ExprNode<T: Element, R: Runtime> {
    id: NodeId,
    shape: Shape,
    operands: Vec<Rc<dyn EvalSource<T, R>>>,
    kernel: Kernel<T, R>,
}

impl<T: Element, R: Runtime> ExprNode<T, R> {
    /// Create an operator node
    ///
    /// `shape` must be the shape of the kernel's result, computed by the
    /// caller from the operand shapes.
    pub fn new(
        shape: Shape,
        operands: Vec<Rc<dyn EvalSource<T, R>>>,
        kernel: Kernel<T, R>,
    ) -> Self {
        Self {
            id: NodeId::new(),
            shape,
            operands,
            kernel,
        }
    }

    /// This node's identity in the evaluation graph
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The output shape
    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of operands
    #[inline]
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Register this node and, recursively, its operands
    ///
    /// Operands are registered first (post-order), so by the time the
    /// plan's sweep reaches this node every operand is already Evaluated.
    /// Registering an already-registered node returns the existing handle.
    pub fn eval_register(&self, plan: &mut EvalPlan<T, R>) -> EvalHandle {
        let operand_ids: Vec<NodeId> = self
            .operands
            .iter()
            .map(|operand| operand.eval_register(plan).id())
            .collect();
        plan.register_compute(self.id, operand_ids, Rc::clone(&self.kernel))
    }
}

impl<T: Element, R: Runtime> EvalSource<T, R> for ExprNode<T, R> {
    fn shape(&self) -> Shape {
        self.shape.clone()
    }

    fn eval_register(&self, plan: &mut EvalPlan<T, R>) -> EvalHandle {
        ExprNode::eval_register(self, plan)
    }
}
