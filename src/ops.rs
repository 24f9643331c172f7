//! Elementwise operator constructors
//!
//! Concrete instances of the operator-node contract. Conformance rules
//! live here, with the operator: both operands must have identical shapes,
//! checked before any node (or memory) is created. The evaluation engine
//! only sees the finished [`ExprNode`].

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::eval::{EvalSource, ExprNode, Kernel};
use crate::runtime::Runtime;
use crate::tensor::StaticArray;
use std::rc::Rc;

/// Lazy elementwise addition of two same-shape operands
pub fn add<T: Element, R: Runtime>(
    lhs: Rc<dyn EvalSource<T, R>>,
    rhs: Rc<dyn EvalSource<T, R>>,
) -> Result<ExprNode<T, R>> {
    binary(lhs, rhs, |a, b| a + b)
}

/// Lazy elementwise subtraction of two same-shape operands
pub fn sub<T: Element, R: Runtime>(
    lhs: Rc<dyn EvalSource<T, R>>,
    rhs: Rc<dyn EvalSource<T, R>>,
) -> Result<ExprNode<T, R>> {
    binary(lhs, rhs, |a, b| a - b)
}

/// Lazy elementwise multiplication of two same-shape operands
pub fn mul<T: Element, R: Runtime>(
    lhs: Rc<dyn EvalSource<T, R>>,
    rhs: Rc<dyn EvalSource<T, R>>,
) -> Result<ExprNode<T, R>> {
    binary(lhs, rhs, |a, b| a * b)
}

fn binary<T: Element, R: Runtime>(
    lhs: Rc<dyn EvalSource<T, R>>,
    rhs: Rc<dyn EvalSource<T, R>>,
    op: fn(T, T) -> T,
) -> Result<ExprNode<T, R>> {
    let shape = lhs.shape();
    let rhs_shape = rhs.shape();
    if shape != rhs_shape {
        return Err(Error::shape_mismatch(&shape, &rhs_shape));
    }

    let out_shape = shape.clone();
    let kernel: Kernel<T, R> = Rc::new(move |inputs: &[StaticArray<T, R>]| {
        let (a, b) = match inputs {
            [a, b] => (a, b),
            _ => return Err(Error::internal("binary kernel expects two operands")),
        };
        let av = a.values()?;
        let bv = b.values()?;
        let out: Vec<T> = av.iter().zip(bv.iter()).map(|(&x, &y)| op(x, y)).collect();
        StaticArray::try_from_slice(&out, out_shape.clone(), a.device())
    });

    Ok(ExprNode::new(shape, vec![lhs, rhs], kernel))
}
