//! Integration tests for the evaluation engine
//!
//! Tests verify:
//! - At-most-once evaluation per registered node (counting kernel)
//! - Idempotent registration and DAG-shaped reuse of subexpressions
//! - data() before eval() fails, after eval() succeeds idempotently
//! - A failed kernel aborts the pass without poisoning evaluated nodes

use std::cell::Cell;
use std::rc::Rc;

use tenq::error::Error;
use tenq::eval::{EvalPlan, EvalSource, ExprNode, Kernel};
use tenq::ops;
use tenq::runtime::cpu::{CpuDevice, CpuRuntime};
use tenq::shape::Shape;
use tenq::tensor::StaticArray;

type Arr = StaticArray<f32, CpuRuntime>;
type Src = Rc<dyn EvalSource<f32, CpuRuntime>>;

fn leaf(data: &[f32], device: &CpuDevice) -> Arr {
    StaticArray::from_slice(data, Shape::matrix(1, data.len()), device)
}

/// An identity node whose kernel counts its invocations
fn counting_identity(operand: Src, counter: Rc<Cell<usize>>) -> ExprNode<f32, CpuRuntime> {
    let shape = operand.shape();
    let out_shape = shape.clone();
    let kernel: Kernel<f32, CpuRuntime> = Rc::new(move |inputs| {
        counter.set(counter.get() + 1);
        let values = inputs[0].values()?;
        StaticArray::try_from_slice(&values, out_shape.clone(), inputs[0].device())
    });
    ExprNode::new(shape, vec![operand], kernel)
}

#[test]
fn test_double_registration_computes_once() {
    let device = CpuDevice::new();
    let counter = Rc::new(Cell::new(0));
    let node = counting_identity(
        Rc::new(leaf(&[1.0, 2.0, 3.0], &device)) as Src,
        Rc::clone(&counter),
    );

    let mut plan = EvalPlan::new();
    let h1 = node.eval_register(&mut plan);
    let h2 = node.eval_register(&mut plan);
    assert_eq!(h1, h2);

    plan.eval().unwrap();
    assert_eq!(counter.get(), 1);

    let d1 = h1.data(&plan).unwrap();
    let d2 = h2.data(&plan).unwrap();
    assert_eq!(d1, d2);
}

#[test]
fn test_shared_subexpression_evaluates_once() {
    let device = CpuDevice::new();
    let counter = Rc::new(Cell::new(0));

    let a = Rc::new(leaf(&[1.0, 2.0], &device)) as Src;
    let b = Rc::new(leaf(&[10.0, 20.0], &device)) as Src;

    // shared = count(a + b); referenced by two downstream expressions
    let sum = Rc::new(ops::add(a, b).unwrap()) as Src;
    let shared = Rc::new(counting_identity(sum, Rc::clone(&counter)));

    let left = ops::add(shared.clone() as Src, Rc::new(leaf(&[1.0, 1.0], &device)) as Src).unwrap();
    let right = ops::sub(shared as Src, Rc::new(leaf(&[1.0, 1.0], &device)) as Src).unwrap();

    let mut plan = EvalPlan::new();
    let hl = left.eval_register(&mut plan);
    let hr = right.eval_register(&mut plan);
    plan.eval().unwrap();

    assert_eq!(counter.get(), 1);
    assert_eq!(hl.data(&plan).unwrap().values().unwrap(), vec![12.0, 23.0]);
    assert_eq!(hr.data(&plan).unwrap().values().unwrap(), vec![10.0, 21.0]);
}

#[test]
fn test_data_before_eval_fails() {
    let device = CpuDevice::new();
    let a = leaf(&[1.0], &device);

    let mut plan = EvalPlan::new();
    let handle = a.eval_register(&mut plan);

    assert!(matches!(handle.data(&plan), Err(Error::NotEvaluated)));
    // the usage error is local: the plan still runs fine afterwards
    plan.eval().unwrap();
    assert_eq!(handle.data(&plan).unwrap(), a);
    // and repeated reads return equal data
    assert_eq!(handle.data(&plan).unwrap(), handle.data(&plan).unwrap());
}

#[test]
fn test_leaf_is_handed_back_not_recomputed() {
    let device = CpuDevice::new();
    let a = leaf(&[4.0, 5.0], &device);

    let mut plan = EvalPlan::new();
    let handle = a.eval_register(&mut plan);
    plan.eval().unwrap();

    // same storage: the realized leaf shares the original's buffer
    let realized = handle.data(&plan).unwrap();
    assert!(!a.available_for_write());
    drop(realized);
    assert_eq!(handle.data(&plan).unwrap(), a);
}

#[test]
fn test_op_shape_mismatch_rejected_at_construction() {
    let device = CpuDevice::new();
    let a = Rc::new(leaf(&[1.0, 2.0], &device)) as Src;
    let b = Rc::new(leaf(&[1.0, 2.0, 3.0], &device)) as Src;
    assert!(matches!(
        ops::add(a, b),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_elementwise_ops() {
    let device = CpuDevice::new();
    let a = Rc::new(leaf(&[5.0, 7.0, 9.0], &device)) as Src;
    let b = Rc::new(leaf(&[1.0, 2.0, 3.0], &device)) as Src;

    let diff = ops::sub(a.clone(), b.clone()).unwrap();
    let prod = ops::mul(a, b).unwrap();

    let mut plan = EvalPlan::new();
    let hd = diff.eval_register(&mut plan);
    let hp = prod.eval_register(&mut plan);
    plan.eval().unwrap();

    assert_eq!(hd.data(&plan).unwrap().values().unwrap(), vec![4.0, 5.0, 6.0]);
    assert_eq!(hp.data(&plan).unwrap().values().unwrap(), vec![5.0, 14.0, 27.0]);
}

#[test]
fn test_failed_kernel_does_not_poison_evaluated_nodes() {
    let device = CpuDevice::new();
    let good = leaf(&[1.0], &device);

    let failing_kernel: Kernel<f32, CpuRuntime> =
        Rc::new(|_inputs| Err(Error::internal("kernel exploded")));
    let bad = ExprNode::new(
        Shape::matrix(1, 1),
        vec![Rc::new(good.clone()) as Src],
        failing_kernel,
    );

    let mut plan = EvalPlan::new();
    let h_good = good.eval_register(&mut plan);
    let h_bad = bad.eval_register(&mut plan);

    assert!(plan.eval().is_err());

    // the operand leaf was evaluated before the failure and stays readable
    assert_eq!(h_good.data(&plan).unwrap(), good);
    // the failing node is still pending
    assert!(matches!(h_bad.data(&plan), Err(Error::NotEvaluated)));
    assert_eq!(plan.pending(), 1);
}

#[test]
fn test_incremental_registration_across_runs() {
    let device = CpuDevice::new();
    let counter = Rc::new(Cell::new(0));
    let first = counting_identity(
        Rc::new(leaf(&[1.0], &device)) as Src,
        Rc::clone(&counter),
    );

    let mut plan = EvalPlan::new();
    let h1 = first.eval_register(&mut plan);
    plan.eval().unwrap();
    assert_eq!(counter.get(), 1);

    // register more work and run again: the first node is not re-run
    let second = counting_identity(
        Rc::new(leaf(&[2.0], &device)) as Src,
        Rc::clone(&counter),
    );
    let h2 = second.eval_register(&mut plan);
    plan.eval().unwrap();

    assert_eq!(counter.get(), 2);
    assert_eq!(h1.data(&plan).unwrap().values().unwrap(), vec![1.0]);
    assert_eq!(h2.data(&plan).unwrap().values().unwrap(), vec![2.0]);
}

#[test]
fn test_handle_from_other_plan_is_unknown() {
    let device = CpuDevice::new();
    let a = leaf(&[1.0], &device);

    let mut plan_a = EvalPlan::new();
    let handle = a.eval_register(&mut plan_a);

    let plan_b = EvalPlan::<f32, CpuRuntime>::new();
    assert!(matches!(handle.data(&plan_b), Err(Error::UnknownNode)));
}
