//! DynamicBatch: a growable batch assembled at evaluation time
//!
//! Elements are pushed one at a time into a host-side arena; nothing is
//! laid out contiguously until the batch passes through the evaluation
//! engine, which performs a single allocation sized to the final batch and
//! a sequential copy of every pushed element.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::eval::{EvalHandle, EvalPlan, EvalSource};
use crate::runtime::{Device, Runtime};
use crate::shape::{Shape, StepLens};
use crate::tensor::{NodeId, StaticArray};
use std::cell::Cell;

enum Mode {
    /// Every element has exactly the declared cardinal shape
    Uniform,
    /// Elements are sequences over the declared cardinal, each with its
    /// own per-step lengths
    Sequences,
}

/// Growable, write-only-until-finalized batch of elements
///
/// A `DynamicBatch` starts empty and accepts elements via
/// [`DynamicBatch::push_back`], copying each element's values into an
/// internal arena. It is never read element-wise directly: registering it
/// with an [`EvalPlan`] snapshots the elements pushed so far, and running
/// the plan flattens the snapshot into one immutable [`StaticArray`] batch.
///
/// Elements pushed after a registration are picked up only by a later,
/// independent registration; results realized from the same batch are
/// unrelated snapshots, not views of each other.
pub struct DynamicBatch<T: Element, R: Runtime> {
    cardinal: Shape,
    mode: Mode,
    /// Arena of pushed element values, in push order
    values: Vec<T>,
    /// Per-element step lengths (sequence mode only)
    seq_lens: Vec<StepLens>,
    batch_num: usize,
    device: R::Device,
    /// Last registration and the element count it snapshotted
    last_reg: Cell<Option<(NodeId, usize)>>,
}

impl<T: Element, R: Runtime> DynamicBatch<T, R> {
    /// A batch whose elements all share the fixed `cardinal` shape
    ///
    /// Evaluation yields a `Batch` container. Fails if `cardinal` is not a
    /// cardinal category.
    pub fn uniform(cardinal: Shape, device: &R::Device) -> Result<Self> {
        Self::with_mode(cardinal, device, Mode::Uniform)
    }

    /// A batch of variable-length sequences over the `cardinal` shape
    ///
    /// Evaluation yields a `BatchSequence` container. Fails if `cardinal`
    /// is not a cardinal category.
    pub fn sequences(cardinal: Shape, device: &R::Device) -> Result<Self> {
        Self::with_mode(cardinal, device, Mode::Sequences)
    }

    fn with_mode(cardinal: Shape, device: &R::Device, mode: Mode) -> Result<Self> {
        if !cardinal.category().is_cardinal() {
            return Err(Error::NonCardinalShape {
                category: cardinal.category(),
            });
        }
        Ok(Self {
            cardinal,
            mode,
            values: Vec::new(),
            seq_lens: Vec::new(),
            batch_num: 0,
            device: device.clone(),
            last_reg: Cell::new(None),
        })
    }

    /// Whether no elements have been pushed yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.batch_num == 0
    }

    /// Number of elements pushed so far
    #[inline]
    pub fn batch_num(&self) -> usize {
        self.batch_num
    }

    /// The declared per-element (or per-step) cardinal shape
    #[inline]
    pub fn cardinal(&self) -> &Shape {
        &self.cardinal
    }

    /// The batch shape as known so far
    pub fn shape(&self) -> Shape {
        match self.mode {
            Mode::Uniform => Shape::Batch {
                batch_num: self.batch_num,
                cardinal: Box::new(self.cardinal.clone()),
            },
            Mode::Sequences => Shape::BatchSequence {
                seq_lens: self.seq_lens.clone(),
                cardinal: Box::new(self.cardinal.clone()),
            },
        }
    }

    /// Append one element, copying its values into the arena
    ///
    /// O(element size); the final contiguous buffer is not allocated here.
    /// The element's shape must match the declared cardinal (uniform mode)
    /// or be a sequence over it (sequence mode); mismatches are rejected
    /// before anything is copied.
    pub fn push_back(&mut self, element: &StaticArray<T, R>) -> Result<()> {
        if !element.device().is_same(&self.device) {
            return Err(Error::DeviceMismatch);
        }

        match self.mode {
            Mode::Uniform => {
                if element.shape() != &self.cardinal {
                    return Err(Error::shape_mismatch(&self.cardinal, element.shape()));
                }
                self.values.extend(element.values()?);
            }
            Mode::Sequences => {
                let lens = match element.shape() {
                    Shape::Sequence { lens, cardinal } if **cardinal == self.cardinal => {
                        lens.clone()
                    }
                    other => {
                        return Err(Error::shape_mismatch(&self.expected_sequence(), other))
                    }
                };
                self.values.extend(element.values()?);
                self.seq_lens.push(lens);
            }
        }
        self.batch_num += 1;
        Ok(())
    }

    /// Append one scalar to a batch of scalar cardinal shape
    pub fn push_scalar(&mut self, value: T) -> Result<()> {
        match self.mode {
            Mode::Uniform if self.cardinal == Shape::Scalar => {
                self.values.push(value);
                self.batch_num += 1;
                Ok(())
            }
            _ => Err(Error::shape_mismatch(&self.cardinal, &Shape::Scalar)),
        }
    }

    /// Register a snapshot of the elements pushed so far
    ///
    /// Running the plan allocates the final batch in one piece and copies
    /// the snapshot into it. Registering again without interleaving pushes
    /// reuses the same plan node; after further pushes a fresh node is
    /// created so earlier snapshots stay untouched.
    pub fn eval_register(&self, plan: &mut EvalPlan<T, R>) -> EvalHandle {
        let id = match self.last_reg.get() {
            Some((id, count)) if count == self.batch_num => id,
            _ => {
                let id = NodeId::new();
                self.last_reg.set(Some((id, self.batch_num)));
                id
            }
        };
        plan.register_gather(id, self.shape(), self.values.clone(), self.device.clone())
    }

    fn expected_sequence(&self) -> Shape {
        Shape::Sequence {
            lens: StepLens::new(),
            cardinal: Box::new(self.cardinal.clone()),
        }
    }
}

impl<T: Element, R: Runtime> EvalSource<T, R> for DynamicBatch<T, R> {
    fn shape(&self) -> Shape {
        DynamicBatch::shape(self)
    }

    fn eval_register(&self, plan: &mut EvalPlan<T, R>) -> EvalHandle {
        DynamicBatch::eval_register(self, plan)
    }
}

#[cfg(all(test, feature = "cpu"))]
mod tests {
    use super::*;
    use crate::runtime::cpu::{CpuDevice, CpuRuntime};

    fn device() -> CpuDevice {
        CpuDevice::new()
    }

    #[test]
    fn test_starts_empty() {
        let batch =
            DynamicBatch::<f32, CpuRuntime>::uniform(Shape::matrix(2, 2), &device()).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.batch_num(), 0);
        assert_eq!(batch.shape().batch_num(), Some(0));
    }

    #[test]
    fn test_push_shape_mismatch_rejected() {
        let d = device();
        let mut batch = DynamicBatch::<f32, CpuRuntime>::uniform(Shape::matrix(2, 2), &d).unwrap();
        let wrong = StaticArray::<f32, CpuRuntime>::new(Shape::matrix(2, 3), &d);
        assert!(matches!(
            batch.push_back(&wrong),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_non_cardinal_rejected() {
        let d = device();
        let batch_shape = Shape::batch(2, Shape::scalar()).unwrap();
        assert!(DynamicBatch::<f32, CpuRuntime>::uniform(batch_shape, &d).is_err());
    }

    #[test]
    fn test_push_scalar_only_on_scalar_cardinal() {
        let d = device();
        let mut scalars = DynamicBatch::<i32, CpuRuntime>::uniform(Shape::scalar(), &d).unwrap();
        scalars.push_scalar(3).unwrap();
        scalars.push_scalar(8).unwrap();
        assert_eq!(scalars.batch_num(), 2);

        let mut mats = DynamicBatch::<i32, CpuRuntime>::uniform(Shape::matrix(1, 1), &d).unwrap();
        assert!(mats.push_scalar(3).is_err());
    }

    #[test]
    fn test_sequence_mode_collects_lens() {
        let d = device();
        let mut batch =
            DynamicBatch::<f32, CpuRuntime>::sequences(Shape::scalar(), &d).unwrap();

        let s0 = StaticArray::<f32, CpuRuntime>::from_slice(
            &[1.0, 2.0, 3.0],
            Shape::sequence(&[2, 1], Shape::scalar()).unwrap(),
            &d,
        );
        let s1 = StaticArray::<f32, CpuRuntime>::from_slice(
            &[4.0],
            Shape::sequence(&[1], Shape::scalar()).unwrap(),
            &d,
        );
        batch.push_back(&s0).unwrap();
        batch.push_back(&s1).unwrap();

        assert_eq!(batch.batch_num(), 2);
        assert_eq!(batch.shape().count(), 4);

        // a plain matrix is not a sequence element
        let m = StaticArray::<f32, CpuRuntime>::new(Shape::matrix(1, 1), &d);
        assert!(batch.push_back(&m).is_err());
    }
}
