//! StaticArray: the fixed-shape container

use super::{NodeId, Storage};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::eval::{EvalHandle, EvalPlan, EvalSource};
use crate::runtime::Runtime;
use crate::shape::Shape;
use std::fmt;

/// Fixed-shape container: a shape plus a slice of contiguous storage
///
/// `StaticArray` is the concrete tensor type for every category. Its shape
/// is fully known and immutable at construction and always satisfies
/// `offset + shape.count() <= storage.len()`.
///
/// # Zero-copy views
///
/// [`StaticArray::view`] fixes the leading coordinate and returns a
/// rank-reduced container sharing the same storage at a shifted offset.
/// Views make the storage non-unique, which closes the write gate on both
/// handles until one of them is dropped.
///
/// # Lazy evaluation
///
/// A `StaticArray` is a leaf in the evaluation graph: registering it puts
/// an already-materialized entry into the plan, and running the plan hands
/// the same storage back without recomputation.
pub struct StaticArray<T: Element, R: Runtime> {
    /// Identity in the evaluation graph; shared by clones of this container
    id: NodeId,
    shape: Shape,
    storage: Storage<T, R>,
    /// Element offset of this view into the storage
    offset: usize,
}

impl<T: Element, R: Runtime> StaticArray<T, R> {
    /// Create a zero-filled container of the given shape
    pub fn try_new(shape: Shape, device: &R::Device) -> Result<Self> {
        let storage = Storage::new_zeroed(shape.count(), device)?;
        Ok(Self {
            id: NodeId::new(),
            shape,
            storage,
            offset: 0,
        })
    }

    /// Create a zero-filled container of the given shape
    ///
    /// # Panics
    ///
    /// Panics if allocation fails. For a fallible alternative, use
    /// [`Self::try_new`].
    pub fn new(shape: Shape, device: &R::Device) -> Self {
        Self::try_new(shape, device).expect("StaticArray::new failed")
    }

    /// Create a container holding a copy of `data`
    ///
    /// Fails if `data.len()` does not equal `shape.count()`.
    pub fn try_from_slice(data: &[T], shape: Shape, device: &R::Device) -> Result<Self> {
        if data.len() != shape.count() {
            return Err(Error::internal(format!(
                "data length {} does not match shape count {}",
                data.len(),
                shape.count()
            )));
        }
        let storage = Storage::from_slice(data, device)?;
        Ok(Self {
            id: NodeId::new(),
            shape,
            storage,
            offset: 0,
        })
    }

    /// Create a container holding a copy of `data`
    ///
    /// # Panics
    ///
    /// Panics if the data length and shape count disagree or allocation
    /// fails. For a fallible alternative, use [`Self::try_from_slice`].
    pub fn from_slice(data: &[T], shape: Shape, device: &R::Device) -> Self {
        Self::try_from_slice(data, shape, device).expect("StaticArray::from_slice failed")
    }

    /// Assemble a container from existing parts (views, evaluation results)
    pub(crate) fn from_parts(
        storage: Storage<T, R>,
        offset: usize,
        shape: Shape,
    ) -> Self {
        debug_assert!(offset + shape.count() <= storage.len());
        Self {
            id: NodeId::new(),
            shape,
            storage,
            offset,
        }
    }

    /// The shape of this container
    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Total element count
    #[inline]
    pub fn count(&self) -> usize {
        self.shape.count()
    }

    /// The device this container lives on
    #[inline]
    pub fn device(&self) -> &R::Device {
        self.storage.device()
    }

    /// This container's identity in the evaluation graph
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether the backing storage is uniquely owned and therefore writable
    #[inline]
    pub fn available_for_write(&self) -> bool {
        self.storage.is_unique()
    }

    /// Write one element at the given multi-index
    ///
    /// Out-of-bounds or wrong-arity coordinates fail with a recoverable
    /// error before anything is touched.
    ///
    /// # Panics
    ///
    /// Panics if the backing storage is shared with another owner. Aliased
    /// writes are a caller contract violation, not a recoverable condition.
    pub fn set_value(&mut self, value: T, coords: &[usize]) -> Result<()> {
        let pos = self.shape.offset_of(coords)?;
        assert!(
            self.available_for_write(),
            "set_value on shared storage ({} owners)",
            self.storage.ref_count()
        );
        self.storage.write(self.offset + pos, value)
    }

    /// Read one element at the given multi-index
    pub fn value(&self, coords: &[usize]) -> Result<T> {
        let pos = self.shape.offset_of(coords)?;
        self.storage.read(self.offset + pos)
    }

    /// Rank-reduced view at a leading index
    ///
    /// Shares storage with `self` (no copy). Batch indexing yields one
    /// cardinal item, sequence indexing yields the indexed step as a batch
    /// (prefix-summing the step lengths before `index`), batch-sequence
    /// indexing yields one sequence, and 3-D array / matrix indexing yield
    /// a page / row. Fails with [`Error::IndexOutOfBounds`] past the outer
    /// extent.
    pub fn view(&self, index: usize) -> Result<StaticArray<T, R>> {
        let (elem_offset, sub) = self.shape.sub_shape(index)?;
        Ok(Self::from_parts(
            self.storage.clone(),
            self.offset + elem_offset,
            sub,
        ))
    }

    /// Copy this container's elements back to the host
    pub fn values(&self) -> Result<Vec<T>> {
        self.storage.read_slice(self.offset, self.shape.count())
    }

    /// Register this container as a leaf of the evaluation plan
    ///
    /// Leaves are already materialized; running the plan transitions the
    /// entry to Evaluated by handing back this container's storage, never
    /// by recomputation.
    pub fn eval_register(&self, plan: &mut EvalPlan<T, R>) -> EvalHandle {
        plan.register_leaf(self)
    }
}

impl<T: Element, R: Runtime> Clone for StaticArray<T, R> {
    /// Clones share storage and evaluation identity (zero-copy)
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            shape: self.shape.clone(),
            storage: self.storage.clone(),
            offset: self.offset,
        }
    }
}

impl<T: Element, R: Runtime> PartialEq for StaticArray<T, R> {
    /// Shape equality and elementwise content equality
    fn eq(&self, other: &Self) -> bool {
        if self.shape != other.shape {
            return false;
        }
        match (self.values(), other.values()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: Element, R: Runtime> EvalSource<T, R> for StaticArray<T, R> {
    fn shape(&self) -> Shape {
        self.shape.clone()
    }

    fn eval_register(&self, plan: &mut EvalPlan<T, R>) -> EvalHandle {
        StaticArray::eval_register(self, plan)
    }
}

impl<T: Element + fmt::Debug, R: Runtime> fmt::Debug for StaticArray<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticArray")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .field("offset", &self.offset)
            .field("storage", &self.storage)
            .finish()
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
    fn test_matrix_set_get_round_trip() {
        let mut m = StaticArray::<f32, CpuRuntime>::new(Shape::matrix(3, 4), &device());
        for i in 0..3 {
            for j in 0..4 {
                m.set_value((i * 4 + j) as f32, &[i, j]).unwrap();
            }
        }
        for i in 0..3 {
            for j in 0..4 {
                assert_eq!(m.value(&[i, j]).unwrap(), (i * 4 + j) as f32);
            }
        }
    }

    #[test]
    fn test_three_d_page_view_round_trip() {
        let mut t = StaticArray::<i32, CpuRuntime>::new(Shape::three_d_array(2, 2, 3), &device());
        let mut c = 0;
        for p in 0..2 {
            for i in 0..2 {
                for j in 0..3 {
                    t.set_value(c, &[p, i, j]).unwrap();
                    c += 1;
                }
            }
        }

        let page = t.view(1).unwrap();
        assert_eq!(page.shape(), &Shape::matrix(2, 3));
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(page.value(&[i, j]).unwrap(), t.value(&[1, i, j]).unwrap());
            }
        }
        assert!(t.view(2).is_err());
    }

    #[test]
    fn test_oob_set_is_recoverable() {
        let mut m = StaticArray::<f32, CpuRuntime>::new(Shape::matrix(2, 2), &device());
        assert!(m.set_value(1.0, &[2, 0]).is_err());
        // the container is still usable afterwards
        m.set_value(1.0, &[1, 1]).unwrap();
        assert_eq!(m.value(&[1, 1]).unwrap(), 1.0);
    }

    #[test]
    #[should_panic(expected = "set_value on shared storage")]
    fn test_write_gate_panics_when_shared() {
        let mut m = StaticArray::<f32, CpuRuntime>::new(Shape::matrix(2, 2), &device());
        let _view = m.view(0).unwrap();
        let _ = m.set_value(1.0, &[0, 0]);
    }

    #[test]
    fn test_write_gate_reopens_after_view_drop() {
        let mut m = StaticArray::<f32, CpuRuntime>::new(Shape::matrix(2, 2), &device());
        {
            let view = m.view(0).unwrap();
            assert!(!m.available_for_write());
            assert!(!view.available_for_write());
        }
        assert!(m.available_for_write());
        m.set_value(5.0, &[0, 1]).unwrap();
    }

    #[test]
    fn test_elementwise_equality() {
        let d = device();
        let a = StaticArray::<f32, CpuRuntime>::from_slice(&[1.0, 2.0], Shape::matrix(1, 2), &d);
        let b = StaticArray::<f32, CpuRuntime>::from_slice(&[1.0, 2.0], Shape::matrix(1, 2), &d);
        let c = StaticArray::<f32, CpuRuntime>::from_slice(&[1.0, 3.0], Shape::matrix(1, 2), &d);
        let e = StaticArray::<f32, CpuRuntime>::from_slice(&[1.0, 2.0], Shape::matrix(2, 1), &d);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, e);
    }

    #[test]
    fn test_scalar_container() {
        let mut s = StaticArray::<f64, CpuRuntime>::new(Shape::scalar(), &device());
        s.set_value(2.5, &[]).unwrap();
        assert_eq!(s.value(&[]).unwrap(), 2.5);
        assert!(s.view(0).is_err());
    }
}
