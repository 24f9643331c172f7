//! Storage: contiguous device memory with Arc-based sharing

use crate::dtype::Element;
use crate::error::Result;
use crate::runtime::Runtime;
use std::marker::PhantomData;
use std::sync::Arc;

/// Contiguous element buffer on a device
///
/// Storage wraps device memory with reference counting, enabling zero-copy
/// views that share the underlying buffer. Two handles referring to the
/// same buffer observe each other's writes.
///
/// Mutation is write-gated: callers must hold the only reference
/// ([`Storage::is_unique`]) before writing. The gate is an explicit check,
/// not a lock; violating it is a caller contract error.
///
/// Memory is deallocated when the last reference is dropped.
pub struct Storage<T: Element, R: Runtime> {
    inner: Arc<StorageInner<T, R>>,
}

struct StorageInner<T: Element, R: Runtime> {
    /// Raw device pointer (device address or CPU ptr cast to u64)
    ptr: u64,
    /// Number of elements (not bytes)
    len: usize,
    /// Device where memory is allocated
    device: R::Device,
    /// If true, we own this memory and deallocate on drop
    owned: bool,
    _elem: PhantomData<T>,
}

impl<T: Element, R: Runtime> Storage<T, R> {
    /// Allocate zero-initialized storage for `len` elements
    pub fn new_zeroed(len: usize, device: &R::Device) -> Result<Self> {
        let ptr = R::allocate(len * std::mem::size_of::<T>(), device)?;
        Ok(Self {
            inner: Arc::new(StorageInner {
                ptr,
                len,
                device: device.clone(),
                owned: true,
                _elem: PhantomData,
            }),
        })
    }

    /// Create storage holding a copy of `data`
    pub fn from_slice(data: &[T], device: &R::Device) -> Result<Self> {
        let bytes = bytemuck::cast_slice(data);
        let ptr = R::allocate(bytes.len(), device)?;
        R::copy_to_device(bytes, ptr, device)?;

        Ok(Self {
            inner: Arc::new(StorageInner {
                ptr,
                len: data.len(),
                device: device.clone(),
                owned: true,
                _elem: PhantomData,
            }),
        })
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Whether the storage holds no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// The device this storage lives on
    #[inline]
    pub fn device(&self) -> &R::Device {
        &self.inner.device
    }

    /// Number of handles sharing this buffer
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether this handle is the buffer's only owner
    ///
    /// The write gate: every mutation checks this first.
    #[inline]
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    /// Read one element at `index`
    ///
    /// `index` must be in bounds; callers derive it from a checked shape
    /// offset.
    pub(crate) fn read(&self, index: usize) -> Result<T> {
        debug_assert!(index < self.inner.len);
        let mut value = T::zeroed();
        let bytes = bytemuck::bytes_of_mut(&mut value);
        R::copy_from_device(self.addr_of(index), bytes, &self.inner.device)?;
        Ok(value)
    }

    /// Write one element at `index`
    ///
    /// Callers must hold the write gate; `index` must be in bounds.
    pub(crate) fn write(&self, index: usize, value: T) -> Result<()> {
        debug_assert!(index < self.inner.len);
        let bytes = bytemuck::bytes_of(&value);
        R::copy_to_device(bytes, self.addr_of(index), &self.inner.device)
    }

    /// Copy `count` elements starting at `offset` back to the host
    pub(crate) fn read_slice(&self, offset: usize, count: usize) -> Result<Vec<T>> {
        debug_assert!(offset + count <= self.inner.len);
        let mut result = vec![T::zeroed(); count];
        if count > 0 {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut result);
            R::copy_from_device(self.addr_of(offset), bytes, &self.inner.device)?;
        }
        Ok(result)
    }

    /// Copy the whole buffer back to the host
    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.read_slice(0, self.inner.len)
    }

    #[inline]
    fn addr_of(&self, index: usize) -> u64 {
        self.inner.ptr + (index * std::mem::size_of::<T>()) as u64
    }
}

impl<T: Element, R: Runtime> Clone for Storage<T, R> {
    /// Clone increments the reference count (zero-copy)
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element, R: Runtime> Drop for StorageInner<T, R> {
    fn drop(&mut self) {
        if self.owned && self.ptr != 0 {
            R::deallocate(
                self.ptr,
                self.len * std::mem::size_of::<T>(),
                &self.device,
            );
        }
    }
}

impl<T: Element, R: Runtime> std::fmt::Debug for Storage<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("ptr", &format!("0x{:x}", self.inner.ptr))
            .field("len", &self.inner.len)
            .field("refs", &Arc::strong_count(&self.inner))
            .finish()
    }
}

#[cfg(all(test, feature = "cpu"))]
mod tests {
    use super::*;
    use crate::runtime::cpu::{CpuDevice, CpuRuntime};

    #[test]
    fn test_from_slice_round_trip() {
        let device = CpuDevice::new();
        let storage = Storage::<f32, CpuRuntime>::from_slice(&[1.0, 2.0, 3.0], &device).unwrap();
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.to_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_clone_shares_buffer() {
        let device = CpuDevice::new();
        let a = Storage::<i32, CpuRuntime>::new_zeroed(4, &device).unwrap();
        assert!(a.is_unique());

        let b = a.clone();
        assert!(!a.is_unique());
        assert_eq!(a.ref_count(), 2);

        // writes through one handle are visible through the other
        a.write(2, 9).unwrap();
        assert_eq!(b.read(2).unwrap(), 9);

        drop(b);
        assert!(a.is_unique());
    }

    #[test]
    fn test_empty_storage() {
        let device = CpuDevice::new();
        let storage = Storage::<f64, CpuRuntime>::new_zeroed(0, &device).unwrap();
        assert!(storage.is_empty());
        assert!(storage.to_vec().unwrap().is_empty());
    }
}
