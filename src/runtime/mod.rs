//! Compute backend abstraction
//!
//! A [`Runtime`] owns raw allocation and host↔device transfer for one kind
//! of compute device; a [`Device`] identifies a concrete unit of that kind.
//! Containers and the evaluation engine are generic over `Runtime`, so the
//! category/shape logic can in principle back multiple device backends.
//! Only the in-process CPU reference backend is provided.

use crate::error::Result;

#[cfg(feature = "cpu")]
pub mod cpu;

/// Trait for device identification
pub trait Device: Clone + Send + Sync + 'static {
    /// Unique identifier for this device
    fn id(&self) -> usize;

    /// Check if two devices are the same
    fn is_same(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Human-readable name
    fn name(&self) -> String {
        format!("Device({})", self.id())
    }
}

/// Core trait for compute backends
///
/// `Runtime` abstracts over allocation and raw memory movement for a
/// device family. It uses static dispatch via generics for zero-cost
/// abstraction; operations address memory through opaque `u64` handles so
/// the same interface can describe host pointers and device addresses.
pub trait Runtime: Clone + Send + Sync + 'static {
    /// Device identifier type
    type Device: Device;

    /// Human-readable name of this runtime
    fn name() -> &'static str;

    /// Allocate zero-initialized device memory
    ///
    /// Returns a device pointer (u64). Allocating zero bytes returns the
    /// null handle 0, which is never dereferenced.
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64>;

    /// Deallocate device memory
    fn deallocate(ptr: u64, size_bytes: usize, device: &Self::Device);

    /// Copy data from host to device
    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()>;

    /// Copy data from device to host
    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()>;

    /// Copy data within the device
    fn copy_within_device(
        src: u64,
        dst: u64,
        size_bytes: usize,
        device: &Self::Device,
    ) -> Result<()>;

    /// Get the default device
    fn default_device() -> Self::Device;
}
