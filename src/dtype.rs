//! Element trait for types that can populate tenq containers

use bytemuck::{Pod, Zeroable};
use std::ops::{Add, Div, Mul, Sub};

/// Trait for types that can be elements of a container
///
/// This trait connects Rust's numeric types to tenq's storage layer.
/// It's implemented for the common primitive numeric types.
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - Basic trait requirements
/// - `Pod + Zeroable` - Safe memory transmutation (bytemuck)
/// - `Add + Sub + Mul + Div` - Arithmetic operations (Output = Self)
/// - `PartialOrd` - Comparison, which also gives elementwise equality
pub trait Element:
    Copy
    + Send
    + Sync
    + Pod
    + Zeroable
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + PartialOrd
{
    /// Convert to f64 for generic numeric operations
    fn to_f64(self) -> f64;

    /// Convert from f64 to this type
    fn from_f64(v: f64) -> Self;

    /// Zero value
    fn zero() -> Self;

    /// One value
    fn one() -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $zero:expr, $one:expr) => {
        impl Element for $ty {
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $ty
            }

            #[inline]
            fn zero() -> Self {
                $zero
            }

            #[inline]
            fn one() -> Self {
                $one
            }
        }
    };
}

impl_element!(f64, 0.0, 1.0);
impl_element!(f32, 0.0, 1.0);
impl_element!(i64, 0, 1);
impl_element!(i32, 0, 1);
impl_element!(u32, 0, 1);
