use std::fmt::Debug;
use std::ops::{Add, Mul};

use half::{bf16, f16};
use num_traits::Zero;

use crate::conv::simd;

/// Element type accepted by the patch-contraction backend.
///
/// Accumulation happens in `Self`: reduced-precision types accumulate in
/// reduced precision.
pub trait Scalar:
    Copy + Zero + Add<Output = Self> + Mul<Output = Self> + Send + Sync + Debug + 'static
{
    /// `acc[j] += alpha * rhs[j]` over the common length.
    #[inline]
    fn axpy(acc: &mut [Self], rhs: &[Self], alpha: Self) {
        for (c, &b) in acc.iter_mut().zip(rhs) {
            *c = *c + alpha * b;
        }
    }
}

impl Scalar for f32 {
    #[inline]
    fn axpy(acc: &mut [f32], rhs: &[f32], alpha: f32) {
        simd::axpy_f32(acc, rhs, alpha);
    }
}

impl Scalar for f64 {}
impl Scalar for i32 {}
impl Scalar for i64 {}
impl Scalar for f16 {}
impl Scalar for bf16 {}
