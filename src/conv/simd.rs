/// SIMD micro-kernels with NEON acceleration and scalar fallbacks.

// ── FP32 AXPY: c[j] += a_val * b[j] ──

#[cfg(all(target_arch = "aarch64", feature = "simd"))]
pub fn axpy_f32(c: &mut [f32], b: &[f32], a_val: f32) {
    use core::arch::aarch64::*;
    let len = c.len().min(b.len());
    let mut j = 0usize;
    // SAFETY: every 4-lane load/store stays below `len`, which bounds both slices.
    unsafe {
        let a_vec = vdupq_n_f32(a_val);
        while j + 4 <= len {
            let b_vec = vld1q_f32(b.as_ptr().add(j));
            let c_vec = vld1q_f32(c.as_ptr().add(j));
            let r = vfmaq_f32(c_vec, a_vec, b_vec);
            vst1q_f32(c.as_mut_ptr().add(j), r);
            j += 4;
        }
    }
    // scalar tail
    while j < len {
        c[j] += a_val * b[j];
        j += 1;
    }
}

#[cfg(not(all(target_arch = "aarch64", feature = "simd")))]
pub fn axpy_f32(c: &mut [f32], b: &[f32], a_val: f32) {
    for (c, &b) in c.iter_mut().zip(b) {
        *c += a_val * b;
    }
}
