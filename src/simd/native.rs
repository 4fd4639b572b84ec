// src/simd/native.rs

use crate::simd::{Predicate, VectorOps};

use safe_arch::*;

/// Native SIMD back-end for x86_64: 128-bit SSE2 registers via `safe_arch`.
pub struct NativeVector;

/// SSE2 has no unsigned byte compare, so both operands are biased into
/// the signed range before the signed compare.
#[inline]
fn bias(v: m128i) -> m128i {
    add_i8_m128i(v, set_splat_i8_m128i(-128))
}

impl VectorOps for NativeVector {
    type V = m128i;
    const WIDTH: usize = 16;

    #[inline]
    fn splat(v: u8) -> m128i {
        set_splat_i8_m128i(v as i8)
    }

    #[inline]
    fn load(src: &[u8]) -> m128i {
        debug_assert!(src.len() >= 16);
        let chunk = unsafe { &*(src.as_ptr() as *const [u8; 16]) };
        load_unaligned_m128i(chunk)
    }

    #[inline]
    fn store(dst: &mut [u8], v: m128i) {
        debug_assert!(dst.len() >= 16);
        let chunk = unsafe { &mut *(dst.as_mut_ptr() as *mut [u8; 16]) };
        store_unaligned_m128i(chunk, v);
    }

    #[inline]
    fn load_partial(src: &[u8], p: Predicate) -> m128i {
        let n = p.len();
        debug_assert!(src.len() >= n);
        let mut tmp = [0u8; 16];
        // Partial transfer ladder: 8/4/2/1-byte copies of the tail.
        let mut off = 0;
        let mut rem = n;
        for chunk in [8usize, 4, 2, 1] {
            if rem >= chunk {
                tmp[off..off + chunk].copy_from_slice(&src[off..off + chunk]);
                off += chunk;
                rem -= chunk;
            }
        }
        load_unaligned_m128i(&tmp)
    }

    #[inline]
    fn store_partial(dst: &mut [u8], v: m128i, p: Predicate) {
        let n = p.len();
        debug_assert!(dst.len() >= n);
        let mut tmp = [0u8; 16];
        store_unaligned_m128i(&mut tmp, v);
        let mut off = 0;
        let mut rem = n;
        for chunk in [8usize, 4, 2, 1] {
            if rem >= chunk {
                dst[off..off + chunk].copy_from_slice(&tmp[off..off + chunk]);
                off += chunk;
                rem -= chunk;
            }
        }
    }

    #[inline]
    fn and(a: m128i, b: m128i) -> m128i {
        bitand_m128i(a, b)
    }

    #[inline]
    fn or(a: m128i, b: m128i) -> m128i {
        bitor_m128i(a, b)
    }

    #[inline]
    fn xor(a: m128i, b: m128i) -> m128i {
        bitxor_m128i(a, b)
    }

    #[inline]
    fn not(a: m128i) -> m128i {
        bitxor_m128i(a, set_splat_i8_m128i(-1))
    }

    #[inline]
    fn add_sat_u8(a: m128i, b: m128i) -> m128i {
        add_saturating_u8_m128i(a, b)
    }

    #[inline]
    fn sub_sat_u8(a: m128i, b: m128i) -> m128i {
        sub_saturating_u8_m128i(a, b)
    }

    #[inline]
    fn min_u8(a: m128i, b: m128i) -> m128i {
        min_u8_m128i(a, b)
    }

    #[inline]
    fn max_u8(a: m128i, b: m128i) -> m128i {
        max_u8_m128i(a, b)
    }

    #[inline]
    fn cmp_gt_u8(a: m128i, b: m128i) -> m128i {
        cmp_gt_mask_i8_m128i(bias(a), bias(b))
    }

    #[inline]
    fn cmp_eq_u8(a: m128i, b: m128i) -> m128i {
        cmp_eq_mask_i8_m128i(a, b)
    }

    #[inline]
    fn select(mask: m128i, a: m128i, b: m128i) -> m128i {
        bitor_m128i(
            bitand_m128i(mask, a),
            bitand_m128i(bitxor_m128i(mask, set_splat_i8_m128i(-1)), b),
        )
    }
}
