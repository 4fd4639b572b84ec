// src/simd/wasm.rs

use crate::simd::{Predicate, VectorOps};

use std::arch::wasm32::*;

/// WASM SIMD back-end: 128-bit `v128` registers.
pub struct WasmVector;

impl VectorOps for WasmVector {
    type V = v128;
    const WIDTH: usize = 16;

    #[inline]
    fn splat(v: u8) -> v128 {
        u8x16_splat(v)
    }

    #[inline]
    fn load(src: &[u8]) -> v128 {
        debug_assert!(src.len() >= 16);
        // SAFETY: length checked above; v128 loads have no alignment
        // requirement on wasm.
        unsafe { v128_load(src.as_ptr() as *const v128) }
    }

    #[inline]
    fn store(dst: &mut [u8], v: v128) {
        debug_assert!(dst.len() >= 16);
        // SAFETY: length checked above.
        unsafe { v128_store(dst.as_mut_ptr() as *mut v128, v) }
    }

    #[inline]
    fn load_partial(src: &[u8], p: Predicate) -> v128 {
        let n = p.len();
        debug_assert!(src.len() >= n);
        let mut tmp = [0u8; 16];
        let mut off = 0;
        let mut rem = n;
        for chunk in [8usize, 4, 2, 1] {
            if rem >= chunk {
                tmp[off..off + chunk].copy_from_slice(&src[off..off + chunk]);
                off += chunk;
                rem -= chunk;
            }
        }
        // SAFETY: tmp is a 16-byte local.
        unsafe { v128_load(tmp.as_ptr() as *const v128) }
    }

    #[inline]
    fn store_partial(dst: &mut [u8], v: v128, p: Predicate) {
        let n = p.len();
        debug_assert!(dst.len() >= n);
        let mut tmp = [0u8; 16];
        // SAFETY: tmp is a 16-byte local.
        unsafe { v128_store(tmp.as_mut_ptr() as *mut v128, v) };
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
    fn and(a: v128, b: v128) -> v128 {
        v128_and(a, b)
    }

    #[inline]
    fn or(a: v128, b: v128) -> v128 {
        v128_or(a, b)
    }

    #[inline]
    fn xor(a: v128, b: v128) -> v128 {
        v128_xor(a, b)
    }

    #[inline]
    fn not(a: v128) -> v128 {
        v128_not(a)
    }

    #[inline]
    fn add_sat_u8(a: v128, b: v128) -> v128 {
        u8x16_add_sat(a, b)
    }

    #[inline]
    fn sub_sat_u8(a: v128, b: v128) -> v128 {
        u8x16_sub_sat(a, b)
    }

    #[inline]
    fn min_u8(a: v128, b: v128) -> v128 {
        u8x16_min(a, b)
    }

    #[inline]
    fn max_u8(a: v128, b: v128) -> v128 {
        u8x16_max(a, b)
    }

    #[inline]
    fn cmp_gt_u8(a: v128, b: v128) -> v128 {
        u8x16_gt(a, b)
    }

    #[inline]
    fn cmp_eq_u8(a: v128, b: v128) -> v128 {
        u8x16_eq(a, b)
    }

    #[inline]
    fn select(mask: v128, a: v128, b: v128) -> v128 {
        v128_bitselect(a, b, mask)
    }
}
