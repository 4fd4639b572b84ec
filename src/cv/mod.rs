// src/cv/mod.rs

use crate::simd::{map_rows, DefaultVector, VectorOps};
use crate::PixelFormat;

/// Per-pixel binary operators applicable between two images of
/// identical geometry. The bitwise members operate on raw row bytes
/// regardless of pixel format; `Difference` is a per-channel absolute
/// difference and unpacks RGB565 fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOp {
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Xnor,
    Difference,
}

/// Applies `op` between one destination row and one source row of the
/// same byte length, writing the result over the destination.
///
/// This is the single per-line kernel shared by the in-memory
/// combinators and the streaming operator.
pub(crate) fn apply_rows(op: PixelOp, format: PixelFormat, dst: &mut [u8], src: &[u8]) {
    type V = DefaultVector;
    match op {
        PixelOp::And => map_rows::<V>(dst, src, V::and),
        PixelOp::Nand => map_rows::<V>(dst, src, |a, b| V::not(V::and(a, b))),
        PixelOp::Or => map_rows::<V>(dst, src, V::or),
        PixelOp::Nor => map_rows::<V>(dst, src, |a, b| V::not(V::or(a, b))),
        PixelOp::Xor => map_rows::<V>(dst, src, V::xor),
        PixelOp::Xnor => map_rows::<V>(dst, src, |a, b| V::not(V::xor(a, b))),
        PixelOp::Difference => match format {
            // |a - b| per byte lane via the two saturating differences.
            PixelFormat::Grayscale => map_rows::<V>(dst, src, |a, b| {
                V::or(V::sub_sat_u8(a, b), V::sub_sat_u8(b, a))
            }),
            PixelFormat::Rgb565 => difference_rows_rgb565(dst, src),
        },
    }
}

// Per-channel absolute difference in 5-6-5 space; fields are unpacked,
// differenced and repacked pixel by pixel.
fn difference_rows_rgb565(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());
    debug_assert_eq!(dst.len() % 2, 0);
    for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        let a = u16::from_le_bytes([d[0], d[1]]);
        let b = u16::from_le_bytes([s[0], s[1]]);
        let dr = ((a >> 11) & 0x1F).abs_diff((b >> 11) & 0x1F);
        let dg = ((a >> 5) & 0x3F).abs_diff((b >> 5) & 0x3F);
        let db = (a & 0x1F).abs_diff(b & 0x1F);
        let out = (dr << 11) | (dg << 5) | db;
        d.copy_from_slice(&out.to_le_bytes());
    }
}

// Submodules for specific pixel and region algorithms
pub mod binary;
pub mod blobs;
pub mod color;
pub mod integral;
pub mod median;
