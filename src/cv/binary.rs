// src/cv/binary.rs
#![allow(clippy::needless_range_loop)]

use crate::cv::color::{self, Color};
use crate::cv::{apply_rows, PixelOp};
use crate::simd::{map_row, DefaultVector, VectorOps};
use crate::{Error, Image, PixelFormat, Rect, Result};

/// The all-ones binary value for a grayscale mask pixel.
pub const BINARY_ON_GRAY: u8 = 0xFF;
/// The all-ones binary value for an RGB565 mask pixel.
pub const BINARY_ON_RGB565: u16 = 0xFFFF;

#[inline]
fn pixel_on(img: &Image, x: u32, y: u32) -> bool {
    match img.format() {
        PixelFormat::Grayscale => img.get_gray(x, y) != 0,
        PixelFormat::Rgb565 => img.get_rgb565(x, y) != 0,
    }
}

/// Converts the image into a binary mask in place: a pixel becomes
/// all-ones when its LAB distance to the reference color is below
/// `distance_limit`, all-zeros otherwise.
pub fn threshold(img: &mut Image, reference: Color, distance_limit: u16) {
    let ref_lab = reference.as_lab();

    match img.format() {
        PixelFormat::Grayscale => {
            // 256 possible inputs; precompute the verdict per code value.
            let mut tab = [0u8; 256];
            for i in 0..256 {
                let lab = color::rgb_to_lab(i as u8, i as u8, i as u8);
                tab[i] = if color::lab_distance(lab, ref_lab) < distance_limit {
                    BINARY_ON_GRAY
                } else {
                    0
                };
            }
            for y in 0..img.height() {
                for px in img.row_mut(y) {
                    *px = tab[*px as usize];
                }
            }
        }
        PixelFormat::Rgb565 => {
            for y in 0..img.height() {
                for x in 0..img.width() {
                    let (r, g, b) = color::rgb565_to_rgb888(img.get_rgb565(x, y));
                    let lab = color::rgb_to_lab(r, g, b);
                    let v = if color::lab_distance(lab, ref_lab) < distance_limit {
                        BINARY_ON_RGB565
                    } else {
                        0
                    };
                    img.set_rgb565(x, y, v);
                }
            }
        }
    }
}

/// Bitwise NOT of every pixel in place.
pub fn invert(img: &mut Image) {
    type V = DefaultVector;
    for y in 0..img.height() {
        map_row::<V>(img.row_mut(y), V::not);
    }
}

/// Applies a binary operator between `img` and a second in-memory image
/// of identical geometry and format, writing the result over `img`.
///
/// Geometry and format are checked before any pixel is touched.
pub fn binary_op(op: PixelOp, img: &mut Image, other: &Image) -> Result<()> {
    if !img.same_geometry(other) {
        return Err(Error::GeometryMismatch(
            img.width(),
            img.height(),
            other.width(),
            other.height(),
        ));
    }
    if img.format() != other.format() {
        return Err(Error::FormatMismatch);
    }
    let format = img.format();
    for y in 0..img.height() {
        apply_rows(op, format, img.row_mut(y), other.row(y));
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Morph {
    Erode,
    Dilate,
}

/// Morphological erosion: every "on" pixel whose on-neighbor count
/// inside the `(2*radius+1)^2` window (center excluded) falls below
/// `threshold` is cleared. Out-of-bounds neighbors count as on, so the
/// image border does not erode the mask by itself.
///
/// `threshold = window_area - 2` reproduces classic all-neighbors
/// erosion.
pub fn erode(img: &mut Image, radius: u32, threshold: u32) {
    morph(img, radius, threshold, Morph::Erode);
}

/// Morphological dilation: every "off" pixel whose on-neighbor count
/// exceeds `threshold` is set. Out-of-bounds neighbors count as off.
///
/// `threshold = 0` reproduces classic any-neighbor dilation.
pub fn dilate(img: &mut Image, radius: u32, threshold: u32) {
    morph(img, radius, threshold, Morph::Dilate);
}

// Output rows go into a ring buffer of radius+1 rows and are committed
// back into the source one row behind the window trail: the window for
// output row y reads source rows y-radius..=y+radius, and commitment
// only ever overwrites row y-(radius+1), which no later window reads.
fn morph(img: &mut Image, radius: u32, threshold: u32, op: Morph) {
    let w = img.width() as i32;
    let h = img.height() as i32;
    let r = radius as i32;
    let stride = img.stride();
    let ring_rows = radius as usize + 1;
    let mut ring = vec![0u8; ring_rows * stride];

    let oob_on = op == Morph::Erode;
    for y in 0..h {
        let slot = y as usize % ring_rows;
        if y as usize >= ring_rows {
            let target = (y as usize - ring_rows) as u32;
            img.row_mut(target)
                .copy_from_slice(&ring[slot * stride..][..stride]);
        }

        // Compute output row y into the freed slot.
        {
            let (src_on, format) = (&*img, img.format());
            let out = &mut ring[slot * stride..][..stride];
            out.copy_from_slice(src_on.row(y as u32));
            for x in 0..w {
                let on = pixel_on(src_on, x as u32, y as u32);
                // Short-circuit: erosion cannot turn an off pixel on,
                // dilation cannot turn an on pixel off.
                match op {
                    Morph::Erode if !on => continue,
                    Morph::Dilate if on => continue,
                    _ => {}
                }
                let mut cnt = 0u32;
                for dy in -r..=r {
                    for dx in -r..=r {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (nx, ny) = (x + dx, y + dy);
                        let non = if nx < 0 || ny < 0 || nx >= w || ny >= h {
                            oob_on
                        } else {
                            pixel_on(src_on, nx as u32, ny as u32)
                        };
                        if non {
                            cnt += 1;
                        }
                    }
                }
                let new = match op {
                    Morph::Erode if cnt < threshold => Some(0u16),
                    Morph::Dilate if cnt > threshold => Some(match format {
                        PixelFormat::Grayscale => BINARY_ON_GRAY as u16,
                        PixelFormat::Rgb565 => BINARY_ON_RGB565,
                    }),
                    _ => None,
                };
                if let Some(v) = new {
                    match format {
                        PixelFormat::Grayscale => out[x as usize] = v as u8,
                        PixelFormat::Rgb565 => {
                            out[x as usize * 2..x as usize * 2 + 2]
                                .copy_from_slice(&v.to_le_bytes());
                        }
                    }
                }
            }
        }
    }

    // Flush the rows still sitting in the ring buffer.
    for y in h..h + ring_rows as i32 {
        let target = y - ring_rows as i32;
        if target >= 0 {
            let slot = y as usize % ring_rows;
            img.row_mut(target as u32)
                .copy_from_slice(&ring[slot * stride..][..stride]);
        }
    }
}

/// Draws the outline of `rect` with the given packed pixel value,
/// clipped to the image bounds.
pub fn draw_rectangle(img: &mut Image, rect: &Rect, value: u16) {
    let w = img.width() as i32;
    let h = img.height() as i32;
    let x1 = rect.x.max(0);
    let y1 = rect.y.max(0);
    let x2 = (rect.x + rect.w - 1).min(w - 1);
    let y2 = (rect.y + rect.h - 1).min(h - 1);
    if x1 > x2 || y1 > y2 {
        return;
    }

    let mut set = |x: i32, y: i32| match img.format() {
        PixelFormat::Grayscale => img.set_gray(x as u32, y as u32, value as u8),
        PixelFormat::Rgb565 => img.set_rgb565(x as u32, y as u32, value),
    };
    for x in x1..=x2 {
        if rect.y >= 0 {
            set(x, rect.y);
        }
        if rect.y + rect.h - 1 < h {
            set(x, rect.y + rect.h - 1);
        }
    }
    for y in y1..=y2 {
        if rect.x >= 0 {
            set(rect.x, y);
        }
        if rect.x + rect.w - 1 < w {
            set(rect.x + rect.w - 1, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_image(buf: &mut [u8], w: u32, h: u32) -> Image<'_> {
        Image::new(buf, w, h, PixelFormat::Grayscale).unwrap()
    }

    #[test]
    fn test_threshold_binary_mask() {
        let mut buf = vec![0u8; 16];
        buf[5] = 250;
        buf[6] = 240;
        let mut img = gray_image(&mut buf, 4, 4);
        threshold(&mut img, Color::Rgb(255, 255, 255), 50);
        for y in 0..4 {
            for x in 0..4 {
                let expected = if (y * 4 + x) == 5 || (y * 4 + x) == 6 {
                    BINARY_ON_GRAY
                } else {
                    0
                };
                assert_eq!(img.get_gray(x, y), expected);
            }
        }
    }

    #[test]
    fn test_threshold_idempotent() {
        let mut buf: Vec<u8> = (0..64u32).map(|i| (i * 37 % 256) as u8).collect();
        let mut img = gray_image(&mut buf, 8, 8);
        threshold(&mut img, Color::Rgb(255, 255, 255), 60);
        let first: Vec<u8> = img.bytes().to_vec();
        threshold(&mut img, Color::Rgb(255, 255, 255), 60);
        assert_eq!(img.bytes(), &first[..], "a binary image is a fixed point");
    }

    #[test]
    fn test_binary_op_geometry_checked() {
        let mut a = vec![0u8; 16];
        let mut b = vec![0u8; 12];
        let mut img_a = Image::new(&mut a, 4, 4, PixelFormat::Grayscale).unwrap();
        let img_b = Image::new(&mut b, 4, 3, PixelFormat::Grayscale).unwrap();
        assert!(matches!(
            binary_op(PixelOp::And, &mut img_a, &img_b),
            Err(Error::GeometryMismatch(4, 4, 4, 3))
        ));
    }

    #[test]
    fn test_xor_self_is_zero() {
        let mut a: Vec<u8> = (0..64u32).map(|i| (i * 11 % 256) as u8).collect();
        let mut b = a.clone();
        let mut img_a = gray_image(&mut a, 8, 8);
        let img_b = gray_image(&mut b, 8, 8);
        binary_op(PixelOp::Xor, &mut img_a, &img_b).unwrap();
        assert!(img_a.bytes().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_erode_removes_isolated_pixel() {
        let mut buf = vec![0u8; 49];
        let mut img = gray_image(&mut buf, 7, 7);
        img.set_gray(3, 3, BINARY_ON_GRAY);
        erode(&mut img, 1, 8);
        assert_eq!(img.get_gray(3, 3), 0);
    }

    #[test]
    fn test_erode_keeps_block_interior() {
        // 5x5 solid block; with all-neighbors erosion only the interior
        // 3x3 survives (image border neighbors count as on).
        let mut buf = vec![0u8; 81];
        let mut img = gray_image(&mut buf, 9, 9);
        for y in 2..7 {
            for x in 2..7 {
                img.set_gray(x, y, BINARY_ON_GRAY);
            }
        }
        erode(&mut img, 1, 8);
        for y in 0..9u32 {
            for x in 0..9u32 {
                let interior = (3..6).contains(&x) && (3..6).contains(&y);
                assert_eq!(
                    img.get_gray(x, y) != 0,
                    interior,
                    "pixel ({x},{y}) after erode"
                );
            }
        }
    }

    #[test]
    fn test_dilate_grows_pixel() {
        let mut buf = vec![0u8; 49];
        let mut img = gray_image(&mut buf, 7, 7);
        img.set_gray(3, 3, BINARY_ON_GRAY);
        dilate(&mut img, 1, 0);
        for y in 2..5u32 {
            for x in 2..5u32 {
                assert_ne!(img.get_gray(x, y), 0);
            }
        }
        assert_eq!(img.get_gray(1, 3), 0);
    }

    #[test]
    fn test_erode_dilate_duality() {
        // dilate(invert(img)) == invert(erode(img)) for the matched
        // threshold pair T_erode = N, T_dilate = 0 with N = 8 neighbors.
        let mut pattern = vec![0u8; 11 * 9];
        for (i, v) in pattern.iter_mut().enumerate() {
            *v = if (i * 7919) % 13 < 5 { BINARY_ON_GRAY } else { 0 };
        }

        let mut a = pattern.clone();
        let mut img = gray_image(&mut a, 11, 9);
        erode(&mut img, 1, 8);
        invert(&mut img);
        let lhs: Vec<u8> = img.bytes().to_vec();

        let mut b = pattern.clone();
        let mut img = gray_image(&mut b, 11, 9);
        invert(&mut img);
        dilate(&mut img, 1, 0);
        let rhs: Vec<u8> = img.bytes().to_vec();

        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_draw_rectangle_outline() {
        let mut buf = vec![0u8; 64];
        let mut img = gray_image(&mut buf, 8, 8);
        let r = Rect { x: 1, y: 2, w: 4, h: 3 };
        draw_rectangle(&mut img, &r, 0xFF);
        assert_eq!(img.get_gray(1, 2), 0xFF);
        assert_eq!(img.get_gray(4, 4), 0xFF);
        assert_eq!(img.get_gray(2, 3), 0, "interior untouched");
    }
}
