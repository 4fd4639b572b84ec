// src/cv/median.rs

/*
 * Sliding-window histogram median filter. The column window slides
 * right by removing the leaving column and adding the entering one, so
 * histogram maintenance costs O(window height) per pixel instead of
 * O(window area). This is a full-frame operation: it needs a scratch
 * copy of the whole image, the most memory-hungry requirement in the
 * pixel core.
 */

use crate::{Image, PixelFormat};

/// Filters the image in place with a `(2*size+1)` square median window,
/// truncated at the image borders.
pub fn median_filter(img: &mut Image, size: u32) {
    match img.format() {
        PixelFormat::Grayscale => median_gray(img, size),
        PixelFormat::Rgb565 => median_rgb565(img, size),
    }
}

// Smallest bin holding the n/2-th element of the window population.
#[inline]
fn hist_median(hist: &[i32], count: i32) -> usize {
    let target = count / 2;
    let mut cum = 0;
    for (i, &c) in hist.iter().enumerate() {
        cum += c;
        if cum > target {
            return i;
        }
    }
    hist.len() - 1
}

fn median_gray(img: &mut Image, size: u32) {
    let w = img.width() as i32;
    let h = img.height() as i32;
    let s = size as i32;
    let mut out = vec![0u8; (w * h) as usize];

    for y in 0..h {
        let rlo = (y - s).max(0);
        let rhi = (y + s).min(h - 1);

        // First column of the row: build the histogram from scratch.
        let mut hist = [0i32; 256];
        let mut count = 0i32;
        for c in 0..=s.min(w - 1) {
            for r in rlo..=rhi {
                hist[img.get_gray(c as u32, r as u32) as usize] += 1;
                count += 1;
            }
        }
        out[(y * w) as usize] = hist_median(&hist, count) as u8;

        for x in 1..w {
            let leave = x - s - 1;
            if leave >= 0 {
                for r in rlo..=rhi {
                    hist[img.get_gray(leave as u32, r as u32) as usize] -= 1;
                    count -= 1;
                }
            }
            let enter = x + s;
            if enter < w {
                for r in rlo..=rhi {
                    hist[img.get_gray(enter as u32, r as u32) as usize] += 1;
                    count += 1;
                }
            }
            out[(y * w + x) as usize] = hist_median(&hist, count) as u8;
        }
    }

    img.bytes_mut().copy_from_slice(&out);
}

fn median_rgb565(img: &mut Image, size: u32) {
    let w = img.width() as i32;
    let h = img.height() as i32;
    let s = size as i32;
    let mut out = vec![0u8; (w * h * 2) as usize];

    for y in 0..h {
        let rlo = (y - s).max(0);
        let rhi = (y + s).min(h - 1);

        // One histogram per channel range: 5-bit red, 6-bit green,
        // 5-bit blue.
        let mut hist_r = [0i32; 32];
        let mut hist_g = [0i32; 64];
        let mut hist_b = [0i32; 32];
        let mut count = 0i32;

        let add_col = |hr: &mut [i32; 32],
                           hg: &mut [i32; 64],
                           hb: &mut [i32; 32],
                           count: &mut i32,
                           img: &Image,
                           c: i32,
                           delta: i32| {
            for r in rlo..=rhi {
                let p = img.get_rgb565(c as u32, r as u32);
                hr[((p >> 11) & 0x1F) as usize] += delta;
                hg[((p >> 5) & 0x3F) as usize] += delta;
                hb[(p & 0x1F) as usize] += delta;
                *count += delta;
            }
        };

        for c in 0..=s.min(w - 1) {
            add_col(&mut hist_r, &mut hist_g, &mut hist_b, &mut count, img, c, 1);
        }

        let write = |out: &mut [u8], x: i32, hr: &[i32; 32], hg: &[i32; 64], hb: &[i32; 32], count: i32| {
            let mr = hist_median(hr, count) as u16;
            let mg = hist_median(hg, count) as u16;
            let mb = hist_median(hb, count) as u16;
            let p = (mr << 11) | (mg << 5) | mb;
            let i = ((y * w + x) * 2) as usize;
            out[i..i + 2].copy_from_slice(&p.to_le_bytes());
        };
        write(&mut out, 0, &hist_r, &hist_g, &hist_b, count);

        for x in 1..w {
            let leave = x - s - 1;
            if leave >= 0 {
                add_col(
                    &mut hist_r, &mut hist_g, &mut hist_b, &mut count, img, leave, -1,
                );
            }
            let enter = x + s;
            if enter < w {
                add_col(
                    &mut hist_r, &mut hist_g, &mut hist_b, &mut count, img, enter, 1,
                );
            }
            write(&mut out, x, &hist_r, &hist_g, &hist_b, count);
        }
    }

    img.bytes_mut().copy_from_slice(&out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_image_is_fixed_point() {
        for size in [1u32, 2, 3] {
            let mut buf = vec![77u8; 16 * 12];
            let mut img = Image::new(&mut buf, 16, 12, PixelFormat::Grayscale).unwrap();
            median_filter(&mut img, size);
            assert!(
                img.bytes().iter().all(|&v| v == 77),
                "uniform gray changed at window size {size}"
            );
        }
    }

    #[test]
    fn test_uniform_rgb565_is_fixed_point() {
        let px = ((13u16) << 11 | (40 << 5) | 7).to_le_bytes();
        let mut buf: Vec<u8> = px.iter().copied().cycle().take(10 * 8 * 2).collect();
        let mut img = Image::new(&mut buf, 10, 8, PixelFormat::Rgb565).unwrap();
        median_filter(&mut img, 2);
        for y in 0..8 {
            for x in 0..10 {
                assert_eq!(img.get_rgb565(x, y), (13 << 11) | (40 << 5) | 7);
            }
        }
    }

    #[test]
    fn test_impulse_removed() {
        let mut buf = vec![0u8; 9 * 9];
        let mut img = Image::new(&mut buf, 9, 9, PixelFormat::Grayscale).unwrap();
        img.set_gray(4, 4, 255);
        median_filter(&mut img, 1);
        assert!(img.bytes().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_majority_wins_in_window() {
        // A 3x3 window over a two-valued stripe picks the majority value.
        let mut buf = vec![0u8; 5 * 5];
        let mut img = Image::new(&mut buf, 5, 5, PixelFormat::Grayscale).unwrap();
        for y in 0..5 {
            for x in 0..5 {
                img.set_gray(x, y, if x < 3 { 100 } else { 20 });
            }
        }
        median_filter(&mut img, 1);
        // Center of column 1: window columns 0..2 all 100.
        assert_eq!(img.get_gray(1, 2), 100);
        // Column 3: window columns 2,3,4 -> values 100,20,20.
        assert_eq!(img.get_gray(3, 2), 20);
    }

    #[test]
    fn test_window_larger_than_image() {
        let mut buf = vec![0u8; 4 * 4];
        buf[5] = 200;
        let mut img = Image::new(&mut buf, 4, 4, PixelFormat::Grayscale).unwrap();
        // Window radius exceeds every dimension; must clamp, not panic.
        median_filter(&mut img, 7);
        assert!(img.bytes().iter().all(|&v| v == 0));
    }
}
