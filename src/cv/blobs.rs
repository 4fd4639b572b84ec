// src/cv/blobs.rs

use crate::{Image, PixelFormat, Point, Rect};
use tracing::debug;

/// Bounding rectangles narrower than this are discarded.
const MIN_BLOB_WIDTH: i32 = 10;

#[inline]
fn take_pixel(img: &mut Image, x: u32, y: u32) -> bool {
    // Reads and clears in one step so a pixel can never be re-enqueued.
    match img.format() {
        PixelFormat::Grayscale => {
            let on = img.get_gray(x, y) != 0;
            if on {
                img.set_gray(x, y, 0);
            }
            on
        }
        PixelFormat::Rgb565 => {
            let on = img.get_rgb565(x, y) != 0;
            if on {
                img.set_rgb565(x, y, 0);
            }
            on
        }
    }
}

/// Extracts the bounding rectangle of every 4-connected component of a
/// binary mask, consuming the mask (visited pixels are cleared).
///
/// Components are discovered in raster order and grown by an iterative
/// flood fill over an explicit work queue; the queue holds at most the
/// instantaneous fill frontier, which is proportional to the component
/// perimeter. Rectangles narrower than the minimum blob width are
/// dropped; survivors are normalized to origin + extent form.
pub fn find_blobs(img: &mut Image) -> Vec<Rect> {
    let w = img.width();
    let h = img.height();
    let mut blobs = Vec::new();
    let mut queue: Vec<Point> = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if !take_pixel(img, x, y) {
                continue;
            }

            let mut rect = Rect::sentinel(w, h);
            queue.push(Point::new(x as u16, y as u16));

            while let Some(p) = queue.pop() {
                let (px, py) = (p.x as u32, p.y as u32);
                rect.fold_point(px as i32, py as i32);

                if px > 0 && take_pixel(img, px - 1, py) {
                    queue.push(Point::new(p.x - 1, p.y));
                }
                if px + 1 < w && take_pixel(img, px + 1, py) {
                    queue.push(Point::new(p.x + 1, p.y));
                }
                if py > 0 && take_pixel(img, px, py - 1) {
                    queue.push(Point::new(p.x, p.y - 1));
                }
                if py + 1 < h && take_pixel(img, px, py + 1) {
                    queue.push(Point::new(p.x, p.y + 1));
                }
            }

            blobs.push(rect);
        }
    }

    let found = blobs.len();
    blobs.retain(|r| r.w - r.x + 1 >= MIN_BLOB_WIDTH);
    for r in &mut blobs {
        r.normalize();
    }
    debug!(found, kept = blobs.len(), "blob extraction finished");
    blobs
}
