// src/core/detector.rs
#![allow(clippy::needless_range_loop)]

use crate::core::response::ResponseLayer;
use crate::core::InterestPoint;
use crate::cv::integral::IntegralImage;
use crate::fmath::{fast_atan2f, fast_expf, fast_roundf};
use nalgebra::{Matrix3, Vector3};
use std::f32::consts::PI;
use tracing::debug;

/// Response-map layer indices forming the (bottom, middle, top)
/// triplets of each octave.
const FILTER_MAP: [[usize; 4]; 5] = [
    [0, 1, 2, 3],
    [1, 3, 4, 5],
    [3, 5, 6, 7],
    [5, 7, 8, 9],
    [7, 9, 10, 11],
];

/// Fixed 7x7 Gaussian weight table (sigma 2.5), indexed by |dx|, |dy|
/// in filter units; used by the orientation assignment.
static GAUSS25: [[f32; 7]; 7] = [
    [0.02546479, 0.02350696, 0.01849123, 0.01239504, 0.00708016, 0.00344628, 0.00142946],
    [0.02350696, 0.02169966, 0.01706956, 0.01144207, 0.00653581, 0.00318132, 0.00131956],
    [0.01849123, 0.01706956, 0.01342739, 0.00900065, 0.00514125, 0.00250252, 0.00103800],
    [0.01239504, 0.01144207, 0.00900065, 0.00603332, 0.00344628, 0.00167749, 0.00069579],
    [0.00708016, 0.00653581, 0.00514125, 0.00344628, 0.00196855, 0.00095820, 0.00039744],
    [0.00344628, 0.00318132, 0.00250252, 0.00167749, 0.00095820, 0.00046640, 0.00019346],
    [0.00142946, 0.00131956, 0.00103800, 0.00069579, 0.00039744, 0.00019346, 0.00008024],
];

// |offset| -> GAUSS25 row/column for the -6..=6 disc coordinates.
const GAUSS_ID: [usize; 13] = [6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6];

/// Haar wavelet response in x at (row, col) with filter side `s`.
#[inline]
fn haar_x(ii: &IntegralImage, row: i32, col: i32, s: i32) -> f32 {
    ii.box_integral(row - s / 2, col, s, s / 2) - ii.box_integral(row - s / 2, col - s / 2, s, s / 2)
}

/// Haar wavelet response in y at (row, col) with filter side `s`.
#[inline]
fn haar_y(ii: &IntegralImage, row: i32, col: i32, s: i32) -> f32 {
    ii.box_integral(row, col - s / 2, s / 2, s) - ii.box_integral(row - s / 2, col - s / 2, s / 2, s)
}

/// Angle of the vector (x, y) mapped into [0, 2*pi).
#[inline]
fn get_angle(x: f32, y: f32) -> f32 {
    let a = fast_atan2f(y, x);
    if a < 0.0 {
        a + 2.0 * PI
    } else {
        a
    }
}

/// Unnormalized-domain 2D Gaussian used for descriptor weighting.
#[inline]
fn gaussian(x: f32, y: f32, sig: f32) -> f32 {
    1.0 / (2.0 * PI * sig * sig) * fast_expf(-(x * x + y * y) / (2.0 * sig * sig))
}

/// Multi-octave Fast-Hessian interest point detector (SURF variant).
pub struct FastHessian {
    /// Number of scale-space octaves, 1 to 5.
    pub octaves: u32,
    /// Base sampling step in image pixels.
    pub init_sample: u32,
    /// Determinant-of-Hessian response threshold.
    pub threshold: f32,
    /// Skip orientation assignment and extract upright descriptors.
    pub upright: bool,
}

impl Default for FastHessian {
    fn default() -> Self {
        Self::new()
    }
}

impl FastHessian {
    /// Detector with the conventional parameter set.
    pub fn new() -> FastHessian {
        FastHessian {
            octaves: 3,
            init_sample: 2,
            threshold: 0.0004,
            upright: false,
        }
    }

    /// Runs one full detection pass against a prebuilt integral image:
    /// response map, non-maximum suppression, sub-pixel interpolation,
    /// then orientation and descriptor extraction per surviving point.
    pub fn detect(&self, ii: &IntegralImage) -> Vec<InterestPoint> {
        let layers = self.build_response_map(ii);
        let octaves = (self.octaves.clamp(1, 5)) as usize;

        let mut ipts: Vec<InterestPoint> = Vec::new();
        for o in 0..octaves {
            for i in 0..2 {
                let b = &layers[FILTER_MAP[o][i]];
                let m = &layers[FILTER_MAP[o][i + 1]];
                let t = &layers[FILTER_MAP[o][i + 2]];

                for r in 0..t.height {
                    for c in 0..t.width {
                        if self.is_extremum(r, c, t, m, b) {
                            if let Some(ipt) = interpolate_extremum(r, c, t, m, b) {
                                ipts.push(ipt);
                            }
                        }
                    }
                }
            }
        }
        debug!(count = ipts.len(), octaves, "interest points extracted");

        for ipt in &mut ipts {
            if !self.upright {
                ipt.orientation = orientation(ipt, ii);
            }
            describe(ipt, ii, self.upright);
        }
        ipts
    }

    // One set of layers per requested octave, box-filter sizes growing
    // from the 9/15/21/27 base sequence, resolution halving per octave.
    fn build_response_map(&self, ii: &IntegralImage) -> Vec<ResponseLayer> {
        let s = self.init_sample.max(1) as i32;
        let w = ii.width() as i32 / s;
        let h = ii.height() as i32 / s;
        let octaves = self.octaves.clamp(1, 5);

        let mut layers = Vec::new();
        for filter in [9, 15, 21, 27] {
            layers.push(ResponseLayer::build(w, h, s, filter, ii));
        }
        if octaves >= 2 {
            layers.push(ResponseLayer::build(w / 2, h / 2, s * 2, 39, ii));
            layers.push(ResponseLayer::build(w / 2, h / 2, s * 2, 51, ii));
        }
        if octaves >= 3 {
            layers.push(ResponseLayer::build(w / 4, h / 4, s * 4, 75, ii));
            layers.push(ResponseLayer::build(w / 4, h / 4, s * 4, 99, ii));
        }
        if octaves >= 4 {
            layers.push(ResponseLayer::build(w / 8, h / 8, s * 8, 147, ii));
            layers.push(ResponseLayer::build(w / 8, h / 8, s * 8, 195, ii));
        }
        if octaves >= 5 {
            layers.push(ResponseLayer::build(w / 16, h / 16, s * 16, 291, ii));
            layers.push(ResponseLayer::build(w / 16, h / 16, s * 16, 387, ii));
        }
        layers
    }

    // 3x3x3 non-maximum suppression on the coarsest grid of the
    // triplet. Ties are eliminated on both sides of the comparison.
    fn is_extremum(
        &self,
        r: i32,
        c: i32,
        t: &ResponseLayer,
        m: &ResponseLayer,
        b: &ResponseLayer,
    ) -> bool {
        let border = (t.filter + 1) / (2 * t.step);
        if r <= border || r >= t.height - border || c <= border || c >= t.width - border {
            return false;
        }

        let candidate = m.response_at(r, c, t);
        if candidate < self.threshold {
            return false;
        }

        for rr in -1..=1 {
            for cc in -1..=1 {
                if t.response(r + rr, c + cc) >= candidate
                    || ((rr != 0 || cc != 0) && m.response_at(r + rr, c + cc, t) >= candidate)
                    || b.response_at(r + rr, c + cc, t) >= candidate
                {
                    return false;
                }
            }
        }
        true
    }
}

// Finite-difference gradient and Hessian across the layer triplet, one
// Newton step toward the true extremum. A singular Hessian or an offset
// component of 0.5 or more discards the candidate.
fn interpolate_extremum(
    r: i32,
    c: i32,
    t: &ResponseLayer,
    m: &ResponseLayer,
    b: &ResponseLayer,
) -> Option<InterestPoint> {
    let v = m.response_at(r, c, t);

    let dx = (m.response_at(r, c + 1, t) - m.response_at(r, c - 1, t)) / 2.0;
    let dy = (m.response_at(r + 1, c, t) - m.response_at(r - 1, c, t)) / 2.0;
    let ds = (t.response(r, c) - b.response_at(r, c, t)) / 2.0;

    let dxx = m.response_at(r, c + 1, t) + m.response_at(r, c - 1, t) - 2.0 * v;
    let dyy = m.response_at(r + 1, c, t) + m.response_at(r - 1, c, t) - 2.0 * v;
    let dss = t.response(r, c) + b.response_at(r, c, t) - 2.0 * v;
    let dxy = (m.response_at(r + 1, c + 1, t) - m.response_at(r + 1, c - 1, t)
        - m.response_at(r - 1, c + 1, t)
        + m.response_at(r - 1, c - 1, t))
        / 4.0;
    let dxs = (t.response(r, c + 1) - t.response(r, c - 1) - b.response_at(r, c + 1, t)
        + b.response_at(r, c - 1, t))
        / 4.0;
    let dys = (t.response(r + 1, c) - t.response(r - 1, c) - b.response_at(r + 1, c, t)
        + b.response_at(r - 1, c, t))
        / 4.0;

    let hessian = Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss);
    let gradient = Vector3::new(dx, dy, ds);

    // Degenerate flat response: skip the candidate rather than let a
    // garbage inverse through.
    let inverse = hessian.try_inverse()?;
    let offset = -(inverse * gradient);

    if offset.x.abs() < 0.5 && offset.y.abs() < 0.5 && offset.z.abs() < 0.5 {
        let x = (c as f32 + offset.x) * t.step as f32;
        let y = (r as f32 + offset.y) * t.step as f32;
        let filter_step = (m.filter - b.filter) as f32;
        // Scale is 1.2/9 of the interpolated filter size.
        let scale = 0.1333 * (m.filter as f32 + offset.z * filter_step);
        Some(InterestPoint::new(x, y, scale, m.laplacian_at(r, c, t)))
    } else {
        None
    }
}

// Dominant orientation: Gaussian-weighted Haar responses over a disc of
// radius 6*scale, swept by a pi/3 window in 0.15 rad steps; the window
// with the largest squared vector sum wins.
fn orientation(ipt: &InterestPoint, ii: &IntegralImage) -> f32 {
    let s = fast_roundf(ipt.scale);
    let r = fast_roundf(ipt.y);
    let c = fast_roundf(ipt.x);

    let mut res_x = [0.0f32; 109];
    let mut res_y = [0.0f32; 109];
    let mut ang = [0.0f32; 109];
    let mut n = 0usize;

    for i in -6i32..=6 {
        for j in -6i32..=6 {
            if i * i + j * j < 36 {
                let gauss = GAUSS25[GAUSS_ID[(i + 6) as usize]][GAUSS_ID[(j + 6) as usize]];
                res_x[n] = gauss * haar_x(ii, r + j * s, c + i * s, 4 * s);
                res_y[n] = gauss * haar_y(ii, r + j * s, c + i * s, 4 * s);
                ang[n] = get_angle(res_x[n], res_y[n]);
                n += 1;
            }
        }
    }

    let mut best = 0.0f32;
    let mut dominant = 0.0f32;
    let mut ang1 = 0.0f32;
    while ang1 < 2.0 * PI {
        let ang2 = if ang1 + PI / 3.0 > 2.0 * PI {
            ang1 - 5.0 * PI / 3.0
        } else {
            ang1 + PI / 3.0
        };

        let mut sum_x = 0.0f32;
        let mut sum_y = 0.0f32;
        for k in 0..n {
            let a = ang[k];
            let inside = if ang1 < ang2 {
                ang1 < a && a < ang2
            } else {
                // window wraps through zero
                (0.0 < a && a < ang2) || (a > ang1 && a < 2.0 * PI)
            };
            if inside {
                sum_x += res_x[k];
                sum_y += res_y[k];
            }
        }

        let mag = sum_x * sum_x + sum_y * sum_y;
        if mag > best {
            best = mag;
            dominant = get_angle(sum_x, sum_y);
        }
        ang1 += 0.15;
    }
    dominant
}

// 4x4 grid of 9x9-sample subregions around the point, each contributing
// (dx, dy, |dx|, |dy|) of Gaussian-weighted Haar responses on the
// rotated axes; the 64-vector is L2-normalized at the end.
fn describe(ipt: &mut InterestPoint, ii: &IntegralImage, upright: bool) {
    let scale = ipt.scale;
    let x = fast_roundf(ipt.x);
    let y = fast_roundf(ipt.y);
    let (co, si) = if upright {
        (1.0f32, 0.0f32)
    } else {
        (ipt.orientation.cos(), ipt.orientation.sin())
    };

    let mut count = 0usize;
    let mut len = 0.0f32;
    let mut cx = -0.5f32;

    let mut i = -8i32;
    while i < 12 {
        i -= 4;
        cx += 1.0;
        let mut cy = -0.5f32;

        let mut j = -8i32;
        while j < 12 {
            j -= 4;
            cy += 1.0;

            let (mut dx, mut dy, mut mdx, mut mdy) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
            let ix = i + 5;
            let jx = j + 5;
            let xs = fast_roundf(x as f32 + (-jx as f32 * scale * si + ix as f32 * scale * co));
            let ys = fast_roundf(y as f32 + (jx as f32 * scale * co + ix as f32 * scale * si));

            for k in i..i + 9 {
                for l in j..j + 9 {
                    let sample_x =
                        fast_roundf(x as f32 + (-l as f32 * scale * si + k as f32 * scale * co));
                    let sample_y =
                        fast_roundf(y as f32 + (l as f32 * scale * co + k as f32 * scale * si));

                    let g1 = gaussian((xs - sample_x) as f32, (ys - sample_y) as f32, 2.5 * scale);
                    let rx = haar_x(ii, sample_y, sample_x, 2 * fast_roundf(scale));
                    let ry = haar_y(ii, sample_y, sample_x, 2 * fast_roundf(scale));

                    let rrx = g1 * (-rx * si + ry * co);
                    let rry = g1 * (rx * co + ry * si);
                    dx += rrx;
                    dy += rry;
                    mdx += rrx.abs();
                    mdy += rry.abs();
                }
            }

            let g2 = gaussian(cx - 2.0, cy - 2.0, 1.5);
            ipt.descriptor[count] = dx * g2;
            ipt.descriptor[count + 1] = dy * g2;
            ipt.descriptor[count + 2] = mdx * g2;
            ipt.descriptor[count + 3] = mdy * g2;
            count += 4;
            len += (dx * dx + dy * dy + mdx * mdx + mdy * mdy) * g2 * g2;

            j += 9;
        }
        i += 9;
    }

    let len = len.sqrt();
    if len > 0.0 {
        for v in ipt.descriptor.iter_mut() {
            *v /= len;
        }
    }
}
