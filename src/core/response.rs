// src/core/response.rs

use crate::cv::integral::IntegralImage;

/// One entry of the multi-scale approximate-Hessian pyramid: the
/// determinant-of-Hessian response and Laplacian sign of every sampled
/// pixel for a single box-filter size. Immutable once built, dropped
/// en masse with the detection pass.
pub struct ResponseLayer {
    pub width: i32,
    pub height: i32,
    /// Image pixels between two neighboring samples of this layer.
    pub step: i32,
    /// Side length of the box filter approximating the Gaussian second
    /// derivative at this scale.
    pub filter: i32,
    responses: Vec<f32>,
    laplacian: Vec<u8>,
}

impl ResponseLayer {
    /// Computes the layer from the integral image. Every response comes
    /// from four box-integral queries per second-derivative term,
    /// normalized by the filter area; near-border filters degrade to
    /// partial sums through the clamped box integral.
    pub fn build(width: i32, height: i32, step: i32, filter: i32, ii: &IntegralImage) -> ResponseLayer {
        let mut responses = vec![0.0f32; (width * height) as usize];
        let mut laplacian = vec![0u8; (width * height) as usize];

        let b = (filter - 1) / 2;
        let l = filter / 3;
        let w = filter;
        // Area normalization, folded with the 1/255 intensity scaling
        // that keeps responses in the conventional 0..1-image range.
        let inverse_area = 1.0 / (w as f32 * w as f32) / 255.0;

        let mut index = 0usize;
        for ar in 0..height {
            for ac in 0..width {
                let r = ar * step;
                let c = ac * step;

                let dxx = ii.box_integral(r - l + 1, c - b, 2 * l - 1, w)
                    - ii.box_integral(r - l + 1, c - l / 2, 2 * l - 1, l) * 3.0;
                let dyy = ii.box_integral(r - b, c - l + 1, w, 2 * l - 1)
                    - ii.box_integral(r - l / 2, c - l + 1, l, 2 * l - 1) * 3.0;
                let dxy = ii.box_integral(r - l, c + 1, l, l)
                    + ii.box_integral(r + 1, c - l, l, l)
                    - ii.box_integral(r - l, c - l, l, l)
                    - ii.box_integral(r + 1, c + 1, l, l);

                let dxx = dxx * inverse_area;
                let dyy = dyy * inverse_area;
                let dxy = dxy * inverse_area;

                // 0.81 corrects the box-filter approximation of the
                // Gaussian second derivative.
                responses[index] = dxx * dyy - 0.81 * dxy * dxy;
                laplacian[index] = (dxx + dyy >= 0.0) as u8;
                index += 1;
            }
        }

        ResponseLayer {
            width,
            height,
            step,
            filter,
            responses,
            laplacian,
        }
    }

    /// Response at this layer's own sampling grid.
    #[inline]
    pub fn response(&self, row: i32, col: i32) -> f32 {
        self.responses[(row * self.width + col) as usize]
    }

    /// Response sampled on the (coarser) grid of `src`; the coordinate
    /// is scaled up by the resolution ratio between the two layers.
    #[inline]
    pub fn response_at(&self, row: i32, col: i32, src: &ResponseLayer) -> f32 {
        let scale = self.width / src.width;
        self.responses[((scale * row) * self.width + scale * col) as usize]
    }

    /// Laplacian sign on the grid of `src`.
    #[inline]
    pub fn laplacian_at(&self, row: i32, col: i32, src: &ResponseLayer) -> i32 {
        let scale = self.width / src.width;
        self.laplacian[((scale * row) * self.width + scale * col) as usize] as i32
    }
}
