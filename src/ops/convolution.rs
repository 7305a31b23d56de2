// ============================================================================
// CONVOLUTION: odd NxN correlation kernels with explicit border policies
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::buffer::{PixelBuffer, write_px};
use crate::error::{EngineError, Result};
use crate::ops::scheduler::{HaloView, Scheduler, stripe_row};

/// Square matrix of odd size. Construction (including deserialization)
/// rejects anything else with `MalformedKernel`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct Kernel {
    size: usize,
    weights: Vec<f64>,
}

impl Kernel {
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        let size = rows.len();
        if size % 2 == 0 {
            return Err(EngineError::MalformedKernel {
                reason: format!("size {size} is not odd"),
            });
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != size) {
            return Err(EngineError::MalformedKernel {
                reason: format!("row {bad} has {} entries, expected {size}", rows[bad].len()),
            });
        }
        if rows.iter().flatten().any(|w| !w.is_finite()) {
            return Err(EngineError::MalformedKernel {
                reason: "weights must be finite".into(),
            });
        }
        Ok(Self { size, weights: rows.into_iter().flatten().collect() })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// ⌊N/2⌋, also the halo a stripe needs.
    pub fn radius(&self) -> usize {
        self.size / 2
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.weights[row * self.size + col]
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.weights.chunks(self.size).map(|r| r.to_vec()).collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for Kernel {
    type Error = EngineError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        Kernel::new(rows)
    }
}

impl From<Kernel> for Vec<Vec<f64>> {
    fn from(k: Kernel) -> Self {
        k.rows()
    }
}

/// What happens to taps that fall outside the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BorderPolicy {
    /// Out-of-bounds taps contribute nothing (borders darken for
    /// positive kernels).
    Ignore,
    /// Coordinates clamp to the nearest edge pixel.
    Clamp,
    /// Out-of-bounds taps are dropped and the sum is rescaled by
    /// `kernel.sum() / in_bounds_weight`.
    Renormalize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlphaHandling {
    /// Output alpha is 1.0.
    Opaque,
    /// Alpha is filtered like the colour channels.
    Filter,
}

/// Correlate all four channels at (x, y). `sample` must accept any in-image
/// coordinate within `kernel.radius()` of (x, y).
#[inline]
fn correlate<S>(kernel: &Kernel, policy: BorderPolicy, w: u32, h: u32, x: u32, y: u32, sample: S) -> [f64; 4]
where
    S: Fn(u32, u32) -> [f32; 4],
{
    let r = kernel.radius() as i64;
    let mut acc = [0.0f64; 4];
    let mut in_weight = 0.0f64;
    for i in 0..kernel.size() {
        for j in 0..kernel.size() {
            let factor = kernel.at(i, j);
            let sx = x as i64 + j as i64 - r;
            let sy = y as i64 + i as i64 - r;
            let inside = sx >= 0 && sy >= 0 && sx < w as i64 && sy < h as i64;
            let (cx, cy) = if inside {
                (sx as u32, sy as u32)
            } else if policy == BorderPolicy::Clamp {
                (sx.clamp(0, w as i64 - 1) as u32, sy.clamp(0, h as i64 - 1) as u32)
            } else {
                continue;
            };
            let px = sample(cx, cy);
            for c in 0..4 {
                acc[c] += factor * px[c] as f64;
            }
            in_weight += factor;
        }
    }
    if policy == BorderPolicy::Renormalize && in_weight.abs() > 1e-12 {
        let scale = kernel.sum() / in_weight;
        for v in &mut acc {
            *v *= scale;
        }
    }
    acc
}

/// Convolve `src` into a new buffer. Runs stripe-parallel with a halo of
/// `kernel.radius()` rows, so the result does not depend on the worker count.
pub fn convolve(
    src: &PixelBuffer,
    kernel: &Kernel,
    policy: BorderPolicy,
    alpha: AlphaHandling,
    scheduler: &Scheduler,
) -> Result<PixelBuffer> {
    let (w, h) = src.dimensions();
    let mut dst = PixelBuffer::new(w, h)?;
    scheduler.run_with_halo(src, &mut dst, kernel.radius() as u32, |stripe, view: &HaloView<'_>, rows| {
        for y in stripe.rows() {
            let row = stripe_row(rows, stripe, y, w);
            for x in 0..w {
                let acc = correlate(kernel, policy, w, h, x, y, |sx, sy| view.get(sx, sy));
                let a = match alpha {
                    AlphaHandling::Opaque => 1.0,
                    AlphaHandling::Filter => acc[3] as f32,
                };
                write_px(row, x as usize, [acc[0] as f32, acc[1] as f32, acc[2] as f32, a]);
            }
        }
    })?;
    Ok(dst)
}

// ----------------------------------------------------------------------------
//  Scalar fields (gradient planes for edge detection)
// ----------------------------------------------------------------------------

/// Unclamped 2D plane of `f64`, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    width: u32,
    height: u32,
    data: Vec<f64>,
}

impl ScalarField {
    pub fn zeros(width: u32, height: u32) -> Self {
        Self { width, height, data: vec![0.0; width as usize * height as usize] }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, v: f64) {
        self.data[y as usize * self.width as usize + x as usize] = v;
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(0.0, f64::max)
    }

    /// Grayscale image with R=G=B=value (clamped) and opaque alpha.
    pub fn to_gray_buffer(&self) -> Result<PixelBuffer> {
        let mut out = PixelBuffer::new(self.width, self.height)?;
        for y in 0..self.height {
            for x in 0..self.width {
                let v = self.get(x, y) as f32;
                out.set(x, y, [v, v, v, 1.0]);
            }
        }
        Ok(out)
    }
}

/// Correlate the red channel of an (already grayscale) image into a raw
/// scalar field. Single-threaded.
pub fn scalar_field(gray: &PixelBuffer, kernel: &Kernel, policy: BorderPolicy) -> ScalarField {
    let (w, h) = gray.dimensions();
    let mut out = ScalarField::zeros(w, h);
    for y in 0..h {
        for x in 0..w {
            let acc = correlate(kernel, policy, w, h, x, y, |sx, sy| gray.get(sx, sy));
            out.set(x, y, acc[0]);
        }
    }
    out
}

// ----------------------------------------------------------------------------
//  Kernel builders
// ----------------------------------------------------------------------------

/// Normalized 2D Gaussian of size `2r+1` with sigma `r/3` (the kernel is
/// truncated at 3 sigma). Radius 0 is the identity.
pub fn gaussian_kernel(radius: u32) -> Kernel {
    if radius == 0 {
        return identity_kernel();
    }
    let sigma = radius as f64 / 3.0;
    let size = 2 * radius as usize + 1;
    let s2 = 2.0 * sigma * sigma;
    let line: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - radius as f64;
            (-d * d / s2).exp()
        })
        .collect();
    let total: f64 = line.iter().sum::<f64>().powi(2);
    let weights = line
        .iter()
        .flat_map(|&a| line.iter().map(move |&b| a * b / total))
        .collect();
    Kernel { size, weights }
}

/// Uniform `(2r+1)²` mean filter.
pub fn box_kernel(radius: u32) -> Kernel {
    let size = 2 * radius as usize + 1;
    let w = 1.0 / (size * size) as f64;
    Kernel { size, weights: vec![w; size * size] }
}

pub fn identity_kernel() -> Kernel {
    Kernel { size: 1, weights: vec![1.0] }
}

pub fn sharpen_kernel() -> Kernel {
    Kernel {
        size: 3,
        weights: vec![0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0],
    }
}

/// Sobel response to vertical intensity change.
pub fn sobel_x() -> Kernel {
    Kernel {
        size: 3,
        weights: vec![1.0, 2.0, 1.0, 0.0, 0.0, 0.0, -1.0, -2.0, -1.0],
    }
}

/// Sobel response to horizontal intensity change.
pub fn sobel_y() -> Kernel {
    Kernel {
        size: 3,
        weights: vec![1.0, 0.0, -1.0, 2.0, 0.0, -2.0, 1.0, 0.0, -1.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::from_fn(w, h, |x, y| {
            let v = (x + y) as f32 / (w + h) as f32;
            [v, 1.0 - v, v * 0.5, 1.0]
        })
        .unwrap()
    }

    #[test]
    fn even_and_ragged_kernels_are_rejected() {
        assert!(matches!(
            Kernel::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
            Err(EngineError::MalformedKernel { .. })
        ));
        assert!(matches!(
            Kernel::new(vec![vec![1.0, 0.0, 0.0], vec![0.0], vec![0.0, 0.0, 1.0]]),
            Err(EngineError::MalformedKernel { .. })
        ));
        assert!(Kernel::new(vec![]).is_err());
    }

    #[test]
    fn kernel_deserialization_validates_shape() {
        assert!(serde_json::from_str::<Kernel>("[[1.0, 2.0]]").is_err());
        let k: Kernel = serde_json::from_str("[[0,0,0],[0,1,0],[0,0,0]]").unwrap();
        assert_eq!(k.size(), 3);
    }

    #[test]
    fn identity_kernel_copies_rgb_and_forces_alpha() {
        let mut src = ramp(5, 4);
        src.set(2, 2, [0.2, 0.4, 0.6, 0.3]);
        let out = convolve(&src, &identity_kernel(), BorderPolicy::Ignore, AlphaHandling::Opaque, &Scheduler::serial()).unwrap();
        assert_eq!(out.get(2, 2), [0.2, 0.4, 0.6, 1.0]);
    }

    #[test]
    fn ignore_policy_darkens_borders_of_a_mean_filter() {
        let src = PixelBuffer::filled(4, 4, [1.0, 1.0, 1.0, 1.0]).unwrap();
        let out = convolve(&src, &box_kernel(1), BorderPolicy::Ignore, AlphaHandling::Opaque, &Scheduler::serial()).unwrap();
        assert!((out.get(0, 0)[0] - 4.0 / 9.0).abs() < 1e-6);
        assert!((out.get(1, 1)[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn renormalize_keeps_flat_images_flat() {
        let src = PixelBuffer::filled(6, 5, [0.4, 0.4, 0.4, 1.0]).unwrap();
        let out = convolve(&src, &gaussian_kernel(2), BorderPolicy::Renormalize, AlphaHandling::Filter, &Scheduler::serial()).unwrap();
        for v in out.as_raw().chunks(4) {
            assert!((v[0] - 0.4).abs() < 1e-5);
        }
    }

    #[test]
    fn halo_parallel_matches_serial() {
        let src = ramp(13, 11);
        let k = gaussian_kernel(3);
        let serial = convolve(&src, &k, BorderPolicy::Ignore, AlphaHandling::Opaque, &Scheduler::serial()).unwrap();
        let par = convolve(&src, &k, BorderPolicy::Ignore, AlphaHandling::Opaque, &Scheduler::new(4, std::time::Duration::from_secs(60))).unwrap();
        assert_eq!(serial, par);
    }

    #[test]
    fn gaussian_kernel_is_normalized() {
        let k = gaussian_kernel(4);
        assert_eq!(k.size(), 9);
        assert!((k.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scalar_field_is_unclamped() {
        let src = PixelBuffer::filled(3, 3, [1.0, 1.0, 1.0, 1.0]).unwrap();
        let k = Kernel::new(vec![vec![0.0, 0.0, 0.0], vec![0.0, 3.0, 0.0], vec![0.0, 0.0, 0.0]]).unwrap();
        let field = scalar_field(&src, &k, BorderPolicy::Ignore);
        assert_eq!(field.get(1, 1), 3.0);
    }
}
