// ============================================================================
// EDGE DETECTION: Canny pipeline over Sobel gradients
// ============================================================================
//
// grayscale → Gaussian blur → Sobel Gx/Gy → magnitude + direction →
// non-max suppression → double threshold → hysteresis.
//
// The blur and both gradient fields replicate edge pixels (Clamp) so a flat
// image produces exactly zero gradient everywhere, borders included.

use crate::buffer::PixelBuffer;
use crate::error::{EngineError, Result};
use crate::ops::adjustments::MAX_BLUR_RADIUS;
use crate::ops::convolution::{self, AlphaHandling, BorderPolicy, ScalarField, sobel_x, sobel_y};
use crate::ops::filters;
use crate::ops::scheduler::Scheduler;

pub const DEFAULT_BLUR_RADIUS: u32 = 4;
pub const HIGH_THRESHOLD_RATIO: f64 = 0.09;
pub const LOW_THRESHOLD_RATIO: f64 = 0.05;

const STRONG: f64 = 1.0;
const WEAK: f64 = 0.5;

/// Below this a gradient magnitude is rounding noise, not an edge.
const MAGNITUDE_FLOOR: f64 = 1e-9;

/// The pre-blur kernel is (2r+1)², so the radius shares the blur cap.
pub fn validate_blur_radius(blur_radius: u32) -> Result<()> {
    if blur_radius > MAX_BLUR_RADIUS {
        return Err(EngineError::invalid(format!(
            "edge detection blur radius {blur_radius} exceeds {MAX_BLUR_RADIUS}"
        )));
    }
    Ok(())
}

/// Run the full Canny pipeline. Output is grayscale (R=G=B ∈ {0, 1}) with
/// opaque alpha.
pub fn canny(src: &PixelBuffer, blur_radius: u32, scheduler: &Scheduler) -> Result<PixelBuffer> {
    validate_blur_radius(blur_radius)?;
    let gray = filters::grayscale(src, scheduler)?;
    let blurred = convolution::convolve(
        &gray,
        &convolution::gaussian_kernel(blur_radius),
        BorderPolicy::Clamp,
        AlphaHandling::Opaque,
        scheduler,
    )?;

    let gx = convolution::scalar_field(&blurred, &sobel_x(), BorderPolicy::Clamp);
    let gy = convolution::scalar_field(&blurred, &sobel_y(), BorderPolicy::Clamp);
    let (mut magnitude, direction) = gradient(&gx, &gy);

    non_max_suppression(&mut magnitude, &direction);
    double_threshold(&mut magnitude);
    hysteresis(&mut magnitude);

    tracing::debug!(
        width = src.width(),
        height = src.height(),
        blur_radius,
        "canny edge map computed"
    );
    magnitude.to_gray_buffer()
}

/// Magnitude clamped to [0, 1] and direction folded into [0, 180] degrees.
fn gradient(gx: &ScalarField, gy: &ScalarField) -> (ScalarField, ScalarField) {
    let (w, h) = (gx.width(), gx.height());
    let mut magnitude = ScalarField::zeros(w, h);
    let mut direction = ScalarField::zeros(w, h);
    for y in 0..h {
        for x in 0..w {
            let (hx, vy) = (gx.get(x, y), gy.get(x, y));
            let m = (hx * hx + vy * vy).sqrt().clamp(0.0, 1.0);
            magnitude.set(x, y, if m < MAGNITUDE_FLOOR { 0.0 } else { m });
            let deg = vy.atan2(hx).to_degrees();
            direction.set(x, y, if deg < 0.0 { deg + 180.0 } else { deg });
        }
    }
    (magnitude, direction)
}

/// The two neighbours compared for a gradient direction, as (dx, dy) offsets.
fn direction_neighbours(angle: f64) -> [(i64, i64); 2] {
    if (22.5..67.5).contains(&angle) {
        [(1, -1), (-1, 1)]
    } else if (67.5..112.5).contains(&angle) {
        [(1, 0), (-1, 0)]
    } else if (112.5..157.5).contains(&angle) {
        [(-1, -1), (1, 1)]
    } else {
        [(0, 1), (0, -1)]
    }
}

/// Interior pixels survive only if they are at least as large as both
/// neighbours along their direction class. Reads a pre-suppression copy.
fn non_max_suppression(magnitude: &mut ScalarField, direction: &ScalarField) {
    let (w, h) = (magnitude.width(), magnitude.height());
    if w < 3 || h < 3 {
        return;
    }
    let original = magnitude.clone();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let here = original.get(x, y);
            let keep = direction_neighbours(direction.get(x, y)).iter().all(|&(dx, dy)| {
                here >= original.get((x as i64 + dx) as u32, (y as i64 + dy) as u32)
            });
            if !keep {
                magnitude.set(x, y, 0.0);
            }
        }
    }
}

fn double_threshold(magnitude: &mut ScalarField) {
    let high = magnitude.max() * HIGH_THRESHOLD_RATIO;
    let low = high * LOW_THRESHOLD_RATIO;
    let (w, h) = (magnitude.width(), magnitude.height());
    for y in 0..h {
        for x in 0..w {
            let v = magnitude.get(x, y);
            let class = if v > high {
                STRONG
            } else if v < low {
                0.0
            } else {
                WEAK
            };
            magnitude.set(x, y, class);
        }
    }
}

/// Weak pixels become strong when any 8-neighbour of the post-threshold
/// snapshot is strong, otherwise they are dropped.
fn hysteresis(classes: &mut ScalarField) {
    let snapshot = classes.clone();
    let (w, h) = (classes.width() as i64, classes.height() as i64);
    for y in 0..h {
        for x in 0..w {
            if snapshot.get(x as u32, y as u32) != WEAK {
                continue;
            }
            let connected = (y - 1..=y + 1).any(|ny| {
                (x - 1..=x + 1).any(|nx| {
                    nx >= 0 && ny >= 0 && nx < w && ny < h && snapshot.get(nx as u32, ny as u32) == STRONG
                })
            });
            classes.set(x as u32, y as u32, if connected { STRONG } else { 0.0 });
        }
    }
}
