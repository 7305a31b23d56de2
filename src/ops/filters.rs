// ============================================================================
// IMAGE FILTERS: desaturation, inversion, flips, sharpen
// ============================================================================
//
// Every filter reads `src` and returns a fresh buffer. Per-pixel filters and
// flips run stripe-parallel; sharpen goes through the halo-aware convolution.

use crate::buffer::{PixelBuffer, luminance, read_px, write_px};
use crate::error::Result;
use crate::ops::convolution::{self, AlphaHandling, BorderPolicy};
use crate::ops::scheduler::{Scheduler, stripe_row};

// ============================================================================
// HELPER: stripe-parallel per-pixel transform
// ============================================================================

/// Apply a per-pixel transform over every stripe of a new buffer.
/// `transform` receives (r, g, b, a) and returns (r, g, b, a); the result is
/// clamped on write.
pub fn map_pixels<F>(src: &PixelBuffer, scheduler: &Scheduler, transform: F) -> Result<PixelBuffer>
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let (w, h) = src.dimensions();
    let mut dst = PixelBuffer::new(w, h)?;
    scheduler.run(&mut dst, |stripe, rows| {
        for y in stripe.rows() {
            let src_row = src.row(y);
            let row = stripe_row(rows, stripe, y, w);
            for x in 0..w as usize {
                let [r, g, b, a] = read_px(src_row, x);
                let (nr, ng, nb, na) = transform(r, g, b, a);
                write_px(row, x, [nr, ng, nb, na]);
            }
        }
    })?;
    Ok(dst)
}

// ============================================================================
// COLOUR
// ============================================================================

/// BT.709 desaturation; alpha kept. Idempotent.
pub fn grayscale(src: &PixelBuffer, scheduler: &Scheduler) -> Result<PixelBuffer> {
    map_pixels(src, scheduler, |r, g, b, a| {
        let l = luminance(r, g, b);
        (l, l, l, a)
    })
}

pub fn inverse_colour(src: &PixelBuffer, scheduler: &Scheduler) -> Result<PixelBuffer> {
    map_pixels(src, scheduler, |r, g, b, a| (1.0 - r, 1.0 - g, 1.0 - b, a))
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Mirror left-right. Each stripe reads only its own rows.
pub fn flip_horizontal(src: &PixelBuffer, scheduler: &Scheduler) -> Result<PixelBuffer> {
    let (w, h) = src.dimensions();
    let mut dst = PixelBuffer::new(w, h)?;
    scheduler.run(&mut dst, |stripe, rows| {
        for y in stripe.rows() {
            let src_row = src.row(y);
            let row = stripe_row(rows, stripe, y, w);
            for x in 0..w as usize {
                write_px(row, x, read_px(src_row, w as usize - 1 - x));
            }
        }
    })?;
    Ok(dst)
}

/// Mirror top-bottom. Stripes read the mirrored rows of the shared source.
pub fn flip_vertical(src: &PixelBuffer, scheduler: &Scheduler) -> Result<PixelBuffer> {
    let (w, h) = src.dimensions();
    let mut dst = PixelBuffer::new(w, h)?;
    scheduler.run(&mut dst, |stripe, rows| {
        for y in stripe.rows() {
            let row = stripe_row(rows, stripe, y, w);
            row.copy_from_slice(src.row(h - 1 - y));
        }
    })?;
    Ok(dst)
}

// ============================================================================
// SHARPEN
// ============================================================================

/// 3x3 sharpen kernel, ignoring out-of-bounds taps; output alpha is opaque.
pub fn sharpen(src: &PixelBuffer, scheduler: &Scheduler) -> Result<PixelBuffer> {
    convolution::convolve(
        src,
        &convolution::sharpen_kernel(),
        BorderPolicy::Ignore,
        AlphaHandling::Opaque,
        scheduler,
    )
}
