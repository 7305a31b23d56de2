// ============================================================================
// TRANSFORM OPERATIONS: free rotation about the canvas centre
// ============================================================================

use crate::buffer::{PixelBuffer, write_px};
use crate::error::Result;
use crate::ops::scheduler::{Scheduler, stripe_row};

/// Rotate by `degrees` (clockwise on screen) about the image centre. The
/// canvas keeps its size; pixels that map outside the source are transparent.
pub fn rotate(src: &PixelBuffer, degrees: f64, scheduler: &Scheduler) -> Result<PixelBuffer> {
    let (w, h) = src.dimensions();
    let mut dst = PixelBuffer::new(w, h)?;

    let theta = (degrees as f32).to_radians();
    let (sin, cos) = theta.sin_cos();
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;

    scheduler.run(&mut dst, |stripe, rows| {
        for y in stripe.rows() {
            let row = stripe_row(rows, stripe, y, w);
            for x in 0..w {
                // Inverse-map the destination pixel centre into the source.
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let sx = cx + cos * dx + sin * dy - 0.5;
                let sy = cy - sin * dx + cos * dy - 0.5;
                write_px(row, x as usize, bilinear_sample(src, sx, sy));
            }
        }
    })?;
    Ok(dst)
}

fn bilinear_sample(img: &PixelBuffer, x: f32, y: f32) -> [f32; 4] {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i64, sy: i64| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i64 || sy >= img.height() as i64 {
            [0.0; 4]
        } else {
            img.get(sx as u32, sy as u32)
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0.0f32; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::from_fn(w, h, |x, y| [x as f32 / w as f32, y as f32 / h as f32, 0.25, 1.0]).unwrap()
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let src = sample(6, 4);
        assert_eq!(rotate(&src, 0.0, &Scheduler::serial()).unwrap(), src);
    }

    #[test]
    fn test_half_turn_maps_corners() {
        let src = sample(4, 4);
        let out = rotate(&src, 180.0, &Scheduler::serial()).unwrap();
        let a = out.get(0, 0);
        let b = src.get(3, 3);
        for c in 0..4 {
            assert!((a[c] - b[c]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_uncovered_corners_are_transparent() {
        let src = PixelBuffer::filled(9, 9, [1.0, 1.0, 1.0, 1.0]).unwrap();
        let out = rotate(&src, 45.0, &Scheduler::serial()).unwrap();
        assert_eq!(out.get(0, 0)[3], 0.0);
        assert_eq!(out.get(4, 4)[3], 1.0);
    }
}
