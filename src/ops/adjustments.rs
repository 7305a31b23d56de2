// ============================================================================
// ADJUSTMENT OPERATIONS: continuous-parameter colour, blur and rotate
// ============================================================================
//
// These back `Engine::adjust`: each call recomputes from the pre-adjustment
// base, so the functions here are pure `&PixelBuffer -> PixelBuffer`.
// Per-pixel adjustments run stripe-parallel; blurs go through the
// halo-aware convolution.
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::error::{EngineError, Result};
use crate::ops::convolution::{self, AlphaHandling, BorderPolicy};
use crate::ops::filters::map_pixels;
use crate::ops::scheduler::Scheduler;
use crate::ops::transform;

/// Largest blur radius accepted; wider kernels are rejected up front.
pub const MAX_BLUR_RADIUS: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustParam {
    Red,
    Green,
    Blue,
    Hue,
    Saturation,
    Value,
    Brightness,
    Contrast,
    GaussianBlur,
    BoxBlur,
    Rotate,
}

impl AdjustParam {
    pub fn all() -> &'static [AdjustParam] {
        &[
            AdjustParam::Red,
            AdjustParam::Green,
            AdjustParam::Blue,
            AdjustParam::Hue,
            AdjustParam::Saturation,
            AdjustParam::Value,
            AdjustParam::Brightness,
            AdjustParam::Contrast,
            AdjustParam::GaussianBlur,
            AdjustParam::BoxBlur,
            AdjustParam::Rotate,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdjustParam::Red => "red",
            AdjustParam::Green => "green",
            AdjustParam::Blue => "blue",
            AdjustParam::Hue => "hue",
            AdjustParam::Saturation => "saturation",
            AdjustParam::Value => "value",
            AdjustParam::Brightness => "brightness",
            AdjustParam::Contrast => "contrast",
            AdjustParam::GaussianBlur => "gaussianblur",
            AdjustParam::BoxBlur => "boxblur",
            AdjustParam::Rotate => "rotate",
        }
    }
}

impl fmt::Display for AdjustParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Case-insensitive; `-`, `_` and spaces are ignored ("Gaussian_Blur" works).
impl FromStr for AdjustParam {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        AdjustParam::all()
            .iter()
            .copied()
            .find(|p| p.name() == key)
            .ok_or_else(|| EngineError::UnknownAdjustment(s.to_string()))
    }
}

pub fn validate(param: AdjustParam, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(EngineError::invalid(format!("{param} value must be finite")));
    }
    if matches!(param, AdjustParam::GaussianBlur | AdjustParam::BoxBlur) {
        if value < 0.0 {
            return Err(EngineError::invalid(format!("{param} radius must be >= 0")));
        }
        if value.round() > MAX_BLUR_RADIUS as f64 {
            return Err(EngineError::invalid(format!("{param} radius exceeds {MAX_BLUR_RADIUS}")));
        }
    }
    Ok(())
}

/// Apply one adjustment to `src`. Callers validate first.
pub fn apply(src: &PixelBuffer, param: AdjustParam, value: f64, scheduler: &Scheduler) -> Result<PixelBuffer> {
    let v = value as f32;
    match param {
        AdjustParam::Red => map_pixels(src, scheduler, |r, g, b, a| (r * v, g, b, a)),
        AdjustParam::Green => map_pixels(src, scheduler, |r, g, b, a| (r, g * v, b, a)),
        AdjustParam::Blue => map_pixels(src, scheduler, |r, g, b, a| (r, g, b * v, a)),
        AdjustParam::Brightness => map_pixels(src, scheduler, |r, g, b, a| (r + v, g + v, b + v, a)),
        AdjustParam::Contrast => {
            let k = 1.0 + v;
            map_pixels(src, scheduler, |r, g, b, a| {
                ((r - 0.5) * k + 0.5, (g - 0.5) * k + 0.5, (b - 0.5) * k + 0.5, a)
            })
        }
        AdjustParam::Hue => {
            let shift = (v / 360.0).rem_euclid(1.0);
            map_pixels(src, scheduler, |r, g, b, a| {
                let (h, s, val) = rgb_to_hsv(r, g, b);
                let (nr, ng, nb) = hsv_to_rgb((h + shift).rem_euclid(1.0), s, val);
                (nr, ng, nb, a)
            })
        }
        AdjustParam::Saturation => map_pixels(src, scheduler, |r, g, b, a| {
            let (h, s, val) = rgb_to_hsv(r, g, b);
            let (nr, ng, nb) = hsv_to_rgb(h, (s * (1.0 + v)).clamp(0.0, 1.0), val);
            (nr, ng, nb, a)
        }),
        AdjustParam::Value => map_pixels(src, scheduler, |r, g, b, a| {
            let (h, s, val) = rgb_to_hsv(r, g, b);
            let (nr, ng, nb) = hsv_to_rgb(h, s, (val * (1.0 + v)).clamp(0.0, 1.0));
            (nr, ng, nb, a)
        }),
        AdjustParam::GaussianBlur => blur(src, convolution::gaussian_kernel(value.round() as u32), scheduler),
        AdjustParam::BoxBlur => blur(src, convolution::box_kernel(value.round() as u32), scheduler),
        AdjustParam::Rotate => transform::rotate(src, value, scheduler),
    }
}

fn blur(src: &PixelBuffer, kernel: convolution::Kernel, scheduler: &Scheduler) -> Result<PixelBuffer> {
    convolution::convolve(src, &kernel, BorderPolicy::Renormalize, AlphaHandling::Filter, scheduler)
}

// ============================================================================
// COLOR SPACE HELPERS
// ============================================================================

/// RGB (0..1) → HSV (H: 0..1, S: 0..1, V: 0..1)
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let d = max - min;

    if d.abs() < 1e-6 {
        return (0.0, 0.0, max);
    }

    let s = if max > 0.0 { d / max } else { 0.0 };
    let h = if max == r {
        let mut h = (g - b) / d;
        if h < 0.0 { h += 6.0; }
        h / 6.0
    } else if max == g {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    (h, s, max)
}

/// HSV (H: 0..1, S: 0..1, V: 0..1) → RGB (0..1)
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    if s.abs() < 1e-6 {
        return (v, v, v);
    }
    let h6 = (h * 6.0).rem_euclid(6.0);
    let i = h6.floor();
    let f = h6 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match i as u32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_names_are_case_and_separator_insensitive() {
        assert_eq!("Brightness".parse::<AdjustParam>().unwrap(), AdjustParam::Brightness);
        assert_eq!("gaussian_blur".parse::<AdjustParam>().unwrap(), AdjustParam::GaussianBlur);
        assert_eq!("BOX-BLUR".parse::<AdjustParam>().unwrap(), AdjustParam::BoxBlur);
        assert!(matches!("gamma".parse::<AdjustParam>(), Err(EngineError::UnknownAdjustment(_))));
    }

    #[test]
    fn test_brightness_adds_and_clamps() {
        let src = PixelBuffer::filled(2, 2, [0.5, 0.9, 0.0, 0.7]).unwrap();
        let out = apply(&src, AdjustParam::Brightness, 0.3, &Scheduler::serial()).unwrap();
        let px = out.get(1, 1);
        assert!((px[0] - 0.8).abs() < 1e-6);
        assert_eq!(px[1], 1.0);
        assert_eq!(px[3], 0.7);
    }

    #[test]
    fn test_hsv_round_trip() {
        for &(r, g, b) in &[(0.2, 0.4, 0.6), (0.9, 0.1, 0.3), (0.5, 0.5, 0.1)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            let (nr, ng, nb) = hsv_to_rgb(h, s, v);
            assert!((nr - r).abs() < 1e-5 && (ng - g).abs() < 1e-5 && (nb - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_full_hue_turn_is_identity() {
        let src = PixelBuffer::filled(1, 1, [0.8, 0.3, 0.1, 1.0]).unwrap();
        let out = apply(&src, AdjustParam::Hue, 360.0, &Scheduler::serial()).unwrap();
        for c in 0..3 {
            assert!((out.get(0, 0)[c] - src.get(0, 0)[c]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_blur_rejects_bad_radius() {
        assert!(validate(AdjustParam::GaussianBlur, -1.0).is_err());
        assert!(validate(AdjustParam::BoxBlur, 1000.0).is_err());
        assert!(validate(AdjustParam::Red, f64::NAN).is_err());
        assert!(validate(AdjustParam::GaussianBlur, 3.0).is_ok());
    }

    #[test]
    fn test_zero_radius_blur_is_identity() {
        let src = PixelBuffer::from_fn(3, 3, |x, y| [x as f32 / 3.0, y as f32 / 3.0, 0.5, 0.5]).unwrap();
        let out = apply(&src, AdjustParam::GaussianBlur, 0.0, &Scheduler::serial()).unwrap();
        assert_eq!(out, src);
    }
}
