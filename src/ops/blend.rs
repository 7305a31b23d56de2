// ============================================================================
// BLEND COMPOSITOR: per-channel blending of a second image over the working one
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::{PixelBuffer, read_px, write_px};
use crate::error::{EngineError, Result};
use crate::ops::scheduler::{Scheduler, stripe_row};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    /// Returns all blend modes in menu order
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Hue,
            BlendMode::Saturation,
            BlendMode::Color,
            BlendMode::Luminosity,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Luminosity => "Luminosity",
        }
    }

    /// Hue/Saturation/Color/Luminosity mix channels and have no per-channel form.
    pub fn is_separable(&self) -> bool {
        !matches!(self, BlendMode::Hue | BlendMode::Saturation | BlendMode::Color | BlendMode::Luminosity)
    }

    /// Blend one channel: `a` from the base image, `b` from the blend image.
    /// Returns `None` for non-separable modes.
    pub fn channel(&self, a: f32, b: f32) -> Option<f32> {
        let v = match self {
            BlendMode::Normal => a,
            BlendMode::Multiply => a * b,
            BlendMode::Screen => 1.0 - (1.0 - a) * (1.0 - b),
            BlendMode::Overlay => overlay_channel(a, b),
            BlendMode::Darken => a.min(b),
            BlendMode::Lighten => a.max(b),
            BlendMode::ColorDodge => color_dodge_channel(a, b),
            BlendMode::ColorBurn => color_burn_channel(a, b),
            // Hard light is overlay with the layers swapped.
            BlendMode::HardLight => overlay_channel(b, a),
            BlendMode::SoftLight => soft_light_channel(a, b),
            BlendMode::Difference => (a - b).abs(),
            BlendMode::Exclusion => a + b - 2.0 * a * b,
            BlendMode::Hue | BlendMode::Saturation | BlendMode::Color | BlendMode::Luminosity => return None,
        };
        Some(v)
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if top == 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

/// W3C Soft Light formula.
fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

pub fn validate(base: &PixelBuffer, layer: &PixelBuffer, mode: BlendMode) -> Result<()> {
    if !mode.is_separable() {
        return Err(EngineError::BlendModeNotImplemented(mode));
    }
    if !base.same_dimensions(layer) {
        return Err(EngineError::mismatch(base.dimensions(), layer.dimensions()));
    }
    Ok(())
}

/// Composite `layer` onto `base`. RGB per channel, alpha taken from `base`.
pub fn blend(base: &PixelBuffer, layer: &PixelBuffer, mode: BlendMode, scheduler: &Scheduler) -> Result<PixelBuffer> {
    validate(base, layer, mode)?;
    let (w, h) = base.dimensions();
    let mut dst = PixelBuffer::new(w, h)?;
    scheduler.run(&mut dst, |stripe, rows| {
        for y in stripe.rows() {
            let (base_row, layer_row) = (base.row(y), layer.row(y));
            let row = stripe_row(rows, stripe, y, w);
            for x in 0..w as usize {
                let a = read_px(base_row, x);
                let b = read_px(layer_row, x);
                let mut out = a;
                for c in 0..3 {
                    // Separable modes always yield a value; checked in `validate`.
                    out[c] = mode.channel(a[c], b[c]).unwrap_or(a[c]);
                }
                write_px(row, x, out);
            }
        }
    })?;
    Ok(dst)
}
