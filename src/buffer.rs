// ============================================================================
// PIXEL BUFFER: normalized RGBA storage shared by every operation
// ============================================================================
//
// Channels are `f32` in [0, 1], interleaved RGBA, rows top to bottom.
// Every write that goes through this API clamps, so the invariant holds for
// any buffer an operation hands back to the engine.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const CHANNELS: usize = 4;

/// BT.709 luminance weights (sum to 1.0).
pub const LUMA_R: f32 = 0.2126;
pub const LUMA_G: f32 = 0.7152;
pub const LUMA_B: f32 = 0.0722;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBuffer")]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

/// Unvalidated wire form; converted through `TryFrom` so a truncated or
/// hand-edited project can't produce a buffer with the wrong length.
#[derive(Deserialize)]
struct RawBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl TryFrom<RawBuffer> for PixelBuffer {
    type Error = EngineError;

    fn try_from(raw: RawBuffer) -> Result<Self> {
        check_dimensions(raw.width, raw.height)?;
        let expected = raw.width as usize * raw.height as usize * CHANNELS;
        if raw.data.len() != expected {
            return Err(EngineError::Project(format!(
                "pixel data has {} values, expected {}",
                raw.data.len(),
                expected
            )));
        }
        let mut data = raw.data;
        for v in &mut data {
            *v = clamp_unit(*v);
        }
        Ok(Self { width: raw.width, height: raw.height, data })
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(EngineError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Clamp to [0, 1]; NaN becomes 0.
#[inline]
pub fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Luminance of an RGB triple. Already-gray pixels are returned untouched so
/// that repeated desaturation is exact.
#[inline]
pub fn luminance(r: f32, g: f32, b: f32) -> f32 {
    if r == g && g == b {
        return r;
    }
    clamp_unit(LUMA_R * r + LUMA_G * g + LUMA_B * b)
}

/// Write a clamped pixel into an interleaved row slice.
#[inline]
pub fn write_px(row: &mut [f32], x: usize, px: [f32; 4]) {
    let i = x * CHANNELS;
    row[i] = clamp_unit(px[0]);
    row[i + 1] = clamp_unit(px[1]);
    row[i + 2] = clamp_unit(px[2]);
    row[i + 3] = clamp_unit(px[3]);
}

/// Read a pixel from an interleaved row slice.
#[inline]
pub fn read_px(row: &[f32], x: usize) -> [f32; 4] {
    let i = x * CHANNELS;
    [row[i], row[i + 1], row[i + 2], row[i + 3]]
}

impl PixelBuffer {
    /// Fully transparent black buffer.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::filled(width, height, [0.0; 4])
    }

    pub fn filled(width: u32, height: u32, px: [f32; 4]) -> Result<Self> {
        check_dimensions(width, height)?;
        let px = px.map(clamp_unit);
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * CHANNELS);
        for _ in 0..count {
            data.extend_from_slice(&px);
        }
        Ok(Self { width, height, data })
    }

    /// Build a buffer from a generator called once per pixel.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Result<Self>
    where
        F: FnMut(u32, u32) -> [f32; 4],
    {
        let mut out = Self::new(width, height)?;
        for y in 0..height {
            for x in 0..width {
                out.set(x, y, f(x, y));
            }
        }
        Ok(out)
    }

    pub fn from_rgba8(width: u32, height: u32, raw: &[u8]) -> Result<Self> {
        check_dimensions(width, height)?;
        let expected = width as usize * height as usize * CHANNELS;
        if raw.len() != expected {
            return Err(EngineError::invalid(format!(
                "RGBA buffer has {} bytes, expected {}",
                raw.len(),
                expected
            )));
        }
        let data = raw.iter().map(|&b| b as f32 / 255.0).collect();
        Ok(Self { width, height, data })
    }

    pub fn from_rgba_image(img: &RgbaImage) -> Result<Self> {
        Self::from_rgba8(img.width(), img.height(), img.as_raw())
    }

    pub fn to_rgba8(&self) -> Vec<u8> {
        self.data.iter().map(|&v| to_byte(v)).collect()
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| image::Rgba(self.get(x, y).map(to_byte)))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of `f32` values in one row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [f32; 4] {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, px: [f32; 4]) {
        let stride = self.stride();
        let row = &mut self.data[y as usize * stride..(y as usize + 1) * stride];
        write_px(row, x as usize, px);
    }

    pub fn row(&self, y: u32) -> &[f32] {
        let stride = self.stride();
        &self.data[y as usize * stride..(y as usize + 1) * stride]
    }

    pub fn as_raw(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access for the stripe scheduler. Callers must keep values in
    /// [0, 1] (use [`write_px`]).
    pub(crate) fn as_raw_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Luminance of the pixel at (x, y).
    #[inline]
    pub fn intensity(&self, x: u32, y: u32) -> f32 {
        let [r, g, b, _] = self.get(x, y);
        luminance(r, g, b)
    }

    pub fn same_dimensions(&self, other: &PixelBuffer) -> bool {
        self.dimensions() == other.dimensions()
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (clamp_unit(v) * 255.0).round() as u8
}
