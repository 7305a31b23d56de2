// ============================================================================
// FREQUENCY FILTERS: transfer functions applied in the 2D Fourier domain
// ============================================================================
//
// Each RGB channel is transformed (rows, then columns via a transpose),
// multiplied by H(d) and transformed back. `d` is the distance of a sample
// from the spectrum centre, scaled so the farthest corner sits at 1.0; the
// cutoff and band width are given on the same 0..1 scale.

use std::fmt;

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyRange {
    LowPass,
    HighPass,
    BandPass,
    BandReject,
}

impl FrequencyRange {
    fn is_band(self) -> bool {
        matches!(self, FrequencyRange::BandPass | FrequencyRange::BandReject)
    }

    /// HighPass and BandReject are complements of their pass counterparts.
    fn is_complement(self) -> bool {
        matches!(self, FrequencyRange::HighPass | FrequencyRange::BandReject)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape")]
pub enum FilterKind {
    Ideal,
    Gaussian,
    Butterworth { order: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyFilter {
    pub kind: FilterKind,
    pub range: FrequencyRange,
    /// D0, the cut-off (or band centre) distance.
    pub cutoff: f64,
    /// W, only used by band ranges.
    #[serde(default)]
    pub band_width: f64,
}

impl FrequencyFilter {
    pub fn new(kind: FilterKind, range: FrequencyRange, cutoff: f64, band_width: f64) -> Self {
        Self { kind, range, cutoff, band_width }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(EngineError::invalid(format!("cutoff must be > 0 (got {})", self.cutoff)));
        }
        if self.range.is_band() && !(self.band_width.is_finite() && self.band_width > 0.0) {
            return Err(EngineError::invalid(format!(
                "band width must be > 0 for {:?} (got {})",
                self.range, self.band_width
            )));
        }
        if let FilterKind::Butterworth { order } = self.kind
            && order == 0
        {
            return Err(EngineError::invalid("Butterworth order must be >= 1"));
        }
        Ok(())
    }

    /// H(d) for a normalized distance `d >= 0`.
    pub fn transfer_value(&self, dist: f64) -> f64 {
        let d0 = self.cutoff;
        let w = self.band_width;
        let band = self.range.is_band();
        let base = match self.kind {
            FilterKind::Gaussian => {
                if band {
                    (-(dist.powi(2) - d0.powi(2)).powi(2) / (dist * w)).exp()
                } else {
                    (-dist.powi(2) / (2.0 * d0.powi(2))).exp()
                }
            }
            FilterKind::Ideal => {
                let inside = if band { (dist - d0).abs() <= w / 2.0 } else { dist <= d0 };
                if inside { 1.0 } else { 0.0 }
            }
            FilterKind::Butterworth { order } => {
                let ratio = if band { (dist.powi(2) - d0.powi(2)) / (dist * w) } else { dist / d0 };
                1.0 / (1.0 + ratio.powi(2 * order as i32))
            }
        };
        // 0/0 only happens for a band filter at d = D0 = 0, which validation rejects.
        let base = if base.is_nan() { 0.0 } else { base };
        if self.range.is_complement() { 1.0 - base } else { base }
    }
}

impl fmt::Display for FrequencyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self.kind {
            FilterKind::Ideal => "ideal".to_string(),
            FilterKind::Gaussian => "gaussian".to_string(),
            FilterKind::Butterworth { order } => format!("butterworth (order {order})"),
        };
        write!(f, "{:?} {shape} filter, cutoff frequency: {:.2}", self.range, self.cutoff)?;
        if self.range.is_band() {
            write!(f, ", bandwidth: {:.2}", self.band_width)?;
        }
        Ok(())
    }
}

/// Signed frequency index of bin `i` in an `n`-point spectrum, in [-n/2, n/2).
#[inline]
fn centred(i: usize, n: usize) -> i64 {
    ((i + n / 2) % n) as i64 - (n / 2) as i64
}

/// Normalized distance of bin (u, v) from DC; the corner bin is 1.0.
pub fn normalized_distance(u: usize, v: usize, width: usize, height: usize) -> f64 {
    let half_w = (width / 2).max(1) as f64;
    let half_h = (height / 2).max(1) as f64;
    let du = centred(u, width) as f64 / half_w;
    let dv = centred(v, height) as f64 / half_h;
    (du * du + dv * dv).sqrt() / std::f64::consts::SQRT_2
}

fn transpose(src: &[Complex<f64>], rows: usize, cols: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); src.len()];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = src[r * cols + c];
        }
    }
    out
}

/// Filter one image. Alpha is copied from the source.
pub fn apply(src: &PixelBuffer, filter: &FrequencyFilter) -> Result<PixelBuffer> {
    filter.validate()?;
    let (w, h) = (src.width() as usize, src.height() as usize);

    let mut planner = FftPlanner::<f64>::new();
    let row_fwd = planner.plan_fft_forward(w);
    let row_inv = planner.plan_fft_inverse(w);
    let col_fwd = planner.plan_fft_forward(h);
    let col_inv = planner.plan_fft_inverse(h);

    // Transfer values in transposed (column-major) order, shared by channels.
    let mut transfer = vec![0.0f64; w * h];
    for u in 0..w {
        for v in 0..h {
            transfer[u * h + v] = filter.transfer_value(normalized_distance(u, v, w, h));
        }
    }

    let scale = 1.0 / (w * h) as f64;
    let raw = src.as_raw();
    let mut out = src.clone();
    for channel in 0..3 {
        let mut data: Vec<Complex<f64>> =
            raw.chunks_exact(4).map(|px| Complex::new(px[channel] as f64, 0.0)).collect();

        row_fwd.process(&mut data);
        let mut cols = transpose(&data, h, w);
        col_fwd.process(&mut cols);

        for (sample, gain) in cols.iter_mut().zip(&transfer) {
            *sample *= *gain;
        }

        col_inv.process(&mut cols);
        let mut data = transpose(&cols, w, h);
        row_inv.process(&mut data);

        for y in 0..h {
            for x in 0..w {
                let mut px = out.get(x as u32, y as u32);
                px[channel] = (data[y * w + x].re * scale) as f32;
                out.set(x as u32, y as u32, px);
            }
        }
    }

    tracing::debug!(%filter, width = w, height = h, "frequency filter applied");
    Ok(out)
}
