// ============================================================================
// HISTOGRAM EQUALIZATION: 256-bucket CDF remap of luminance
// ============================================================================

use crate::buffer::{PixelBuffer, luminance};
use crate::error::Result;
use crate::ops::filters::map_pixels;
use crate::ops::scheduler::Scheduler;

pub const BUCKETS: usize = 256;

/// Equalized image plus the curves the editor plots next to it.
#[derive(Clone, Debug)]
pub struct Equalization {
    pub image: PixelBuffer,
    /// Cumulative count per input intensity.
    pub original_cdf: [u64; BUCKETS],
    /// Cumulative count per output intensity (monotone).
    pub result_cdf: [u64; BUCKETS],
    /// Output intensity bucket (0..=255 scale, before the /256) for each
    /// input bucket. `None` when the image was degenerate and passed through.
    pub mapping: Option<[f64; BUCKETS]>,
}

#[inline]
fn bucket(intensity: f32) -> usize {
    ((intensity * 255.0).round() as usize).min(BUCKETS - 1)
}

pub fn histogram(src: &PixelBuffer) -> [u64; BUCKETS] {
    let mut pdf = [0u64; BUCKETS];
    for px in src.as_raw().chunks_exact(4) {
        pdf[bucket(luminance(px[0], px[1], px[2]))] += 1;
    }
    pdf
}

/// Running sum of `pdf`, and the count used as the floor of the remap:
/// the CDF value at the first populated bucket after an empty prefix.
pub fn cumulative(pdf: &[u64; BUCKETS]) -> ([u64; BUCKETS], u64) {
    let mut cdf = [0u64; BUCKETS];
    let mut cdf_min = 0;
    cdf[0] = pdf[0];
    for i in 1..BUCKETS {
        cdf[i] = cdf[i - 1] + pdf[i];
        if cdf[i - 1] == 0 {
            cdf_min = cdf[i];
        }
    }
    (cdf, cdf_min)
}

pub fn equalize(src: &PixelBuffer, scheduler: &Scheduler) -> Result<Equalization> {
    let pdf = histogram(src);
    let (cdf, cdf_min) = cumulative(&pdf);
    let total = src.pixel_count() as u64;
    let populated = pdf.iter().filter(|&&n| n > 0).count();

    if total == cdf_min || populated <= 1 {
        tracing::debug!(populated, "histogram is degenerate, passing intensity through");
        let image = map_pixels(src, scheduler, |r, g, b, a| {
            let l = luminance(r, g, b);
            (l, l, l, a)
        })?;
        return Ok(Equalization { image, original_cdf: cdf, result_cdf: cdf, mapping: None });
    }

    let span = (total - cdf_min) as f64;
    let mut mapping = [0.0f64; BUCKETS];
    for (i, m) in mapping.iter_mut().enumerate() {
        *m = (cdf[i] as f64 - cdf_min as f64) / span * (BUCKETS as f64 - 2.0) + 1.0;
    }

    let image = map_pixels(src, scheduler, |r, g, b, a| {
        let v = (mapping[bucket(luminance(r, g, b))] / BUCKETS as f64) as f32;
        (v, v, v, a)
    })?;

    Ok(Equalization { image, original_cdf: cdf, result_cdf: result_cdf(&cdf, &mapping), mapping: Some(mapping) })
}

/// Re-bucket the original CDF at the mapped output positions, then fill
/// gaps so the curve is non-decreasing.
fn result_cdf(cdf: &[u64; BUCKETS], mapping: &[f64; BUCKETS]) -> [u64; BUCKETS] {
    let mut out = [0u64; BUCKETS];
    for i in 0..BUCKETS {
        let target = (mapping[i].max(0.0) as usize).min(BUCKETS - 1);
        out[target] = cdf[i];
    }
    for i in 1..BUCKETS {
        out[i] = out[i].max(out[i - 1]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdf_min_uses_first_populated_bucket() {
        let mut pdf = [0u64; BUCKETS];
        pdf[10] = 3;
        pdf[20] = 5;
        let (cdf, cdf_min) = cumulative(&pdf);
        assert_eq!(cdf_min, 3);
        assert_eq!(cdf[255], 8);
    }

    #[test]
    fn test_cdf_min_is_zero_when_black_is_present() {
        let mut pdf = [0u64; BUCKETS];
        pdf[0] = 2;
        pdf[255] = 2;
        assert_eq!(cumulative(&pdf).1, 0);
    }

    #[test]
    fn test_uniform_image_is_identity() {
        for v in [0.0, 0.3, 1.0] {
            let src = PixelBuffer::filled(5, 4, [v, v, v, 0.8]).unwrap();
            let eq = equalize(&src, &Scheduler::serial()).unwrap();
            assert_eq!(eq.image, src);
            assert!(eq.mapping.is_none());
        }
    }

    #[test]
    fn test_two_levels_spread_to_extremes() {
        let src = PixelBuffer::from_fn(4, 2, |x, _| if x < 2 { [0.2; 4] } else { [0.6, 0.6, 0.6, 1.0] }).unwrap();
        let eq = equalize(&src, &Scheduler::serial()).unwrap();
        // first populated bucket maps to 1/256, the last to 255/256
        assert!((eq.image.get(0, 0)[0] - 1.0 / 256.0).abs() < 1e-6);
        assert!((eq.image.get(3, 1)[0] - 255.0 / 256.0).abs() < 1e-6);
        assert_eq!(eq.image.get(0, 0)[3], 0.2);
    }

    #[test]
    fn test_result_cdf_is_monotone_and_complete() {
        let src = PixelBuffer::from_fn(16, 16, |x, y| {
            let v = ((x * y) % 7) as f32 / 6.0;
            [v, v, v, 1.0]
        })
        .unwrap();
        let eq = equalize(&src, &Scheduler::serial()).unwrap();
        assert!(eq.result_cdf.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(eq.result_cdf[255], 256);
        assert_eq!(eq.original_cdf[255], 256);
    }
}
