// ============================================================================
// OPERATIONS: the closed catalog of image transformations
// ============================================================================
//
// Every transformation is an `Operation` value: immutable, serializable, and
// applied through one entry point that reads a source buffer and returns a
// fresh destination buffer. Nothing here keeps state between calls.

pub mod adjustments;
pub mod blend;
pub mod convolution;
pub mod edges;
pub mod filters;
pub mod frequency;
pub mod histogram;
pub mod scheduler;
pub mod steganography;
pub mod style;
pub mod transform;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::error::{EngineError, Result};

use adjustments::AdjustParam;
use blend::BlendMode;
use convolution::{AlphaHandling, BorderPolicy, Kernel};
use frequency::FrequencyFilter;
use scheduler::Scheduler;
use steganography::{Payload, StegoParams};
use style::StyleTransfer;

fn default_blur_radius() -> u32 {
    edges::DEFAULT_BLUR_RADIUS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    Grayscale,
    InverseColour,
    FlipHorizontal,
    FlipVertical,
    Convolution {
        kernel: Kernel,
    },
    EdgeDetection {
        #[serde(default = "default_blur_radius")]
        blur_radius: u32,
    },
    Sharpen,
    Blend {
        mode: BlendMode,
        image: Arc<PixelBuffer>,
    },
    HistogramEqualization,
    FrequencyFilter {
        filter: FrequencyFilter,
    },
    SteganographyEncode {
        payload: Payload,
        #[serde(default)]
        params: StegoParams,
    },
    Adjust {
        param: AdjustParam,
        value: f64,
    },
    StyleTransfer {
        style_id: String,
    },
}

/// Everything an operation may need besides its source image.
#[derive(Clone, Copy, Default)]
pub struct ExecContext<'a> {
    pub scheduler: Scheduler,
    pub style: Option<&'a dyn StyleTransfer>,
}

impl<'a> ExecContext<'a> {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler, style: None }
    }

    pub fn with_style(mut self, style: Option<&'a dyn StyleTransfer>) -> Self {
        self.style = style;
        self
    }
}

impl Operation {
    /// Look up a payload-free operation by name (case-insensitive, `-`, `_`
    /// and spaces ignored). Used by the CLI.
    pub fn from_name(name: &str) -> Option<Operation> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        let op = match key.as_str() {
            "grayscale" | "greyscale" => Operation::Grayscale,
            "inverse" | "inversecolour" | "inversecolor" | "invert" => Operation::InverseColour,
            "fliph" | "fliphorizontal" => Operation::FlipHorizontal,
            "flipv" | "flipvertical" => Operation::FlipVertical,
            "sharpen" => Operation::Sharpen,
            "edgedetection" | "canny" | "edges" => Operation::EdgeDetection { blur_radius: default_blur_radius() },
            "histogramequalization" | "equalize" | "equalise" => Operation::HistogramEqualization,
            _ => return None,
        };
        Some(op)
    }

    /// Reject parameters that can never succeed on `src`. Runs before any
    /// pixel work so a failed call leaves the caller's state untouched.
    pub fn validate(&self, src: &PixelBuffer) -> Result<()> {
        match self {
            Operation::EdgeDetection { blur_radius } => edges::validate_blur_radius(*blur_radius),
            Operation::Blend { mode, image } => blend::validate(src, image, *mode),
            Operation::FrequencyFilter { filter } => filter.validate(),
            Operation::SteganographyEncode { params, .. } => params.validate(),
            Operation::Adjust { param, value } => adjustments::validate(*param, *value),
            Operation::StyleTransfer { style_id } if style_id.trim().is_empty() => {
                Err(EngineError::invalid("style id is empty"))
            }
            _ => Ok(()),
        }
    }

    /// Validate, then run against `src`, returning a new buffer.
    pub fn apply(&self, src: &PixelBuffer, ctx: &ExecContext<'_>) -> Result<PixelBuffer> {
        self.validate(src)?;
        let s = &ctx.scheduler;
        match self {
            Operation::Grayscale => filters::grayscale(src, s),
            Operation::InverseColour => filters::inverse_colour(src, s),
            Operation::FlipHorizontal => filters::flip_horizontal(src, s),
            Operation::FlipVertical => filters::flip_vertical(src, s),
            Operation::Convolution { kernel } => {
                convolution::convolve(src, kernel, BorderPolicy::Ignore, AlphaHandling::Opaque, s)
            }
            Operation::EdgeDetection { blur_radius } => edges::canny(src, *blur_radius, s),
            Operation::Sharpen => filters::sharpen(src, s),
            Operation::Blend { mode, image } => blend::blend(src, image, *mode, s),
            Operation::HistogramEqualization => histogram::equalize(src, s).map(|eq| eq.image),
            Operation::FrequencyFilter { filter } => frequency::apply(src, filter),
            Operation::SteganographyEncode { payload, params } => steganography::encode(src, payload, params),
            Operation::Adjust { param, value } => adjustments::apply(src, *param, *value, s),
            Operation::StyleTransfer { style_id } => style::apply(src, style_id, ctx.style),
        }
    }

    /// Variant name as used in the `"type"` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Grayscale => "Grayscale",
            Operation::InverseColour => "InverseColour",
            Operation::FlipHorizontal => "FlipHorizontal",
            Operation::FlipVertical => "FlipVertical",
            Operation::Convolution { .. } => "Convolution",
            Operation::EdgeDetection { .. } => "EdgeDetection",
            Operation::Sharpen => "Sharpen",
            Operation::Blend { .. } => "Blend",
            Operation::HistogramEqualization => "HistogramEqualization",
            Operation::FrequencyFilter { .. } => "FrequencyFilter",
            Operation::SteganographyEncode { .. } => "SteganographyEncode",
            Operation::Adjust { .. } => "Adjust",
            Operation::StyleTransfer { .. } => "StyleTransfer",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Grayscale => f.write_str("Grayscale"),
            Operation::InverseColour => f.write_str("Inverse colour"),
            Operation::FlipHorizontal => f.write_str("Flip horizontal"),
            Operation::FlipVertical => f.write_str("Flip vertical"),
            Operation::Convolution { kernel } => write!(f, "Convolution ({0}x{0})", kernel.size()),
            Operation::EdgeDetection { .. } => f.write_str("Edge detection (Canny)"),
            Operation::Sharpen => f.write_str("Sharpen"),
            Operation::Blend { mode, .. } => write!(f, "Blend ({mode})"),
            Operation::HistogramEqualization => f.write_str("Histogram Equalization"),
            Operation::FrequencyFilter { filter } => write!(f, "{filter}"),
            Operation::SteganographyEncode { payload, params } => {
                let what = match payload {
                    Payload::Text(_) => "text",
                    Payload::Image(_) => "image",
                };
                write!(f, "Encode {what} ({} bits)", params.bits)
            }
            Operation::Adjust { param, value } => write!(f, "Adjust {param} {value:.2}"),
            Operation::StyleTransfer { style_id } => write!(f, "Style transfer ({style_id})"),
        }
    }
}
