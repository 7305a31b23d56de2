// ============================================================================
// STYLE TRANSFER: seam for an external neural style model
// ============================================================================
//
// The model itself lives outside this crate. The engine only needs a way to
// hand it an image and a style name and get an image of the same size back.

use crate::buffer::PixelBuffer;
use crate::error::{EngineError, Result};

pub trait StyleTransfer: Send + Sync {
    fn apply_style(&self, image: &PixelBuffer, style_id: &str) -> Result<PixelBuffer>;

    /// Style names the model accepts, for menus. Empty if unknown.
    fn styles(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Run `model` and check that it honoured the size contract.
pub fn apply(image: &PixelBuffer, style_id: &str, model: Option<&dyn StyleTransfer>) -> Result<PixelBuffer> {
    let model = model.ok_or_else(|| EngineError::invalid("no style transfer model registered"))?;
    let styled = model.apply_style(image, style_id)?;
    if !styled.same_dimensions(image) {
        return Err(EngineError::mismatch(image.dimensions(), styled.dimensions()));
    }
    Ok(styled)
}
