use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::error::{EngineError, Result};
use crate::ops::Operation;

// ============================================================================
// RASTER IMAGES
// ============================================================================

/// Decode any format the `image` crate was built with (PNG, JPEG, WEBP, BMP, …).
pub fn load_image(path: &Path) -> Result<PixelBuffer> {
    let img = image::open(path)?.to_rgba8();
    tracing::debug!(path = %path.display(), width = img.width(), height = img.height(), "image loaded");
    PixelBuffer::from_rgba_image(&img)
}

/// Encode by file extension. JPEG has no alpha channel, so it is dropped.
pub fn save_image(buffer: &PixelBuffer, path: &Path) -> Result<()> {
    let rgba = buffer.to_rgba_image();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => DynamicImage::ImageRgba8(rgba).to_rgb8().save(path)?,
        _ => rgba.save(path)?,
    }
    tracing::debug!(path = %path.display(), "image saved");
    Ok(())
}

// ============================================================================
// OPERATION LOGS (JSON)
// ============================================================================

pub fn operations_to_json(ops: &[Operation]) -> Result<String> {
    Ok(serde_json::to_string_pretty(ops)?)
}

pub fn operations_from_json(json: &str) -> Result<Vec<Operation>> {
    Ok(serde_json::from_str(json)?)
}

pub fn operation_from_json(json: &str) -> Result<Operation> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_operations(path: &Path) -> Result<Vec<Operation>> {
    operations_from_json(&std::fs::read_to_string(path)?)
}

// ============================================================================
// RLB PROJECT FILE FORMAT
// ============================================================================

const RLB_MAGIC: &str = "RLB1";

/// Maximum supported canvas dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted project files.
const MAX_CANVAS_DIM: u32 = 32_768;

#[derive(Serialize, Deserialize)]
struct ProjectFile {
    magic: String,
    image: PixelBuffer,
    /// Operation log as JSON; bincode can't drive the tagged enum.
    operations: String,
}

/// A working image together with the operations that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    pub image: PixelBuffer,
    pub operations: Vec<Operation>,
}

pub fn save_project(image: &PixelBuffer, operations: &[Operation], path: &Path) -> Result<()> {
    let project = ProjectFile {
        magic: RLB_MAGIC.to_string(),
        image: image.clone(),
        operations: serde_json::to_string(operations)?,
    };
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, &project)?;
    tracing::info!(path = %path.display(), operations = operations.len(), "project saved");
    Ok(())
}

pub fn load_project(path: &Path) -> Result<Project> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(EngineError::Project("file too small".into()));
    }

    // bincode encodes a String as: 8-byte length prefix + UTF-8 data.
    // The magic is 4 chars, so bytes 8..12 hold it.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != RLB_MAGIC {
        return Err(EngineError::Project(format!("unknown magic '{magic}'")));
    }

    // Check the header dimensions before bincode allocates the pixel vector.
    let dims: (String, u32, u32) = bincode::deserialize(&raw)?;
    if dims.1 > MAX_CANVAS_DIM || dims.2 > MAX_CANVAS_DIM {
        return Err(EngineError::Project(format!(
            "canvas {}x{} exceeds the {MAX_CANVAS_DIM} pixel limit",
            dims.1, dims.2
        )));
    }

    let project: ProjectFile = bincode::deserialize(&raw)?;
    Ok(Project { image: project.image, operations: operations_from_json(&project.operations)? })
}
