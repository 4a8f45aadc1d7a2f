//! crates/storybook_core/src/imaging.rs
//!
//! Small helpers over the `image` crate: inspecting dimensions, classifying
//! aspect ratios and normalizing stored images to JPEG.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

use crate::domain::Orientation;
use crate::ports::{PortError, PortResult};

/// Images whose width/height ratio is within this distance of 1.0 are square.
pub const DEFAULT_ASPECT_TOLERANCE: f64 = 0.2;

/// Reads `(width, height)` from an encoded image without decoding its pixels.
pub fn dimensions(bytes: &[u8]) -> PortResult<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PortError::InvalidInput(e.to_string()))?
        .into_dimensions()
        .map_err(|e| PortError::InvalidInput(e.to_string()))
}

pub fn classify_aspect(width: u32, height: u32, tolerance: f64) -> Orientation {
    if height == 0 {
        return Orientation::Unknown;
    }
    let ratio = f64::from(width) / f64::from(height);
    if (ratio - 1.0).abs() < tolerance {
        Orientation::Square
    } else if ratio > 1.0 {
        Orientation::Landscape
    } else {
        Orientation::Portrait
    }
}

/// Re-encodes any supported image as JPEG. Transparency is dropped.
pub fn to_jpeg(bytes: &[u8]) -> PortResult<Vec<u8>> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| PortError::InvalidInput(e.to_string()))?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut out = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    Ok(out)
}

/// MIME type guessed from a file extension; `None` for non-image files.
pub fn mime_for_path(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// `data:<mime>;base64,<payload>` form of an image.
pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}
