use base64::{Engine as _, engine::general_purpose};
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::canvas::MaskRaster;

/// Prefix of every exported mask URI.
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug)]
pub enum MaskError {
    Io(std::io::Error),
    Encode(ImageError),
    Script(String),
}

impl std::fmt::Display for MaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaskError::Io(e) => write!(f, "I/O error: {}", e),
            MaskError::Encode(e) => write!(f, "Encoding error: {}", e),
            MaskError::Script(e) => write!(f, "Invalid script: {}", e),
        }
    }
}

impl std::error::Error for MaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MaskError::Io(e) => Some(e),
            MaskError::Encode(e) => Some(e),
            MaskError::Script(_) => None,
        }
    }
}

impl From<std::io::Error> for MaskError {
    fn from(e: std::io::Error) -> Self {
        MaskError::Io(e)
    }
}

impl From<ImageError> for MaskError {
    fn from(e: ImageError) -> Self {
        MaskError::Encode(e)
    }
}

impl From<serde_json::Error> for MaskError {
    fn from(e: serde_json::Error) -> Self {
        MaskError::Script(e.to_string())
    }
}

// ============================================================================
// MASK EXPORT
// ============================================================================

/// Encode the raster as an RGBA PNG (lossless, alpha preserved).
pub fn encode_png(raster: &MaskRaster) -> Result<Vec<u8>, MaskError> {
    let image = raster.image();
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new(&mut buffer);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(buffer)
}

/// Encode the raster as a `data:image/png;base64,…` URI, the form handed to
/// the compositing step.
pub fn encode_data_uri(raster: &MaskRaster) -> Result<String, MaskError> {
    let bytes = encode_png(raster)?;
    let b64 = general_purpose::STANDARD.encode(&bytes);
    Ok(format!("{}{}", PNG_DATA_URI_PREFIX, b64))
}

/// Decode a URI produced by `encode_data_uri` back into pixels.
pub fn decode_data_uri(uri: &str) -> Result<RgbaImage, MaskError> {
    let payload = uri
        .strip_prefix(PNG_DATA_URI_PREFIX)
        .ok_or_else(|| MaskError::Script("not a PNG data URI".to_string()))?;
    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| MaskError::Script(format!("bad base64 payload: {}", e)))?;
    let image = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)?;
    Ok(image.to_rgba8())
}

/// Write the raster to `path` as a PNG file.
pub fn write_png(raster: &MaskRaster, path: &Path) -> Result<(), MaskError> {
    let bytes = encode_png(raster)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
