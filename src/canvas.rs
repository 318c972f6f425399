use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// Opaque black — the blank mask every session starts from.
pub const MASK_BASE: Rgba<u8> = Rgba([0, 0, 0, 255]);

// ============================================================================
// MASK RASTER
// ============================================================================

/// The live pixel buffer strokes are drawn into.
///
/// Width and height are fixed for the lifetime of a raster; a host that needs
/// other dimensions builds a new one (see `MaskSession::sync_host`).
#[derive(Clone, Debug, PartialEq)]
pub struct MaskRaster {
    pixels: RgbaImage,
}

impl MaskRaster {
    /// New raster filled with `MASK_BASE`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, MASK_BASE),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub(crate) fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Overwrite every pixel with `color`.
    pub fn fill(&mut self, color: Rgba<u8>) {
        let buf: &mut [u8] = &mut self.pixels;
        buf.par_chunks_mut(4)
            .for_each(|px| px.copy_from_slice(&color.0));
    }

    /// Replace the whole buffer with `image`. Dimensions must match; a
    /// mismatched image is ignored.
    pub fn restore_from(&mut self, image: &RgbaImage) -> bool {
        if image.dimensions() != self.pixels.dimensions() {
            return false;
        }
        self.pixels.copy_from_slice(image.as_raw());
        true
    }

    /// True when every pixel equals `MASK_BASE`.
    pub fn is_blank(&self) -> bool {
        self.pixels
            .as_raw()
            .par_chunks(4)
            .all(|px| px == &MASK_BASE.0[..])
    }

    /// Mean mask strength in `[0, 1]`: luminance weighted by alpha, so white
    /// paint counts fully and black or erased pixels count as nothing.
    pub fn coverage(&self) -> f64 {
        let count = self.pixels.width() as u64 * self.pixels.height() as u64;
        if count == 0 {
            return 0.0;
        }
        let total: u64 = self
            .pixels
            .as_raw()
            .par_chunks(4)
            .map(|px| {
                let lum = (px[0] as u64 + px[1] as u64 + px[2] as u64) / 3;
                lum * px[3] as u64
            })
            .sum();
        total as f64 / (count as f64 * 255.0 * 255.0)
    }

    /// Bytes held by the pixel buffer.
    pub fn memory_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

// ============================================================================
// COORDINATE MAPPING
// ============================================================================

/// Bounding rectangle of the drawing surface as laid out on screen, in the
/// same units the pointer events report.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SurfaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    /// Surface displayed at 1:1 with its native pixels, anchored at the origin.
    pub fn native(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }
}

/// Converts a client-space pointer position to canvas pixel coordinates.
///
/// Returns `None` while the surface is unmounted (`rect` is `None`) or has no
/// area; the caller drops the sample. Positions outside the surface still map
/// (dabs are clipped later) so strokes that run off the edge stay continuous.
pub fn screen_to_canvas(
    client: (f32, f32),
    rect: Option<SurfaceRect>,
    canvas_width: u32,
    canvas_height: u32,
) -> Option<(f32, f32)> {
    let rect = rect?;
    if !rect.has_area() || canvas_width == 0 || canvas_height == 0 {
        return None;
    }
    let scale_x = canvas_width as f32 / rect.width;
    let scale_y = canvas_height as f32 / rect.height;
    Some(((client.0 - rect.left) * scale_x, (client.1 - rect.top) * scale_y))
}
