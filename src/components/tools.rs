use crate::canvas::MaskRaster;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Dab spacing never exceeds this many pixels, whatever the brush size.
pub const MAX_DAB_SPACING: f32 = 6.0;

/// Inner gradient stop floor, keeps the solid core from collapsing to zero.
const MIN_HARDNESS_STOP: f32 = 0.01;

/// How a dab combines with the mask underneath it.
/// Paint: white composited source-over (adds coverage)
/// Erase: destination-out (removes alpha, keeps colour)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushMode {
    #[default]
    Paint,
    Erase,
}

/// Brush settings supplied by the host for each stroke.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushProperties {
    /// Dab diameter in canvas pixels.
    pub size: f32,
    /// Percentage (0–100) of the radius that stays fully opaque.
    pub hardness: f32,
    pub mode: BrushMode,
}

impl Default for BrushProperties {
    fn default() -> Self {
        Self {
            size: 50.0,
            hardness: 100.0,
            mode: BrushMode::Paint,
        }
    }
}

impl BrushProperties {
    pub fn new(size: f32, hardness: f32, mode: BrushMode) -> Self {
        Self { size, hardness, mode }
    }

    pub fn radius(&self) -> f32 {
        self.size / 2.0
    }

    /// Fraction of the radius where the linear falloff begins.
    pub fn hardness_stop(&self) -> f32 {
        (self.hardness.clamp(0.0, 100.0) / 100.0).max(MIN_HARDNESS_STOP)
    }

    /// Distance between consecutive dabs along a segment.
    pub fn spacing(&self) -> f32 {
        (self.size / 4.0).min(MAX_DAB_SPACING)
    }
}

/// Alpha of the radial gradient at `dist` from the dab centre: 1.0 out to
/// `hardness_stop * radius`, then linear down to 0.0 at `radius`.
pub fn compute_brush_alpha(dist: f32, radius: f32, hardness_stop: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    let t = dist / radius;
    if t >= 1.0 {
        0.0
    } else if t <= hardness_stop {
        1.0
    } else {
        (1.0 - t) / (1.0 - hardness_stop)
    }
}

/// Composite white over `px` with coverage `alpha` (non-premultiplied).
#[inline]
fn blend_paint(px: &mut [u8], alpha: f32) {
    let da = px[3] as f32 / 255.0;
    let out_a = alpha + da * (1.0 - alpha);
    if out_a <= 0.0 {
        px.copy_from_slice(&[0, 0, 0, 0]);
        return;
    }
    for c in px.iter_mut().take(3) {
        let dc = *c as f32;
        let out = (255.0 * alpha + dc * da * (1.0 - alpha)) / out_a;
        *c = out.round().clamp(0.0, 255.0) as u8;
    }
    px[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Destination-out: scale the existing alpha by `1 - alpha`.
#[inline]
fn blend_erase(px: &mut [u8], alpha: f32) {
    let remaining = px[3] as f32 * (1.0 - alpha);
    px[3] = remaining.round().clamp(0.0, 255.0) as u8;
}

/// Stamp one dab centred at `(cx, cy)`. Pixels are sampled at their centres
/// and the dab is clipped to the raster.
pub fn stamp_dab(raster: &mut MaskRaster, cx: f32, cy: f32, brush: &BrushProperties) {
    let radius = brush.radius();
    if radius <= 0.0 || !cx.is_finite() || !cy.is_finite() {
        return;
    }
    let (w, h) = raster.dimensions();
    let min_x = (cx - radius).floor().max(0.0) as u32;
    let min_y = (cy - radius).floor().max(0.0) as u32;
    let max_x = ((cx + radius).ceil().max(0.0) as u32).min(w);
    let max_y = ((cy + radius).ceil().max(0.0) as u32).min(h);
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    let stop = brush.hardness_stop();
    let mode = brush.mode;
    let stride = w as usize * 4;
    let buf: &mut [u8] = raster.image_mut();
    let rows = &mut buf[min_y as usize * stride..max_y as usize * stride];

    rows.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(i, row)| {
            let py = (min_y as usize + i) as f32 + 0.5;
            let dy = py - cy;
            for x in min_x..max_x {
                let dx = x as f32 + 0.5 - cx;
                let alpha = compute_brush_alpha((dx * dx + dy * dy).sqrt(), radius, stop);
                if alpha <= 0.0 {
                    continue;
                }
                let off = x as usize * 4;
                let px = &mut row[off..off + 4];
                match mode {
                    BrushMode::Paint => blend_paint(px, alpha),
                    BrushMode::Erase => blend_erase(px, alpha),
                }
            }
        });
}

/// Offsets along a segment (from `start` in direction `delta`, length `dist`)
/// whose dabs of `radius` can reach the raster, as `(near, far)`. `None` when
/// the whole segment passes outside.
fn reach_along(
    start: (f32, f32),
    delta: (f64, f64),
    dist: f64,
    raster: &MaskRaster,
    radius: f32,
) -> Option<(f64, f64)> {
    let r = radius.max(0.0) as f64;
    let (w, h) = raster.dimensions();
    let (x0, y0) = (start.0 as f64, start.1 as f64);
    let bounds = [(x0, delta.0, -r, w as f64 + r), (y0, delta.1, -r, h as f64 + r)];

    // Liang-Barsky over the raster box grown by the radius, in t ∈ [0, 1]
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (origin, d, lo, hi) in bounds {
        if d == 0.0 {
            if origin < lo || origin > hi {
                return None;
            }
            continue;
        }
        let (a, b) = ((lo - origin) / d, (hi - origin) / d);
        let (enter, exit) = if a < b { (a, b) } else { (b, a) };
        t0 = t0.max(enter);
        t1 = t1.min(exit);
        if t0 > t1 {
            return None;
        }
    }
    Some((t0 * dist, t1 * dist))
}

// ============================================================================
// STROKE RASTERIZER
// ============================================================================

/// Turns a stream of canvas-space samples into evenly spaced dabs.
///
/// The brush is latched when the stroke begins; changes the host makes while
/// the pointer is down apply to the next stroke.
#[derive(Debug, Default)]
pub struct StrokeRasterizer {
    brush: BrushProperties,
    last_point: Option<(f32, f32)>,
    dabs: usize,
}

impl StrokeRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.last_point.is_some()
    }

    /// Dabs stamped since the current (or most recent) stroke began.
    pub fn dab_count(&self) -> usize {
        self.dabs
    }

    pub fn last_point(&self) -> Option<(f32, f32)> {
        self.last_point
    }

    /// Start a stroke and stamp its first dab, so a tap still marks the mask.
    pub fn begin(&mut self, raster: &mut MaskRaster, brush: BrushProperties, point: (f32, f32)) {
        self.brush = brush;
        self.dabs = 0;
        self.last_point = Some(point);
        self.dab(raster, point);
    }

    /// Extend the stroke to `point`, stamping every `spacing()` pixels along
    /// the segment from the last point. Only the stretch of the segment that
    /// can touch the raster is walked. Returns the number of dabs placed.
    pub fn extend(&mut self, raster: &mut MaskRaster, point: (f32, f32)) -> usize {
        let Some(last) = self.last_point else {
            return 0;
        };
        self.last_point = Some(point);

        let dx = point.0 as f64 - last.0 as f64;
        let dy = point.1 as f64 - last.1 as f64;
        let dist = (dx * dx + dy * dy).sqrt();
        if !dist.is_finite() || dist <= 0.0 {
            return 0;
        }
        let step = self.brush.spacing() as f64;
        if step <= 0.0 {
            self.dab(raster, point);
            return 1;
        }

        let Some((near, far)) = reach_along(last, (dx, dy), dist, raster, self.brush.radius())
        else {
            return 0;
        };
        // offsets i * step for i in [0, count) stay strictly below `dist`
        let count = (dist / step).ceil() as u64;
        let first = (near / step).ceil().max(0.0) as u64;
        let last_index = ((far / step).floor() as u64).min(count.saturating_sub(1));

        let (ux, uy) = (dx / dist, dy / dist);
        let before = self.dabs;
        for i in first..=last_index {
            let offset = i as f64 * step;
            let p = (last.0 as f64 + ux * offset, last.1 as f64 + uy * offset);
            self.dab(raster, (p.0 as f32, p.1 as f32));
        }
        self.dabs - before
    }

    /// Finish the stroke. Returns `true` if a stroke was in progress.
    pub fn end(&mut self) -> bool {
        self.last_point.take().is_some()
    }

    fn dab(&mut self, raster: &mut MaskRaster, point: (f32, f32)) {
        stamp_dab(raster, point.0, point.1, &self.brush);
        self.dabs += 1;
    }
}
