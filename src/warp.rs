//! Perspective warping of RGBA rasters
//!
//! Every output pixel is mapped back through the inverse homography and sampled
//! from the source. Taps falling outside the source take the fill color (transparent
//! by default); the source edge is never clamped or wrapped.
//!
//! The `Deformer` owns the pristine original of one image and produces the deformed
//! layer for a target quad. The source sits on a padded canvas so that corners
//! dragged outside the image do not clip, and the result is cropped back to the
//! original footprint plus a margin.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::DegenerateQuadError;
use crate::geometry::{ImageSpace, Point, Rect};
use crate::homography::Homography;

/// How far (in multiples of the larger image side) a deformed layer may extend
/// past each edge of the original footprint; the layer is at most 3x the
/// image size along each axis
const MAX_OVERHANG_FACTOR: f64 = 1.0;

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpOptions {
    pub fill: Rgba<u8>,
    pub interpolation: Interpolation,
}

impl Default for WarpOptions {
    fn default() -> Self {
        Self {
            fill: TRANSPARENT,
            interpolation: Interpolation::Bilinear,
        }
    }
}

/// Pixel corners of a `width` x `height` image: TL, TR, BR, BL
pub fn canonical_corners(width: u32, height: u32) -> [Point<ImageSpace>; 4] {
    let (r, b) = (width as f64 - 1.0, height as f64 - 1.0);
    [
        Point::new(0.0, 0.0),
        Point::new(r, 0.0),
        Point::new(r, b),
        Point::new(0.0, b),
    ]
}

/// Warp `image` by `homography` into a new `out_width` x `out_height` raster
///
/// A non-invertible homography leaves the input untouched: a clone of `image`
/// is returned and the caller must treat it as a no-op.
pub fn warp(
    image: &RgbaImage,
    homography: &Homography,
    out_width: u32,
    out_height: u32,
    options: &WarpOptions,
) -> RgbaImage {
    let Some(inverse) = homography.inverse() else {
        warn!("Singular homography, leaving image unchanged");
        return image.clone();
    };

    let mut out = RgbaImage::from_pixel(out_width, out_height, options.fill);
    warp_region(image, &inverse, (0.0, 0.0), &mut out, (0.0, 0.0), options);
    out
}

/// Warp `image` so that its corners land on `dst` (TL, TR, BR, BL), same output size
///
/// Degenerate targets return the input unchanged.
pub fn warp_quad(image: &RgbaImage, dst: &[Point<ImageSpace>; 4], options: &WarpOptions) -> RgbaImage {
    let (w, h) = image.dimensions();
    match Homography::solve(&canonical_corners(w, h), dst) {
        Ok(homography) => warp(image, &homography, w, h, options),
        Err(e) => {
            debug!("warp_quad skipped: {}", e);
            image.clone()
        }
    }
}

/// Fill `out` by inverse mapping
///
/// `src_origin` is the position of source pixel (0,0) in the homography's source
/// space, `out_origin` that of output pixel (0,0) in its destination space.
fn warp_region(
    src: &RgbaImage,
    inverse: &Homography,
    src_origin: (f64, f64),
    out: &mut RgbaImage,
    out_origin: (f64, f64),
    options: &WarpOptions,
) {
    let (out_w, out_h) = out.dimensions();
    if out_w == 0 || out_h == 0 {
        return;
    }

    let row_len = out_w as usize * 4;
    let buf: &mut [u8] = out;
    buf.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(oy, row)| {
            for (ox, px) in row.chunks_exact_mut(4).enumerate() {
                let dst: Point<ImageSpace> =
                    Point::new(ox as f64 + out_origin.0, oy as f64 + out_origin.1);
                let value = match inverse.try_apply(dst) {
                    Some(s) => sample(src, s.x - src_origin.0, s.y - src_origin.1, options),
                    None => options.fill.0,
                };
                px.copy_from_slice(&value);
            }
        });
}

/// Sample `src` at a fractional position using the configured interpolation
#[inline]
pub fn sample(src: &RgbaImage, x: f64, y: f64, options: &WarpOptions) -> [u8; 4] {
    if !x.is_finite() || !y.is_finite() {
        return options.fill.0;
    }
    match options.interpolation {
        Interpolation::Nearest => tap(src, x.round() as i64, y.round() as i64).unwrap_or(options.fill.0),
        Interpolation::Bilinear => bilinear_sample(src, x, y, options.fill.0),
    }
}

#[inline]
fn tap(src: &RgbaImage, x: i64, y: i64) -> Option<[u8; 4]> {
    if x < 0 || y < 0 || x >= src.width() as i64 || y >= src.height() as i64 {
        return None;
    }
    Some(src.get_pixel(x as u32, y as u32).0)
}

/// Bilinear interpolation on straight alpha
///
/// Color is weighted by alpha while blending so transparent neighbours do not
/// bleed their (meaningless) color into the result.
#[inline]
fn bilinear_sample(src: &RgbaImage, x: f64, y: f64, fill: [u8; 4]) -> [u8; 4] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (ix, iy) = (x0 as i64, y0 as i64);

    let taps = [
        (ix, iy, (1.0 - fx) * (1.0 - fy)),
        (ix + 1, iy, fx * (1.0 - fy)),
        (ix, iy + 1, (1.0 - fx) * fy),
        (ix + 1, iy + 1, fx * fy),
    ];

    let mut acc = [0.0f64; 4];
    for (tx, ty, weight) in taps {
        if weight <= 0.0 {
            continue;
        }
        let p = tap(src, tx, ty).unwrap_or(fill);
        let a = p[3] as f64 * weight;
        acc[0] += p[0] as f64 * a;
        acc[1] += p[1] as f64 * a;
        acc[2] += p[2] as f64 * a;
        acc[3] += a;
    }

    if acc[3] <= 1e-9 {
        return [0, 0, 0, 0];
    }

    [
        (acc[0] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[1] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[2] / acc[3]).round().clamp(0.0, 255.0) as u8,
        acc[3].round().clamp(0.0, 255.0) as u8,
    ]
}

/// A raster positioned in image space
///
/// `origin` is the image-space position of the buffer's pixel (0,0). The
/// undeformed layer has its origin at (0,0); deformed layers usually start at
/// negative coordinates because of the margin.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub image: Arc<RgbaImage>,
    pub origin: Point<ImageSpace>,
}

impl Layer {
    pub fn new(image: Arc<RgbaImage>, origin: Point<ImageSpace>) -> Self {
        Self { image, origin }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Area covered by the pixels (pixel centers sit half a pixel inside)
    pub fn bounds(&self) -> Rect<ImageSpace> {
        Rect::new(
            self.origin.x - 0.5,
            self.origin.y - 0.5,
            self.width() as f64,
            self.height() as f64,
        )
    }

    pub fn center(&self) -> Point<ImageSpace> {
        self.bounds().center()
    }

    /// Sample at an image-space position
    pub fn sample(&self, p: Point<ImageSpace>, options: &WarpOptions) -> [u8; 4] {
        sample(&self.image, p.x - self.origin.x, p.y - self.origin.y, options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeformSettings {
    /// Canvas padding as a fraction of the larger image side (at least 0.5)
    pub pad_ratio: f64,
    /// Margin kept around the original footprint after warping (at least 0.2)
    pub margin_ratio: f64,
    pub options: WarpOptions,
}

impl Default for DeformSettings {
    fn default() -> Self {
        Self {
            pad_ratio: 0.5,
            margin_ratio: 0.2,
            options: WarpOptions::default(),
        }
    }
}

/// Perspective deformation state of one image
#[derive(Debug, Clone)]
pub struct Deformer {
    original: Arc<RgbaImage>,
    quad: [Point<ImageSpace>; 4],
    settings: DeformSettings,
}

impl Deformer {
    pub fn new(original: Arc<RgbaImage>, settings: DeformSettings) -> Self {
        let quad = canonical_corners(original.width(), original.height());
        Self {
            original,
            quad,
            settings,
        }
    }

    pub fn original(&self) -> &Arc<RgbaImage> {
        &self.original
    }

    /// Current target quad in image space (TL, TR, BR, BL)
    pub fn quad(&self) -> [Point<ImageSpace>; 4] {
        self.quad
    }

    pub fn set_quad(&mut self, quad: [Point<ImageSpace>; 4]) {
        self.quad = quad;
    }

    pub fn settings(&self) -> &DeformSettings {
        &self.settings
    }

    pub fn reset(&mut self) {
        self.quad = canonical_corners(self.original.width(), self.original.height());
    }

    /// The original as an undeformed layer
    pub fn identity_layer(&self) -> Layer {
        Layer::new(self.original.clone(), Point::origin())
    }

    /// Deform to `quad` and remember it as the current target
    pub fn apply(&mut self, quad: [Point<ImageSpace>; 4]) -> Result<Layer, DegenerateQuadError> {
        let layer = self.deform(&quad)?;
        self.quad = quad;
        Ok(layer)
    }

    /// Warp the original so its corners land on `quad`
    pub fn deform(&self, quad: &[Point<ImageSpace>; 4]) -> Result<Layer, DegenerateQuadError> {
        let (w, h) = self.original.dimensions();
        let extent = w.max(h) as f64;
        let (right, bottom) = (w as f64 - 1.0, h as f64 - 1.0);

        let bbox = Rect::bounding(quad).ok_or(DegenerateQuadError)?;
        if !bbox.x.is_finite() || !bbox.y.is_finite() || !bbox.width.is_finite() || !bbox.height.is_finite() {
            return Err(DegenerateQuadError);
        }

        // Output window in image space, inclusive pixel bounds: the original
        // footprint plus the margin, grown to cover the target quad.
        let margin = (extent * self.settings.margin_ratio).ceil();
        let limit = (extent * MAX_OVERHANG_FACTOR).ceil().max(margin);
        let x0 = (-margin).min(bbox.x.floor()).max(-limit);
        let y0 = (-margin).min(bbox.y.floor()).max(-limit);
        let x1 = (right + margin).max(bbox.max().x.ceil()).min(right + limit);
        let y1 = (bottom + margin).max(bbox.max().y.ceil()).min(bottom + limit);

        // The padded canvas has to hold the whole window
        let pad = (extent * self.settings.pad_ratio)
            .ceil()
            .max(-x0)
            .max(-y0)
            .max(x1 - right)
            .max(y1 - bottom);

        let shift = |p: Point<ImageSpace>| -> Point<ImageSpace> { Point::new(p.x + pad, p.y + pad) };
        let src = canonical_corners(w, h).map(shift);
        let dst = quad.map(shift);
        let homography = Homography::solve(&src, &dst)?;
        let inverse = homography.inverse().ok_or(DegenerateQuadError)?;

        let out_w = (x1 - x0 + 1.0) as u32;
        let out_h = (y1 - y0 + 1.0) as u32;
        let mut out = RgbaImage::from_pixel(out_w, out_h, self.settings.options.fill);
        warp_region(
            &self.original,
            &inverse,
            (pad, pad),
            &mut out,
            (x0 + pad, y0 + pad),
            &self.settings.options,
        );

        debug!(
            "Deformed {}x{} -> {}x{} layer at ({}, {})",
            w, h, out_w, out_h, x0, y0
        );
        Ok(Layer::new(Arc::new(out), Point::new(x0, y0)))
    }
}
