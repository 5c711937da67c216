//! Selection frame, crop rendering and export naming
//!
//! The crop renders only the image layer (no handles, no frame) through its affine
//! transform into a buffer the size of the selection frame, then resamples to the
//! target resolution with a Lanczos filter when the sizes differ.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::affine::AffineState;
use crate::geometry::{Point, Rect, SceneSpace};
use crate::warp::{Layer, WarpOptions, TRANSPARENT};

pub use crate::io::save_png;

/// Output size of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1024, 1024)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`, e.g. `1024x768`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", s))?;
        let width: u32 = w.trim().parse().map_err(|e| format!("bad width {:?}: {}", w, e))?;
        let height: u32 = h.trim().parse().map_err(|e| format!("bad height {:?}: {}", h, e))?;
        if width == 0 || height == 0 {
            return Err(format!("resolution must be non-zero, got {}x{}", width, height));
        }
        Ok(Self { width, height })
    }
}

/// The exported region, in scene coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionFrame {
    pub rect: Rect<SceneSpace>,
    pub target: Resolution,
}

impl SelectionFrame {
    /// Largest rectangle with the target's aspect ratio inside a
    /// `width` x `height` image, centered
    pub fn fit(width: u32, height: u32, target: Resolution) -> Self {
        let (w, h) = (width as f64, height as f64);
        let target_aspect = target.aspect_ratio();

        let (sel_w, sel_h) = if w / h > target_aspect {
            // Image is wider than the target
            (h * target_aspect, h)
        } else {
            (w, w / target_aspect)
        };

        Self {
            rect: Rect::new((w - sel_w) / 2.0, (h - sel_h) / 2.0, sel_w, sel_h),
            target,
        }
    }

    /// Pixel size of the un-resampled crop
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.rect.width.max(0.0) as u32,
            self.rect.height.max(0.0) as u32,
        )
    }
}

/// Render `layer` as transformed by `affine`, clipped to `selection`, at the target size
///
/// The selection is in scene space, the same space the layer is displayed in.
/// Areas the layer does not cover stay transparent.
pub fn crop_and_export(
    layer: &Layer,
    affine: &AffineState,
    selection: &SelectionFrame,
    options: &WarpOptions,
) -> RgbaImage {
    let target = selection.target;
    let (crop_w, crop_h) = selection.pixel_size();
    if crop_w == 0 || crop_h == 0 {
        warn!("Empty selection frame, exporting a blank image");
        return RgbaImage::from_pixel(target.width, target.height, TRANSPARENT);
    }

    let Some(inverse) = affine.matrix().try_inverse() else {
        warn!("Image transform is not invertible, exporting a blank image");
        return RgbaImage::from_pixel(target.width, target.height, TRANSPARENT);
    };

    let origin = selection.rect.min();
    let mut cropped = RgbaImage::from_pixel(crop_w, crop_h, TRANSPARENT);
    let row_len = crop_w as usize * 4;
    let buf: &mut [u8] = &mut cropped;
    buf.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(oy, row)| {
            for (ox, px) in row.chunks_exact_mut(4).enumerate() {
                let scene: Point<SceneSpace> = Point::new(origin.x + ox as f64, origin.y + oy as f64);
                let local = Point::new(
                    inverse[(0, 0)] * scene.x + inverse[(0, 1)] * scene.y + inverse[(0, 2)],
                    inverse[(1, 0)] * scene.x + inverse[(1, 1)] * scene.y + inverse[(1, 2)],
                );
                px.copy_from_slice(&layer.sample(local, options));
            }
        });

    if (crop_w, crop_h) == (target.width, target.height) {
        return cropped;
    }
    resample(&cropped, target)
}

/// Lanczos resample in premultiplied space so transparent pixels do not darken edges
pub fn resample(image: &RgbaImage, target: Resolution) -> RgbaImage {
    let mut premultiplied = image.clone();
    for px in premultiplied.pixels_mut() {
        let a = px[3] as u32;
        for c in 0..3 {
            px[c] = ((px[c] as u32 * a + 127) / 255) as u8;
        }
    }

    let mut out = imageops::resize(&premultiplied, target.width, target.height, FilterType::Lanczos3);
    for px in out.pixels_mut() {
        let a = px[3] as u32;
        if a == 0 {
            px.0 = [0, 0, 0, 0];
            continue;
        }
        for c in 0..3 {
            px[c] = ((px[c] as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    }
    out
}

/// `<dir>/<stem><suffix>.png`; always PNG so transparency survives
pub fn export_path(dir: &Path, source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    dir.join(format!("{}{}.png", stem, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Delta, ImageSpace};
    use image::Rgba;
    use std::sync::Arc;

    fn pattern(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 3) as u8, (y * 2) as u8, ((x + y) % 256) as u8, 255]))
    }

    fn layer(img: RgbaImage) -> Layer {
        Layer::new(Arc::new(img), Point::<ImageSpace>::origin())
    }

    #[test]
    fn test_selection_frame_wide_image_square_target() {
        let frame = SelectionFrame::fit(200, 100, Resolution::new(50, 50));
        assert_eq!(frame.rect, Rect::new(50.0, 0.0, 100.0, 100.0));
        assert_eq!(frame.rect.aspect_ratio(), 1.0);
        assert_eq!(frame.rect.center(), Point::new(100.0, 50.0));
    }

    #[test]
    fn test_selection_frame_tall_target() {
        let frame = SelectionFrame::fit(200, 100, Resolution::new(100, 400));
        assert_eq!(frame.rect, Rect::new(87.5, 0.0, 25.0, 100.0));

        let frame = SelectionFrame::fit(100, 300, Resolution::new(1024, 1024));
        assert_eq!(frame.rect, Rect::new(0.0, 100.0, 100.0, 100.0));
        assert_eq!(frame.pixel_size(), (100, 100));
    }

    #[test]
    fn test_full_frame_crop_round_trips() {
        let img = pattern(64, 48);
        let selection = SelectionFrame {
            rect: Rect::new(0.0, 0.0, 64.0, 48.0),
            target: Resolution::new(64, 48),
        };
        let out = crop_and_export(&layer(img.clone()), &AffineState::default(), &selection, &WarpOptions::default());
        assert_eq!(out, img);
    }

    #[test]
    fn test_crop_follows_position() {
        let img = pattern(20, 20);
        let affine = AffineState {
            position: Delta { dx: 5.0, dy: 0.0 },
            ..Default::default()
        };
        let selection = SelectionFrame {
            rect: Rect::new(0.0, 0.0, 20.0, 20.0),
            target: Resolution::new(20, 20),
        };
        let out = crop_and_export(&layer(img.clone()), &affine, &selection, &WarpOptions::default());
        // Left strip is uncovered, the rest is the image shifted right
        assert_eq!(out.get_pixel(2, 3).0, [0, 0, 0, 0]);
        assert_eq!(out.get_pixel(5, 3), img.get_pixel(0, 3));
        assert_eq!(out.get_pixel(19, 10), img.get_pixel(14, 10));
    }

    #[test]
    fn test_crop_of_offset_layer() {
        // A deformed layer starting at (-2, -2) in image space
        let img = pattern(10, 10);
        let shifted = Layer::new(Arc::new(img.clone()), Point::new(-2.0, -2.0));
        let selection = SelectionFrame {
            rect: Rect::new(0.0, 0.0, 4.0, 4.0),
            target: Resolution::new(4, 4),
        };
        let out = crop_and_export(&shifted, &AffineState::default(), &selection, &WarpOptions::default());
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(2, 2));
    }

    #[test]
    fn test_resample_to_target() {
        let img = RgbaImage::from_pixel(40, 40, Rgba([200, 50, 10, 255]));
        let selection = SelectionFrame::fit(40, 40, Resolution::new(10, 10));
        let out = crop_and_export(&layer(img), &AffineState::default(), &selection, &WarpOptions::default());
        assert_eq!(out.dimensions(), (10, 10));
        let center = out.get_pixel(5, 5).0;
        assert_eq!(center[3], 255);
        assert!((center[0] as i32 - 200).abs() <= 2);
    }

    #[test]
    fn test_resample_transparent_stays_clean() {
        let img = RgbaImage::from_pixel(8, 8, TRANSPARENT);
        let out = resample(&img, Resolution::new(3, 3));
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_export_path() {
        let p = export_path(Path::new("/out"), Path::new("/photos/holiday.jpeg"), "_edited");
        assert_eq!(p, PathBuf::from("/out/holiday_edited.png"));
        let p = export_path(Path::new("out"), Path::new("scan.PNG"), "_edited");
        assert_eq!(p, PathBuf::from("out/scan_edited.png"));
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!("640x480".parse::<Resolution>(), Ok(Resolution::new(640, 480)));
        assert_eq!(" 32 X 16".parse::<Resolution>(), Ok(Resolution::new(32, 16)));
        assert!("640".parse::<Resolution>().is_err());
        assert!("0x10".parse::<Resolution>().is_err());
        assert_eq!(Resolution::new(3, 4).to_string(), "3x4");
    }
}
