//! Raster decoding and PNG encoding

use image::{ImageOutputFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;

use crate::error::{EditorError, Result};

/// Extensions the gallery picks up when given a directory
pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Decode any supported format to 8-bit RGBA
pub fn load_rgba(path: &Path) -> Result<RgbaImage> {
    let decoded = image::open(path).map_err(|source| EditorError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decoded.to_rgba8())
}

/// Encode to an in-memory PNG
pub fn encode_png(image: &RgbaImage, path: &Path) -> Result<Vec<u8>> {
    let mut png_data = Vec::new();
    let mut cursor = Cursor::new(&mut png_data);
    image
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|source| EditorError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(png_data)
}

/// Write `image` to `path` as PNG, whatever the extension says
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    let png_data = encode_png(image, path)?;
    std::fs::write(path, png_data).map_err(|source| EditorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("photowarp-io-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_png_round_trip_keeps_alpha() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("alpha.png");
        let mut img = RgbaImage::from_pixel(6, 4, Rgba([10, 20, 30, 255]));
        img.put_pixel(2, 1, Rgba([0, 0, 0, 0]));
        img.put_pixel(3, 1, Rgba([200, 100, 50, 128]));

        save_png(&img, &path).unwrap();
        assert_eq!(load_rgba(&path).unwrap(), img);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_undecodable_file_is_decode_error() {
        let dir = scratch_dir("garbage");
        let path = dir.join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        match load_rgba(&path) {
            Err(EditorError::Decode { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected decode error, got {:?}", other.map(|i| i.dimensions())),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_into_missing_dir_is_io_error() {
        let img = RgbaImage::new(1, 1);
        let path = std::env::temp_dir()
            .join(format!("photowarp-missing-{}", std::process::id()))
            .join("nested")
            .join("out.png");
        assert!(matches!(save_png(&img, &path), Err(EditorError::Io { .. })));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("a/b/photo.JPG")));
        assert!(is_supported(Path::new("scan.tiff")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("README")));
    }
}
