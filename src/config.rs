//! Configuration management for photowarp

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::export::Resolution;
use crate::gallery::GridLayout;
use crate::slot::SlotSettings;
use crate::warp::{DeformSettings, Interpolation, WarpOptions};

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub target_width: u32,
    pub target_height: u32,
    /// Appended to the source file stem, e.g. `photo.jpg` -> `photo_edited.png`
    pub suffix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            target_width: 1024,
            target_height: 1024,
            suffix: "_edited".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn target(&self) -> Resolution {
        Resolution::new(self.target_width.max(1), self.target_height.max(1))
    }
}

/// Perspective deformation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeformConfig {
    /// Canvas padding as a fraction of the larger image side
    pub pad_ratio: f64,
    /// Margin kept around the image after warping
    pub margin_ratio: f64,
    /// Side of the square control handles, in scene units (minimum 20)
    pub handle_size: f64,
    pub interpolation: Interpolation,
}

impl Default for DeformConfig {
    fn default() -> Self {
        Self {
            pad_ratio: 0.5,
            margin_ratio: 0.2,
            handle_size: 25.0,
            interpolation: Interpolation::Bilinear,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GalleryConfig {
    pub columns: usize,
    pub rows: usize,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self { columns: 4, rows: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Oldest entries are dropped past this many; 0 keeps everything
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 50 }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub deform: DeformConfig,

    #[serde(default)]
    pub gallery: GalleryConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Per-image settings; ratios below the working minimum are raised to it
    pub fn slot_settings(&self) -> SlotSettings {
        let defaults = DeformSettings::default();
        SlotSettings {
            deform: DeformSettings {
                pad_ratio: self.deform.pad_ratio.max(defaults.pad_ratio),
                margin_ratio: self.deform.margin_ratio.max(defaults.margin_ratio),
                options: WarpOptions {
                    interpolation: self.deform.interpolation,
                    ..WarpOptions::default()
                },
            },
            handle_size: self.deform.handle_size,
            history_limit: self.history.max_entries,
            target: self.export.target(),
        }
    }

    pub fn grid_layout(&self) -> GridLayout {
        GridLayout {
            columns: self.gallery.columns.max(1),
            rows: self.gallery.rows.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.export.target(), Resolution::new(1024, 1024));
        assert_eq!(config.export.suffix, "_edited");
        assert_eq!(config.grid_layout().per_page(), 8);

        let settings = config.slot_settings();
        assert_eq!(settings.handle_size, 25.0);
        assert_eq!(settings.history_limit, 50);
        assert_eq!(settings.deform, DeformSettings::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [export]
            target_width = 640

            [deform]
            interpolation = "nearest"
            margin_ratio = 0.05
            "#,
        )
        .unwrap();
        assert_eq!(config.export.target(), Resolution::new(640, 1024));
        assert_eq!(config.gallery.columns, 4);

        let settings = config.slot_settings();
        assert_eq!(settings.deform.options.interpolation, Interpolation::Nearest);
        assert_eq!(settings.deform.margin_ratio, 0.2);
    }

    #[test]
    fn test_load_or_create_round_trip() {
        let dir = std::env::temp_dir().join(format!("photowarp-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        std::fs::remove_dir_all(&dir).ok();

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, Config::default());

        let mut changed = created;
        changed.history.max_entries = 7;
        changed.save(&path).unwrap();
        assert_eq!(Config::load_or_create(&path).unwrap(), changed);
        std::fs::remove_dir_all(&dir).ok();
    }
}
