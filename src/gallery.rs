//! Paginated collection of image slots
//!
//! Slots are laid out `columns` x `rows` per page in load order. Loading and
//! exporting never stop at the first bad file; failures are tallied in the
//! returned report.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{EditorError, Result};
use crate::export::{export_path, save_png, Resolution};
use crate::slot::{ImageSlot, SlotSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub columns: usize,
    pub rows: usize,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self { columns: 4, rows: 2 }
    }
}

impl GridLayout {
    pub fn per_page(&self) -> usize {
        (self.columns * self.rows).max(1)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    pub output_dir: PathBuf,
    pub saved: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
}

#[derive(Debug)]
pub struct Gallery {
    slots: Vec<ImageSlot>,
    settings: SlotSettings,
    layout: GridLayout,
    current_page: usize,
    selected: Option<usize>,
}

impl Gallery {
    pub fn new(settings: SlotSettings, layout: GridLayout) -> Self {
        Self {
            slots: Vec::new(),
            settings,
            layout,
            current_page: 0,
            selected: None,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ImageSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&ImageSlot> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut ImageSlot> {
        self.slots.get_mut(index)
    }

    pub fn settings(&self) -> &SlotSettings {
        &self.settings
    }

    /// Add an already decoded slot at the end
    pub fn push(&mut self, slot: ImageSlot) {
        self.slots.push(slot);
    }

    /// Decode and append every path; undecodable files are skipped
    pub fn load<P: AsRef<Path>>(&mut self, paths: &[P]) -> LoadReport {
        let mut report = LoadReport::default();
        for path in paths {
            let path = path.as_ref();
            match ImageSlot::open(path, &self.settings) {
                Ok(slot) => {
                    self.slots.push(slot);
                    report.loaded.push(path.to_path_buf());
                }
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    report.failed.push(FailedFile {
                        path: path.to_path_buf(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            "Loaded {} images ({} failed), {} pages",
            report.loaded.len(),
            report.failed.len(),
            self.page_count()
        );
        report
    }

    pub fn page_count(&self) -> usize {
        self.slots.len().div_ceil(self.layout.per_page())
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Slot indices shown on the current page
    pub fn page_range(&self) -> std::ops::Range<usize> {
        let start = (self.current_page * self.layout.per_page()).min(self.slots.len());
        let end = (start + self.layout.per_page()).min(self.slots.len());
        start..end
    }

    /// Grid cell (row, column) of a slot on its page
    pub fn grid_position(&self, index: usize) -> (usize, usize) {
        let cell = index % self.layout.per_page();
        (cell / self.layout.columns.max(1), cell % self.layout.columns.max(1))
    }

    pub fn next_page(&mut self) {
        if self.page_count() > 1 {
            self.current_page = (self.current_page + 1).min(self.page_count() - 1);
        }
    }

    pub fn prev_page(&mut self) {
        if self.page_count() > 1 {
            self.current_page = self.current_page.saturating_sub(1);
        }
    }

    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.slots.len() {
            return Err(EditorError::EmptySlot(index));
        }
        self.selected = Some(index);
        self.current_page = index / self.layout.per_page();
        Ok(())
    }

    /// The slot edit commands go to: the last selected one if it is on the
    /// current page, otherwise the first slot of the page
    pub fn active_index(&self) -> Option<usize> {
        let range = self.page_range();
        match self.selected {
            Some(i) if range.contains(&i) => Some(i),
            _ if !range.is_empty() => Some(range.start),
            _ => None,
        }
    }

    pub fn active_mut(&mut self) -> Option<&mut ImageSlot> {
        let index = self.active_index()?;
        self.slots.get_mut(index)
    }

    /// New export size for every slot
    pub fn set_target_resolution(&mut self, target: Resolution) {
        self.settings.target = target;
        for slot in &mut self.slots {
            slot.set_target_resolution(target);
        }
        info!("Target resolution set to {}", target);
    }

    /// Export every slot into `dir` as `<stem><suffix>.png`
    ///
    /// Only a failure to create `dir` is an error; per-image failures land in the report.
    pub fn export_all(&self, dir: &Path, suffix: &str) -> Result<ExportReport> {
        std::fs::create_dir_all(dir).map_err(|source| EditorError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut report = ExportReport {
            output_dir: dir.to_path_buf(),
            ..Default::default()
        };
        for (index, slot) in self.slots.iter().enumerate() {
            let source = slot
                .source()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(format!("image_{}", index + 1)));
            let path = export_path(dir, &source, suffix);

            match save_png(&slot.export(), &path) {
                Ok(()) => {
                    info!("Saved {:?}", path);
                    report.saved.push(path);
                }
                Err(e) => {
                    warn!("Failed to save image {}: {}", index + 1, e);
                    report.failed.push(FailedFile {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!("Saved {} images to {:?}", report.saved.len(), dir);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::load_rgba;
    use image::{Rgba, RgbaImage};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("photowarp-gallery-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn gallery_of(n: usize) -> Gallery {
        let settings = SlotSettings::default();
        let mut g = Gallery::new(settings, GridLayout::default());
        for i in 0..n {
            g.push(ImageSlot::new(
                RgbaImage::from_pixel(8, 8, Rgba([i as u8, 0, 0, 255])),
                &settings,
            ));
        }
        g
    }

    #[test]
    fn test_pagination() {
        let mut g = gallery_of(11);
        assert_eq!(g.page_count(), 2);
        assert_eq!(g.page_range(), 0..8);
        assert_eq!(g.grid_position(5), (1, 1));
        assert_eq!(g.grid_position(9), (0, 1));

        g.next_page();
        assert_eq!(g.page_range(), 8..11);
        g.next_page();
        assert_eq!(g.current_page(), 1);
        g.prev_page();
        g.prev_page();
        assert_eq!(g.current_page(), 0);
        assert_eq!(gallery_of(0).page_count(), 0);
    }

    #[test]
    fn test_active_slot_follows_page() {
        let mut g = gallery_of(10);
        assert_eq!(g.active_index(), Some(0));
        g.select(3).unwrap();
        assert_eq!(g.active_index(), Some(3));
        g.next_page();
        assert_eq!(g.active_index(), Some(8));
        assert!(matches!(g.select(10), Err(EditorError::EmptySlot(10))));
        assert!(gallery_of(0).active_index().is_none());
    }

    #[test]
    fn test_target_resolution_updates_all_slots() {
        let mut g = gallery_of(3);
        g.set_target_resolution(Resolution::new(4, 8));
        for slot in g.slots() {
            assert_eq!(slot.selection().target, Resolution::new(4, 8));
            assert_eq!(slot.selection().rect.width, 4.0);
        }
    }

    #[test]
    fn test_load_counts_failures() {
        let dir = scratch_dir("load");
        let good = dir.join("good.png");
        let bad = dir.join("bad.jpg");
        save_png(&RgbaImage::from_pixel(5, 3, Rgba([1, 2, 3, 255])), &good).unwrap();
        std::fs::write(&bad, b"nope").unwrap();

        let mut g = Gallery::new(SlotSettings::default(), GridLayout::default());
        let report = g.load(&[good.clone(), bad.clone(), dir.join("missing.png")]);
        assert_eq!(report.loaded, vec![good.clone()]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].path, bad);
        assert_eq!(g.len(), 1);
        assert_eq!(g.slot(0).unwrap().source(), Some(good.as_path()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_export_all_writes_edited_pngs() {
        let dir = scratch_dir("export");
        let input = dir.join("holiday.png");
        save_png(&RgbaImage::from_pixel(20, 10, Rgba([9, 8, 7, 255])), &input).unwrap();

        let mut g = Gallery::new(SlotSettings::default(), GridLayout::default());
        g.load(&[&input]);
        g.set_target_resolution(Resolution::new(6, 6));

        let out_dir = dir.join("out");
        let report = g.export_all(&out_dir, "_edited").unwrap();
        assert_eq!(report.saved, vec![out_dir.join("holiday_edited.png")]);
        assert!(report.failed.is_empty());

        let exported = load_rgba(&report.saved[0]).unwrap();
        assert_eq!(exported.dimensions(), (6, 6));
        std::fs::remove_dir_all(&dir).ok();
    }
}
