//! One image and everything that has been done to it
//!
//! An `ImageSlot` owns the pristine original, the current deformed layer, the
//! affine state, the four control points, the selection frame and the undo
//! history. The interaction controller drives it through the gesture hooks below;
//! batch code uses `apply_quad` / `edit_affine` directly.

use image::RgbaImage;
use nalgebra::Matrix3;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::affine::AffineState;
use crate::control_points::{ControlPointId, ControlPointSet};
use crate::error::{DegenerateQuadError, HistoryError, Result};
use crate::export::{crop_and_export, Resolution, SelectionFrame};
use crate::geometry::{Delta, ImageSpace, Point, SceneSpace};
use crate::history::{EditState, History};
use crate::interaction::Frame;
use crate::io;
use crate::warp::{DeformSettings, Deformer, Layer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotSettings {
    pub deform: DeformSettings,
    pub handle_size: f64,
    /// Maximum number of history entries, 0 for unbounded
    pub history_limit: usize,
    pub target: Resolution,
}

impl Default for SlotSettings {
    fn default() -> Self {
        Self {
            deform: DeformSettings::default(),
            handle_size: 25.0,
            history_limit: 50,
            target: Resolution::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageSlot {
    deformer: Deformer,
    layer: Layer,
    affine: AffineState,
    control_points: ControlPointSet,
    selection: SelectionFrame,
    history: History,
    handle_size: f64,
    source: Option<PathBuf>,
}

impl ImageSlot {
    /// Wrap a decoded image; history stays empty until the first edit
    pub fn new(image: RgbaImage, settings: &SlotSettings) -> Self {
        let (w, h) = image.dimensions();
        let deformer = Deformer::new(Arc::new(image), settings.deform);
        let affine = AffineState::default();
        let control_points = ControlPointSet::at_corners(&deformer.quad(), &affine);

        Self {
            layer: deformer.identity_layer(),
            deformer,
            affine,
            control_points,
            selection: SelectionFrame::fit(w, h, settings.target),
            history: History::new(settings.history_limit),
            handle_size: settings.handle_size,
            source: None,
        }
    }

    /// Decode `path` into a new slot
    pub fn open(path: &Path, settings: &SlotSettings) -> Result<Self> {
        let image = io::load_rgba(path)?;
        debug!("Loaded {:?} ({}x{})", path, image.width(), image.height());
        let mut slot = Self::new(image, settings);
        slot.source = Some(path.to_path_buf());
        Ok(slot)
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn original(&self) -> &Arc<RgbaImage> {
        self.deformer.original()
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn affine(&self) -> &AffineState {
        &self.affine
    }

    pub fn quad(&self) -> [Point<ImageSpace>; 4] {
        self.deformer.quad()
    }

    pub fn control_points(&self) -> &ControlPointSet {
        &self.control_points
    }

    pub fn selection(&self) -> &SelectionFrame {
        &self.selection
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn handle_size(&self) -> f64 {
        self.handle_size
    }

    /// What a canvas needs to draw this slot
    pub fn frame(&self) -> Frame<'_> {
        let origin = Matrix3::new(
            1.0, 0.0, self.layer.origin.x, //
            0.0, 1.0, self.layer.origin.y, //
            0.0, 0.0, 1.0,
        );
        Frame {
            layer: &self.layer,
            transform: self.affine.matrix() * origin,
            control_points: &self.control_points,
            selection: &self.selection,
        }
    }

    /// Recompute the selection frame for a new export size
    pub fn set_target_resolution(&mut self, target: Resolution) {
        let (w, h) = self.original().dimensions();
        self.selection = SelectionFrame::fit(w, h, target);
    }

    pub fn snapshot(&self) -> EditState {
        EditState {
            layer: self.layer.clone(),
            affine: self.affine,
            quad: self.deformer.quad(),
            control_points: self.control_points,
        }
    }

    /// Record the current state as a new history entry
    pub fn commit(&mut self) {
        let state = self.snapshot();
        self.history.record(state);
    }

    /// Put every part of `state` back; nothing is left half-applied
    pub fn restore(&mut self, state: &EditState) {
        self.layer = state.layer.clone();
        self.affine = state.affine;
        self.deformer.set_quad(state.quad);
        self.control_points = ControlPointSet::from_positions(
            state.control_points.original_positions(),
            state.control_points.current_positions(),
        );
    }

    pub fn undo(&mut self) -> std::result::Result<(), HistoryError> {
        let state = match self.history.undo() {
            Ok(state) => state.clone(),
            Err(e) => {
                info!("{}", e);
                return Err(e);
            }
        };
        self.restore(&state);
        info!("Undo successful");
        Ok(())
    }

    pub fn redo(&mut self) -> std::result::Result<(), HistoryError> {
        let state = match self.history.redo() {
            Ok(state) => state.clone(),
            Err(e) => {
                info!("{}", e);
                return Err(e);
            }
        };
        self.restore(&state);
        info!("Redo successful");
        Ok(())
    }

    /// Back to the untouched original, recorded as a new edit
    pub fn reset(&mut self) {
        self.deformer.reset();
        self.layer = self.deformer.identity_layer();
        self.affine = AffineState::default();
        self.control_points = ControlPointSet::at_corners(&self.deformer.quad(), &self.affine);
        self.commit();
        info!("Image reset to original");
    }

    /// Resize and rotate act around the center of the current layer
    pub fn begin_affine_gesture(&mut self) {
        self.affine.repivot(self.layer.center());
    }

    pub fn translate_by(&mut self, delta: Delta) {
        self.affine.translate_by(delta);
        self.follow_affine();
    }

    pub fn resize_by(&mut self, delta: Delta, constrain: bool) {
        self.affine.resize_by(delta, constrain);
        self.follow_affine();
    }

    pub fn rotate_towards(&mut self, last: Point<SceneSpace>, current: Point<SceneSpace>) {
        let center = self.affine.map(self.layer.center());
        self.affine.rotate_towards(center, last, current);
        self.follow_affine();
    }

    fn follow_affine(&mut self) {
        self.control_points.reposition(&self.deformer.quad(), &self.affine);
    }

    /// Move one handle and re-deform; a degenerate quad keeps the previous layer
    pub fn drag_control_point(&mut self, id: ControlPointId, at: Point<SceneSpace>) {
        self.control_points.move_to(id, at);
        self.redeform();
    }

    /// End of a deform drag: final warp, then fresh handles on the new corners
    pub fn release_control_points(&mut self) {
        self.redeform();
        self.control_points = ControlPointSet::at_corners(&self.deformer.quad(), &self.affine);
    }

    fn redeform(&mut self) {
        let Some(quad) = self.control_points.to_image_space(&self.affine) else {
            debug!("Transform not invertible, deformation skipped");
            return;
        };
        match self.deformer.apply(quad) {
            Ok(layer) => self.layer = layer,
            Err(e) => debug!("Keeping previous layer: {}", e),
        }
    }

    /// Deform to `quad` (image space, TL TR BR BL) and record the edit
    pub fn apply_quad(&mut self, quad: [Point<ImageSpace>; 4]) -> std::result::Result<(), DegenerateQuadError> {
        self.layer = self.deformer.apply(quad)?;
        self.control_points = ControlPointSet::at_corners(&quad, &self.affine);
        self.commit();
        Ok(())
    }

    /// Change the affine state around the layer center and record the edit
    pub fn edit_affine(&mut self, edit: impl FnOnce(&mut AffineState)) {
        self.begin_affine_gesture();
        edit(&mut self.affine);
        self.follow_affine();
        self.commit();
    }

    /// The selected region at the target resolution
    pub fn export(&self) -> RgbaImage {
        crop_and_export(
            &self.layer,
            &self.affine,
            &self.selection,
            &self.deformer.settings().options,
        )
    }
}
