//! The four deformation handles of an image

use crate::affine::AffineState;
use crate::geometry::{ImageSpace, Point, Rect, SceneSpace};

/// Smallest accepted handle size; anything smaller is too fiddly to grab
pub const MIN_HANDLE_SIZE: f64 = 20.0;

/// Handle identity, in the fixed order TL, TR, BR, BL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPointId {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl ControlPointId {
    pub const ALL: [ControlPointId; 4] = [
        ControlPointId::TopLeft,
        ControlPointId::TopRight,
        ControlPointId::BottomRight,
        ControlPointId::BottomLeft,
    ];

    pub fn index(self) -> usize {
        match self {
            ControlPointId::TopLeft => 0,
            ControlPointId::TopRight => 1,
            ControlPointId::BottomRight => 2,
            ControlPointId::BottomLeft => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ControlPointId::TopLeft => "Top Left",
            ControlPointId::TopRight => "Top Right",
            ControlPointId::BottomRight => "Bottom Right",
            ControlPointId::BottomLeft => "Bottom Left",
        }
    }
}

/// One handle, positioned in the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPoint {
    pub id: ControlPointId,
    /// Where the handle was placed when the set was (re)built
    pub original: Point<SceneSpace>,
    /// Where it is now
    pub current: Point<SceneSpace>,
}

/// Exactly four handles, never reordered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPointSet {
    points: [ControlPoint; 4],
}

impl ControlPointSet {
    /// Fresh handles on the corners of `quad` as displayed through `affine`
    pub fn at_corners(quad: &[Point<ImageSpace>; 4], affine: &AffineState) -> Self {
        let points = ControlPointId::ALL.map(|id| {
            let pos = affine.map(quad[id.index()]);
            ControlPoint {
                id,
                original: pos,
                current: pos,
            }
        });
        Self { points }
    }

    /// Rebuild from recorded original/current scene positions (TL, TR, BR, BL)
    pub fn from_positions(original: [Point<SceneSpace>; 4], current: [Point<SceneSpace>; 4]) -> Self {
        let points = ControlPointId::ALL.map(|id| ControlPoint {
            id,
            original: original[id.index()],
            current: current[id.index()],
        });
        Self { points }
    }

    pub fn get(&self, id: ControlPointId) -> &ControlPoint {
        &self.points[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn original_positions(&self) -> [Point<SceneSpace>; 4] {
        self.points.map(|p| p.original)
    }

    pub fn current_positions(&self) -> [Point<SceneSpace>; 4] {
        self.points.map(|p| p.current)
    }

    pub fn move_to(&mut self, id: ControlPointId, pos: Point<SceneSpace>) {
        self.points[id.index()].current = pos;
    }

    /// Follow an affine change: current positions track the quad corners
    pub fn reposition(&mut self, quad: &[Point<ImageSpace>; 4], affine: &AffineState) {
        for p in &mut self.points {
            p.current = affine.map(quad[p.id.index()]);
        }
    }

    /// Current positions mapped back into image space, `None` if the transform collapsed
    pub fn to_image_space(&self, affine: &AffineState) -> Option<[Point<ImageSpace>; 4]> {
        let mut out = [Point::origin(); 4];
        for p in &self.points {
            out[p.id.index()] = affine.unmap(p.current)?;
        }
        Some(out)
    }

    /// First handle (in fixed order) whose square of side `handle_size` contains `at`
    pub fn hit_test(&self, at: Point<SceneSpace>, handle_size: f64) -> Option<ControlPointId> {
        let size = handle_size.max(MIN_HANDLE_SIZE);
        self.points
            .iter()
            .find(|p| Rect::centered_square(&p.current, size).contains(&at))
            .map(|p| p.id)
    }
}
