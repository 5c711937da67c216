//! Move / resize / rotate state of one image
//!
//! The affine stage is applied on top of the (already perspective-warped) layer:
//!
//! ```text
//! scene = translate(position) * translate(pivot) * rotate(angle) * scale(sx, sy) * translate(-pivot) * local
//! ```
//!
//! The pivot is the center of the layer's bounding box, captured whenever a
//! resize or rotate gesture rebuilds the transform.

use nalgebra::Matrix3;

use crate::geometry::{Delta, ImageSpace, Point, SceneSpace};

/// Scale factors never shrink below this, so the transform stays invertible
const MIN_SCALE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineState {
    /// Accumulated rotation in degrees (clockwise on screen, y axis pointing down)
    pub angle: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Absolute translation of the image in the scene
    pub position: Delta,
    pub pivot: Point<ImageSpace>,
}

impl Default for AffineState {
    fn default() -> Self {
        Self {
            angle: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            position: Delta::default(),
            pivot: Point::origin(),
        }
    }
}

impl AffineState {
    pub fn is_identity(&self) -> bool {
        self.angle == 0.0
            && self.scale_x == 1.0
            && self.scale_y == 1.0
            && self.position == Delta::default()
    }

    /// Composed image-to-scene matrix
    pub fn matrix(&self) -> Matrix3<f64> {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let (px, py) = (self.pivot.x, self.pivot.y);

        let outer = Matrix3::new(
            1.0, 0.0, self.position.dx + px, //
            0.0, 1.0, self.position.dy + py, //
            0.0, 0.0, 1.0,
        );
        let rotate = Matrix3::new(
            cos, -sin, 0.0, //
            sin, cos, 0.0, //
            0.0, 0.0, 1.0,
        );
        let scale = Matrix3::new(
            self.scale_x, 0.0, 0.0, //
            0.0, self.scale_y, 0.0, //
            0.0, 0.0, 1.0,
        );
        let back = Matrix3::new(
            1.0, 0.0, -px, //
            0.0, 1.0, -py, //
            0.0, 0.0, 1.0,
        );

        outer * rotate * scale * back
    }

    /// Image space to scene space
    pub fn map(&self, p: Point<ImageSpace>) -> Point<SceneSpace> {
        let m = self.matrix();
        Point::new(
            m[(0, 0)] * p.x + m[(0, 1)] * p.y + m[(0, 2)],
            m[(1, 0)] * p.x + m[(1, 1)] * p.y + m[(1, 2)],
        )
    }

    /// Scene space back to image space, `None` if the transform has collapsed
    pub fn unmap(&self, p: Point<SceneSpace>) -> Option<Point<ImageSpace>> {
        let inv = self.matrix().try_inverse()?;
        let local = Point::new(
            inv[(0, 0)] * p.x + inv[(0, 1)] * p.y + inv[(0, 2)],
            inv[(1, 0)] * p.x + inv[(1, 1)] * p.y + inv[(1, 2)],
        );
        local.is_finite().then_some(local)
    }

    /// Move gesture step
    pub fn translate_by(&mut self, delta: Delta) {
        self.position.dx += delta.dx;
        self.position.dy += delta.dy;
    }

    /// Resize gesture step: each axis grows by 1% per scene unit of cursor travel
    ///
    /// With `constrain` both axes follow the horizontal travel.
    pub fn resize_by(&mut self, delta: Delta, constrain: bool) {
        let fx = 1.0 + delta.dx / 100.0;
        let fy = if constrain { fx } else { 1.0 + delta.dy / 100.0 };
        self.scale_x = (self.scale_x * fx).max(MIN_SCALE);
        self.scale_y = (self.scale_y * fy).max(MIN_SCALE);
    }

    /// Rotate gesture step: add the change in bearing from `center` to the cursor
    pub fn rotate_towards(
        &mut self,
        center: Point<SceneSpace>,
        last: Point<SceneSpace>,
        current: Point<SceneSpace>,
    ) {
        if last == center || current == center {
            return;
        }
        let mut delta = center.bearing_to(&current) - center.bearing_to(&last);
        // Crossing the atan2 branch cut must not spin the image a full turn
        if delta > 180.0 {
            delta -= 360.0;
        } else if delta <= -180.0 {
            delta += 360.0;
        }
        self.angle += delta;
    }

    /// Move the pivot to `pivot` without changing where anything is drawn
    ///
    /// The translation absorbs the difference, so the image stays put on screen.
    pub fn repivot(&mut self, pivot: Point<ImageSpace>) {
        let before = self.map(pivot);
        self.pivot = pivot;
        let after = self.map(pivot);
        self.translate_by(before - after);
    }
}
