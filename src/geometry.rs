//! Points and rectangles tagged with the coordinate space they live in
//!
//! Three spaces exist in the editor:
//! - `ImageSpace`: pixel coordinates of the original image (pixel centers at integers)
//! - `SceneSpace`: where the transformed image, the selection frame and the
//!   control handles are laid out
//! - `ViewSpace`: host widget coordinates, related to the scene by the viewport zoom/pan
//!
//! A `Point<ImageSpace>` cannot be passed where a `Point<SceneSpace>` is expected,
//! so every conversion has to go through an explicit mapping.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewSpace;

/// A 2D point in the coordinate space `S`
pub struct Point<S> {
    pub x: f64,
    pub y: f64,
    space: PhantomData<S>,
}

impl<S> Point<S> {
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }

    pub const fn origin() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Bearing from `self` to `other` in degrees, as returned by `atan2`
    pub fn bearing_to(&self, other: &Self) -> f64 {
        (other.y - self.y).atan2(other.x - self.x).to_degrees()
    }
}

// Manual impls so that the marker type does not need to implement these traits itself.
impl<S> Clone for Point<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Point<S> {}

impl<S> PartialEq for Point<S> {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<S> Default for Point<S> {
    fn default() -> Self {
        Self::origin()
    }
}

impl<S> fmt::Debug for Point<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Displacement between two points of the same space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Delta {
    pub dx: f64,
    pub dy: f64,
}

impl<S> Sub for Point<S> {
    type Output = Delta;

    fn sub(self, rhs: Self) -> Delta {
        Delta {
            dx: self.x - rhs.x,
            dy: self.y - rhs.y,
        }
    }
}

impl<S> Add<Delta> for Point<S> {
    type Output = Point<S>;

    fn add(self, rhs: Delta) -> Point<S> {
        Point::new(self.x + rhs.dx, self.y + rhs.dy)
    }
}

/// Axis-aligned rectangle in the coordinate space `S`
pub struct Rect<S> {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    space: PhantomData<S>,
}

impl<S> Rect<S> {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            space: PhantomData,
        }
    }

    pub fn center(&self) -> Point<S> {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn min(&self) -> Point<S> {
        Point::new(self.x, self.y)
    }

    pub fn max(&self) -> Point<S> {
        Point::new(self.x + self.width, self.y + self.height)
    }

    /// Half-open containment: the left/top edges are inside, the right/bottom ones are not
    pub fn contains(&self, p: &Point<S>) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    /// Square of side `size` centered on `p`
    pub fn centered_square(p: &Point<S>, size: f64) -> Self {
        Self::new(p.x - size / 2.0, p.y - size / 2.0, size, size)
    }

    /// Smallest rectangle covering all the given points
    pub fn bounding(points: &[Point<S>]) -> Option<Self> {
        let first = points.first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Some(Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }
}

impl<S> Clone for Rect<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Rect<S> {}

impl<S> PartialEq for Rect<S> {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
    }
}

impl<S> fmt::Debug for Rect<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}, {:.3} {:.3}x{:.3}]",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Host zoom/pan relating view coordinates to the scene
///
/// `view = scene * zoom + pan`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub zoom: f64,
    pub pan: Delta,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Delta::default(),
        }
    }
}

impl Viewport {
    pub fn new(zoom: f64, pan_x: f64, pan_y: f64) -> Self {
        Self {
            zoom,
            pan: Delta { dx: pan_x, dy: pan_y },
        }
    }

    pub fn to_scene(&self, p: Point<ViewSpace>) -> Point<SceneSpace> {
        Point::new((p.x - self.pan.dx) / self.zoom, (p.y - self.pan.dy) / self.zoom)
    }

    pub fn to_view(&self, p: Point<SceneSpace>) -> Point<ViewSpace> {
        Point::new(p.x * self.zoom + self.pan.dx, p.y * self.zoom + self.pan.dy)
    }

    /// Zoom by one wheel step (10%) keeping the view position `anchor` fixed
    pub fn wheel(&mut self, anchor: Point<ViewSpace>, zoom_in: bool) {
        let factor = if zoom_in { 1.1 } else { 1.0 / 1.1 };
        let fixed = self.to_scene(anchor);
        self.zoom *= factor;
        self.pan = Delta {
            dx: anchor.x - fixed.x * self.zoom,
            dy: anchor.y - fixed.y * self.zoom,
        };
    }
}
