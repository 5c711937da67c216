//! Pointer interaction for one image slot
//!
//! Events are fed to `Controller::dispatch` one at a time. The controller is a small
//! state machine (`Idle` -> `Dragging` -> `Idle`) that turns them into slot edits,
//! asks the `Canvas` to redraw, and reports `Outcome::Modified` exactly once per
//! completed gesture (the slot has recorded a history entry by then).

use nalgebra::Matrix3;
use tracing::debug;

use crate::control_points::{ControlPointId, ControlPointSet, MIN_HANDLE_SIZE};
use crate::export::SelectionFrame;
use crate::geometry::{Point, SceneSpace, ViewSpace, Viewport};
use crate::slot::ImageSlot;
use crate::warp::Layer;

/// Everything a host needs to draw one image
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub layer: &'a Layer,
    /// Layer buffer pixel coordinates to scene coordinates
    pub transform: Matrix3<f64>,
    pub control_points: &'a ControlPointSet,
    pub selection: &'a SelectionFrame,
}

/// Drawing surface capabilities the controller relies on
pub trait Canvas {
    /// Handle under `at`, if any
    fn hit_test(&self, at: Point<SceneSpace>) -> Option<ControlPointId>;

    /// Display a new frame
    fn render(&mut self, frame: &Frame<'_>);
}

/// Toolkit-free canvas: remembers where the handles were last drawn
#[derive(Debug, Clone)]
pub struct OffscreenCanvas {
    handle_size: f64,
    handles: Option<ControlPointSet>,
    last_transform: Option<Matrix3<f64>>,
    last_size: (u32, u32),
    frames: usize,
}

impl OffscreenCanvas {
    pub fn new(handle_size: f64) -> Self {
        Self {
            handle_size: handle_size.max(MIN_HANDLE_SIZE),
            handles: None,
            last_transform: None,
            last_size: (0, 0),
            frames: 0,
        }
    }

    pub fn frames_rendered(&self) -> usize {
        self.frames
    }

    pub fn last_transform(&self) -> Option<&Matrix3<f64>> {
        self.last_transform.as_ref()
    }

    pub fn last_size(&self) -> (u32, u32) {
        self.last_size
    }
}

impl Canvas for OffscreenCanvas {
    fn hit_test(&self, at: Point<SceneSpace>) -> Option<ControlPointId> {
        self.handles.as_ref()?.hit_test(at, self.handle_size)
    }

    fn render(&mut self, frame: &Frame<'_>) {
        self.handles = Some(*frame.control_points);
        self.last_transform = Some(frame.transform);
        self.last_size = (frame.layer.width(), frame.layer.height());
        self.frames += 1;
    }
}

/// What the primary button does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Move,
    Resize,
    Rotate,
    Deform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    /// Pans the view
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    /// Keep the aspect ratio while resizing
    pub constrain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Press {
        position: Point<ViewSpace>,
        button: PointerButton,
    },
    Move {
        position: Point<ViewSpace>,
        modifiers: Modifiers,
    },
    Release {
        position: Point<ViewSpace>,
        button: PointerButton,
    },
    Wheel {
        position: Point<ViewSpace>,
        zoom_in: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Move,
    Resize,
    Rotate,
    Deform(ControlPointId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        gesture: Gesture,
        last: Point<SceneSpace>,
        changed: bool,
    },
    Panning {
        last: Point<ViewSpace>,
    },
}

/// Result of dispatching one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing happened
    Ignored,
    /// The display changed mid-gesture (or the view moved)
    Updated,
    /// A gesture finished and changed the image; a history entry was recorded
    Modified,
}

#[derive(Debug, Clone)]
pub struct Controller {
    mode: EditMode,
    state: DragState,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(EditMode::default())
    }
}

impl Controller {
    pub fn new(mode: EditMode) -> Self {
        Self {
            mode,
            state: DragState::Idle,
        }
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// Switching mode ends any gesture in progress as if the button had
    /// been released
    pub fn set_mode<C: Canvas + ?Sized>(&mut self, mode: EditMode, slot: &mut ImageSlot, canvas: &mut C) -> Outcome {
        self.mode = mode;
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Dragging { gesture, changed, .. } => Self::finish(gesture, changed, slot, canvas),
            DragState::Idle | DragState::Panning { .. } => Outcome::Ignored,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn dispatch<C: Canvas + ?Sized>(
        &mut self,
        event: PointerEvent,
        slot: &mut ImageSlot,
        canvas: &mut C,
        viewport: &mut Viewport,
    ) -> Outcome {
        match event {
            PointerEvent::Press { position, button } => self.press(position, button, slot, canvas, viewport),
            PointerEvent::Move { position, modifiers } => self.drag(position, modifiers, slot, canvas, viewport),
            PointerEvent::Release { button, .. } => self.release(button, slot, canvas),
            PointerEvent::Wheel { position, zoom_in } => {
                viewport.wheel(position, zoom_in);
                Outcome::Updated
            }
        }
    }

    fn press<C: Canvas + ?Sized>(
        &mut self,
        position: Point<ViewSpace>,
        button: PointerButton,
        slot: &mut ImageSlot,
        canvas: &mut C,
        viewport: &Viewport,
    ) -> Outcome {
        if self.state != DragState::Idle {
            return Outcome::Ignored;
        }

        let at = viewport.to_scene(position);
        let gesture = match (button, self.mode) {
            (PointerButton::Middle, _) => {
                self.state = DragState::Panning { last: position };
                return Outcome::Ignored;
            }
            (PointerButton::Secondary, _) => return Outcome::Ignored,
            (PointerButton::Primary, EditMode::Move) => Gesture::Move,
            (PointerButton::Primary, EditMode::Resize) => Gesture::Resize,
            (PointerButton::Primary, EditMode::Rotate) => Gesture::Rotate,
            (PointerButton::Primary, EditMode::Deform) => match canvas.hit_test(at) {
                Some(id) => {
                    debug!("Grabbed {} handle", id.label());
                    Gesture::Deform(id)
                }
                None => return Outcome::Ignored,
            },
        };

        if matches!(gesture, Gesture::Resize | Gesture::Rotate) {
            slot.begin_affine_gesture();
        }

        self.state = DragState::Dragging {
            gesture,
            last: at,
            changed: false,
        };
        Outcome::Ignored
    }

    fn drag<C: Canvas + ?Sized>(
        &mut self,
        position: Point<ViewSpace>,
        modifiers: Modifiers,
        slot: &mut ImageSlot,
        canvas: &mut C,
        viewport: &mut Viewport,
    ) -> Outcome {
        match self.state {
            DragState::Idle => Outcome::Ignored,
            DragState::Panning { last } => {
                let delta = position - last;
                viewport.pan.dx += delta.dx;
                viewport.pan.dy += delta.dy;
                self.state = DragState::Panning { last: position };
                Outcome::Updated
            }
            DragState::Dragging { gesture, last, .. } => {
                let at = viewport.to_scene(position);
                if at == last {
                    return Outcome::Ignored;
                }
                let delta = at - last;
                match gesture {
                    Gesture::Move => slot.translate_by(delta),
                    Gesture::Resize => slot.resize_by(delta, modifiers.constrain),
                    Gesture::Rotate => slot.rotate_towards(last, at),
                    Gesture::Deform(id) => slot.drag_control_point(id, at),
                }
                self.state = DragState::Dragging {
                    gesture,
                    last: at,
                    changed: true,
                };
                canvas.render(&slot.frame());
                Outcome::Updated
            }
        }
    }

    fn release<C: Canvas + ?Sized>(
        &mut self,
        button: PointerButton,
        slot: &mut ImageSlot,
        canvas: &mut C,
    ) -> Outcome {
        let state = std::mem::replace(&mut self.state, DragState::Idle);
        match (state, button) {
            (DragState::Panning { .. }, PointerButton::Middle) => Outcome::Ignored,
            (DragState::Dragging { gesture, changed, .. }, PointerButton::Primary) => {
                Self::finish(gesture, changed, slot, canvas)
            }
            (other, _) => {
                // A release for a different button does not end the gesture
                self.state = other;
                Outcome::Ignored
            }
        }
    }

    fn finish<C: Canvas + ?Sized>(gesture: Gesture, changed: bool, slot: &mut ImageSlot, canvas: &mut C) -> Outcome {
        if let Gesture::Deform(id) = gesture {
            debug!("Released {} handle", id.label());
            // Always re-anchor, even after a click without movement
            slot.release_control_points();
            canvas.render(&slot.frame());
        }
        if changed {
            slot.commit();
            Outcome::Modified
        } else {
            Outcome::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::{ImageSlot, SlotSettings};
    use image::{Rgba, RgbaImage};

    fn setup() -> (ImageSlot, OffscreenCanvas, Viewport) {
        let slot = ImageSlot::new(RgbaImage::from_pixel(100, 100, Rgba([1, 2, 3, 255])), &SlotSettings::default());
        let mut canvas = OffscreenCanvas::new(slot.handle_size());
        canvas.render(&slot.frame());
        (slot, canvas, Viewport::default())
    }

    #[test]
    fn test_middle_button_pans() {
        let (mut slot, mut canvas, mut viewport) = setup();
        let mut controller = Controller::new(EditMode::Deform);

        let press = PointerEvent::Press {
            position: Point::new(10.0, 10.0),
            button: PointerButton::Middle,
        };
        controller.dispatch(press, &mut slot, &mut canvas, &mut viewport);
        assert_eq!(controller.state(), DragState::Panning { last: Point::new(10.0, 10.0) });

        let drag = PointerEvent::Move {
            position: Point::new(25.0, 5.0),
            modifiers: Modifiers::default(),
        };
        assert_eq!(controller.dispatch(drag, &mut slot, &mut canvas, &mut viewport), Outcome::Updated);
        assert_eq!(viewport.pan, crate::geometry::Delta { dx: 15.0, dy: -5.0 });

        let release = PointerEvent::Release {
            position: Point::new(25.0, 5.0),
            button: PointerButton::Middle,
        };
        assert_eq!(controller.dispatch(release, &mut slot, &mut canvas, &mut viewport), Outcome::Ignored);
        assert_eq!(controller.state(), DragState::Idle);
        assert!(slot.history().is_empty());
    }

    #[test]
    fn test_hit_test_goes_through_viewport() {
        let (mut slot, mut canvas, _) = setup();
        // Zoomed in 2x: the top-right handle at scene (99, 0) is drawn at view (198, 0)
        let mut viewport = Viewport::new(2.0, 0.0, 0.0);
        let mut controller = Controller::new(EditMode::Deform);

        let press = PointerEvent::Press {
            position: Point::new(198.0, 0.0),
            button: PointerButton::Primary,
        };
        controller.dispatch(press, &mut slot, &mut canvas, &mut viewport);
        match controller.state() {
            DragState::Dragging { gesture, .. } => assert_eq!(gesture, Gesture::Deform(ControlPointId::TopRight)),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_render_on_every_drag_step() {
        let (mut slot, mut canvas, mut viewport) = setup();
        let mut controller = Controller::default();
        assert_eq!(controller.mode(), EditMode::Move);
        let before = canvas.frames_rendered();

        for event in [
            PointerEvent::Press {
                position: Point::new(50.0, 50.0),
                button: PointerButton::Primary,
            },
            PointerEvent::Move {
                position: Point::new(52.0, 50.0),
                modifiers: Modifiers::default(),
            },
            PointerEvent::Move {
                position: Point::new(54.0, 50.0),
                modifiers: Modifiers::default(),
            },
        ] {
            controller.dispatch(event, &mut slot, &mut canvas, &mut viewport);
        }
        assert_eq!(canvas.frames_rendered(), before + 2);
        let t = canvas.last_transform().unwrap();
        assert_eq!(t[(0, 2)], 4.0);
        assert_eq!(canvas.last_size(), (100, 100));
    }

    #[test]
    fn test_secondary_release_does_not_end_drag() {
        let (mut slot, mut canvas, mut viewport) = setup();
        let mut controller = Controller::new(EditMode::Move);
        let at = Point::new(50.0, 50.0);
        controller.dispatch(
            PointerEvent::Press { position: at, button: PointerButton::Primary },
            &mut slot,
            &mut canvas,
            &mut viewport,
        );
        controller.dispatch(
            PointerEvent::Release { position: at, button: PointerButton::Secondary },
            &mut slot,
            &mut canvas,
            &mut viewport,
        );
        assert!(matches!(controller.state(), DragState::Dragging { .. }));

        // No motion happened, so ending the gesture records nothing
        assert_eq!(controller.set_mode(EditMode::Rotate, &mut slot, &mut canvas), Outcome::Ignored);
        assert_eq!(controller.state(), DragState::Idle);
        assert!(slot.history().is_empty());
    }

    #[test]
    fn test_mode_switch_mid_deform_commits_and_reanchors() {
        let (mut slot, mut canvas, mut viewport) = setup();
        let mut controller = Controller::new(EditMode::Deform);
        controller.dispatch(
            PointerEvent::Press { position: Point::new(99.0, 0.0), button: PointerButton::Primary },
            &mut slot,
            &mut canvas,
            &mut viewport,
        );
        controller.dispatch(
            PointerEvent::Move { position: Point::new(150.0, -20.0), modifiers: Modifiers::default() },
            &mut slot,
            &mut canvas,
            &mut viewport,
        );
        let rendered = canvas.frames_rendered();

        assert_eq!(controller.set_mode(EditMode::Move, &mut slot, &mut canvas), Outcome::Modified);
        assert_eq!(controller.mode(), EditMode::Move);
        assert_eq!(controller.state(), DragState::Idle);
        assert_eq!(canvas.frames_rendered(), rendered + 1);

        assert_eq!(slot.history().len(), 1);
        assert_eq!(slot.history().current(), Some(&slot.snapshot()));
        let tr = slot.control_points().get(ControlPointId::TopRight);
        assert!(tr.current.distance(&Point::new(150.0, -20.0)) < 1e-9);
        assert_eq!(tr.original, tr.current);
        assert_eq!(slot.quad()[1], Point::new(150.0, -20.0));

        // The late release of the old button is a no-op
        let release = PointerEvent::Release { position: Point::new(150.0, -20.0), button: PointerButton::Primary };
        assert_eq!(controller.dispatch(release, &mut slot, &mut canvas, &mut viewport), Outcome::Ignored);
        assert_eq!(slot.history().len(), 1);
    }

    #[test]
    fn test_wheel_zooms() {
        let (mut slot, mut canvas, mut viewport) = setup();
        let mut controller = Controller::default();
        let wheel = PointerEvent::Wheel {
            position: Point::new(0.0, 0.0),
            zoom_in: false,
        };
        assert_eq!(controller.dispatch(wheel, &mut slot, &mut canvas, &mut viewport), Outcome::Updated);
        assert!((viewport.zoom - 1.0 / 1.1).abs() < 1e-12);
    }
}
