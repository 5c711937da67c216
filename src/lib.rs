//! photowarp - perspective correction and cropping core for batches of images
//!
//! Each loaded image lives in an [`slot::ImageSlot`]: four draggable control
//! points drive a homography warp of the original, a move/resize/rotate
//! transform places the warped layer in the scene, and a fixed-aspect
//! selection frame defines what gets exported. Every completed edit is
//! recorded in a linear undo/redo history.
//!
//! Hosts drive a slot with [`interaction::Controller`] and draw it through the
//! [`interaction::Canvas`] trait; batch code uses [`gallery::Gallery`].

pub mod affine;
pub mod config;
pub mod control_points;
pub mod error;
pub mod export;
pub mod gallery;
pub mod geometry;
pub mod history;
pub mod homography;
pub mod interaction;
pub mod io;
pub mod slot;
pub mod warp;

pub use error::{DegenerateQuadError, EditorError, HistoryError};
pub use export::{Resolution, SelectionFrame};
pub use gallery::Gallery;
pub use homography::Homography;
pub use slot::{ImageSlot, SlotSettings};
