//! Error types for the editing core

use std::path::PathBuf;
use thiserror::Error;

/// The four control points do not describe a usable quadrilateral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("control points are collinear or coincident, no homography exists")]
pub struct DegenerateQuadError;

/// Undo/redo requested with nothing to move to
///
/// This is a status condition for the user, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Nothing to redo")]
    NothingToRedo,
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    DegenerateQuad(#[from] DegenerateQuadError),

    #[error("failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("slot {0} holds no image")]
    EmptySlot(usize),
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
