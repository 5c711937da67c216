//! Linear undo/redo history of full edit-state snapshots
//!
//! Recording after an undo drops every entry past the current one; there is no
//! branch preservation.

use tracing::debug;

use crate::affine::AffineState;
use crate::control_points::ControlPointSet;
use crate::error::HistoryError;
use crate::geometry::{ImageSpace, Point};
use crate::warp::Layer;

/// Everything needed to put an image back exactly as it was
///
/// The layer's pixel buffer is shared behind an `Arc` and never mutated after it
/// is published, so holding it here cannot alias a buffer that changes later.
#[derive(Debug, Clone, PartialEq)]
pub struct EditState {
    pub layer: Layer,
    pub affine: AffineState,
    pub quad: [Point<ImageSpace>; 4],
    pub control_points: ControlPointSet,
}

#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<EditState>,
    current: Option<usize>,
    max_entries: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(0)
    }
}

impl History {
    /// `max_entries == 0` means unbounded
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            current: None,
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&EditState> {
        self.current.and_then(|i| self.entries.get(i))
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.current, Some(i) if i > 0)
    }

    pub fn can_redo(&self) -> bool {
        match self.current {
            Some(i) => i + 1 < self.entries.len(),
            None => false,
        }
    }

    /// Truncate after the current entry, append `state`, make it current
    pub fn record(&mut self, state: EditState) {
        let keep = self.current.map_or(0, |i| i + 1);
        self.entries.truncate(keep);
        self.entries.push(state);

        if self.max_entries > 0 && self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }

        self.current = Some(self.entries.len() - 1);
        debug!("History: recorded state {} of {}", self.entries.len() - 1, self.entries.len());
    }

    /// Step back and return the state to restore
    pub fn undo(&mut self) -> Result<&EditState, HistoryError> {
        match self.current {
            Some(i) if i > 0 => {
                self.current = Some(i - 1);
                Ok(&self.entries[i - 1])
            }
            _ => Err(HistoryError::NothingToUndo),
        }
    }

    /// Step forward and return the state to restore
    pub fn redo(&mut self) -> Result<&EditState, HistoryError> {
        match self.current {
            Some(i) if i + 1 < self.entries.len() => {
                self.current = Some(i + 1);
                Ok(&self.entries[i + 1])
            }
            _ => Err(HistoryError::NothingToRedo),
        }
    }
}
