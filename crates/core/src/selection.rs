//! Drag lifecycle for the reference-region selection.
//!
//! The controller only sees points that are already in image-pixel space;
//! mapping from the display happens in [`crate::geometry`].

use crate::geometry::Rectangle;
use eframe::egui;

/// Whether a drag is in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        /// Image-space point where the pointer went down.
        start: egui::Pos2,
    },
}

/// Tracks pointer down/move/up and publishes a normalized [`Rectangle`].
///
/// `Idle -> Dragging -> Idle`. The last rectangle published during a drag
/// stays committed after the drag ends; there is no minimum size.
#[derive(Debug, Clone)]
pub struct SelectionController {
    state: DragState,
    rectangle: Option<Rectangle>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
            rectangle: None,
        }
    }

    /// Starts a new drag, discarding any previous selection.
    pub fn pointer_down(&mut self, at: egui::Pos2) {
        self.state = DragState::Dragging { start: at };
        self.rectangle = None;
    }

    /// Updates the rectangle while dragging. Returns `true` if it changed.
    pub fn pointer_move(&mut self, at: egui::Pos2) -> bool {
        let DragState::Dragging { start } = self.state else {
            return false;
        };
        let next = Rectangle::from_corners(start, at);
        if self.rectangle == Some(next) {
            return false;
        }
        self.rectangle = Some(next);
        true
    }

    /// Ends the drag and keeps the last published rectangle.
    pub fn pointer_up(&mut self) {
        self.state = DragState::Idle;
    }

    /// The pointer left the surface mid-drag; treated like a release.
    pub fn pointer_leave(&mut self) {
        self.pointer_up();
    }

    /// Sets a committed selection directly, bypassing the drag lifecycle.
    pub fn commit(&mut self, rectangle: Rectangle) {
        self.state = DragState::Idle;
        self.rectangle = Some(rectangle);
    }

    pub fn clear(&mut self) {
        self.state = DragState::Idle;
        self.rectangle = None;
    }

    pub fn rectangle(&self) -> Option<Rectangle> {
        self.rectangle
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new()
    }
}
