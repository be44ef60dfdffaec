//! Pointer input handling for the image surface.
//!
//! Translates egui's per-frame pointer state into the down/move/up/leave
//! events the selection expects, and forwards them to [`AppState`] along
//! with the surface rectangle of this frame.

use crate::app::AppState;
use eframe::egui;

/// A pointer event over the image surface, in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Primary button pressed over the surface.
    Down(egui::Pos2),
    /// Pointer moved while a drag is active.
    Move(egui::Pos2),
    /// Primary button released.
    Up,
    /// Pointer left the surface mid-drag.
    Leave,
}

/// Snapshot of the pointer for one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerFrame {
    pub pressed: bool,
    pub released: bool,
    /// Primary button is held at the end of the frame.
    pub primary_down: bool,
    pub press_origin: Option<egui::Pos2>,
    pub hover: Option<egui::Pos2>,
}

impl PointerFrame {
    pub fn capture(ctx: &egui::Context) -> Self {
        ctx.input(|i| Self {
            pressed: i.pointer.primary_pressed(),
            released: i.pointer.primary_released(),
            primary_down: i.pointer.primary_down(),
            press_origin: i.pointer.press_origin(),
            hover: i.pointer.hover_pos(),
        })
    }
}

/// Turns one frame of pointer state into selection events.
///
/// # Arguments
/// * `frame` - Pointer state for this frame
/// * `surface` - Where the image is drawn this frame
/// * `over_surface` - Whether the surface widget has the pointer
/// * `dragging` - Whether a selection drag is in progress
pub fn pointer_events(
    frame: PointerFrame,
    surface: egui::Rect,
    over_surface: bool,
    dragging: bool,
) -> Vec<PointerEvent> {
    let mut events = Vec::new();

    if frame.pressed && over_surface {
        if let Some(origin) = frame.press_origin.or(frame.hover) {
            if surface.contains(origin) {
                events.push(PointerEvent::Down(origin));
                if let Some(hover) = frame.hover.filter(|h| *h != origin) {
                    events.push(PointerEvent::Move(hover));
                }
                // press and release within one frame
                if frame.released || !frame.primary_down {
                    events.push(PointerEvent::Up);
                }
                return events;
            }
        }
    }

    if !dragging {
        return events;
    }

    match frame.hover {
        Some(pos) if surface.contains(pos) => {
            events.push(PointerEvent::Move(pos));
            // a release can be missed while the window lacks focus
            if frame.released || !frame.primary_down {
                events.push(PointerEvent::Up);
            }
        }
        _ => events.push(PointerEvent::Leave),
    }

    events
}

/// Applies events to the application state.
pub fn apply_pointer_events(state: &mut AppState, events: &[PointerEvent], surface: egui::Rect) {
    for event in events {
        match *event {
            PointerEvent::Down(pos) => state.pointer_down(pos, surface),
            PointerEvent::Move(pos) => state.pointer_move(pos, surface),
            PointerEvent::Up => state.pointer_up(),
            PointerEvent::Leave => state.pointer_leave(),
        }
    }
}
