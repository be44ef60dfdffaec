//! Pointer-to-image coordinate mapping and selection rectangles.
//!
//! The image is drawn at whatever size the layout gives it, while the
//! segmentation service works in natural pixel coordinates. Everything in
//! this module is pure: scales are derived from the layout passed in on each
//! call and never cached, so a resize between two events is harmless.

use eframe::egui;

/// Ratio between natural image pixels and rendered surface units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayScale {
    pub x: f32,
    pub y: f32,
}

impl DisplayScale {
    /// Derives the scale from the current surface rectangle.
    ///
    /// Returns `None` when the surface has no area (collapsed layout).
    pub fn from_layout(surface: egui::Rect, natural: egui::Vec2) -> Option<Self> {
        if surface.width() <= 0.0 || surface.height() <= 0.0 {
            return None;
        }
        Some(Self {
            x: natural.x / surface.width(),
            y: natural.y / surface.height(),
        })
    }
}

/// Maps a pointer position on the rendered surface to image-pixel space.
///
/// No clamping is applied: a pointer outside the surface maps outside
/// `[0, natural]`.
pub fn map_pointer(pointer: egui::Pos2, surface: egui::Rect, natural: egui::Vec2) -> Option<egui::Pos2> {
    let scale = DisplayScale::from_layout(surface, natural)?;
    Some(egui::pos2(
        (pointer.x - surface.left()) * scale.x,
        (pointer.y - surface.top()) * scale.y,
    ))
}

/// Axis-aligned selection in image-pixel space.
///
/// `(x, y)` is always the top-left corner and both extents are non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectangle {
    /// Bounding box of two arbitrary corners, whatever the drag direction.
    pub fn from_corners(a: egui::Pos2, b: egui::Pos2) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    /// Builds a rectangle from a position and size, normalizing negative extents.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_corners(egui::pos2(x, y), egui::pos2(x + width, y + height))
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Integer bounds sent to the service: floor of each edge.
    pub fn bounds(&self) -> RegionBounds {
        RegionBounds {
            x_min: self.x.floor() as i64,
            y_min: self.y.floor() as i64,
            x_max: self.right().floor() as i64,
            y_max: self.bottom().floor() as i64,
        }
    }
}

/// Integer region carried in the multipart request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBounds {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}
