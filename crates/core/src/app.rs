//! Top-level state for the upload → draw → segment → adjust/reset flow.
//!
//! [`AppState`] owns every piece of mutable state and is driven from a
//! single thread. Async work reports back through the coordinator and the
//! mask decoder, which are drained by [`AppState::poll`].

use crate::geometry::{self, Rectangle};
use crate::image_processing::SourceImage;
use crate::overlay::{self, DecodeEvent, OverlayRenderer, DEFAULT_OPACITY};
use crate::selection::SelectionController;
use crate::segmentation::{RequestState, SegmentationCoordinator, SegmentationResult};
use eframe::egui;
use image::RgbaImage;
use std::time::{Duration, Instant};
use tracing::info;

pub struct AppState {
    image: Option<SourceImage>,
    selection: SelectionController,
    coordinator: SegmentationCoordinator,
    overlay: OverlayRenderer,
    opacity: f32,
    decode_error: Option<String>,
    composite: Option<RgbaImage>,
    /// Bumped on every change to image, rectangle, mask or opacity.
    revision: u64,
    composite_revision: Option<u64>,
}

impl AppState {
    pub fn new(coordinator: SegmentationCoordinator, overlay: OverlayRenderer) -> Self {
        Self {
            image: None,
            selection: SelectionController::new(),
            coordinator,
            overlay,
            opacity: DEFAULT_OPACITY,
            decode_error: None,
            composite: None,
            revision: 0,
            composite_revision: None,
        }
    }

    /// Replaces the image and clears selection, result and error.
    ///
    /// Opacity keeps its current value.
    pub fn load_image(&mut self, image: SourceImage) {
        info!(?image, "image loaded");
        self.image = Some(image);
        self.clear_results();
    }

    /// Clears image, selection, result and error, and restores the default opacity.
    pub fn reset(&mut self) {
        self.image = None;
        self.opacity = DEFAULT_OPACITY;
        self.clear_results();
    }

    fn clear_results(&mut self) {
        self.selection.clear();
        self.coordinator.invalidate();
        self.overlay.set_mask(None);
        self.decode_error = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn image(&self) -> Option<&SourceImage> {
        self.image.as_ref()
    }

    pub fn rectangle(&self) -> Option<Rectangle> {
        self.selection.rectangle()
    }

    pub fn is_dragging(&self) -> bool {
        self.selection.is_dragging()
    }

    pub fn request_state(&self) -> &RequestState {
        self.coordinator.state()
    }

    /// Latest successful result; kept while a retry is pending or after it fails.
    pub fn result(&self) -> Option<&SegmentationResult> {
        self.coordinator.result()
    }

    pub fn is_pending(&self) -> bool {
        self.coordinator.state().is_pending()
    }

    /// Message for the error banner, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.coordinator.state().error().or(self.decode_error.as_deref())
    }

    /// Whether the current mask has been decoded and is being drawn.
    pub fn mask_ready(&self) -> bool {
        self.overlay.is_decoded()
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Natural size of the current image as an egui vector.
    fn natural_size(&self) -> Option<egui::Vec2> {
        self.image.as_ref().map(|img| {
            let (w, h) = img.natural_size();
            egui::vec2(w as f32, h as f32)
        })
    }

    fn map(&self, pointer: egui::Pos2, surface: egui::Rect) -> Option<egui::Pos2> {
        geometry::map_pointer(pointer, surface, self.natural_size()?)
    }

    /// Pointer pressed over the rendered image at `surface`.
    pub fn pointer_down(&mut self, pointer: egui::Pos2, surface: egui::Rect) {
        if let Some(at) = self.map(pointer, surface) {
            self.selection.pointer_down(at);
            self.touch();
        }
    }

    pub fn pointer_move(&mut self, pointer: egui::Pos2, surface: egui::Rect) {
        if !self.selection.is_dragging() {
            return;
        }
        let Some(at) = self.map(pointer, surface) else {
            return;
        };
        if self.selection.pointer_move(at) {
            self.touch();
        }
    }

    pub fn pointer_up(&mut self) {
        self.selection.pointer_up();
    }

    pub fn pointer_leave(&mut self) {
        self.selection.pointer_leave();
    }

    /// Sets the selection directly in image-pixel space.
    pub fn select(&mut self, rectangle: Rectangle) {
        self.selection.commit(rectangle);
        self.touch();
    }

    /// Whether the segment control should be enabled.
    pub fn can_segment(&self) -> bool {
        self.coordinator.can_submit(self.image.as_ref(), self.selection.rectangle())
    }

    /// Submits the current selection. Returns `false` if no request was issued.
    pub fn segment(&mut self) -> bool {
        let issued = self
            .coordinator
            .submit(self.image.as_ref(), self.selection.rectangle());
        if issued {
            self.decode_error = None;
        }
        issued
    }

    /// Adjusts the mask opacity. Ignored unless a result exists.
    pub fn set_opacity(&mut self, value: f32) -> bool {
        if self.result().is_none() {
            return false;
        }
        let value = overlay::clamp_opacity(value);
        if value == self.opacity {
            return false;
        }
        self.opacity = value;
        self.touch();
        true
    }

    /// Drains async completions. Returns `true` if anything visible changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        if self.coordinator.poll() {
            self.sync_mask();
            changed = true;
        }
        if let Some(event) = self.overlay.poll() {
            self.on_decode(event);
            changed = true;
        }
        changed
    }

    /// Blocks until the request and mask decode settle or `timeout` passes.
    pub fn wait_until_settled(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        if self.coordinator.wait(timeout) {
            self.sync_mask();
        }
        if self.overlay.has_mask() && !self.overlay.is_decoded() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Some(event) = self.overlay.wait(remaining) {
                self.on_decode(event);
            }
        }
    }

    fn sync_mask(&mut self) {
        let mask = self.coordinator.result().map(|r| r.mask.clone());
        if self.overlay.set_mask(mask.as_ref()) {
            self.decode_error = None;
            self.touch();
        }
    }

    fn on_decode(&mut self, event: DecodeEvent) {
        if let DecodeEvent::Failed(message) = event {
            self.decode_error = Some(format!("Could not display the returned mask: {message}"));
        }
        self.touch();
    }

    /// Whether the composite needs recomputing.
    pub fn is_dirty(&self) -> bool {
        self.composite_revision != Some(self.revision)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The overlay surface for the current state, recomputed only when an
    /// input changed. `None` without an image.
    pub fn composite(&mut self) -> Option<&RgbaImage> {
        let (width, height) = self.image.as_ref()?.natural_size();
        if self.is_dirty() {
            let rectangle = self.selection.rectangle();
            let surface = self.overlay.render(width, height, self.opacity, rectangle.as_ref());
            self.composite = Some(surface);
            self.composite_revision = Some(self.revision);
        }
        self.composite.as_ref()
    }

    /// Source image with the overlay baked in.
    pub fn flattened(&mut self) -> Option<RgbaImage> {
        let overlay = self.composite()?.clone();
        let image = self.image.as_ref()?;
        Some(overlay::flatten_onto(image.image(), &overlay))
    }
}
