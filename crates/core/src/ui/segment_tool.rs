//! Main segmentation viewer application.
//!
//! This module contains the `SegmentTool` struct which implements the
//! `eframe::App` trait: the image with its overlay in the central panel and
//! the controls in a side panel.

use super::rendering::{draw_border, draw_texture, fit_image_rect, opacity_label, to_color_image, upload_texture};
use super::selection::{apply_pointer_events, pointer_events, PointerFrame};
use super::state::{LoadEvent, Textures};
use crate::app::AppState;
use crate::image_processing::SourceImage;
use crate::overlay::OPACITY_STEP;
use eframe::egui;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use tracing::{info, warn};

/// Image extensions offered by the file picker.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// The interactive segmentation viewer.
pub struct SegmentTool {
    state: AppState,
    textures: Textures,

    // Upload state
    load_tx: Sender<LoadEvent>,
    load_rx: Receiver<LoadEvent>,
    /// Bumped on each new upload and on reset; stale reads are dropped.
    upload_generation: u64,
    /// Serial of the image in `state`, for texture invalidation.
    image_serial: u64,
    upload_in_progress: bool,
    upload_error: Option<String>,
}

impl SegmentTool {
    /// Creates the viewer around an already wired [`AppState`].
    ///
    /// # Arguments
    /// * `state` - Application state with its coordinator and renderer
    /// * `initial` - Image to show on startup, if any
    pub fn new(state: AppState, initial: Option<SourceImage>) -> Self {
        let (load_tx, load_rx) = channel();
        let mut tool = Self {
            state,
            textures: Textures::default(),
            load_tx,
            load_rx,
            upload_generation: 0,
            image_serial: 0,
            upload_in_progress: false,
            upload_error: None,
        };
        if let Some(image) = initial {
            tool.install_image(image);
        }
        tool
    }

    fn install_image(&mut self, image: SourceImage) {
        self.state.load_image(image);
        self.image_serial += 1;
        self.upload_error = None;
    }

    /// Opens the file picker on a worker thread and reads the chosen file there.
    fn pick_image(&mut self, ctx: &egui::Context) {
        self.upload_generation += 1;
        self.upload_in_progress = true;
        let generation = self.upload_generation;
        let tx = self.load_tx.clone();
        let ctx = ctx.clone();

        thread::spawn(move || {
            let picked = rfd::FileDialog::new()
                .add_filter("Images", IMAGE_EXTENSIONS)
                .add_filter("All files", &["*"])
                .pick_file();
            match picked {
                Some(path) => {
                    let _ = tx.send(read_image(generation, path));
                }
                None => {
                    let _ = tx.send(LoadEvent::Failed {
                        generation,
                        path: PathBuf::new(),
                        message: String::new(),
                    });
                }
            }
            ctx.request_repaint();
        });
    }

    /// Reads a file dropped onto the window.
    fn load_dropped(&mut self, ctx: &egui::Context, path: PathBuf) {
        self.upload_generation += 1;
        self.upload_in_progress = true;
        let generation = self.upload_generation;
        let tx = self.load_tx.clone();
        let ctx = ctx.clone();

        thread::spawn(move || {
            let _ = tx.send(read_image(generation, path));
            ctx.request_repaint();
        });
    }

    /// Applies finished uploads; reads superseded by a newer upload or a reset are dropped.
    fn process_load_events(&mut self) {
        while let Ok(event) = self.load_rx.try_recv() {
            if event.generation() != self.upload_generation {
                continue;
            }
            self.upload_in_progress = false;
            match event {
                LoadEvent::Loaded { image, .. } => self.install_image(image),
                LoadEvent::Failed { path, message, .. } => {
                    // An empty path means the picker was cancelled.
                    if !path.as_os_str().is_empty() {
                        warn!(path = %path.display(), %message, "image upload failed");
                        self.upload_error = Some(message);
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        info!("reset");
        self.state.reset();
        self.textures.clear();
        self.upload_generation += 1;
        self.upload_in_progress = false;
        self.upload_error = None;
    }

    /// Re-uploads textures whose source changed since the last frame.
    fn sync_textures(&mut self, ctx: &egui::Context) {
        if self.textures.image_serial != Some(self.image_serial) {
            if let Some(image) = self.state.image() {
                let color = to_color_image(&image.image().to_rgba8());
                upload_texture(ctx, &mut self.textures.image, "source_image", color);
                self.textures.image_serial = Some(self.image_serial);
            }
        }

        if self.textures.overlay_revision != Some(self.state.revision()) {
            let revision = self.state.revision();
            if let Some(surface) = self.state.composite() {
                let color = to_color_image(surface);
                upload_texture(ctx, &mut self.textures.overlay, "overlay", color);
                self.textures.overlay_revision = Some(revision);
            }
        }
    }

    /// Renders the controls side panel.
    fn render_controls(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("Controls");
        ui.add_space(8.0);

        if self.state.image().is_some() {
            ui.label(egui::RichText::new("1. Select a reference region").strong());
            ui.label("Drag on the image to draw a rectangle.");

            if let Some(rect) = self.state.rectangle() {
                let b = rect.bounds();
                ui.label(
                    egui::RichText::new(format!("({}, {}) – ({}, {})", b.x_min, b.y_min, b.x_max, b.y_max))
                        .monospace()
                        .small(),
                );
            }
            ui.add_space(8.0);

            let button_text = if self.state.is_pending() { "Processing..." } else { "2. Run segmentation" };
            ui.horizontal(|ui| {
                let button = egui::Button::new(button_text).min_size(egui::vec2(ui.available_width(), 28.0));
                if ui.add_enabled(self.state.can_segment(), button).clicked() {
                    self.state.segment();
                }
            });
            if self.state.is_pending() {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Waiting for the segmentation service...");
                });
            }

            if self.state.result().is_some() {
                ui.add_space(8.0);
                let mut opacity = self.state.opacity();
                ui.label(opacity_label(opacity));
                let slider = egui::Slider::new(&mut opacity, 0.0..=1.0)
                    .step_by(OPACITY_STEP as f64)
                    .show_value(false);
                if ui.add(slider).changed() {
                    self.state.set_opacity(opacity);
                }
            }

            ui.add_space(12.0);
            if ui.button("Reset").clicked() {
                self.reset();
            }
        } else if ui.button("Open image...").clicked() {
            self.pick_image(ctx);
        }

        if self.upload_in_progress {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Reading image...");
            });
        }

        let error = self.upload_error.as_deref().or(self.state.error_message());
        if let Some(error) = error {
            ui.add_space(8.0);
            ui.label(egui::RichText::new(error).color(egui::Color32::from_rgb(220, 60, 60)));
        }
    }

    /// Renders the image, its overlay, and handles pointer input.
    fn render_canvas(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let available = ui.available_rect_before_wrap();

        let Some(image) = self.state.image() else {
            self.render_placeholder(ui, ctx, available);
            return;
        };

        let (w, h) = image.natural_size();
        let surface = fit_image_rect(available, egui::vec2(w as f32, h as f32));
        let response = ui.allocate_rect(surface, egui::Sense::drag());

        let events = pointer_events(
            PointerFrame::capture(ctx),
            surface,
            response.contains_pointer(),
            self.state.is_dragging(),
        );
        apply_pointer_events(&mut self.state, &events, surface);

        if response.hovered() || self.state.is_dragging() {
            ctx.set_cursor_icon(egui::CursorIcon::Crosshair);
        }

        self.sync_textures(ctx);

        let painter = ui.painter_at(surface);
        if let Some(texture) = &self.textures.image {
            draw_texture(&painter, texture, surface);
        }
        if let Some(texture) = &self.textures.overlay {
            draw_texture(&painter, texture, surface);
        }
    }

    fn render_placeholder(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, available: egui::Rect) {
        let zone = available.shrink(24.0);
        draw_border(ui.painter(), zone, 2.0, egui::Color32::GRAY);

        let response = ui.allocate_rect(zone, egui::Sense::click());
        ui.painter().text(
            zone.center(),
            egui::Align2::CENTER_CENTER,
            "Click or drop an image here",
            egui::FontId::proportional(18.0),
            egui::Color32::LIGHT_GRAY,
        );
        if response.clicked() && !self.upload_in_progress {
            self.pick_image(ctx);
        }
    }
}

/// Reads and decodes `path`, packaging the outcome for the UI thread.
fn read_image(generation: u64, path: PathBuf) -> LoadEvent {
    match SourceImage::open(&path) {
        Ok(image) => LoadEvent::Loaded { generation, image },
        Err(e) => LoadEvent::Failed {
            generation,
            path,
            message: e.to_string(),
        },
    }
}

impl eframe::App for SegmentTool {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_load_events();
        self.state.poll();

        let dropped = ctx.input(|i| i.raw.dropped_files.iter().find_map(|f| f.path.clone()));
        if let Some(path) = dropped {
            self.load_dropped(ctx, path);
        }

        egui::SidePanel::right("controls")
            .resizable(false)
            .exact_width(280.0)
            .show(ctx, |ui| {
                self.render_controls(ui, ctx);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_canvas(ui, ctx);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    #[test]
    fn picker_only_offers_decodable_formats() {
        for ext in IMAGE_EXTENSIONS {
            let format = ImageFormat::from_extension(ext).unwrap();
            assert!(format.reading_enabled(), "{ext} is offered but cannot be read");
        }
    }
}
