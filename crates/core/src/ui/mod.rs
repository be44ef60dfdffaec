//! User interface components for segmask.
//!
//! This module provides the desktop viewer: load an image, drag a
//! reference region, run segmentation, and tune the mask overlay.
//!
//! # Architecture
//!
//! The UI is split into focused submodules:
//! - [`state`]: Upload events and texture bookkeeping
//! - [`rendering`]: Layout and drawing utilities
//! - [`selection`]: Pointer input translation
//! - [`segment_tool`]: Main application logic
//!
//! # Usage
//!
//! ```ignore
//! use segmask_core::{ui, Config};
//!
//! let config = Config::load()?;
//! ui::run_viewer(config, None)?;
//! ```

mod rendering;
mod selection;
mod segment_tool;
mod state;

// Public API exports
pub use rendering::{fit_image_rect, opacity_label};
pub use segment_tool::SegmentTool;
pub use selection::{pointer_events, PointerEvent, PointerFrame};

use crate::app::AppState;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::image_processing::SourceImage;
use crate::overlay::{MaskDecoder, OverlayRenderer};
use crate::segmentation::{HttpSegmentationClient, Notifier, SegmentationCoordinator};
use eframe::egui;
use std::sync::Arc;

/// Launches the viewer window and blocks until it is closed.
///
/// # Arguments
/// * `config` - Application configuration with the service URL
/// * `initial` - Image to open on startup, if any
///
/// # Errors
/// Returns an error if the service client can't be built from `config` or
/// the window fails to start.
pub fn run_viewer(config: Config, initial: Option<SourceImage>) -> Result<()> {
    let client = Arc::new(HttpSegmentationClient::new(&config)?);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 480.0])
            .with_title("segmask"),
        ..Default::default()
    };

    eframe::run_native(
        "segmask",
        options,
        Box::new(move |cc| {
            let ctx = cc.egui_ctx.clone();
            let repaint: Notifier = Arc::new(move || ctx.request_repaint());

            let coordinator = SegmentationCoordinator::new(client).with_notifier(repaint.clone());
            let overlay = OverlayRenderer::with_decoder(MaskDecoder::new().with_notifier(repaint));
            let state = AppState::new(coordinator, overlay);

            Ok(Box::new(SegmentTool::new(state, initial)) as Box<dyn eframe::App>)
        }),
    )
    .map_err(|e| AppError::ui(format!("Failed to run UI: {}", e)))
}
