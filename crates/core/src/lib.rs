//! segmask Core Library
//!
//! This library provides the core functionality for segmask, a viewer that
//! sends a user-selected reference region to a zero-shot segmentation
//! service and overlays the returned similarity mask on the image.
//!
//! # Overview
//!
//! The user loads an image, drags a rectangle over a region of interest,
//! submits it, and adjusts the mask opacity. The library handles:
//!
//! - **Coordinate mapping**: display space to image pixels via [`geometry`]
//! - **Selection**: drag lifecycle via [`selection`]
//! - **Service calls**: multipart requests and request state via [`segmentation`]
//! - **Compositing**: mask and outline overlay via [`overlay`]
//! - **State**: the upload → draw → segment → reset flow via [`app`]
//! - **User Interface**: the eframe viewer via [`ui`]
//!
//! # Quick Start
//!
//! ```ignore
//! use segmask_core::Segmask;
//!
//! let app = Segmask::new()?;
//! app.run_interactive(None)?;
//! ```
//!
//! # Module Structure
//!
//! - [`app`]: Top-level application state
//! - [`config`]: Configuration loading and management
//! - [`error`]: Error types and result aliases
//! - [`geometry`]: Coordinate mapping and rectangles
//! - [`image_processing`]: Image loading and data-URI handling
//! - [`overlay`]: Overlay compositing and async mask decoding
//! - [`segmentation`]: Service client and request coordination
//! - [`selection`]: Drag selection state machine
//! - [`ui`]: User interface components

pub mod app;
pub mod config;
pub mod error;
pub mod geometry;
pub mod image_processing;
pub mod overlay;
pub mod segmentation;
pub mod selection;
pub mod ui;

// Re-export primary types for convenience
pub use app::AppState;
pub use config::Config;
pub use error::{AppError, Result};
pub use geometry::{Rectangle, RegionBounds};
pub use image_processing::SourceImage;
pub use segmentation::{HttpSegmentationClient, RequestState, SegmentationCoordinator};

use image::RgbaImage;
use overlay::OverlayRenderer;
use segmentation::SegmentationService;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Options for a one-shot segmentation without the UI.
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    /// Mask opacity used for the exported composite.
    pub opacity: f32,
    /// How long to wait for the service and the mask decode.
    pub timeout: Duration,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            opacity: overlay::DEFAULT_OPACITY,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Main entry point for the segmask application.
///
/// This struct provides a facade over the various subsystems,
/// handling initialization and orchestration.
///
/// # Example
///
/// ```ignore
/// use segmask_core::Segmask;
///
/// let app = Segmask::new()?;
/// app.run_interactive(Some(std::path::Path::new("photo.jpg")))?;
/// ```
pub struct Segmask {
    config: Config,
    client: Arc<HttpSegmentationClient>,
}

impl Segmask {
    /// Creates a new instance with configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured base URL is invalid.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::load()?)
    }

    /// Creates an instance with custom configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        let client = Arc::new(HttpSegmentationClient::new(&config)?);
        Ok(Self { config, client })
    }

    /// Opens the viewer, optionally with an image preloaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the image can't be read or the UI fails to start.
    pub fn run_interactive(&self, image: Option<&Path>) -> Result<()> {
        let initial = image.map(SourceImage::open).transpose()?;
        ui::run_viewer(self.config.clone(), initial)
    }

    /// Segments `region` of the image at `path` and returns the flattened composite.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UploadRead`] for an unreadable image, and
    /// [`AppError::Segmentation`] carrying the user-facing message when the
    /// request fails, times out, or the mask can't be decoded.
    pub fn segment_file(&self, path: &Path, region: Rectangle, options: &HeadlessOptions) -> Result<RgbaImage> {
        let image = SourceImage::open(path)?;
        let coordinator = SegmentationCoordinator::new(self.client.clone());
        let mut state = AppState::new(coordinator, OverlayRenderer::new());

        state.load_image(image);
        state.select(region);
        if !state.segment() {
            return Err(AppError::Segmentation("Segmentation could not be started".to_string()));
        }

        state.wait_until_settled(options.timeout);

        if let Some(message) = state.error_message() {
            return Err(AppError::Segmentation(message.to_string()));
        }
        if state.is_pending() || !state.mask_ready() {
            return Err(AppError::Segmentation("Timed out waiting for the segmentation service".to_string()));
        }

        state.set_opacity(options.opacity);
        state
            .flattened()
            .ok_or_else(|| AppError::ui("No image to compose"))
    }

    /// Checks that the segmentation service answers its health endpoint.
    pub fn check_service(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.client.health())
    }

    /// Returns a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Initializes the library by loading environment variables.
///
/// Call this once at application startup before using any other functions.
pub fn init() {
    let _ = dotenvy::dotenv();
}
