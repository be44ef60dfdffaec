//! UI-side state types and event definitions.
//!
//! Everything here lives on the UI thread; worker threads only ever send
//! [`LoadEvent`]s through a channel.

use crate::image_processing::SourceImage;
use eframe::egui;
use std::path::PathBuf;

/// Result of reading an image picked or dropped by the user.
pub(crate) enum LoadEvent {
    /// The file decoded into a displayable image.
    Loaded {
        /// Upload generation the read was started under.
        generation: u64,
        image: SourceImage,
    },
    /// The file could not be read or decoded.
    Failed {
        generation: u64,
        path: PathBuf,
        message: String,
    },
}

impl LoadEvent {
    pub(crate) fn generation(&self) -> u64 {
        match self {
            Self::Loaded { generation, .. } | Self::Failed { generation, .. } => *generation,
        }
    }
}

/// Textures uploaded to the GPU and the state revision they reflect.
#[derive(Default)]
pub(crate) struct Textures {
    /// The source image, re-uploaded only when a new image is loaded.
    pub image: Option<egui::TextureHandle>,
    /// Serial of the image currently in `image`.
    pub image_serial: Option<u64>,
    /// The mask/outline overlay surface.
    pub overlay: Option<egui::TextureHandle>,
    /// [`crate::app::AppState::revision`] the overlay texture was built from.
    pub overlay_revision: Option<u64>,
}

impl Textures {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

