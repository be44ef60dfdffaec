//! Mask overlay compositing.
//!
//! The overlay is a transparent RGBA surface with the image's natural
//! dimensions, drawn on top of the source image. It holds the mask
//! (alpha scaled by the opacity slider) and the selection outline, which is
//! always painted last so it stays visible whatever the opacity.

use crate::error::Result;
use crate::geometry::Rectangle;
use crate::segmentation::{MaskPayload, Notifier};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default mask opacity.
pub const DEFAULT_OPACITY: f32 = 0.6;

/// Slider increment for the opacity control.
pub const OPACITY_STEP: f32 = 0.1;

/// How the selection outline is stroked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineStyle {
    pub color: Rgba<u8>,
    /// Line width in image pixels, centred on the rectangle edge.
    pub width: f32,
}

impl Default for OutlineStyle {
    fn default() -> Self {
        Self {
            color: Rgba([0x00, 0xff, 0x00, 0xff]),
            width: 3.0,
        }
    }
}

/// Clamps an opacity value into `[0, 1]`; NaN becomes the default.
pub fn clamp_opacity(value: f32) -> f32 {
    if value.is_nan() {
        DEFAULT_OPACITY
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Stretches a decoded mask to the surface size with bilinear filtering.
pub fn stretch_mask(mask: &DynamicImage, width: u32, height: u32) -> RgbaImage {
    let rgba = mask.to_rgba8();
    if rgba.dimensions() == (width, height) {
        return rgba;
    }
    imageops::resize(&rgba, width, height, FilterType::Triangle)
}

/// Builds the overlay surface.
///
/// `mask` must already match `(width, height)`; see [`stretch_mask`]. The
/// mask's own alpha is multiplied by `opacity`. The outline is stroked on
/// top at full opacity.
pub fn compose_overlay(
    width: u32,
    height: u32,
    mask: Option<&RgbaImage>,
    opacity: f32,
    rectangle: Option<&Rectangle>,
    style: &OutlineStyle,
) -> RgbaImage {
    let mut surface = RgbaImage::new(width, height);

    if let Some(mask) = mask {
        let opacity = clamp_opacity(opacity);
        for (dst, src) in surface.pixels_mut().zip(mask.pixels()) {
            let alpha = (src[3] as f32 * opacity).round() as u8;
            *dst = Rgba([src[0], src[1], src[2], alpha]);
        }
    }

    if let Some(rect) = rectangle {
        stroke_rectangle(&mut surface, rect, style);
    }

    surface
}

/// Strokes the outline of `rect`, centred on its edges.
pub fn stroke_rectangle(surface: &mut RgbaImage, rect: &Rectangle, style: &OutlineStyle) {
    let half = style.width / 2.0;
    let (outer_x0, outer_y0) = (rect.x - half, rect.y - half);
    let (outer_x1, outer_y1) = (rect.right() + half, rect.bottom() + half);
    let (inner_x0, inner_y0) = (rect.x + half, rect.y + half);
    let (inner_x1, inner_y1) = (rect.right() - half, rect.bottom() - half);

    let (w, h) = surface.dimensions();
    let px0 = outer_x0.floor().max(0.0) as u32;
    let py0 = outer_y0.floor().max(0.0) as u32;
    let px1 = (outer_x1.ceil().max(0.0) as u32).min(w);
    let py1 = (outer_y1.ceil().max(0.0) as u32).min(h);

    for py in py0..py1 {
        let cy = py as f32 + 0.5;
        if cy < outer_y0 || cy > outer_y1 {
            continue;
        }
        for px in px0..px1 {
            let cx = px as f32 + 0.5;
            if cx < outer_x0 || cx > outer_x1 {
                continue;
            }
            let inside_inner = cx > inner_x0 && cx < inner_x1 && cy > inner_y0 && cy < inner_y1;
            if !inside_inner {
                surface.put_pixel(px, py, style.color);
            }
        }
    }
}

/// Alpha-composites the overlay onto the source image, for export.
///
/// Uses the "over" operator in floating point, so an opaque source stays
/// exactly opaque.
pub fn flatten_onto(source: &DynamicImage, overlay: &RgbaImage) -> RgbaImage {
    let mut base = source.to_rgba8();
    for (dst, top) in base.pixels_mut().zip(overlay.pixels()) {
        let a = top[3] as f32 / 255.0;
        if a == 0.0 {
            continue;
        }
        let under = dst[3] as f32 / 255.0 * (1.0 - a);
        let out = a + under;
        for c in 0..3 {
            let blended = (top[c] as f32 * a + dst[c] as f32 * under) / out;
            dst[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    base
}

/// A finished decode, tagged with the request it answers.
struct DecodeCompletion {
    generation: u64,
    outcome: Result<DynamicImage>,
}

/// Decodes mask payloads on a worker thread.
///
/// Only the most recently requested payload is ever delivered: completions
/// for older requests are dropped when polled.
pub struct MaskDecoder {
    latest: u64,
    tx: Sender<DecodeCompletion>,
    rx: Receiver<DecodeCompletion>,
    notifier: Option<Notifier>,
}

impl MaskDecoder {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            latest: 0,
            tx,
            rx,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Starts decoding `payload`, superseding any earlier request.
    pub fn request(&mut self, payload: MaskPayload) -> u64 {
        self.latest += 1;
        let generation = self.latest;
        let tx = self.tx.clone();
        let notifier = self.notifier.clone();

        thread::spawn(move || {
            let outcome = payload.decode();
            let _ = tx.send(DecodeCompletion { generation, outcome });
            if let Some(notify) = notifier {
                notify();
            }
        });

        generation
    }

    /// Forgets any outstanding request so its result will be dropped.
    pub fn cancel(&mut self) {
        self.latest += 1;
    }

    /// Returns the latest request's result if it has landed.
    pub fn poll(&mut self) -> Option<Result<DynamicImage>> {
        let mut found = None;
        while let Ok(completion) = self.rx.try_recv() {
            if let Some(outcome) = self.accept(completion) {
                found = Some(outcome);
            }
        }
        found
    }

    /// Like [`poll`](Self::poll) but waits up to `timeout` for the latest result.
    pub fn wait(&mut self, timeout: Duration) -> Option<Result<DynamicImage>> {
        if let Some(found) = self.poll() {
            return Some(found);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(completion) => {
                    if let Some(outcome) = self.accept(completion) {
                        return Some(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn accept(&self, completion: DecodeCompletion) -> Option<Result<DynamicImage>> {
        if completion.generation == self.latest {
            Some(completion.outcome)
        } else {
            debug!(stale = completion.generation, latest = self.latest, "dropping superseded mask decode");
            None
        }
    }
}

impl Default for MaskDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// What a poll of the renderer produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// The current mask is decoded and ready to draw.
    Ready,
    /// The current mask could not be decoded.
    Failed(String),
}

/// Keeps the decoded mask for the current payload and renders the overlay.
///
/// Opacity and rectangle changes reuse the cached, already stretched mask;
/// only a new payload triggers a decode.
pub struct OverlayRenderer {
    decoder: MaskDecoder,
    style: OutlineStyle,
    mask: Option<MaskPayload>,
    decoded: Option<DynamicImage>,
    decode_failed: bool,
    stretched: Option<RgbaImage>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::with_decoder(MaskDecoder::new())
    }

    pub fn with_decoder(decoder: MaskDecoder) -> Self {
        Self {
            decoder,
            style: OutlineStyle::default(),
            mask: None,
            decoded: None,
            decode_failed: false,
            stretched: None,
        }
    }

    /// Sets the current mask. Returns `true` if it differs from the previous one.
    pub fn set_mask(&mut self, mask: Option<&MaskPayload>) -> bool {
        if self.mask.as_ref() == mask {
            return false;
        }
        self.decoded = None;
        self.decode_failed = false;
        self.stretched = None;
        match mask {
            Some(payload) => {
                self.decoder.request(payload.clone());
            }
            None => self.decoder.cancel(),
        }
        self.mask = mask.cloned();
        true
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.is_some()
    }

    pub fn poll(&mut self) -> Option<DecodeEvent> {
        let outcome = self.decoder.poll()?;
        Some(self.store(outcome))
    }

    pub fn wait(&mut self, timeout: Duration) -> Option<DecodeEvent> {
        let outcome = self.decoder.wait(timeout)?;
        Some(self.store(outcome))
    }

    fn store(&mut self, outcome: Result<DynamicImage>) -> DecodeEvent {
        match outcome {
            Ok(image) => {
                self.decoded = Some(image);
                self.stretched = None;
                DecodeEvent::Ready
            }
            Err(e) => {
                warn!(error = %e, "mask decode failed");
                self.decode_failed = true;
                DecodeEvent::Failed(e.to_string())
            }
        }
    }

    /// Renders the overlay for a `width` x `height` image.
    ///
    /// While the current mask is still decoding the surface is left blank.
    /// A mask that failed to decode is skipped and only the outline is drawn.
    pub fn render(&mut self, width: u32, height: u32, opacity: f32, rectangle: Option<&Rectangle>) -> RgbaImage {
        if self.mask.is_none() || self.decode_failed {
            return compose_overlay(width, height, None, opacity, rectangle, &self.style);
        }

        let Some(decoded) = &self.decoded else {
            return RgbaImage::new(width, height);
        };

        let stale = self
            .stretched
            .as_ref()
            .is_none_or(|s| s.dimensions() != (width, height));
        if stale {
            self.stretched = Some(stretch_mask(decoded, width, height));
        }

        compose_overlay(width, height, self.stretched.as_ref(), opacity, rectangle, &self.style)
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}
