//! Segmentation service client and request coordination.
//!
//! [`HttpSegmentationClient`] speaks the service's multipart protocol.
//! [`SegmentationCoordinator`] owns the request lifecycle on the UI side:
//! it runs one request at a time on a background thread and exposes the
//! outcome as a [`RequestState`].
//!
//! # Ordering
//!
//! Each submission is tagged with a generation number. Resetting or loading
//! a new image bumps the generation, so a completion that arrives for an
//! abandoned request is dropped instead of overwriting newer state.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::geometry::{Rectangle, RegionBounds};
use crate::image_processing::{ImageProcessor, SourceImage};
use futures::future::BoxFuture;
use image::DynamicImage;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Path of the segmentation endpoint relative to the base URL.
pub const SEGMENT_PATH: &str = "api/upload_and_segment";

/// Path of the liveness endpoint relative to the base URL.
pub const HEALTH_PATH: &str = "healthz";

/// Callback fired from a worker thread when a completion is ready.
///
/// The UI uses it to request a repaint.
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

/// Everything the service needs for one segmentation call.
#[derive(Debug, Clone)]
pub struct SegmentationRequest {
    pub image: SourceImage,
    pub bounds: RegionBounds,
}

/// The mask as returned by the service: an encoded image, usually a data URI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct MaskPayload(String);

impl MaskPayload {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the payload into an image. Blocking; see [`crate::overlay::MaskDecoder`].
    pub fn decode(&self) -> Result<DynamicImage> {
        ImageProcessor::decode_data_uri(&self.0)
    }
}

/// Region echoed back by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReferenceRegion {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

/// Diagnostic details about the feature grid the service used.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SegmentationMetadata {
    pub patch_size: Option<u32>,
    pub num_patches_h: Option<u32>,
    pub num_patches_w: Option<u32>,
    pub original_size: Option<[u32; 2]>,
    pub reference_region: Option<ReferenceRegion>,
}

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SegmentationResponse {
    pub mask_image: MaskPayload,
    #[serde(default)]
    pub metadata: Option<SegmentationMetadata>,
}

impl SegmentationResponse {
    /// Parses a response body, mapping any shape problem to [`AppError::ResponseParse`].
    pub fn from_body(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| AppError::parse(e.to_string()))
    }
}

/// A mask together with the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationResult {
    pub mask: MaskPayload,
    pub bounds: RegionBounds,
    pub metadata: Option<SegmentationMetadata>,
}

/// Where the current segmentation attempt stands.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Pending,
    Succeeded(SegmentationResult),
    Failed(String),
}

impl RequestState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn result(&self) -> Option<&SegmentationResult> {
        match self {
            Self::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Anything that can turn an image and a region into a mask.
pub trait SegmentationService: Send + Sync + 'static {
    fn segment(&self, request: SegmentationRequest) -> BoxFuture<'static, Result<SegmentationResponse>>;

    fn health(&self) -> BoxFuture<'static, Result<()>>;
}

/// HTTP implementation of [`SegmentationService`].
///
/// No timeout is configured: a request runs until the service answers or
/// the connection fails.
#[derive(Clone)]
pub struct HttpSegmentationClient {
    client: reqwest::Client,
    segment_url: Url,
    health_url: Url,
}

impl HttpSegmentationClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            segment_url: config.endpoint(SEGMENT_PATH)?,
            health_url: config.endpoint(HEALTH_PATH)?,
        })
    }

    /// Builds the multipart body: the original file plus four integer bounds.
    fn build_form(request: &SegmentationRequest) -> Result<Form> {
        let file = Part::bytes(request.image.bytes().to_vec())
            .file_name(request.image.file_name().to_string())
            .mime_str(request.image.mime_type())?;

        let b = request.bounds;
        Ok(Form::new()
            .part("file", file)
            .text("x_min", b.x_min.to_string())
            .text("y_min", b.y_min.to_string())
            .text("x_max", b.x_max.to_string())
            .text("y_max", b.y_max.to_string()))
    }

    pub async fn upload_and_segment(&self, request: SegmentationRequest) -> Result<SegmentationResponse> {
        let form = Self::build_form(&request)?;

        let response = self
            .client
            .post(self.segment_url.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        SegmentationResponse::from_body(&body)
    }

    pub async fn check_health(&self) -> Result<()> {
        let response = self.client.get(self.health_url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl SegmentationService for HttpSegmentationClient {
    fn segment(&self, request: SegmentationRequest) -> BoxFuture<'static, Result<SegmentationResponse>> {
        let client = self.clone();
        Box::pin(async move { client.upload_and_segment(request).await })
    }

    fn health(&self) -> BoxFuture<'static, Result<()>> {
        let client = self.clone();
        Box::pin(async move { client.check_health().await })
    }
}

/// Message from a request worker back to the coordinator.
struct Completion {
    generation: u64,
    bounds: RegionBounds,
    outcome: Result<SegmentationResponse>,
}

/// Runs segmentation requests off the UI thread and tracks their state.
///
/// At most one request is in flight per generation. There is no
/// cancellation: an abandoned request runs to completion and its result is
/// discarded.
///
/// The last successful result outlives later `Pending` and `Failed` states
/// so the mask stays on screen while the user retries; only
/// [`invalidate`](Self::invalidate) drops it.
pub struct SegmentationCoordinator {
    service: Arc<dyn SegmentationService>,
    state: RequestState,
    last_result: Option<SegmentationResult>,
    generation: u64,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    notifier: Option<Notifier>,
}

impl SegmentationCoordinator {
    pub fn new(service: Arc<dyn SegmentationService>) -> Self {
        let (tx, rx) = channel();
        Self {
            service,
            state: RequestState::Idle,
            last_result: None,
            generation: 0,
            tx,
            rx,
            notifier: None,
        }
    }

    /// Registers a callback fired whenever a completion is queued.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Most recent successful result for the current image, if any.
    pub fn result(&self) -> Option<&SegmentationResult> {
        self.last_result.as_ref()
    }

    /// Whether [`submit`](Self::submit) would issue a request.
    pub fn can_submit(&self, image: Option<&SourceImage>, rectangle: Option<Rectangle>) -> bool {
        image.is_some() && rectangle.is_some() && !self.state.is_pending()
    }

    /// Issues a request for `rectangle` on `image`.
    ///
    /// Returns `false` without doing anything when the image or rectangle is
    /// missing, or a request is already pending.
    pub fn submit(&mut self, image: Option<&SourceImage>, rectangle: Option<Rectangle>) -> bool {
        let (Some(image), Some(rectangle)) = (image, rectangle) else {
            return false;
        };
        if self.state.is_pending() {
            return false;
        }

        self.generation += 1;
        self.state = RequestState::Pending;

        let request = SegmentationRequest {
            image: image.clone(),
            bounds: rectangle.bounds(),
        };
        info!(
            generation = self.generation,
            file = request.image.file_name(),
            bounds = ?request.bounds,
            "submitting segmentation request"
        );

        self.spawn_request(request);
        true
    }

    /// Abandons any in-flight request, drops the result and returns to `Idle`.
    pub fn invalidate(&mut self) {
        if self.state.is_pending() {
            debug!(generation = self.generation, "abandoning in-flight segmentation request");
        }
        self.generation += 1;
        self.state = RequestState::Idle;
        self.last_result = None;
    }

    /// Applies any finished requests. Returns `true` if the state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(completion) = self.rx.try_recv() {
            changed |= self.apply(completion);
        }
        changed
    }

    /// Blocks until the pending request settles or `timeout` elapses.
    ///
    /// Returns `true` if the state changed.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut changed = self.poll();
        while self.state.is_pending() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(completion) => changed |= self.apply(completion),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        changed
    }

    fn apply(&mut self, completion: Completion) -> bool {
        if completion.generation != self.generation {
            debug!(
                stale = completion.generation,
                current = self.generation,
                "discarding superseded segmentation result"
            );
            return false;
        }

        self.state = match completion.outcome {
            Ok(response) => {
                info!(generation = completion.generation, "segmentation succeeded");
                if let Some(meta) = &response.metadata {
                    debug!(?meta, "segmentation metadata");
                }
                let result = SegmentationResult {
                    mask: response.mask_image,
                    bounds: completion.bounds,
                    metadata: response.metadata,
                };
                self.last_result = Some(result.clone());
                RequestState::Succeeded(result)
            }
            Err(e) => {
                if let AppError::HttpStatus { status, body } = &e {
                    warn!(status, body = %body, "segmentation service rejected request");
                } else {
                    warn!(error = %e, "segmentation request failed");
                }
                RequestState::Failed(e.user_message())
            }
        };
        true
    }

    /// Spawns a background thread for the async call, reporting back through the channel.
    fn spawn_request(&self, request: SegmentationRequest) {
        let tx = self.tx.clone();
        let service = self.service.clone();
        let notifier = self.notifier.clone();
        let generation = self.generation;
        let bounds = request.bounds;

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();

            let outcome = match runtime {
                Ok(rt) => rt.block_on(service.segment(request)),
                Err(e) => Err(AppError::Io(e)),
            };

            let _ = tx.send(Completion {
                generation,
                bounds,
                outcome,
            });
            if let Some(notify) = notifier {
                notify();
            }
        });
    }
}
