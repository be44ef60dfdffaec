#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::BoxFuture;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use segmask_core::error::{AppError, Result};
use segmask_core::image_processing::{ImageProcessor, SourceImage};
use segmask_core::segmentation::{
    MaskPayload, Notifier, SegmentationRequest, SegmentationResponse, SegmentationService,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// A PNG-backed source image filled with one colour.
pub fn png_source(width: u32, height: u32) -> SourceImage {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])));
    let bytes = ImageProcessor::encode_png(&img).unwrap();
    SourceImage::from_bytes("photo.png", bytes).unwrap()
}

/// A grayscale mask data URI where every pixel has `value`.
pub fn mask_uri(width: u32, height: u32, value: u8) -> MaskPayload {
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])));
    MaskPayload::new(ImageProcessor::encode_data_uri(&img).unwrap())
}

pub fn response(mask: MaskPayload) -> SegmentationResponse {
    SegmentationResponse {
        mask_image: mask,
        metadata: None,
    }
}

/// One scripted answer for [`FakeService`].
pub enum Scripted {
    Reply(Result<SegmentationResponse>),
    /// Resolves only when the paired sender fires.
    Gated(oneshot::Receiver<Result<SegmentationResponse>>),
}

/// In-memory segmentation service that replays scripted answers in order.
#[derive(Default)]
pub struct FakeService {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<SegmentationRequest>>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, outcome: Result<SegmentationResponse>) {
        self.script.lock().unwrap().push_back(Scripted::Reply(outcome));
    }

    /// Queues an answer that waits for the returned sender.
    pub fn gate(&self) -> oneshot::Sender<Result<SegmentationResponse>> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().unwrap().push_back(Scripted::Gated(rx));
        tx
    }

    pub fn requests(&self) -> Vec<SegmentationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Blocks until the service has been called `count` times.
    ///
    /// Requests run on their own threads, so the scripted order only holds
    /// once each call has actually reached the service.
    pub fn wait_for_requests(&self, count: usize) {
        let deadline = std::time::Instant::now() + WAIT;
        while self.requests.lock().unwrap().len() < count {
            assert!(std::time::Instant::now() < deadline, "service was never called");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl SegmentationService for FakeService {
    fn segment(&self, request: SegmentationRequest) -> BoxFuture<'static, Result<SegmentationResponse>> {
        let next = self.script.lock().unwrap().pop_front();
        self.requests.lock().unwrap().push(request);
        Box::pin(async move {
            match next {
                Some(Scripted::Reply(outcome)) => outcome,
                Some(Scripted::Gated(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(AppError::parse("gate dropped"))),
                None => Err(AppError::parse("no scripted response")),
            }
        })
    }

    fn health(&self) -> BoxFuture<'static, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Notifier that reports each completion on a channel.
pub fn counting_notifier() -> (Notifier, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let notifier: Notifier = Arc::new(move || {
        let _ = tx.lock().unwrap().send(());
    });
    (notifier, rx)
}

/// Serves `router` on an ephemeral loopback port from a background thread.
pub fn spawn_server(router: axum::Router) -> SocketAddr {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, router).await.unwrap();
        });
    });
    rx.recv_timeout(WAIT).unwrap()
}
