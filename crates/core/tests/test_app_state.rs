mod common;

use std::sync::Arc;

use axum::routing::post;
use axum::{Json, Router};
use eframe::egui;
use serde_json::json;

use common::{counting_notifier, mask_uri, png_source, response, spawn_server, FakeService, WAIT};
use segmask_core::error::{AppError, SEGMENTATION_FAILED_MESSAGE};
use segmask_core::geometry::Rectangle;
use segmask_core::overlay::{MaskDecoder, OverlayRenderer, DEFAULT_OPACITY};
use segmask_core::segmentation::{RequestState, SegmentationCoordinator};
use segmask_core::{AppState, Config, HeadlessOptions, Segmask, SourceImage};

fn state_with(service: Arc<FakeService>) -> AppState {
    AppState::new(SegmentationCoordinator::new(service), OverlayRenderer::new())
}

fn segmented_state(service: &Arc<FakeService>) -> AppState {
    service.reply(Ok(response(mask_uri(4, 4, 255))));
    let mut state = state_with(service.clone());
    state.load_image(png_source(16, 16));
    state.select(Rectangle::new(2.0, 2.0, 8.0, 8.0));
    assert!(state.segment());
    state.wait_until_settled(WAIT);
    state
}

#[test]
fn segmenting_needs_an_image_and_a_selection() {
    let mut state = state_with(FakeService::new());
    assert!(!state.can_segment());

    state.load_image(png_source(16, 16));
    assert!(!state.can_segment());

    state.select(Rectangle::new(1.0, 1.0, 4.0, 4.0));
    assert!(state.can_segment());

    state.reset();
    assert!(state.image().is_none());
    assert!(state.rectangle().is_none());
    assert!(!state.can_segment());
    assert!(!state.segment());
}

#[test]
fn pointer_drag_is_mapped_into_image_pixels() {
    let mut state = state_with(FakeService::new());
    state.load_image(png_source(200, 100));
    // drawn at half size, offset by the panel margin
    let surface = egui::Rect::from_min_size(egui::pos2(10.0, 10.0), egui::vec2(100.0, 50.0));

    state.pointer_down(egui::pos2(20.0, 20.0), surface);
    state.pointer_move(egui::pos2(60.0, 40.0), surface);
    assert!(state.is_dragging());
    state.pointer_up();

    assert!(!state.is_dragging());
    assert_eq!(state.rectangle(), Some(Rectangle { x: 20.0, y: 20.0, width: 80.0, height: 40.0 }));
}

#[test]
fn collapsed_surface_ignores_the_pointer() {
    let mut state = state_with(FakeService::new());
    state.load_image(png_source(64, 64));
    let surface = egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(0.0, 0.0));

    state.pointer_down(egui::pos2(0.0, 0.0), surface);
    assert!(!state.is_dragging());
    assert!(state.rectangle().is_none());
}

#[test]
fn opacity_only_moves_once_a_mask_exists() {
    let service = FakeService::new();
    let mut state = state_with(service.clone());
    state.load_image(png_source(16, 16));
    assert!(!state.set_opacity(0.2));
    assert_eq!(state.opacity(), DEFAULT_OPACITY);

    let mut state = segmented_state(&service);
    assert!(state.result().is_some());
    assert!(state.set_opacity(0.3));
    assert!(state.set_opacity(7.0));
    assert_eq!(state.opacity(), 1.0);
}

#[test]
fn new_upload_keeps_opacity_but_reset_restores_default() {
    let service = FakeService::new();
    let mut state = segmented_state(&service);
    state.set_opacity(0.3);

    state.load_image(png_source(8, 8));
    assert!(state.result().is_none());
    assert!(state.rectangle().is_none());
    assert_eq!(state.opacity(), 0.3);

    state.reset();
    assert_eq!(state.opacity(), DEFAULT_OPACITY);
}

#[test]
fn failure_keeps_the_selection_for_a_retry() {
    let service = FakeService::new();
    service.reply(Err(AppError::HttpStatus { status: 500, body: "{\"error\":\"x\"}".into() }));
    service.reply(Ok(response(mask_uri(4, 4, 255))));
    let mut state = state_with(service.clone());
    state.load_image(png_source(16, 16));
    let rect = Rectangle::new(3.0, 3.0, 5.0, 5.0);
    state.select(rect);

    state.segment();
    state.wait_until_settled(WAIT);
    assert_eq!(state.error_message(), Some(SEGMENTATION_FAILED_MESSAGE));
    assert_eq!(state.rectangle(), Some(rect));
    assert!(state.can_segment());

    state.segment();
    state.wait_until_settled(WAIT);
    assert_eq!(state.error_message(), None);
    assert!(state.mask_ready());
    assert_eq!(service.requests().len(), 2);
}

#[test]
fn reset_while_pending_drops_the_late_result() {
    let service = FakeService::new();
    let gate = service.gate();
    let (notifier, notified) = counting_notifier();
    let coordinator = SegmentationCoordinator::new(service.clone()).with_notifier(notifier);
    let mut state = AppState::new(coordinator, OverlayRenderer::with_decoder(MaskDecoder::new()));
    state.load_image(png_source(16, 16));
    state.select(Rectangle::new(0.0, 0.0, 4.0, 4.0));
    state.segment();
    assert!(state.is_pending());

    state.reset();
    gate.send(Ok(response(mask_uri(4, 4, 255)))).unwrap();
    notified.recv_timeout(WAIT).unwrap();

    state.poll();
    assert_eq!(state.request_state(), &RequestState::Idle);
    assert!(state.result().is_none());
    assert!(state.composite().is_none());
}

#[test]
fn composite_is_recomputed_only_when_inputs_change() {
    let service = FakeService::new();
    let mut state = segmented_state(&service);

    assert!(state.composite().is_some());
    assert!(!state.is_dirty());
    let revision = state.revision();

    state.set_opacity(0.25);
    assert!(state.is_dirty());
    assert!(state.revision() > revision);

    let surface = state.composite().unwrap();
    assert_eq!(surface.dimensions(), (16, 16));
    // 255 * 0.25, away from the outline
    assert_eq!(surface.get_pixel(14, 14)[3], 64);
}

#[test]
fn image_from_disk_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.png");
    std::fs::write(&path, png_source(24, 12).bytes()).unwrap();

    let service = FakeService::new();
    service.reply(Ok(response(mask_uri(6, 3, 255))));
    let mut state = state_with(service.clone());
    state.load_image(SourceImage::open(&path).unwrap());
    state.select(Rectangle::new(4.5, 2.5, 10.0, 5.0));
    state.segment();
    state.wait_until_settled(WAIT);

    let sent = &service.requests()[0];
    assert_eq!(sent.image.file_name(), "scene.png");
    assert_eq!((sent.bounds.x_min, sent.bounds.y_min, sent.bounds.x_max, sent.bounds.y_max), (4, 2, 14, 7));

    assert!(state.mask_ready());
    let flat = state.flattened().unwrap();
    assert_eq!(flat.dimensions(), (24, 12));
    assert!(flat.pixels().all(|p| p[3] == 255));
}

#[test]
fn headless_run_returns_flattened_composite() {
    let router = Router::new().route(
        "/api/upload_and_segment",
        post(|| async { Json(json!({ "mask_image": mask_uri(4, 4, 255).as_str() })) }),
    );
    let addr = spawn_server(router);
    let config = Config::builder()
        .with_api_base_url(format!("http://{addr}"))
        .build()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.png");
    std::fs::write(&path, png_source(20, 20).bytes()).unwrap();

    let app = Segmask::with_config(config).unwrap();
    let options = HeadlessOptions { opacity: 0.5, timeout: WAIT };
    let flat = app
        .segment_file(&path, Rectangle::new(2.0, 2.0, 6.0, 6.0), &options)
        .unwrap();
    assert_eq!(flat.dimensions(), (20, 20));
}

#[test]
fn headless_run_reports_service_failure() {
    let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let config = Config::builder()
        .with_api_base_url(format!("http://{addr}"))
        .build()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.png");
    std::fs::write(&path, png_source(8, 8).bytes()).unwrap();

    let err = Segmask::with_config(config)
        .unwrap()
        .segment_file(&path, Rectangle::new(0.0, 0.0, 4.0, 4.0), &HeadlessOptions { opacity: 0.6, timeout: WAIT })
        .unwrap_err();
    assert!(matches!(err, AppError::Segmentation(ref m) if m == SEGMENTATION_FAILED_MESSAGE), "{err:?}");
}
