//! UI rendering helpers.
//!
//! Layout of the image on screen, texture conversion, and small drawing
//! utilities shared by the panels.

use eframe::egui;
use image::RgbaImage;

/// Fits an image into `available`, preserving aspect ratio.
///
/// The image is never scaled above its natural size. The result is
/// horizontally centred and anchored to the top of `available`.
pub fn fit_image_rect(available: egui::Rect, natural: egui::Vec2) -> egui::Rect {
    if natural.x <= 0.0 || natural.y <= 0.0 {
        return egui::Rect::from_min_size(available.min, egui::Vec2::ZERO);
    }

    let scale = (available.width() / natural.x)
        .min(available.height() / natural.y)
        .min(1.0)
        .max(0.0);
    let size = natural * scale;
    let left = available.center().x - size.x / 2.0;

    egui::Rect::from_min_size(egui::pos2(left, available.top()), size)
}

/// Converts an RGBA buffer into an egui image for texture upload.
pub fn to_color_image(image: &RgbaImage) -> egui::ColorImage {
    let size = [image.width() as usize, image.height() as usize];
    let pixels = image.as_flat_samples();
    egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice())
}

/// Uploads `image` into `slot`, reusing the existing texture when possible.
pub fn upload_texture(
    ctx: &egui::Context,
    slot: &mut Option<egui::TextureHandle>,
    name: &str,
    image: egui::ColorImage,
) {
    match slot {
        Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
        None => *slot = Some(ctx.load_texture(name, image, egui::TextureOptions::LINEAR)),
    }
}

/// Paints a texture stretched over `rect`.
pub fn draw_texture(painter: &egui::Painter, texture: &egui::TextureHandle, rect: egui::Rect) {
    painter.image(
        texture.id(),
        rect,
        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
        egui::Color32::WHITE,
    );
}

/// Draws a border around a rectangle.
///
/// # Arguments
/// * `painter` - The egui painter to draw with
/// * `rect` - The area to outline
/// * `stroke_width` - Width of the border line
/// * `color` - Color of the border
pub fn draw_border(painter: &egui::Painter, rect: egui::Rect, stroke_width: f32, color: egui::Color32) {
    painter.rect_stroke(
        rect,
        8.0,
        egui::Stroke::new(stroke_width, color),
        egui::StrokeKind::Inside,
    );
}

/// Label for the opacity slider, e.g. `Mask opacity: 60%`.
pub fn opacity_label(opacity: f32) -> String {
    format!("Mask opacity: {}%", (opacity * 100.0).round() as i32)
}
