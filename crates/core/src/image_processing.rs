//! Image loading, data-URI decoding and encoding utilities.
//!
//! The source image travels to the service as the exact bytes the user
//! picked; it is decoded locally only to learn its natural size and to
//! display it. Masks come back as data URIs and are decoded here.

use crate::error::{AppError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// An uploaded image: original bytes plus a decoded raster for display.
///
/// The bytes are shared and never mutated, so cloning is cheap.
#[derive(Clone)]
pub struct SourceImage {
    bytes: Arc<[u8]>,
    file_name: String,
    mime_type: String,
    decoded: Arc<DynamicImage>,
}

impl SourceImage {
    /// Reads and decodes an image file.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UploadRead`] if the file can't be read or isn't a
    /// format we can display.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|e| AppError::upload(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Self::from_bytes(file_name, bytes)
    }

    /// Decodes an in-memory upload.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let file_name = file_name.into();
        let format = image::guess_format(&bytes)
            .or_else(|_| ImageFormat::from_path(&file_name))
            .map_err(|e| AppError::upload(format!("{file_name}: unrecognized format ({e})")))?;

        let decoded = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| AppError::upload(format!("{file_name}: {e}")))?;

        Ok(Self {
            bytes: bytes.into(),
            file_name,
            mime_type: format.to_mime_type().to_string(),
            decoded: Arc::new(decoded),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn image(&self) -> &DynamicImage {
        &self.decoded
    }

    /// Natural (full-resolution) width and height.
    pub fn natural_size(&self) -> (u32, u32) {
        (self.decoded.width(), self.decoded.height())
    }
}

impl std::fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (w, h) = self.natural_size();
        f.debug_struct("SourceImage")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .field("size", &format_args!("{w}x{h}"))
            .finish()
    }
}

/// Stateless helpers for the encode/decode steps of the workflow.
pub struct ImageProcessor;

impl ImageProcessor {
    /// Decodes a `data:<mime>;base64,<payload>` URI into an image.
    ///
    /// A bare base64 string without the `data:` prefix is accepted too.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MaskDecode`] for a non-base64 data URI, invalid
    /// base64, or bytes that aren't a supported image.
    pub fn decode_data_uri(uri: &str) -> Result<DynamicImage> {
        let payload = match uri.trim().strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest
                    .split_once(',')
                    .ok_or_else(|| AppError::mask("data URI has no payload"))?;
                if !header.ends_with(";base64") {
                    return Err(AppError::mask(format!("unsupported data URI encoding: {header}")));
                }
                data
            }
            None => uri.trim(),
        };

        let bytes = BASE64
            .decode(payload)
            .map_err(|e| AppError::mask(format!("invalid base64: {e}")))?;

        image::load_from_memory(&bytes).map_err(|e| AppError::mask(format!("invalid image data: {e}")))
    }

    /// Encodes an image as a PNG data URI.
    pub fn encode_data_uri(image: &DynamicImage) -> Result<String> {
        let png = Self::encode_png(image)?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
    }

    /// Encodes a DynamicImage to PNG bytes.
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| AppError::image(format!("Failed to encode image: {}", e)))?;

        Ok(buffer)
    }

    /// Writes an RGBA composite to disk; the format follows the extension.
    pub fn save_rgba(image: &RgbaImage, path: &Path) -> Result<()> {
        let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
        let out = match format {
            // JPEG has no alpha channel
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).to_rgb8()),
            _ => DynamicImage::ImageRgba8(image.clone()),
        };
        out.save_with_format(path, format)
            .map_err(|e| AppError::image(format!("Failed to write {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gray(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([200])))
    }

    #[test]
    fn data_uri_round_trips_dimensions() {
        let uri = ImageProcessor::encode_data_uri(&gray(7, 3)).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        let decoded = ImageProcessor::decode_data_uri(&uri).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (7, 3));
    }

    #[test]
    fn bare_base64_is_accepted() {
        let uri = ImageProcessor::encode_data_uri(&gray(2, 2)).unwrap();
        let bare = uri.trim_start_matches("data:image/png;base64,");
        assert!(ImageProcessor::decode_data_uri(bare).is_ok());
    }

    #[test]
    fn rejects_garbage_payloads() {
        assert!(matches!(
            ImageProcessor::decode_data_uri("data:image/png;base64,@@@"),
            Err(AppError::MaskDecode(_))
        ));
        assert!(matches!(
            ImageProcessor::decode_data_uri("data:text/plain,hello"),
            Err(AppError::MaskDecode(_))
        ));
        assert!(matches!(
            ImageProcessor::decode_data_uri(&BASE64.encode(b"not an image")),
            Err(AppError::MaskDecode(_))
        ));
    }

    #[test]
    fn source_image_keeps_original_bytes() {
        let png = ImageProcessor::encode_png(&gray(5, 4)).unwrap();
        let source = SourceImage::from_bytes("scan.png", png.clone()).unwrap();
        assert_eq!(source.bytes(), png.as_slice());
        assert_eq!(source.mime_type(), "image/png");
        assert_eq!(source.natural_size(), (5, 4));
    }

    #[test]
    fn undecodable_upload_is_an_upload_error() {
        let err = SourceImage::from_bytes("notes.png", b"plain text".to_vec()).unwrap_err();
        assert!(matches!(err, AppError::UploadRead(_)));
    }

    #[test]
    fn common_raster_uploads_are_readable() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 5, image::Rgba([40, 80, 120, 255])));
        for (format, name, mime) in [
            (ImageFormat::Bmp, "scan.bmp", "image/bmp"),
            (ImageFormat::Gif, "anim.gif", "image/gif"),
            (ImageFormat::WebP, "photo.webp", "image/webp"),
        ] {
            let mut bytes = Vec::new();
            img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
            let source = SourceImage::from_bytes(name, bytes).unwrap();
            assert_eq!(source.mime_type(), mime);
            assert_eq!(source.natural_size(), (6, 5));
        }
    }
}
