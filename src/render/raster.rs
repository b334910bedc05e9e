//! Decode, draw and encode: the bitmap half of the export pipeline.

use crate::error::{Error, Result};
use crate::platform::decode_data_uri;
use crate::render::{Blob, CanvasSettings, EncoderOptions, DEFAULT_QUALITY};
use base64::Engine as _;
use log::debug;
use std::sync::{Arc, OnceLock};

/// Font database shared by every usvg parse; loading system fonts is slow.
fn shared_fontdb() -> Arc<usvg::fontdb::Database> {
    static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            Arc::new(db)
        })
        .clone()
}

pub(crate) fn usvg_options() -> usvg::Options<'static> {
    let mut opt = usvg::Options::default();
    opt.fontdb = shared_fontdb();
    opt
}

enum Source {
    Vector(usvg::Tree),
    Bitmap(image::RgbaImage),
}

/// A decoded image with its natural size in CSS pixels.
pub struct DecodedImage {
    source: Source,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.source {
            Source::Vector(_) => "vector",
            Source::Bitmap(_) => "bitmap",
        };
        f.debug_struct("DecodedImage")
            .field("kind", &kind)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

fn is_svg(mime: &str, bytes: &[u8]) -> bool {
    if mime == "image/svg+xml" {
        return true;
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let head = head.trim_start();
    head.starts_with("<svg") || head.starts_with("<?xml")
}

/// Decode raw image bytes (SVG or a bitmap format).
pub(crate) fn decode_bytes(mime: &str, bytes: &[u8]) -> std::result::Result<DecodedImage, String> {
    if is_svg(mime, bytes) {
        let tree = usvg::Tree::from_data(bytes, &usvg_options()).map_err(|e| e.to_string())?;
        let size = tree.size();
        return Ok(DecodedImage {
            width: size.width().ceil() as u32,
            height: size.height().ceil() as u32,
            source: Source::Vector(tree),
        });
    }
    let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let rgba = img.to_rgba8();
    Ok(DecodedImage {
        width: rgba.width(),
        height: rgba.height(),
        source: Source::Bitmap(rgba),
    })
}

/// Decode a data URI into an image. Failures carry the decoded markup and
/// the URI so malformed SVG can be inspected.
pub fn data_uri_to_image(uri: &str) -> Result<DecodedImage> {
    let decode_error = |bytes: &[u8]| Error::RasterDecode {
        markup: String::from_utf8_lossy(bytes).into_owned(),
        uri: uri.to_string(),
    };
    let (mime, bytes) = decode_data_uri(uri).ok_or_else(|| decode_error(&[]))?;
    decode_bytes(&mime, &bytes).map_err(|e| {
        debug!("data URI failed to decode: {}", e);
        decode_error(&bytes)
    })
}

/// A drawing surface holding premultiplied RGBA pixels.
pub struct Canvas {
    pixmap: tiny_skia::Pixmap,
}

impl Canvas {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &tiny_skia::Pixmap {
        &self.pixmap
    }

    /// Straight-alpha RGBA of one pixel
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }
}

fn to_pixmap(img: &image::RgbaImage) -> Result<tiny_skia::Pixmap> {
    let mut pixmap = tiny_skia::Pixmap::new(img.width(), img.height())
        .ok_or_else(|| Error::Encode(format!("cannot allocate {}x{} pixmap", img.width(), img.height())))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

/// Draw an image onto a new canvas scaled by `pixel_ratio`, so the output
/// has the same physical size on any display.
pub fn image_to_canvas(img: &DecodedImage, settings: &CanvasSettings, pixel_ratio: f32) -> Result<Canvas> {
    let ratio = settings
        .pixel_ratio
        .filter(|r| r.is_finite() && *r > 0.0)
        .unwrap_or(if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            pixel_ratio
        } else {
            1.0
        });
    let width = (img.width as f32 * ratio) as u32;
    let height = (img.height as f32 * ratio) as u32;
    let mut pixmap = tiny_skia::Pixmap::new(width.max(1), height.max(1))
        .ok_or_else(|| Error::Encode(format!("cannot allocate {}x{} canvas", width, height)))?;
    if !settings.alpha {
        pixmap.fill(tiny_skia::Color::BLACK);
    }

    let transform = tiny_skia::Transform::from_scale(ratio, ratio);
    match &img.source {
        Source::Vector(tree) => resvg::render(tree, transform, &mut pixmap.as_mut()),
        Source::Bitmap(rgba) => {
            let src = to_pixmap(rgba)?;
            pixmap.draw_pixmap(
                0,
                0,
                src.as_ref(),
                &tiny_skia::PixmapPaint::default(),
                transform,
                None,
            );
        }
    }
    Ok(Canvas { pixmap })
}

fn jpeg_quality(quality: f32) -> u8 {
    let q = if quality.is_finite() && (0.0..=1.0).contains(&quality) {
        quality
    } else {
        DEFAULT_QUALITY
    };
    ((q * 100.0).round() as u8).clamp(1, 100)
}

fn encode(canvas: &Canvas, opts: &EncoderOptions) -> Result<Blob> {
    let mime = opts.mime_type.trim().to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" => {
            // dropping alpha from premultiplied pixels composites onto black
            let rgb: Vec<u8> = canvas
                .pixmap
                .data()
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            let mut bytes = Vec::new();
            let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut bytes,
                jpeg_quality(opts.quality),
            );
            enc.encode(&rgb, canvas.width(), canvas.height(), image::ExtendedColorType::Rgb8)
                .map_err(|e| Error::Encode(format!("JPEG: {}", e)))?;
            Ok(Blob {
                mime_type: mime,
                bytes,
            })
        }
        other => {
            if other != "image/png" {
                debug!("unsupported raster type {:?}, encoding PNG", other);
            }
            let bytes = canvas
                .pixmap
                .encode_png()
                .map_err(|e| Error::Encode(format!("PNG: {}", e)))?;
            Ok(Blob {
                mime_type: "image/png".to_string(),
                bytes,
            })
        }
    }
}

pub fn canvas_to_raster_blob(canvas: &Canvas, opts: &EncoderOptions) -> Result<Blob> {
    encode(canvas, opts)
}

pub fn canvas_to_raster_data_uri(canvas: &Canvas, opts: &EncoderOptions) -> Result<String> {
    let blob = encode(canvas, opts)?;
    Ok(format!(
        "data:{};base64,{}",
        blob.mime_type,
        base64::engine::general_purpose::STANDARD.encode(&blob.bytes)
    ))
}

/// Re-encode any decodable image as a PNG data URI at its natural size.
pub(crate) fn to_png_data_uri(img: &DecodedImage) -> Result<String> {
    let canvas = image_to_canvas(img, &CanvasSettings::default(), 1.0)?;
    canvas_to_raster_data_uri(&canvas, &EncoderOptions::default())
}
