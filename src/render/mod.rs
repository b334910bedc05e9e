//! Encoders: inlined markup to a data URI, to a bitmap, to an encoded raster.

pub mod encode;
pub mod raster;

pub use encode::{data_uri_to_markup, inlined_svg_to_data_uri, reencode};
pub use raster::{
    canvas_to_raster_blob, canvas_to_raster_data_uri, data_uri_to_image, image_to_canvas,
    Canvas, DecodedImage,
};

use serde::Deserialize;

/// Preamble prepended to exported markup. Declares `&nbsp;`, which the
/// serializer emits for U+00A0.
pub const DOCTYPE: &str = r#"<?xml version="1.0" standalone="no"?><!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd" [<!ENTITY nbsp "&#160;">]>"#;

pub const DEFAULT_MIME_TYPE: &str = "image/png";
pub const DEFAULT_QUALITY: f32 = 0.8;

/// Raster encoder parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EncoderOptions {
    pub mime_type: String,
    /// 0..=1, ignored by lossless formats
    pub quality: f32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            quality: DEFAULT_QUALITY,
        }
    }
}

/// Settings for the drawing surface.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CanvasSettings {
    /// When false the canvas starts opaque black instead of transparent
    pub alpha: bool,
    /// Overrides the environment's device pixel ratio
    pub pixel_ratio: Option<f32>,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            alpha: true,
            pixel_ratio: None,
        }
    }
}

/// Encoded raster bytes with their MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}
