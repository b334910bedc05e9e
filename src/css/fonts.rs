//! `@font-face` discovery and embedding.

use crate::platform::{FetchError, Fetcher};
use crate::Context;
use base64::Engine as _;
use log::{debug, error, warn};
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use once_cell::sync::Lazy;
use std::sync::Arc;
use url::Url;

/// A font reference found in (or supplied for) the stylesheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontInfo {
    /// The CSS fragment containing the reference
    pub text: String,
    /// MIME type inferred from the extension
    pub format: String,
    /// Absolute URL
    pub url: String,
}

/// Extension to MIME type, first match wins.
const FONT_FORMATS: &[(&str, &str)] = &[
    ("woff2", "font/woff2"),
    ("woff", "font/woff"),
    ("otf", "application/x-font-opentype"),
    ("ttf", "application/x-font-ttf"),
    ("eot", "application/vnd.ms-fontobject"),
    ("sfnt", "application/font-sfnt"),
    ("svg", "image/svg+xml"),
];

static FONT_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"url\(["']?(.+?)["']?\)"#).unwrap());

pub fn font_mime_type(font_url: &str) -> &'static str {
    let found = FONT_FORMATS.iter().find(|(ext, _)| {
        font_url
            .find(&format!(".{}", ext))
            .map_or(false, |idx| idx > 0)
    });
    match found {
        Some(&(_, mime)) => mime,
        None => {
            error!(
                "Unknown font format for {}. Fonts may not be working correctly.",
                font_url
            );
            "application/octet-stream"
        }
    }
}

/// Find the first `url(...)` in a `@font-face` rule and resolve it.
///
/// `href` is the URL of the sheet the rule came from. `../x` and `./x` are
/// appended to it; anything else is taken as already absolute. Rules from
/// sheets without an href resolve against the page `location`.
pub fn detect_css_font(css_text: &str, href: Option<&str>, location: &Url) -> Option<FontInfo> {
    let url = FONT_URL
        .captures(css_text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");
    if url.is_empty() || url.starts_with("data:") || url == "about:blank" {
        return None;
    }

    let full = match href {
        Some(h) if url.starts_with("../") => format!("{}/../{}", h, url),
        Some(h) if url.starts_with("./") => format!("{}/{}", h, url),
        Some(_) => url.to_string(),
        None => location
            .join(url)
            .map(String::from)
            .unwrap_or_else(|_| url.to_string()),
    };
    let full = Url::parse(&full).map(String::from).unwrap_or(full);

    Some(FontInfo {
        text: css_text.to_string(),
        format: font_mime_type(&full).to_string(),
        url: full,
    })
}

/// Embed one font. Resolves to `""` when the font cannot be loaded; the
/// outcome is cached per URL either way.
pub(crate) async fn load_font(font: &FontInfo, ctx: &Context) -> String {
    if ctx.cache.fonts.contains(&font.url) {
        debug!("font cache hit: {}", font.url);
    }
    let fetcher = ctx.fetcher.clone();
    let owned = font.clone();
    ctx.cache
        .fonts
        .get_or_fetch(&font.url, move || {
            Box::pin(async move { fetch_font(fetcher, owned).await })
        })
        .await
}

async fn fetch_font(fetcher: Arc<dyn Fetcher>, font: FontInfo) -> String {
    match fetcher.fetch(&font.url).await {
        Ok(res) if res.ok() => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&res.body);
            let data_url = format!("url(\"data:{};base64,{}\")", font.format, encoded);
            let replaced = FONT_URL.replace(&font.text, NoExpand(&data_url));
            format!("{}\n", replaced)
        }
        Ok(res) => {
            warn!("Failed to load font from: {} (status {})", font.url, res.status);
            String::new()
        }
        Err(FetchError::Aborted) => {
            debug!("font request aborted: {}", font.url);
            String::new()
        }
        Err(e) => {
            warn!("Failed to load font from: {}: {}", font.url, e);
            String::new()
        }
    }
}

/// Embed every font concurrently and concatenate the results in list order.
pub(crate) async fn inline_fonts(fonts: &[FontInfo], ctx: &Context) -> String {
    futures::future::join_all(fonts.iter().map(|f| load_font(f, ctx)))
        .await
        .concat()
}
