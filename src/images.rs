//! Embeds every `<image>` reference of the export clone as a PNG data URI.
//!
//! Loads run concurrently and the whole step fails on the first image that
//! cannot be loaded or decoded.

use crate::dom::{SvgElement, XLINK_NS};
use crate::error::{Error, Result};
use crate::render::raster::{decode_bytes, to_png_data_uri};
use crate::Context;
use futures::future::try_join_all;
use log::debug;
use std::time::{SystemTime, UNIX_EPOCH};
use url::{Position, Url};

/// The reference of an `<image>`: `xlink:href` when populated, else `href`.
pub fn image_href(el: &SvgElement) -> Option<&str> {
    el.attr_ns(XLINK_NS, "href")
        .filter(|h| !h.is_empty())
        .or_else(|| el.attr("href").filter(|h| !h.is_empty()))
}

fn set_image_href(el: &mut SvgElement, uri: &str) {
    if el.attr_ns(XLINK_NS, "href").map_or(false, |h| !h.is_empty()) {
        el.set_attr_ns(XLINK_NS, "href", uri);
    } else {
        el.set_attr("href", uri);
    }
}

/// Absolute `http(s)` reference to a host other than the page's.
pub fn is_external(href: &str, location: &Url) -> bool {
    let host = &location[Position::BeforeHost..Position::AfterPort];
    href.starts_with("http") && !href.contains(host)
}

/// Append a `t=<millis>` query parameter.
pub fn with_cache_buster(href: &str, now_ms: u128) -> String {
    let sep = if href.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", href, sep, now_ms)
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

async fn load_image(href: &str, location: &Url, ctx: &Context) -> Result<String> {
    let resolved = location
        .join(href)
        .map(String::from)
        .unwrap_or_else(|_| href.to_string());
    let target = if is_external(href, location) {
        with_cache_buster(&resolved, now_ms())
    } else {
        resolved
    };

    let res = ctx
        .fetcher
        .fetch(&target)
        .await
        .map_err(|e| {
            debug!("image fetch failed for {}: {}", target, e);
            Error::ImageLoad(target.clone())
        })?;
    if !res.ok() {
        debug!("image fetch for {} returned {}", target, res.status);
        return Err(Error::ImageLoad(target));
    }
    let mime = res.content_type.as_deref().unwrap_or("");
    let decoded = decode_bytes(mime, &res.body).map_err(|e| {
        debug!("image decode failed for {}: {}", target, e);
        Error::ImageLoad(target.clone())
    })?;
    to_png_data_uri(&decoded)
}

/// Rewrite every `<image>` under `root` to reference an embedded PNG.
pub(crate) async fn inline_images(root: &mut SvgElement, location: &Url, ctx: &Context) -> Result<()> {
    let mut refs: Vec<Option<String>> = Vec::new();
    root.walk(&mut |el| {
        if el.name == "image" {
            refs.push(image_href(el).map(str::to_string));
        }
    });
    if refs.iter().all(Option::is_none) {
        return Ok(());
    }

    let loads = refs.iter().map(|href| async move {
        match href {
            Some(h) => load_image(h, location, ctx).await.map(Some),
            None => Ok(None),
        }
    });
    let uris = try_join_all(loads).await?;

    let mut next = uris.into_iter();
    root.walk_mut(&mut |el| {
        if el.name == "image" {
            if let Some(Some(uri)) = next.next() {
                set_image_href(el, &uri);
            }
        }
    });
    Ok(())
}
