//! svgport
//!
//! Turns an SVG graphic embedded in a page into a self-contained artifact:
//! standalone SVG markup, an SVG data URI, or an encoded raster image.
//!
//! Exporting a graphic means pulling everything it depends on out of its
//! page. The style rules that apply to it, the web fonts those rules use and
//! the bitmaps its `<image>` elements reference are fetched and embedded, and
//! the document is rebuilt with correct namespaces and geometry.
//!
//! # Features
//!
//! - **http** (default): reqwest backed [`platform::HttpFetcher`], the
//!   [`new_exporter`] constructor and the `svgport` binary
//! - **Pluggable collaborators**: network access goes through
//!   [`platform::Fetcher`], media/feature evaluation through
//!   [`platform::Environment`]
//! - **Session caches**: each font and stylesheet URL is fetched at most once
//!   per [`Exporter`] unless [`CachePolicy::PerExport`] is selected
//!
//! # Example
//!
//! ```no_run
//! use svgport::{Document, ExporterConfig, RenderOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let page = r#"<html><body><svg viewBox="0 0 200 100"><rect width="10" height="10"/></svg></body></html>"#;
//! let doc = Document::parse(page, url::Url::parse("https://example.com/")?);
//!
//! let exporter = svgport::new_exporter(ExporterConfig::default())?;
//! let svg = exporter
//!     .svg_to_inlined_svg(doc.graphic("svg")?, &RenderOptions::default())
//!     .await?;
//! println!("{}x{}", svg.width, svg.height);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub mod error;
pub use error::{Error, Result};

pub mod builder;
pub mod cache;
pub mod css;
pub mod dom;
pub mod download;
pub mod geometry;
pub mod images;
// Device metrics, media/supports evaluation and network access
pub mod platform;
pub mod render;

pub use builder::{DocumentOptions, InlinedSvg};
pub use cache::{CachePolicy, ResourceCache};
pub use css::CssOptions;
pub use dom::{Document, Graphic};
pub use download::{Artifact, DirectorySink, DownloadSink, StdoutSink};
pub use render::{
    canvas_to_raster_blob, canvas_to_raster_data_uri, data_uri_to_image, image_to_canvas,
    inlined_svg_to_data_uri, Blob, CanvasSettings, EncoderOptions,
};

use platform::{DeviceMetrics, Environment, Fetcher};
use serde::Deserialize;

/// Configuration for [`new_exporter`].
///
/// # Examples
///
/// ```
/// let cfg = svgport::ExporterConfig::default();
/// assert_eq!(cfg.timeout_ms, 30000);
/// assert_eq!(cfg.media_type, "screen");
/// ```
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// User agent string sent with every request
    pub user_agent: String,
    /// Per request timeout in milliseconds
    pub timeout_ms: u64,
    /// Extra HTTP headers
    pub headers: Vec<(String, String)>,
    /// Viewport media queries are evaluated against; also supplies the
    /// device pixel ratio for raster output
    pub device: DeviceMetrics,
    /// Media type for `@media` and `media=""` (`screen`, `print`)
    pub media_type: String,
    pub cache_policy: CachePolicy,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("svgport/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_ms: 30000,
            headers: Vec::new(),
            device: DeviceMetrics::default(),
            media_type: "screen".to_string(),
            cache_policy: CachePolicy::default(),
        }
    }
}

/// Options for one export, grouped by pipeline stage.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub document: DocumentOptions,
    pub css: CssOptions,
    pub canvas: CanvasSettings,
    pub encoder: EncoderOptions,
}

/// Collaborators threaded through one export.
pub(crate) struct Context {
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) environment: Arc<dyn Environment>,
    pub(crate) cache: Arc<ResourceCache>,
}

#[cfg(test)]
impl Context {
    /// Default screen environment and a fresh cache around `fetcher`.
    pub(crate) fn for_fetcher<F: Fetcher + 'static>(fetcher: Arc<F>) -> Self {
        Self {
            fetcher,
            environment: Arc::new(platform::ScreenEnvironment::default()),
            cache: Arc::new(ResourceCache::default()),
        }
    }
}

/// Runs exports against one fetcher, environment and cache.
pub struct Exporter {
    fetcher: Arc<dyn Fetcher>,
    environment: Arc<dyn Environment>,
    cache: Arc<ResourceCache>,
    cache_policy: CachePolicy,
}

impl Exporter {
    pub fn new(fetcher: Arc<dyn Fetcher>, environment: Arc<dyn Environment>) -> Self {
        Self {
            fetcher,
            environment,
            cache: Arc::new(ResourceCache::default()),
            cache_policy: CachePolicy::default(),
        }
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// The session cache. Unused under [`CachePolicy::PerExport`].
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    fn context(&self) -> Context {
        let cache = match self.cache_policy {
            CachePolicy::Session => self.cache.clone(),
            CachePolicy::PerExport => Arc::new(ResourceCache::default()),
        };
        Context {
            fetcher: self.fetcher.clone(),
            environment: self.environment.clone(),
            cache,
        }
    }

    /// Standalone SVG markup for `graphic` with styles, fonts and images
    /// embedded.
    pub async fn svg_to_inlined_svg(
        &self,
        graphic: Graphic<'_>,
        opts: &RenderOptions,
    ) -> Result<InlinedSvg> {
        let ctx = self.context();
        builder::build_document(graphic, &opts.document, &opts.css, &ctx).await
    }

    pub async fn svg_to_inlined_svg_data_uri(
        &self,
        graphic: Graphic<'_>,
        opts: &RenderOptions,
    ) -> Result<String> {
        let svg = self.svg_to_inlined_svg(graphic, opts).await?;
        Ok(inlined_svg_to_data_uri(&svg.markup))
    }

    async fn svg_to_canvas(
        &self,
        graphic: Graphic<'_>,
        opts: &RenderOptions,
    ) -> Result<render::Canvas> {
        let uri = self.svg_to_inlined_svg_data_uri(graphic, opts).await?;
        let image = data_uri_to_image(&uri)?;
        image_to_canvas(&image, &opts.canvas, self.environment.device_pixel_ratio())
    }

    pub async fn svg_to_raster_data_uri(
        &self,
        graphic: Graphic<'_>,
        opts: &RenderOptions,
    ) -> Result<String> {
        let canvas = self.svg_to_canvas(graphic, opts).await?;
        canvas_to_raster_data_uri(&canvas, &opts.encoder)
    }

    pub async fn svg_to_raster_blob(&self, graphic: Graphic<'_>, opts: &RenderOptions) -> Result<Blob> {
        let canvas = self.svg_to_canvas(graphic, opts).await?;
        canvas_to_raster_blob(&canvas, &opts.encoder)
    }

    /// Save an artifact through `sink`, resolving URIs with this exporter's
    /// fetcher.
    pub async fn download(&self, name: &str, artifact: Artifact, sink: &dyn DownloadSink) -> Result<()> {
        download::download(name, artifact, self.fetcher.as_ref(), sink).await
    }

    pub async fn download_svg(
        &self,
        graphic: Graphic<'_>,
        name: &str,
        opts: &RenderOptions,
        sink: &dyn DownloadSink,
    ) -> Result<()> {
        let uri = self.svg_to_inlined_svg_data_uri(graphic, opts).await?;
        self.download(name, Artifact::Uri(uri), sink).await
    }

    pub async fn download_svg_as_raster(
        &self,
        graphic: Graphic<'_>,
        name: &str,
        opts: &RenderOptions,
        sink: &dyn DownloadSink,
    ) -> Result<()> {
        let uri = self.svg_to_raster_data_uri(graphic, opts).await?;
        self.download(name, Artifact::Uri(uri), sink).await
    }
}

/// Create an exporter backed by the HTTP fetcher and a screen environment
/// built from `config`.
#[cfg(feature = "http")]
pub fn new_exporter(config: ExporterConfig) -> Result<Exporter> {
    let fetcher = platform::HttpFetcher::new(&config.user_agent, config.timeout_ms, &config.headers)?;
    let environment = platform::ScreenEnvironment::with_media_type(config.device, config.media_type);
    Ok(Exporter::new(Arc::new(fetcher), Arc::new(environment)).with_cache_policy(config.cache_policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MemoryFetcher, ScreenEnvironment};
    use url::Url;

    const PAGE: &str = r#"<html><head>
<link rel="stylesheet" href="/site.css">
</head><body>
<svg id="chart" viewBox="0 0 20 10"><rect class="bar" width="20" height="10"/></svg>
</body></html>"#;

    fn exporter(fetcher: Arc<MemoryFetcher>, dpr: f32) -> Exporter {
        let env = ScreenEnvironment::new(DeviceMetrics {
            dpr,
            ..Default::default()
        });
        Exporter::new(fetcher, Arc::new(env))
    }

    fn fetcher() -> Arc<MemoryFetcher> {
        Arc::new(MemoryFetcher::new().with_route(
            "http://site.test/site.css",
            "text/css",
            ".bar { fill: #ff0000 }",
        ))
    }

    fn doc() -> Document {
        Document::parse(PAGE, Url::parse("http://site.test/").unwrap())
    }

    #[test]
    fn test_default_config() {
        let config = ExporterConfig::default();
        assert_eq!(config.device.width, 1280);
        assert_eq!(config.device.height, 720);
        assert_eq!(config.cache_policy, CachePolicy::Session);
        assert!(config.user_agent.starts_with("svgport/"));
    }

    #[test]
    fn test_render_options_from_json() {
        let opts: RenderOptions = serde_json::from_str(
            r#"{"document": {"scale": 3, "responsive": true}, "encoder": {"mime_type": "image/jpeg"}}"#,
        )
        .unwrap();
        assert_eq!(opts.document.scale, 3.0);
        assert!(opts.document.responsive);
        assert_eq!(opts.encoder.mime_type, "image/jpeg");
        assert_eq!(opts.encoder.quality, render::DEFAULT_QUALITY);
        assert!(opts.canvas.alpha);
    }

    #[tokio::test]
    async fn raster_export_uses_the_device_pixel_ratio() {
        let d = doc();
        let blob = exporter(fetcher(), 2.0)
            .svg_to_raster_blob(d.graphic("#chart").unwrap(), &RenderOptions::default())
            .await
            .unwrap();
        assert_eq!(blob.mime_type, "image/png");
        let img = image::load_from_memory(&blob.bytes).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (40, 20));
        assert_eq!(img.get_pixel(20, 10).0, [255, 0, 0, 255]);
    }

    #[tokio::test]
    async fn canvas_override_wins_over_the_environment() {
        let d = doc();
        let mut opts = RenderOptions::default();
        opts.canvas.pixel_ratio = Some(1.0);
        opts.encoder.mime_type = "image/jpeg".into();
        let uri = exporter(fetcher(), 3.0)
            .svg_to_raster_data_uri(d.graphic("#chart").unwrap(), &opts)
            .await
            .unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        let (_, bytes) = platform::decode_data_uri(&uri).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (20, 10));
    }

    #[tokio::test]
    async fn cache_policy_controls_refetching() {
        let d = doc();
        let opts = RenderOptions::default();

        let f = fetcher();
        let session = exporter(f.clone(), 1.0);
        for _ in 0..2 {
            session
                .svg_to_inlined_svg(d.graphic("#chart").unwrap(), &opts)
                .await
                .unwrap();
        }
        assert_eq!(f.requests("http://site.test/site.css"), 1);
        assert!(session.cache().stylesheets.contains("http://site.test/site.css"));

        let f = fetcher();
        let fresh = exporter(f.clone(), 1.0).with_cache_policy(CachePolicy::PerExport);
        for _ in 0..2 {
            fresh
                .svg_to_inlined_svg(d.graphic("#chart").unwrap(), &opts)
                .await
                .unwrap();
        }
        assert_eq!(f.requests("http://site.test/site.css"), 2);
        assert!(fresh.cache().is_empty());
    }

    #[tokio::test]
    async fn inlined_markup_carries_the_linked_rules() {
        let d = doc();
        let svg = exporter(fetcher(), 1.0)
            .svg_to_inlined_svg(d.graphic("#chart").unwrap(), &RenderOptions::default())
            .await
            .unwrap();
        assert!(svg.markup.contains(".bar{fill: #ff0000}"));
        let uri = inlined_svg_to_data_uri(&svg.markup);
        let back = render::data_uri_to_markup(&uri).unwrap();
        assert!(back.ends_with(&svg.markup));
    }
}
