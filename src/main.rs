use anyhow::{bail, Context as _, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::{info, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use svgport::platform::{DeviceMetrics, Fetcher, HttpFetcher, ScreenEnvironment};
use svgport::{
    Artifact, Blob, CachePolicy, DirectorySink, Document, DownloadSink, Exporter, RenderOptions,
    StdoutSink,
};
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "svgport",
    version,
    about = "Export an SVG graphic from a page as standalone SVG, a data URI or a raster image"
)]
struct Cli {
    /// Page or SVG file to export from (path or http/https/file URL)
    input: String,

    /// Selector locating the graphic
    #[arg(long, short = 's', default_value = "svg")]
    selector: String,

    /// Location relative references resolve against (defaults to the input's)
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, short = 'f', value_enum, default_value = "svg")]
    format: Format,

    /// Output file (defaults to stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// JSON file with render options; flags below override it
    #[arg(long)]
    options: Option<PathBuf>,

    #[arg(long)]
    width: Option<f64>,

    #[arg(long)]
    height: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    left: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    top: Option<f64>,

    #[arg(long)]
    scale: Option<f64>,

    /// Background color applied to the exported root
    #[arg(long)]
    background: Option<String>,

    /// Fit the container instead of a fixed pixel size
    #[arg(long, action = ArgAction::SetTrue)]
    responsive: bool,

    /// Do not embed any CSS
    #[arg(long, action = ArgAction::SetTrue)]
    exclude_css: bool,

    /// Drop style rules that match nothing in the graphic
    #[arg(long, action = ArgAction::SetTrue)]
    exclude_unused_css: bool,

    /// JPEG quality, 0..1
    #[arg(long)]
    quality: Option<f32>,

    /// Device pixel ratio for raster output
    #[arg(long)]
    pixel_ratio: Option<f32>,

    /// Draw raster output on an opaque canvas
    #[arg(long, action = ArgAction::SetTrue)]
    opaque: bool,

    /// Viewport width for media queries
    #[arg(long, default_value_t = 1280)]
    viewport_width: u32,

    #[arg(long, default_value_t = 720)]
    viewport_height: u32,

    /// Media type for @media evaluation
    #[arg(long, default_value = "screen")]
    media: String,

    /// Per request timeout
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Refetch fonts and stylesheets for every export
    #[arg(long, action = ArgAction::SetTrue)]
    no_cache: bool,

    /// Log progress to stderr (repeat for more)
    #[arg(long, short = 'v', action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Svg,
    DataUri,
    Png,
    Jpeg,
}

/// `-v` raises the default level; `RUST_LOG` still overrides it.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn render_options(cli: &Cli) -> Result<RenderOptions> {
    let mut opts: RenderOptions = match &cli.options {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => RenderOptions::default(),
    };

    let doc = &mut opts.document;
    if cli.width.is_some() {
        doc.width = cli.width;
    }
    if cli.height.is_some() {
        doc.height = cli.height;
    }
    if let Some(left) = cli.left {
        doc.left = left;
    }
    if let Some(top) = cli.top {
        doc.top = top;
    }
    if let Some(scale) = cli.scale {
        doc.scale = scale;
    }
    if cli.background.is_some() {
        doc.background_color = cli.background.clone();
    }
    doc.responsive |= cli.responsive;
    doc.exclude_css |= cli.exclude_css;
    opts.css.exclude_unused_css |= cli.exclude_unused_css;

    if cli.pixel_ratio.is_some() {
        opts.canvas.pixel_ratio = cli.pixel_ratio;
    }
    if cli.opaque {
        opts.canvas.alpha = false;
    }
    match cli.format {
        Format::Png => opts.encoder.mime_type = "image/png".to_string(),
        Format::Jpeg => opts.encoder.mime_type = "image/jpeg".to_string(),
        Format::Svg | Format::DataUri => {}
    }
    if let Some(q) = cli.quality {
        opts.encoder.quality = q;
    }
    Ok(opts)
}

/// Load the input markup and the location it is served from.
async fn load_input(cli: &Cli, fetcher: &dyn Fetcher) -> Result<(String, Url)> {
    let (markup, location) = match Url::parse(&cli.input) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "file") => {
            let res = fetcher
                .fetch(url.as_str())
                .await
                .map_err(|e| svgport::Error::Network(format!("{}: {}", url, e)))?;
            if !res.ok() {
                return Err(svgport::Error::Network(format!("{} returned {}", url, res.status)).into());
            }
            (res.text(), url)
        }
        _ => {
            let path = std::fs::canonicalize(&cli.input)
                .with_context(|| format!("reading {}", cli.input))?;
            let markup = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let location = Url::from_file_path(&path)
                .map_err(|_| svgport::Error::Config(format!("bad path {}", path.display())))?;
            (markup, location)
        }
    };

    let location = match &cli.base_url {
        Some(base) => Url::parse(base)
            .map_err(|e| svgport::Error::Config(format!("bad base URL {}: {}", base, e)))?,
        None => location,
    };
    Ok((markup, location))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let opts = render_options(&cli)?;
    let fetcher = Arc::new(HttpFetcher::new(
        concat!("svgport/", env!("CARGO_PKG_VERSION")),
        cli.timeout_ms,
        &[],
    )?);
    let environment = Arc::new(ScreenEnvironment::with_media_type(
        DeviceMetrics {
            width: cli.viewport_width,
            height: cli.viewport_height,
            ..Default::default()
        },
        cli.media.clone(),
    ));

    let (markup, location) = load_input(&cli, fetcher.as_ref()).await?;
    info!("loaded {} ({} bytes)", location, markup.len());
    let doc = Document::parse(&markup, location);
    let graphic = doc.graphic(&cli.selector)?;

    let policy = if cli.no_cache {
        CachePolicy::PerExport
    } else {
        CachePolicy::Session
    };
    let exporter = Exporter::new(fetcher, environment).with_cache_policy(policy);

    let artifact = match cli.format {
        Format::Svg => {
            let svg = exporter.svg_to_inlined_svg(graphic, &opts).await?;
            info!("exported {}x{}", svg.width, svg.height);
            text_artifact("image/svg+xml", svg.markup)
        }
        Format::DataUri => {
            let uri = exporter.svg_to_inlined_svg_data_uri(graphic, &opts).await?;
            text_artifact("text/plain", uri)
        }
        Format::Png | Format::Jpeg => {
            Artifact::Blob(exporter.svg_to_raster_blob(graphic, &opts).await?)
        }
    };

    let (name, sink) = match &cli.output {
        Some(path) => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let name = match path.file_name() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => bail!("output path {} has no file name", path.display()),
            };
            (name, Box::new(DirectorySink::new(dir)) as Box<dyn DownloadSink>)
        }
        None => (String::new(), Box::new(StdoutSink) as Box<dyn DownloadSink>),
    };
    exporter.download(&name, artifact, sink.as_ref()).await?;
    Ok(())
}

fn text_artifact(mime_type: &str, text: String) -> Artifact {
    Artifact::Blob(Blob {
        mime_type: mime_type.to_string(),
        bytes: text.into_bytes(),
    })
}
