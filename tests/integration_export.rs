mod common;

use common::{png, Route, TestServer};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use svgport::platform::{Fetcher, HttpFetcher};
use svgport::{Document, Error, ExporterConfig, RenderOptions};
use url::Url;

const PAGE: &str = r#"<!DOCTYPE html>
<html><head>
<link rel="stylesheet" href="/css/site.css">
</head><body>
<div id="scope">
<svg id="chart" viewBox="0 0 200 100">
  <rect class="bar" width="200" height="100"/>
  <image href="/img/dot.png" width="4" height="4"/>
  <text class="label" x="10" y="50">日本語</text>
</svg>
<p id="caption">not a graphic</p>
</div>
</body></html>"#;

fn site(base: &str) -> Vec<(&'static str, Route)> {
    let css = format!(
        r#"@font-face {{ font-family: "Brand"; src: url("{base}/fonts/brand.woff2") format("woff2"); }}
@font-face {{ font-family: "Gone"; src: url("{base}/fonts/gone.woff"); }}
#scope .bar {{ fill: #0000ff }}
.label {{ font-family: Brand }}
.not-present {{ fill: red }}"#
    );
    vec![
        ("/", Route::ok("text/html", PAGE)),
        ("/css/site.css", Route::ok("text/css", css)),
        ("/fonts/brand.woff2", Route::ok("font/woff2", vec![0u8, 1, 2, 3])),
        ("/img/dot.png", Route::ok("image/png", png(4, 4, [255, 255, 0, 255]))),
    ]
}

async fn load_page(server: &TestServer) -> Document {
    let fetcher = HttpFetcher::new("svgport-tests", 5000, &[]).unwrap();
    let res = fetcher.fetch(&server.url("/")).await.unwrap();
    assert!(res.ok());
    Document::parse(&res.text(), Url::parse(&server.url("/")).unwrap())
}

fn remap_scope() -> RenderOptions {
    let mut opts = RenderOptions::default();
    opts.css.selector_remap = Some(Arc::new(|s: &str| s.replace("#scope ", "")));
    opts
}

#[tokio::test]
async fn test_export_embeds_styles_fonts_and_images() {
    let server = TestServer::start(site);
    let doc = load_page(&server).await;
    let exporter = svgport::new_exporter(ExporterConfig::default()).unwrap();

    let svg = exporter
        .svg_to_inlined_svg(doc.graphic("#chart").unwrap(), &RenderOptions::default())
        .await
        .unwrap();
    let markup = &svg.markup;

    assert!(markup.contains(r#"width="200" height="100""#));
    assert!(markup.contains(r#"href="data:image/png;base64,"#));
    assert!(markup.contains("#scope .bar{fill: #0000ff}"));
    assert!(markup.contains(".label{font-family: Brand}"));
    assert!(markup.contains(".not-present { fill: red }"));
    assert!(markup.contains(r#"url("data:font/woff2;base64,AAECAw==")"#));
    // the 404 font contributes nothing
    assert!(!markup.contains("Gone"));
    assert!(markup.contains("日本語"));
    assert_eq!(server.hits("/fonts/gone.woff"), 1);
}

#[tokio::test]
async fn test_unused_rules_and_selector_remap() {
    let server = TestServer::start(site);
    let doc = load_page(&server).await;
    let exporter = svgport::new_exporter(ExporterConfig::default()).unwrap();

    let mut opts = remap_scope();
    opts.css.exclude_unused_css = true;
    let svg = exporter
        .svg_to_inlined_svg(doc.graphic("#chart").unwrap(), &opts)
        .await
        .unwrap();
    assert!(svg.markup.contains(".bar{fill: #0000ff}"));
    assert!(!svg.markup.contains("#scope"));
    assert!(!svg.markup.contains(".not-present"));
}

#[tokio::test]
async fn test_scale_and_responsive_geometry() {
    let server = TestServer::start(site);
    let doc = load_page(&server).await;
    let exporter = svgport::new_exporter(ExporterConfig::default()).unwrap();

    let mut opts = RenderOptions::default();
    opts.document.scale = 2.0;
    let svg = exporter
        .svg_to_inlined_svg(doc.graphic("#chart").unwrap(), &opts)
        .await
        .unwrap();
    assert!(svg.markup.contains(r#"width="400" height="200""#));
    assert!(svg.markup.contains(r#"viewBox="0 0 200 100""#));

    let mut opts = RenderOptions::default();
    opts.document.responsive = true;
    let svg = exporter
        .svg_to_inlined_svg(doc.graphic("#chart").unwrap(), &opts)
        .await
        .unwrap();
    let root_tag = &svg.markup[..svg.markup.find('>').unwrap()];
    assert!(!root_tag.contains("width="));
    assert!(!root_tag.contains("height="));
    assert!(root_tag.contains(r#"preserveAspectRatio="xMinYMin meet""#));
}

#[tokio::test]
async fn test_raster_export_at_device_pixel_ratio() {
    let server = TestServer::start(site);
    let doc = load_page(&server).await;
    let mut config = ExporterConfig::default();
    config.device.dpr = 2.0;
    let exporter = svgport::new_exporter(config).unwrap();

    let blob = exporter
        .svg_to_raster_blob(doc.graphic("#chart").unwrap(), &remap_scope())
        .await
        .unwrap();
    assert_eq!(blob.mime_type, "image/png");
    let img = image::load_from_memory(&blob.bytes).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (400, 200));
    assert_eq!(img.get_pixel(300, 150).0, [0, 0, 255, 255]);
    // the embedded bitmap sits in the top left corner
    assert_eq!(img.get_pixel(2, 2).0, [255, 255, 0, 255]);
}

#[tokio::test]
async fn test_output_is_deterministic() {
    let server = TestServer::start(site);
    let doc = load_page(&server).await;

    let mut digests = Vec::new();
    for _ in 0..2 {
        let exporter = svgport::new_exporter(ExporterConfig::default()).unwrap();
        let uri = exporter
            .svg_to_inlined_svg_data_uri(doc.graphic("#chart").unwrap(), &RenderOptions::default())
            .await
            .unwrap();
        digests.push(hex::encode(Sha256::digest(uri.as_bytes())));
    }
    assert_eq!(digests[0], digests[1]);
}

#[tokio::test]
async fn test_structural_failures_abort_the_export() {
    let server = TestServer::start(|base| {
        let mut routes = site(base);
        routes.retain(|(path, _)| *path != "/img/dot.png");
        routes
    });
    let doc = load_page(&server).await;
    let exporter = svgport::new_exporter(ExporterConfig::default()).unwrap();
    let opts = RenderOptions::default();

    let err = exporter
        .svg_to_inlined_svg(doc.graphic("#caption").unwrap(), &opts)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotGraphic(_)));
    assert_eq!(err.to_string(), "Attempted to render non-SVG element: p");

    let err = exporter
        .svg_to_inlined_svg(doc.graphic("#chart").unwrap(), &opts)
        .await
        .unwrap_err();
    match err {
        Error::ImageLoad(href) => assert_eq!(href, server.url("/img/dot.png")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_stylesheet_times_out_without_failing() {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr());
    std::thread::spawn(move || {
        for req in server.incoming_requests() {
            std::thread::sleep(Duration::from_millis(1500));
            let _ = req.respond(tiny_http::Response::from_string(".a { fill: red }"));
        }
    });

    let page = r#"<html><head><link rel="stylesheet" href="/slow.css"></head>
<body><svg viewBox="0 0 10 10"><rect class="a" width="1" height="1"/></svg></body></html>"#;
    let doc = Document::parse(page, Url::parse(&base).unwrap());
    let exporter = svgport::new_exporter(ExporterConfig {
        timeout_ms: 200,
        ..Default::default()
    })
    .unwrap();

    let t0 = Instant::now();
    let svg = exporter
        .svg_to_inlined_svg(doc.graphic("svg").unwrap(), &RenderOptions::default())
        .await
        .unwrap();
    assert!(t0.elapsed() < Duration::from_millis(1200));
    assert!(!svg.markup.contains(".a{"));
}

#[tokio::test]
async fn test_own_namespace_and_circular_imports() {
    let page = r#"<html><head><link rel="stylesheet" href="/css/a.css"></head><body>
<svg id="own" xmlns="http://www.w3.org/2000/svg" viewBox="0 0 20 10">
  <rect class="bar" width="20" height="10"/><text class="label">x</text>
</svg></body></html>"#;
    let server = TestServer::start(move |_| {
        vec![
            ("/", Route::ok("text/html", page)),
            (
                "/css/a.css",
                Route::ok("text/css", "@import \"b.css\";\n.bar { fill: #00ff00 }"),
            ),
            (
                "/css/b.css",
                Route::ok("text/css", "@import url(a.css);\n.label { stroke: red }"),
            ),
        ]
    });
    let doc = load_page(&server).await;
    let exporter = svgport::new_exporter(ExporterConfig::default()).unwrap();

    let svg = exporter
        .svg_to_inlined_svg(doc.graphic("#own").unwrap(), &RenderOptions::default())
        .await
        .unwrap();
    let markup = &svg.markup;
    assert!(markup.starts_with("<svg "));
    assert!(!markup.contains(":xmlns="));
    assert_eq!(markup.matches(r#"xmlns="http://www.w3.org/2000/svg""#).count(), 1);
    assert_eq!(markup.matches("xmlns:xlink=").count(), 1);
    assert!(markup.contains(".label{stroke: red}\n.bar{fill: #00ff00}"));
    assert_eq!(server.hits("/css/a.css"), 1);
    assert_eq!(server.hits("/css/b.css"), 1);

    let uri = exporter
        .svg_to_inlined_svg_data_uri(doc.graphic("#own").unwrap(), &RenderOptions::default())
        .await
        .unwrap();
    let decoded = svgport::render::data_uri_to_markup(&uri).unwrap();
    assert!(!decoded.contains(":xmlns="));
}
