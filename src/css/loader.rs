//! Collects the page's stylesheets, fetching the ones that are only linked.

use crate::css::rules::{parse_stylesheet, CssRule};
use crate::dom::{Document, StyleSource};
use crate::platform::{FetchError, Fetcher};
use crate::Context;
use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;

/// A stylesheet with its rules. `href` is `None` for inline sheets.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedStylesheet {
    pub href: Option<String>,
    pub rules: Vec<CssRule>,
}

/// All sheets whose media currently matches, in document order.
pub(crate) async fn get_stylesheets(doc: &Document, ctx: &Context) -> Vec<Arc<LoadedStylesheet>> {
    let loads = doc
        .styles()
        .iter()
        .filter(|s| {
            s.media
                .as_deref()
                .map_or(true, |m| ctx.environment.matches_media(m))
        })
        .map(|s| load_source(s, ctx));
    join_all(loads).await.into_iter().flatten().collect()
}

async fn load_source(source: &StyleSource, ctx: &Context) -> Option<Arc<LoadedStylesheet>> {
    match (&source.text, &source.href) {
        (Some(text), href) => Some(Arc::new(LoadedStylesheet {
            href: href.clone(),
            rules: parse_stylesheet(text),
        })),
        (None, Some(href)) => load_remote(href, ctx).await,
        (None, None) => {
            warn!("Stylesheet could not be loaded: inline sheet is not accessible");
            None
        }
    }
}

/// Fetch and parse a sheet by URL. Cached per href, failures included.
pub(crate) async fn load_remote(href: &str, ctx: &Context) -> Option<Arc<LoadedStylesheet>> {
    if ctx.cache.stylesheets.contains(href) {
        debug!("stylesheet cache hit: {}", href);
    }
    let fetcher = ctx.fetcher.clone();
    let owned = href.to_string();
    ctx.cache
        .stylesheets
        .get_or_fetch(href, move || {
            Box::pin(async move { fetch_stylesheet(fetcher, owned).await })
        })
        .await
}

async fn fetch_stylesheet(fetcher: Arc<dyn Fetcher>, href: String) -> Option<Arc<LoadedStylesheet>> {
    match fetcher.fetch(&href).await {
        Ok(res) if res.ok() => {
            let rules = parse_stylesheet(&res.text());
            debug!("loaded {} ({} rules)", href, rules.len());
            Some(Arc::new(LoadedStylesheet {
                href: Some(href),
                rules,
            }))
        }
        Ok(res) => {
            warn!("Stylesheet could not be loaded: {} (status {})", href, res.status);
            None
        }
        Err(FetchError::Aborted) => {
            debug!("stylesheet request aborted: {}", href);
            None
        }
        Err(e) => {
            warn!("Stylesheet could not be loaded: {}: {}", href, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryFetcher;
    use url::Url;

    const PAGE: &str = r#"<html><head>
<link rel="stylesheet" href="a.css">
<style>.inline { fill: red }</style>
<link rel="stylesheet" href="print.css" media="print">
<link rel="stylesheet" href="missing.css">
<link rel="stylesheet" href="b.css" media="screen and (min-width: 100px)">
</head><body><svg></svg></body></html>"#;

    fn fetcher() -> Arc<MemoryFetcher> {
        Arc::new(
            MemoryFetcher::new()
                .with_route("http://site.test/a.css", "text/css", ".a { fill: blue }")
                .with_route("http://site.test/b.css", "text/css", ".b { fill: green }")
                .with_route("http://site.test/print.css", "text/css", ".p { fill: black }"),
        )
    }

    fn doc() -> Document {
        Document::parse(PAGE, Url::parse("http://site.test/index.html").unwrap())
    }

    #[tokio::test]
    async fn keeps_document_order_and_filters_media() {
        let fetcher = fetcher();
        let ctx = Context::for_fetcher(fetcher.clone());
        let sheets = get_stylesheets(&doc(), &ctx).await;
        let hrefs: Vec<Option<&str>> = sheets.iter().map(|s| s.href.as_deref()).collect();
        assert_eq!(
            hrefs,
            vec![
                Some("http://site.test/a.css"),
                None,
                Some("http://site.test/b.css")
            ]
        );
        assert_eq!(fetcher.requests("http://site.test/print.css"), 0);
        assert_eq!(fetcher.requests("http://site.test/missing.css"), 1);
    }

    #[tokio::test]
    async fn remote_sheets_are_fetched_once_per_session() {
        let fetcher = fetcher();
        let ctx = Context::for_fetcher(fetcher.clone());
        let d = doc();
        get_stylesheets(&d, &ctx).await;
        get_stylesheets(&d, &ctx).await;
        assert_eq!(fetcher.requests("http://site.test/a.css"), 1);
        assert_eq!(fetcher.requests("http://site.test/missing.css"), 1);
    }

    #[tokio::test]
    async fn inaccessible_inline_sheet_is_dropped() {
        let ctx = Context::for_fetcher(fetcher());
        let mut d = Document::parse("<svg></svg>", Url::parse("http://site.test/").unwrap());
        d.attach_stylesheet(StyleSource::default());
        d.attach_stylesheet(StyleSource::inline(".x { fill: red }"));
        let sheets = get_stylesheets(&d, &ctx).await;
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].rules.len(), 1);
    }
}
