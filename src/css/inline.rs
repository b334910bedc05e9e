use crate::css::fonts::{detect_css_font, inline_fonts, FontInfo};
use crate::css::loader::{get_stylesheets, load_remote};
use crate::css::rules::CssRule;
use crate::css::CssOptions;
use crate::dom::Graphic;
use crate::error::{Error, Result};
use crate::Context;
use futures::future::LocalBoxFuture;
use log::warn;
use std::collections::HashSet;
use url::Url;

/// Rules and fonts gathered over one export.
#[derive(Default)]
struct Accumulator {
    css: Vec<String>,
    fonts: Vec<FontInfo>,
    /// Sheets on the current `@import` chain
    importing: HashSet<String>,
}

/// Build the stylesheet embedded into the exported graphic.
///
/// Selectors are matched against the live document the graphic lives in.
/// The result is the emitted rule texts joined by newlines, followed
/// directly by the embedded `@font-face` rules.
pub(crate) async fn inline_css(graphic: Graphic<'_>, opts: &CssOptions, ctx: &Context) -> Result<String> {
    if opts.inline_all_fonts {
        return Err(Error::NotImplemented(
            "inline_all_fonts (embedding every @font-face source)".into(),
        ));
    }

    let walker = RuleWalker {
        graphic,
        opts,
        ctx,
        detect_fonts: opts.fonts.is_none(),
    };
    let mut acc = Accumulator {
        css: Vec::new(),
        fonts: opts.fonts.clone().unwrap_or_default(),
        importing: HashSet::new(),
    };

    let sheets = get_stylesheets(graphic.document(), ctx).await;
    for sheet in &sheets {
        acc.importing.clear();
        acc.importing.extend(sheet.href.clone());
        walker.walk(&sheet.rules, sheet.href.as_deref(), &mut acc).await;
    }

    let mut fonts: Vec<FontInfo> = Vec::with_capacity(acc.fonts.len());
    for font in acc.fonts {
        if !fonts.contains(&font) {
            fonts.push(font);
        }
    }
    let font_css = inline_fonts(&fonts, ctx).await;
    Ok(acc.css.join("\n") + &font_css)
}

struct RuleWalker<'a, 'g> {
    graphic: Graphic<'g>,
    opts: &'a CssOptions,
    ctx: &'a Context,
    detect_fonts: bool,
}

impl<'a, 'g> RuleWalker<'a, 'g> {
    /// Visit rules in order. Imports are awaited in place so their rules
    /// land where the `@import` stood.
    fn walk<'r>(
        &'r self,
        rules: &'r [CssRule],
        href: Option<&'r str>,
        acc: &'r mut Accumulator,
    ) -> LocalBoxFuture<'r, ()> {
        Box::pin(async move {
            for rule in rules {
                match rule {
                    CssRule::Style {
                        selector,
                        declarations,
                    } => {
                        if self.matches(selector) {
                            acc.css.push(self.opts.generate_css(selector, declarations));
                        } else if !self.opts.exclude_unused_css {
                            acc.css.push(rule.css_text());
                        }
                    }
                    CssRule::FontFace { .. } => {
                        if self.detect_fonts {
                            let location = self.graphic.document().location();
                            if let Some(font) = detect_css_font(&rule.css_text(), href, location) {
                                acc.fonts.push(font);
                            }
                        }
                    }
                    CssRule::Media { condition, rules } => {
                        if self.ctx.environment.matches_media(condition) {
                            self.walk(rules, href, acc).await;
                        }
                    }
                    CssRule::Supports { condition, rules } => {
                        if self.ctx.environment.supports(condition) {
                            self.walk(rules, href, acc).await;
                        }
                    }
                    CssRule::Import { href: target, media } => {
                        if !media.is_empty() && !self.ctx.environment.matches_media(media) {
                            continue;
                        }
                        let url = self.resolve(target, href);
                        if !acc.importing.insert(url.clone()) {
                            warn!("Skipping circular @import of {}", url);
                            continue;
                        }
                        match load_remote(&url, self.ctx).await {
                            Some(sheet) => {
                                self.walk(&sheet.rules, sheet.href.as_deref(), acc).await
                            }
                            None => warn!("Skipping @import of {}", url),
                        }
                        acc.importing.remove(&url);
                    }
                    CssRule::Other { text } => {
                        if !self.opts.exclude_unused_css {
                            acc.css.push(text.clone());
                        }
                    }
                }
            }
        })
    }

    fn matches(&self, selector: &str) -> bool {
        match self.graphic.matches_in_context(selector) {
            Ok(found) => found,
            Err(e) => {
                warn!("Invalid CSS selector \"{}\": {}", selector, e);
                false
            }
        }
    }

    fn resolve(&self, target: &str, href: Option<&str>) -> String {
        let location = self.graphic.document().location();
        let base = href.and_then(|h| Url::parse(h).ok());
        base.as_ref()
            .unwrap_or(location)
            .join(target)
            .map(String::from)
            .unwrap_or_else(|_| target.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, StyleSource};
    use crate::platform::MemoryFetcher;
    use std::sync::Arc;

    const PAGE: &str = r#"<html><body><div id="scope">
<svg id="chart" viewBox="0 0 200 100"><g class="foo"><text class="label">Hi</text></g></svg>
</div></body></html>"#;

    fn doc_with(css: &[&str]) -> Document {
        let mut doc = Document::parse(PAGE, Url::parse("http://site.test/index.html").unwrap());
        for sheet in css {
            doc.attach_stylesheet(StyleSource::inline(*sheet));
        }
        doc
    }

    fn ctx() -> Context {
        Context::for_fetcher(Arc::new(MemoryFetcher::new()))
    }

    #[tokio::test]
    async fn unused_rules_pass_through_unless_excluded() {
        let doc = doc_with(&[".foo {fill:red}\n.not-present {fill:blue}"]);
        let g = doc.graphic("#chart").unwrap();

        let css = inline_css(g, &CssOptions::default(), &ctx()).await.unwrap();
        assert_eq!(css, ".foo{fill:red}\n.not-present { fill:blue }");

        let opts = CssOptions {
            exclude_unused_css: true,
            ..Default::default()
        };
        let css = inline_css(g, &opts, &ctx()).await.unwrap();
        assert_eq!(css, ".foo{fill:red}");
    }

    #[tokio::test]
    async fn selector_remap_scopes_out_ancestors() {
        let doc = doc_with(&["#scope .foo {color:red}"]);
        let opts = CssOptions {
            selector_remap: Some(Arc::new(|s: &str| s.replace("#scope ", ""))),
            ..Default::default()
        };
        let css = inline_css(doc.graphic("#chart").unwrap(), &opts, &ctx())
            .await
            .unwrap();
        assert_eq!(css, ".foo{color:red}");
    }

    #[tokio::test]
    async fn conditional_groups_are_gated_not_passed_through() {
        let doc = doc_with(&[
            "@media print { .foo { fill: black } }\n@media screen { .label { fill: red } }\n@supports (frobnicate: 1) { .foo { x: 1 } }\n@supports (display: grid) { .foo { y: 2 } }",
        ]);
        let css = inline_css(doc.graphic("#chart").unwrap(), &CssOptions::default(), &ctx())
            .await
            .unwrap();
        assert_eq!(css, ".label{fill: red}\n.foo{y: 2}");
    }

    #[tokio::test]
    async fn invalid_selectors_count_as_unmatched() {
        let doc = doc_with(&[".foo:::bad { fill: red }\n.foo { fill: blue }"]);
        let g = doc.graphic("#chart").unwrap();
        let css = inline_css(g, &CssOptions::default(), &ctx()).await.unwrap();
        assert_eq!(css, ".foo:::bad { fill: red }\n.foo{fill: blue}");
        let opts = CssOptions {
            exclude_unused_css: true,
            ..Default::default()
        };
        assert_eq!(inline_css(g, &opts, &ctx()).await.unwrap(), ".foo{fill: blue}");
    }

    #[tokio::test]
    async fn imports_are_spliced_in_document_order() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .with_route("http://site.test/css/base.css", "text/css", ".label { a: 1 }")
                .with_route("http://site.test/css/print.css", "text/css", ".label { p: 1 }"),
        );
        let ctx = Context::for_fetcher(fetcher.clone());
        let mut doc = doc_with(&[]);
        doc.attach_stylesheet(StyleSource {
            href: Some("http://site.test/css/main.css".into()),
            media: None,
            text: Some(
                "@import \"base.css\";\n@import url(print.css) print;\n@import \"gone.css\";\n.foo { b: 2 }"
                    .into(),
            ),
        });
        let css = inline_css(doc.graphic("#chart").unwrap(), &CssOptions::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(css, ".label{a: 1}\n.foo{b: 2}");
        assert_eq!(fetcher.requests("http://site.test/css/print.css"), 0);
        assert_eq!(fetcher.requests("http://site.test/css/gone.css"), 1);
    }

    #[tokio::test]
    async fn circular_imports_are_cut() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .with_route("http://site.test/a.css", "text/css", "@import \"b.css\";\n.foo { a: 1 }")
                .with_route("http://site.test/b.css", "text/css", "@import \"a.css\";\n.label { b: 1 }")
                .with_route("http://site.test/self.css", "text/css", "@import url(self.css);\n.foo { s: 1 }"),
        );
        let ctx = Context::for_fetcher(fetcher.clone());
        let mut doc = doc_with(&[]);
        doc.attach_stylesheet(StyleSource::linked("http://site.test/a.css"));
        doc.attach_stylesheet(StyleSource::linked("http://site.test/b.css"));
        doc.attach_stylesheet(StyleSource::linked("http://site.test/self.css"));

        let css = inline_css(doc.graphic("#chart").unwrap(), &CssOptions::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(
            css,
            ".label{b: 1}\n.foo{a: 1}\n.foo{a: 1}\n.label{b: 1}\n.foo{s: 1}"
        );
        assert_eq!(fetcher.requests("http://site.test/a.css"), 1);
        assert_eq!(fetcher.requests("http://site.test/self.css"), 1);
    }

    #[tokio::test]
    async fn diamond_imports_are_not_mistaken_for_cycles() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .with_route("http://site.test/left.css", "text/css", "@import \"base.css\";")
                .with_route("http://site.test/right.css", "text/css", "@import \"base.css\";")
                .with_route("http://site.test/base.css", "text/css", ".foo { z: 0 }"),
        );
        let ctx = Context::for_fetcher(fetcher);
        let mut doc = doc_with(&[]);
        doc.attach_stylesheet(StyleSource {
            href: Some("http://site.test/main.css".into()),
            media: None,
            text: Some("@import \"left.css\";\n@import \"right.css\";".into()),
        });
        let css = inline_css(doc.graphic("#chart").unwrap(), &CssOptions::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(css, ".foo{z: 0}\n.foo{z: 0}");
    }

    #[tokio::test]
    async fn fonts_are_detected_and_appended() {
        let fetcher = Arc::new(MemoryFetcher::new().with_route(
            "http://site.test/fonts/a.woff",
            "font/woff",
            vec![0u8],
        ));
        let ctx = Context::for_fetcher(fetcher);
        let doc = doc_with(&[
            "@font-face { font-family: A; src: url(fonts/a.woff) }\n@font-face { src: url(fonts/gone.woff) }\n.foo { font-family: A }",
        ]);
        let css = inline_css(doc.graphic("#chart").unwrap(), &CssOptions::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(
            css,
            ".foo{font-family: A}@font-face { font-family: A; src: url(\"data:font/woff;base64,AA==\") }\n"
        );
    }

    #[tokio::test]
    async fn explicit_font_list_disables_detection() {
        let doc = doc_with(&["@font-face { src: url(fonts/a.woff) }"]);
        let opts = CssOptions {
            fonts: Some(Vec::new()),
            ..Default::default()
        };
        let fetcher = Arc::new(MemoryFetcher::new());
        let ctx = Context::for_fetcher(fetcher.clone());
        let css = inline_css(doc.graphic("#chart").unwrap(), &opts, &ctx).await.unwrap();
        assert_eq!(css, "");
        assert_eq!(fetcher.total_requests(), 0);
    }

    #[tokio::test]
    async fn inline_all_fonts_is_rejected() {
        let doc = doc_with(&[]);
        let opts = CssOptions {
            inline_all_fonts: true,
            ..Default::default()
        };
        let err = inline_css(doc.graphic("#chart").unwrap(), &opts, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }
}
