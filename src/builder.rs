//! Reconstructs a graphic as a standalone SVG document.

use crate::css::{inline_css, CssOptions};
use crate::dom::{Graphic, SvgElement, SvgNode, SVG_NS, XHTML_NS, XLINK_NS};
use crate::error::{Error, Result};
use crate::geometry::{bounding_box, root_dimension, Dimension};
use crate::images::inline_images;
use crate::Context;
use log::debug;
use regex::{NoExpand, Regex};
use serde::Deserialize;
use once_cell::sync::Lazy;

pub const DEFAULT_SCALE: f64 = 1.0;

/// Elements that can be exported.
const GRAPHICS_ELEMENTS: &[&str] = &[
    "a", "circle", "ellipse", "foreignObject", "g", "image", "line", "path", "polygon",
    "polyline", "rect", "svg", "switch", "text", "textPath", "tspan", "use",
];

/// Geometry and document options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    /// Output width before scaling. Zero counts as unset.
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// viewBox origin
    pub left: f64,
    pub top: f64,
    pub scale: f64,
    pub background_color: Option<String>,
    /// Size to the container (`preserveAspectRatio`) instead of fixed pixels
    pub responsive: bool,
    /// Skip CSS inlining entirely
    pub exclude_css: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            left: 0.0,
            top: 0.0,
            scale: DEFAULT_SCALE,
            background_color: None,
            responsive: false,
            exclude_css: false,
        }
    }
}

/// Standalone markup plus its unscaled size.
#[derive(Debug, Clone, PartialEq)]
pub struct InlinedSvg {
    pub markup: String,
    pub width: f64,
    pub height: f64,
}

static TRANSLATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"translate\(.*?\)").unwrap());

/// Serializer-generated prefixes on `href`
static GENERATED_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)NS\d+:href").unwrap());

fn explicit(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite() && *v != 0.0)
}

/// Set `name` unless it already has a non-empty value.
fn ensure_attr(el: &mut SvgElement, name: &str, value: &str) {
    if el.attr(name).map_or(true, str::is_empty) {
        el.set_attr(name, value);
    }
}

fn fix_foreign_object_namespaces(root: &mut SvgElement) {
    root.walk_mut(&mut |el| {
        if el.name != "foreignObject" {
            return;
        }
        for child in el.child_elements_mut() {
            let ns = if child.name == "svg" { SVG_NS } else { XHTML_NS };
            ensure_attr(child, "xmlns", ns);
        }
    });
}

fn stylesheet(css: &str) -> SvgNode {
    let mut style = SvgElement::new("style");
    style.set_attr("type", "text/css");
    style.append_child(SvgNode::CData(format!("\n{}\n", css)));
    let mut defs = SvgElement::new("defs");
    defs.append_child(SvgNode::Element(style));
    SvgNode::Element(defs)
}

/// Build the standalone document for `graphic`.
///
/// Images are embedded into the clone; CSS selectors are matched against
/// the live document.
pub(crate) async fn build_document(
    graphic: Graphic<'_>,
    opts: &DocumentOptions,
    css: &CssOptions,
    ctx: &Context,
) -> Result<InlinedSvg> {
    let name = graphic.local_name();
    if !graphic.is_svg() || !GRAPHICS_ELEMENTS.contains(&name) {
        return Err(Error::NotGraphic(name.to_string()));
    }

    let mut clone = graphic.clone_tree();
    inline_images(&mut clone, graphic.document().location(), ctx).await?;

    let background = opts
        .background_color
        .clone()
        .filter(|c| !c.trim().is_empty())
        .or_else(|| graphic.style_property("background-color"));
    clone.set_style_property("background-color", background.as_deref());

    let (mut root, width, height) = if name == "svg" {
        let width = explicit(opts.width).unwrap_or_else(|| root_dimension(&graphic, Dimension::Width));
        let height =
            explicit(opts.height).unwrap_or_else(|| root_dimension(&graphic, Dimension::Height));
        (clone, width, height)
    } else {
        let stripped = clone
            .attr("transform")
            .map(|transform| TRANSLATE.replace(transform, "").into_owned());
        if let Some(transform) = stripped {
            clone.set_attr("transform", &transform);
        }
        let bb = bounding_box(&clone);
        debug!("<{}> bounding box {:?}", name, bb);
        let mut svg = SvgElement::new("svg");
        svg.append_child(SvgNode::Element(clone));
        (svg, bb.x + bb.width, bb.y + bb.height)
    };

    root.set_attr("version", "1.1");
    root.set_attr(
        "viewBox",
        &format!("{} {} {} {}", opts.left, opts.top, width, height),
    );
    ensure_attr(&mut root, "xmlns", SVG_NS);
    ensure_attr(&mut root, "xmlns:xlink", XLINK_NS);

    if opts.responsive {
        root.remove_attr("width");
        root.remove_attr("height");
        root.set_attr("preserveAspectRatio", "xMinYMin meet");
    } else {
        root.set_attr("width", &(width * opts.scale).to_string());
        root.set_attr("height", &(height * opts.scale).to_string());
    }

    fix_foreign_object_namespaces(&mut root);

    if !opts.exclude_css {
        let css_text = inline_css(graphic, css, ctx).await?;
        root.insert_first_child(stylesheet(&css_text));
    }

    let fixed = format!("xmlns:xlink=\"{}\" xlink:href", XLINK_NS);
    let markup = GENERATED_HREF
        .replace_all(&root.outer_markup(), NoExpand(&fixed))
        .into_owned();

    Ok(InlinedSvg {
        markup,
        width,
        height,
    })
}
