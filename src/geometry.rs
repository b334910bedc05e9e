//! Output geometry: viewBox parsing, the root size fallback chain and
//! bounding boxes of sub-elements.

use crate::dom::{Graphic, SvgElement, SVG_NS, XLINK_NS};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Width,
    Height,
}

impl Dimension {
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Width => "width",
            Dimension::Height => "height",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewBox {
    /// Parse `min-x min-y width height`. Negative sizes are invalid.
    pub fn parse(text: &str) -> Option<Self> {
        let nums: Vec<f64> = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<f64>().ok())
            .collect::<Option<_>>()?;
        match nums.as_slice() {
            &[x, y, width, height] if width >= 0.0 && height >= 0.0 => Some(Self {
                x,
                y,
                width,
                height,
            }),
            _ => None,
        }
    }

    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Width => self.width,
            Dimension::Height => self.height,
        }
    }
}

/// Leading integer of a string, like JavaScript's `parseInt(s, 10)`.
pub fn parse_leading_int(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<f64>().ok().map(|v| sign * v)
}

fn truthy(v: f64) -> Option<f64> {
    if v.is_finite() && v != 0.0 {
        Some(v)
    } else {
        None
    }
}

/// Size of a root `<svg>` when no explicit size was requested: viewBox,
/// then a non-percentage attribute, then the inline style, then 0.
pub fn root_dimension(graphic: &Graphic<'_>, dim: Dimension) -> f64 {
    let from_view_box = graphic
        .attr("viewBox")
        .and_then(ViewBox::parse)
        .and_then(|vb| truthy(vb.get(dim)));
    let from_attr = || {
        graphic
            .attr(dim.name())
            .filter(|v| !v.trim_end().ends_with('%'))
            .and_then(parse_leading_int)
            .and_then(truthy)
    };
    let from_style = || {
        graphic
            .style_property(dim.name())
            .as_deref()
            .and_then(parse_leading_int)
            .and_then(truthy)
    };
    from_view_box
        .or_else(from_attr)
        .or_else(from_style)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Geometric bounding box of a drawable element in its own user space
/// (its `transform` is not applied). Zero when nothing can be measured.
pub fn bounding_box(element: &SvgElement) -> BBox {
    let mut measured = element.clone();
    measured.remove_attr("transform");
    let mut root = SvgElement::new("svg");
    root.set_attr("xmlns", SVG_NS);
    root.set_attr("xmlns:xlink", XLINK_NS);
    root.append_child(crate::dom::SvgNode::Element(measured));
    let markup = root.outer_markup();

    let opt = crate::render::raster::usvg_options();
    let tree = match usvg::Tree::from_str(&markup, &opt) {
        Ok(tree) => tree,
        Err(e) => {
            debug!("could not measure <{}>: {}", element.name, e);
            return BBox::default();
        }
    };
    if !tree.root().has_children() {
        return BBox::default();
    }
    let rect = tree.root().abs_bounding_box();
    BBox {
        x: rect.x() as f64,
        y: rect.y() as f64,
        width: rect.width() as f64,
        height: rect.height() as f64,
    }
}
