//! Tree primitives: the parsed live page and the owned clone that gets
//! rewritten and serialized.

use crate::error::{Error, Result};
use log::debug;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A style source attached to the page, in document order.
///
/// `text` is the directly readable sheet body. Linked sheets have an `href`
/// and no text, and are loaded over the network.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyleSource {
    pub href: Option<String>,
    pub media: Option<String>,
    pub text: Option<String>,
}

impl StyleSource {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn linked(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            ..Default::default()
        }
    }

    pub fn with_media(mut self, media: impl Into<String>) -> Self {
        self.media = Some(media.into());
        self
    }
}

/// The live page a graphic is exported from.
pub struct Document {
    html: Html,
    location: Url,
    styles: Vec<StyleSource>,
}

impl Document {
    /// Parse HTML or standalone SVG markup served from `location`.
    pub fn parse(markup: &str, location: Url) -> Self {
        let html = Html::parse_document(markup);
        let styles = collect_style_sources(&html, &location);
        debug!("parsed {} with {} style sources", location, styles.len());
        Self {
            html,
            location,
            styles,
        }
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn styles(&self) -> &[StyleSource] {
        &self.styles
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Append a sheet after the ones found in the markup.
    pub fn attach_stylesheet(&mut self, source: StyleSource) {
        self.styles.push(source);
    }

    /// Locate the graphic to export.
    pub fn graphic(&self, selector: &str) -> Result<Graphic<'_>> {
        let sel = Selector::parse(selector)
            .map_err(|e| Error::InvalidSelector(format!("{}: {:?}", selector, e)))?;
        self.html
            .select(&sel)
            .next()
            .map(|el| Graphic { doc: self, el })
            .ok_or_else(|| Error::NotFound(selector.to_string()))
    }
}

fn collect_style_sources(html: &Html, location: &Url) -> Vec<StyleSource> {
    let sel = match Selector::parse("style, link") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let mut out = Vec::new();
    for node in html.select(&sel) {
        let el = node.value();
        let media = el
            .attr("media")
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        if el.name() == "style" {
            let css_type = el.attr("type").map(str::trim).unwrap_or("");
            if !css_type.is_empty() && !css_type.eq_ignore_ascii_case("text/css") {
                continue;
            }
            out.push(StyleSource {
                href: None,
                media,
                text: Some(node.text().collect()),
            });
        } else {
            let rel = el.attr("rel").unwrap_or("").to_ascii_lowercase();
            let words: Vec<&str> = rel.split_ascii_whitespace().collect();
            if !words.contains(&"stylesheet") || words.contains(&"alternate") {
                continue;
            }
            let href = match el.attr("href").map(str::trim).filter(|h| !h.is_empty()) {
                Some(h) => h,
                None => continue,
            };
            let href = location
                .join(href)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string());
            out.push(StyleSource {
                href: Some(href),
                media,
                text: None,
            });
        }
    }
    out
}

/// Read-only handle on an element of the live document.
#[derive(Clone, Copy)]
pub struct Graphic<'a> {
    doc: &'a Document,
    el: ElementRef<'a>,
}

impl<'a> Graphic<'a> {
    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn local_name(&self) -> &'a str {
        self.el.value().name()
    }

    pub fn namespace(&self) -> &'a str {
        &self.el.value().name.ns
    }

    pub fn is_svg(&self) -> bool {
        self.namespace() == SVG_NS
    }

    /// Attribute by qualified name (`href`, `xlink:href`).
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        let value = self.el.value();
        if !name.contains(':') {
            return value.attr(name);
        }
        value
            .attrs
            .iter()
            .find(|(qn, _)| {
                let prefix = qn.prefix.as_ref().map(|p| &**p).unwrap_or("");
                name.split_once(':') == Some((prefix, &*qn.local))
            })
            .map(|(_, v)| &**v)
    }

    pub fn attr_ns(&self, ns: &str, local: &str) -> Option<&'a str> {
        self.el
            .value()
            .attrs
            .iter()
            .find(|(qn, _)| &*qn.ns == ns && &*qn.local == local)
            .map(|(_, v)| &**v)
    }

    /// A property from the inline `style` attribute.
    pub fn style_property(&self, name: &str) -> Option<String> {
        let style = self.el.value().attr("style")?;
        style_declarations(style)
            .into_iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn parent(&self) -> Option<Graphic<'a>> {
        self.el
            .parent()
            .and_then(ElementRef::wrap)
            .map(|el| Graphic { doc: self.doc, el })
    }

    /// Whether `selector` matches below this element or, failing that,
    /// below its parent. Matching runs in the context of the whole page so
    /// ancestor combinators see the real ancestors.
    pub fn matches_in_context(&self, selector: &str) -> std::result::Result<bool, String> {
        let sel = Selector::parse(selector).map_err(|e| format!("{:?}", e))?;
        if self.el.select(&sel).next().is_some() {
            return Ok(true);
        }
        let found = match self.el.parent() {
            Some(node) => match ElementRef::wrap(node) {
                Some(parent) => parent.select(&sel).next().is_some(),
                None => self.doc.html.select(&sel).next().is_some(),
            },
            None => false,
        };
        Ok(found)
    }

    /// Deep clone into an owned, mutable tree.
    pub fn clone_tree(&self) -> SvgElement {
        clone_element(self.el)
    }
}

fn clone_element(el: ElementRef<'_>) -> SvgElement {
    let value = el.value();
    let attrs = value
        .attrs
        .iter()
        .map(|(qn, v)| Attribute {
            prefix: qn
                .prefix
                .as_ref()
                .map(|p| p.to_string())
                .filter(|p| !p.is_empty()),
            ns: qn.ns.to_string(),
            local: qn.local.to_string(),
            value: v.to_string(),
        })
        .collect();

    let mut children = Vec::new();
    for child in el.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(c) = ElementRef::wrap(child) {
                    children.push(SvgNode::Element(clone_element(c)));
                }
            }
            Node::Text(t) => children.push(SvgNode::Text(t.text.to_string())),
            Node::Comment(c) => children.push(SvgNode::Comment(c.comment.to_string())),
            _ => {}
        }
    }

    SvgElement {
        name: value.name().to_string(),
        ns: value.name.ns.to_string(),
        attrs,
        children,
    }
}

/// Split a `style` attribute into `(property, value)` pairs. Semicolons
/// inside quotes or parentheses (`url(data:...;base64,...)`) do not split.
pub fn style_declarations(style: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    let mut push = |decl: &str| {
        if let Some((k, v)) = decl.split_once(':') {
            let (k, v) = (k.trim(), v.trim());
            if !k.is_empty() {
                out.push((k.to_ascii_lowercase(), v.to_string()));
            }
        }
    };
    for (i, c) in style.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                push(&style[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push(&style[start..]);
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub ns: String,
    pub local: String,
    pub value: String,
}

impl Attribute {
    pub fn qualified_name(&self) -> String {
        match self.prefix.as_deref() {
            Some(p) if !p.is_empty() => format!("{}:{}", p, self.local),
            _ => self.local.clone(),
        }
    }

    fn from_qualified(name: &str, value: &str) -> Self {
        let (prefix, local) = match name.split_once(':') {
            Some((p, l)) => (Some(p.to_string()), l.to_string()),
            None => (None, name.to_string()),
        };
        let ns = match (prefix.as_deref(), local.as_str()) {
            (None, "xmlns") | (Some("xmlns"), _) => XMLNS_NS,
            (Some("xlink"), _) => XLINK_NS,
            (Some("xml"), _) => XML_NS,
            _ => "",
        };
        Self {
            prefix,
            ns: ns.to_string(),
            local,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SvgNode {
    Element(SvgElement),
    Text(String),
    CData(String),
    Comment(String),
}

/// Owned element of the export clone.
#[derive(Debug, Clone, PartialEq)]
pub struct SvgElement {
    pub name: String,
    pub ns: String,
    pub attrs: Vec<Attribute>,
    pub children: Vec<SvgNode>,
}

impl SvgElement {
    /// A new element in the SVG namespace.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ns: SVG_NS.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.qualified_name() == name)
            .map(|a| a.value.as_str())
    }

    pub fn attr_ns(&self, ns: &str, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.ns == ns && a.local == local)
            .map(|a| a.value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|a| a.qualified_name() == name) {
            Some(a) => a.value = value.to_string(),
            None => self.attrs.push(Attribute::from_qualified(name, value)),
        }
    }

    /// Set a namespaced attribute. New attributes carry no prefix, so the
    /// serializer invents one.
    pub fn set_attr_ns(&mut self, ns: &str, local: &str, value: &str) {
        match self.attrs.iter_mut().find(|a| a.ns == ns && a.local == local) {
            Some(a) => a.value = value.to_string(),
            None => self.attrs.push(Attribute {
                prefix: None,
                ns: ns.to_string(),
                local: local.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|a| a.qualified_name() != name);
        before != self.attrs.len()
    }

    pub fn style_property(&self, name: &str) -> Option<String> {
        style_declarations(self.attr("style")?)
            .into_iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Set (or with `None`, remove) one inline style property. The `style`
    /// attribute is dropped once it has no declarations left.
    pub fn set_style_property(&mut self, name: &str, value: Option<&str>) {
        let mut decls: Vec<(String, String)> = self
            .attr("style")
            .map(style_declarations)
            .unwrap_or_default()
            .into_iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case(name))
            .collect();
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            decls.push((name.to_string(), v.to_string()));
        }
        if decls.is_empty() {
            self.remove_attr("style");
        } else {
            let text = decls
                .iter()
                .map(|(k, v)| format!("{}: {};", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            self.set_attr("style", &text);
        }
    }

    pub fn insert_first_child(&mut self, node: SvgNode) {
        self.children.insert(0, node);
    }

    pub fn append_child(&mut self, node: SvgNode) {
        self.children.push(node);
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &SvgElement> {
        self.children.iter().filter_map(|c| match c {
            SvgNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut SvgElement> {
        self.children.iter_mut().filter_map(|c| match c {
            SvgNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Pre-order walk over this element and all descendant elements.
    pub fn walk(&self, f: &mut dyn FnMut(&SvgElement)) {
        f(self);
        for child in self.child_elements() {
            child.walk(f);
        }
    }

    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut SvgElement)) {
        f(self);
        for child in self.child_elements_mut() {
            child.walk_mut(f);
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                SvgNode::Text(t) | SvgNode::CData(t) => out.push_str(t),
                SvgNode::Element(e) => out.push_str(&e.text_content()),
                SvgNode::Comment(_) => {}
            }
        }
        out
    }

    /// XML serialization of this element and its subtree.
    pub fn outer_markup(&self) -> String {
        let mut out = String::new();
        let mut generated = 0usize;
        self.write_markup(&mut out, &mut generated);
        out
    }

    fn write_markup(&self, out: &mut String, generated: &mut usize) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attrs {
            out.push(' ');
            let prefix = attr.prefix.as_deref().filter(|p| !p.is_empty());
            match (prefix, attr.ns.as_str()) {
                (Some(p), _) => {
                    out.push_str(p);
                    out.push(':');
                    out.push_str(&attr.local);
                }
                (None, "") | (None, XMLNS_NS) => out.push_str(&attr.local),
                (None, ns) => {
                    *generated += 1;
                    out.push_str(&format!(
                        "xmlns:NS{n}=\"{}\" NS{n}:{}",
                        escape(ns, true),
                        attr.local,
                        n = *generated
                    ));
                }
            }
            out.push_str("=\"");
            out.push_str(&escape(&attr.value, true));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                SvgNode::Element(e) => e.write_markup(out, generated),
                SvgNode::Text(t) => out.push_str(&escape(t, false)),
                SvgNode::CData(t) => {
                    out.push_str("<![CDATA[");
                    out.push_str(&t.replace("]]>", "]]]]><![CDATA[>"));
                    out.push_str("]]>");
                }
                SvgNode::Comment(c) => {
                    out.push_str("<!--");
                    out.push_str(c);
                    out.push_str("-->");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}
