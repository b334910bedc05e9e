//! CSS inlining: collect the page's rules, keep the ones that apply to the
//! graphic, and embed the fonts they reference.

pub mod fonts;
pub mod inline;
pub mod loader;
pub mod rules;

pub use fonts::{detect_css_font, font_mime_type, FontInfo};
pub(crate) use inline::inline_css;
pub use loader::LoadedStylesheet;
pub use rules::{parse_stylesheet, CssRule};

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

pub type SelectorRemap = Arc<dyn Fn(&str) -> String + Send + Sync>;
pub type ModifyStyle = Arc<dyn Fn(&str) -> String + Send + Sync>;
pub type ModifyCss = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Options for the CSS inlining stage.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct CssOptions {
    /// Drop rules that match nothing in the graphic instead of passing them through
    pub exclude_unused_css: bool,
    /// Fonts to embed. When set, `@font-face` rules are not scanned.
    pub fonts: Option<Vec<FontInfo>>,
    /// Embed every `src` of a `@font-face` rule. Not implemented; setting it
    /// makes the export fail.
    pub inline_all_fonts: bool,
    #[serde(skip)]
    pub selector_remap: Option<SelectorRemap>,
    #[serde(skip)]
    pub modify_style: Option<ModifyStyle>,
    /// Replaces both `selector_remap` and `modify_style`
    #[serde(skip)]
    pub modify_css: Option<ModifyCss>,
}

impl CssOptions {
    /// Text for a style rule that matched.
    pub fn generate_css(&self, selector: &str, properties: &str) -> String {
        if let Some(modify) = &self.modify_css {
            return modify(selector, properties);
        }
        let selector = match &self.selector_remap {
            Some(remap) => remap(selector),
            None => selector.to_string(),
        };
        let properties = match &self.modify_style {
            Some(modify) => modify(properties),
            None => properties.to_string(),
        };
        format!("{}{{{}}}", selector, properties)
    }
}

impl fmt::Debug for CssOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CssOptions")
            .field("exclude_unused_css", &self.exclude_unused_css)
            .field("fonts", &self.fonts)
            .field("inline_all_fonts", &self.inline_all_fonts)
            .field("selector_remap", &self.selector_remap.is_some())
            .field("modify_style", &self.modify_style.is_some())
            .field("modify_css", &self.modify_css.is_some())
            .finish()
    }
}
