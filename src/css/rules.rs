//! Stylesheet text to a rule tree.
//!
//! Only the structure the inliner needs is recovered: selector text and raw
//! declaration text for style rules, the condition text of `@media` and
//! `@supports`, the target of `@import`, and the raw text of everything
//! else so it can be passed through untouched.

use cssparser::{
    match_ignore_ascii_case, AtRuleParser, CowRcStr, ParseError, Parser, ParserInput,
    ParserState, QualifiedRuleParser, StyleSheetParser,
};
use log::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum CssRule {
    Style {
        selector: String,
        declarations: String,
    },
    FontFace {
        declarations: String,
    },
    Media {
        condition: String,
        rules: Vec<CssRule>,
    },
    Supports {
        condition: String,
        rules: Vec<CssRule>,
    },
    Import {
        href: String,
        media: String,
    },
    /// Any other at-rule (`@keyframes`, `@page`, ...). `@charset` is consumed
    /// by the tokenizer and never shows up.
    Other {
        text: String,
    },
}

impl CssRule {
    /// Serialized rule text.
    pub fn css_text(&self) -> String {
        match self {
            CssRule::Style {
                selector,
                declarations,
            } => format!("{} {{ {} }}", selector, declarations),
            CssRule::FontFace { declarations } => format!("@font-face {{ {} }}", declarations),
            CssRule::Media { condition, rules } => {
                format!("@media {} {{\n{}\n}}", condition, nested_text(rules))
            }
            CssRule::Supports { condition, rules } => {
                format!("@supports {} {{\n{}\n}}", condition, nested_text(rules))
            }
            CssRule::Import { href, media } if media.is_empty() => {
                format!("@import url(\"{}\");", href)
            }
            CssRule::Import { href, media } => format!("@import url(\"{}\") {};", href, media),
            CssRule::Other { text } => text.clone(),
        }
    }
}

fn nested_text(rules: &[CssRule]) -> String {
    rules
        .iter()
        .map(|r| format!("  {}", r.css_text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a stylesheet. Invalid rules are skipped.
pub fn parse_stylesheet(text: &str) -> Vec<CssRule> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    let mut rule_parser = RuleParser;
    parse_rule_list(&mut parser, &mut rule_parser)
}

fn parse_rule_list<'i>(input: &mut Parser<'i, '_>, rule_parser: &mut RuleParser) -> Vec<CssRule> {
    StyleSheetParser::new(input, rule_parser)
        .filter_map(|r| match r {
            Ok(rule) => Some(rule),
            Err((e, text)) => {
                debug!("Invalid rule; ignoring {:?}: {:?}", text, e.kind);
                None
            }
        })
        .collect()
}

/// Consume the rest of `input` and return its source text.
fn rest_of<'i>(input: &mut Parser<'i, '_>) -> String {
    let start = input.position();
    while input.next().is_ok() {}
    input.slice_from(start).trim().to_string()
}

struct RuleParser;

enum AtPrelude {
    FontFace,
    Media(String),
    Supports(String),
    Import { href: String, media: String },
    Other { name: String, prelude: String },
}

impl<'i> QualifiedRuleParser<'i> for RuleParser {
    type Prelude = String;
    type QualifiedRule = CssRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let selector = rest_of(input);
        if selector.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(selector)
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        Ok(CssRule::Style {
            selector: prelude,
            declarations: rest_of(input),
        })
    }
}

impl<'i> AtRuleParser<'i> for RuleParser {
    type Prelude = AtPrelude;
    type AtRule = CssRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let prelude = match_ignore_ascii_case! {
            &name,
            "font-face" => {
                rest_of(input);
                AtPrelude::FontFace
            },
            "media" => AtPrelude::Media(rest_of(input)),
            "supports" => AtPrelude::Supports(rest_of(input)),
            "import" => {
                let href = input.expect_url_or_string()?.as_ref().to_owned();
                AtPrelude::Import { href, media: rest_of(input) }
            },
            _ => AtPrelude::Other { name: name.to_string(), prelude: rest_of(input) },
        };
        Ok(prelude)
    }

    fn rule_without_block(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
    ) -> Result<Self::AtRule, ()> {
        match prelude {
            AtPrelude::Import { href, media } => Ok(CssRule::Import { href, media }),
            AtPrelude::Other { name, prelude } if prelude.is_empty() => Ok(CssRule::Other {
                text: format!("@{};", name),
            }),
            AtPrelude::Other { name, prelude } => Ok(CssRule::Other {
                text: format!("@{} {};", name, prelude),
            }),
            _ => Err(()),
        }
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        let rule = match prelude {
            AtPrelude::FontFace => CssRule::FontFace {
                declarations: rest_of(input),
            },
            AtPrelude::Media(condition) => CssRule::Media {
                condition,
                rules: parse_rule_list(input, self),
            },
            AtPrelude::Supports(condition) => CssRule::Supports {
                condition,
                rules: parse_rule_list(input, self),
            },
            AtPrelude::Other { name, prelude } => {
                let body = rest_of(input);
                let head = if prelude.is_empty() {
                    format!("@{}", name)
                } else {
                    format!("@{} {}", name, prelude)
                };
                CssRule::Other {
                    text: format!("{} {{ {} }}", head, body),
                }
            }
            AtPrelude::Import { .. } => {
                debug!("@import with a block at {:?}", start.source_location());
                return Err(input.new_custom_error(()));
            }
        };
        Ok(rule)
    }
}
