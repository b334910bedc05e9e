/// Media query and `@supports` evaluation for the default screen environment.
///
/// Both are tokenized with `cssparser`. Anything that fails to parse does not
/// match, the way browsers treat unknown media features.
use crate::platform::DeviceMetrics;
use cssparser::{ParseError, Parser, ParserInput, Token};

const EM_PX: f32 = 16.0;

/// Properties an `@supports (prop: value)` test reports as supported.
const KNOWN_PROPERTIES: &[&str] = &[
    "align-items", "animation", "background", "background-color", "background-image",
    "border", "border-radius", "bottom", "box-shadow", "box-sizing", "clip", "clip-path",
    "clip-rule", "color", "column-gap", "content", "cursor", "cx", "cy", "d", "display",
    "dominant-baseline", "fill", "fill-opacity", "fill-rule", "filter", "flex",
    "flex-direction", "flood-color", "flood-opacity", "font", "font-family",
    "font-size", "font-stretch", "font-style", "font-variant", "font-weight", "gap",
    "grid", "grid-template-columns", "height", "isolation", "justify-content", "left",
    "letter-spacing", "lighting-color", "line-height", "margin", "marker", "marker-end",
    "marker-mid", "marker-start", "mask", "max-height", "max-width", "min-height",
    "min-width", "mix-blend-mode", "object-fit", "opacity", "outline", "overflow",
    "padding", "paint-order", "pointer-events", "position", "r", "right", "row-gap",
    "rx", "ry", "shape-rendering", "stop-color", "stop-opacity", "stroke",
    "stroke-dasharray", "stroke-dashoffset", "stroke-linecap", "stroke-linejoin",
    "stroke-miterlimit", "stroke-opacity", "stroke-width", "text-align", "text-anchor",
    "text-decoration", "text-rendering", "text-shadow", "top", "transform",
    "transform-box", "transform-origin", "transition", "vector-effect", "visibility",
    "white-space", "width", "word-spacing", "writing-mode", "x", "y", "z-index",
];

/// Whether a comma separated media query list matches. An empty list matches.
pub fn matches_media_list(list: &str, device: &DeviceMetrics, media_type: &str) -> bool {
    let list = list.trim();
    if list.is_empty() {
        return true;
    }
    let mut input = ParserInput::new(list);
    let mut parser = Parser::new(&mut input);
    let results: Result<Vec<bool>, ParseError<'_, ()>> =
        parser.parse_comma_separated(|i| Ok(query_matches(i, device, media_type)));
    results.map(|r| r.into_iter().any(|m| m)).unwrap_or(false)
}

fn query_matches(input: &mut Parser<'_, '_>, device: &DeviceMetrics, media_type: &str) -> bool {
    let matched = parse_query(input, device, media_type).unwrap_or(false);
    while input.next().is_ok() {}
    matched
}

fn parse_query<'i>(
    input: &mut Parser<'i, '_>,
    device: &DeviceMetrics,
    media_type: &str,
) -> Result<bool, ParseError<'i, ()>> {
    let negated = input.try_parse(|i| i.expect_ident_matching("not")).is_ok();
    if !negated {
        let _ = input.try_parse(|i| i.expect_ident_matching("only"));
    }

    let mut matched = true;
    let mut need_and = false;
    if let Ok(ty) = input.try_parse(|i| i.expect_ident_cloned()) {
        matched = ty.eq_ignore_ascii_case("all") || ty.eq_ignore_ascii_case(media_type);
        need_and = true;
    }

    while !input.is_exhausted() {
        if need_and {
            input.expect_ident_matching("and")?;
        }
        input.expect_parenthesis_block()?;
        let feature = input.parse_nested_block(|i| feature_matches(i, device))?;
        matched = matched && feature;
        need_and = true;
    }

    Ok(matched != negated)
}

#[derive(Clone, Copy)]
enum Range {
    Min,
    Max,
    Exact,
}

impl Range {
    fn compare(self, actual: f32, expected: f32) -> bool {
        match self {
            Range::Min => actual >= expected,
            Range::Max => actual <= expected,
            Range::Exact => (actual - expected).abs() < f32::EPSILON,
        }
    }
}

fn feature_matches<'i>(
    input: &mut Parser<'i, '_>,
    device: &DeviceMetrics,
) -> Result<bool, ParseError<'i, ()>> {
    let name = input.expect_ident_cloned()?.to_ascii_lowercase();
    if input.is_exhausted() {
        return Ok(boolean_feature(&name, device));
    }
    input.expect_colon()?;
    let value = input.next()?.clone();

    let (range, feature) = if let Some(f) = name.strip_prefix("min-") {
        (Range::Min, f)
    } else if let Some(f) = name.strip_prefix("max-") {
        (Range::Max, f)
    } else {
        (Range::Exact, name.as_str())
    };

    let matched = match feature {
        "width" | "device-width" => {
            length_px(&value).map(|v| range.compare(device.width as f32, v))
        }
        "height" | "device-height" => {
            length_px(&value).map(|v| range.compare(device.height as f32, v))
        }
        "resolution" => resolution_dppx(&value).map(|v| range.compare(device.pixel_ratio(), v)),
        "color" => number(&value).map(|v| range.compare(8.0, v)),
        "monochrome" => number(&value).map(|v| range.compare(0.0, v)),
        "orientation" => ident(&value).map(|o| match o.as_str() {
            "portrait" => device.is_portrait(),
            "landscape" => !device.is_portrait(),
            _ => false,
        }),
        "prefers-color-scheme" => ident(&value).map(|s| s == "light"),
        "hover" | "any-hover" => ident(&value).map(|h| match h.as_str() {
            "hover" => !device.touch,
            "none" => device.touch,
            _ => false,
        }),
        "pointer" | "any-pointer" => ident(&value).map(|p| match p.as_str() {
            "fine" => !device.touch,
            "coarse" => device.touch,
            _ => false,
        }),
        _ => None,
    };
    Ok(matched.unwrap_or(false))
}

fn boolean_feature(name: &str, device: &DeviceMetrics) -> bool {
    match name {
        "width" | "height" | "color" | "orientation" | "resolution" | "pointer"
        | "any-pointer" => true,
        "hover" | "any-hover" => !device.touch,
        _ => false,
    }
}

fn length_px(token: &Token<'_>) -> Option<f32> {
    match token {
        Token::Number { value, .. } if *value == 0.0 => Some(0.0),
        Token::Dimension { value, unit, .. } => {
            let unit = unit.to_ascii_lowercase();
            match unit.as_str() {
                "px" => Some(*value),
                "em" | "rem" => Some(*value * EM_PX),
                "pt" => Some(*value * 96.0 / 72.0),
                "in" => Some(*value * 96.0),
                "cm" => Some(*value * 96.0 / 2.54),
                "mm" => Some(*value * 96.0 / 25.4),
                _ => None,
            }
        }
        _ => None,
    }
}

fn resolution_dppx(token: &Token<'_>) -> Option<f32> {
    match token {
        Token::Dimension { value, unit, .. } => {
            let unit = unit.to_ascii_lowercase();
            match unit.as_str() {
                "dppx" | "x" => Some(*value),
                "dpi" => Some(*value / 96.0),
                "dpcm" => Some(*value * 2.54 / 96.0),
                _ => None,
            }
        }
        _ => None,
    }
}

fn number(token: &Token<'_>) -> Option<f32> {
    match token {
        Token::Number { value, .. } => Some(*value),
        _ => None,
    }
}

fn ident(token: &Token<'_>) -> Option<String> {
    match token {
        Token::Ident(s) => Some(s.to_ascii_lowercase()),
        _ => None,
    }
}

/// Evaluate an `@supports` condition (`not`, `and`, `or`, declarations and
/// `selector()` tests).
pub fn evaluate_supports(condition: &str) -> bool {
    let mut input = ParserInput::new(condition);
    let mut parser = Parser::new(&mut input);
    parser
        .parse_entirely(|i| supports_condition(i))
        .unwrap_or(false)
}

fn supports_condition<'i>(input: &mut Parser<'i, '_>) -> Result<bool, ParseError<'i, ()>> {
    if input.try_parse(|i| i.expect_ident_matching("not")).is_ok() {
        return supports_in_parens(input).map(|v| !v);
    }

    let mut result = supports_in_parens(input)?;
    let mut combinator: Option<bool> = None;
    while !input.is_exhausted() {
        let word = input.expect_ident_cloned()?;
        let is_and = if word.eq_ignore_ascii_case("and") {
            true
        } else if word.eq_ignore_ascii_case("or") {
            false
        } else {
            return Err(input.new_custom_error(()));
        };
        // `a and b or c` is invalid without parentheses
        if combinator.is_some_and(|c| c != is_and) {
            return Err(input.new_custom_error(()));
        }
        combinator = Some(is_and);
        let next = supports_in_parens(input)?;
        result = if is_and { result && next } else { result || next };
    }
    Ok(result)
}

fn supports_in_parens<'i>(input: &mut Parser<'i, '_>) -> Result<bool, ParseError<'i, ()>> {
    if input
        .try_parse(|i| i.expect_function_matching("selector"))
        .is_ok()
    {
        return input.parse_nested_block(|i| {
            let start = i.position();
            while i.next().is_ok() {}
            Ok(scraper::Selector::parse(i.slice_from(start).trim()).is_ok())
        });
    }

    input.expect_parenthesis_block()?;
    input.parse_nested_block(|i| {
        if let Ok(nested) = i.try_parse(|i| supports_condition(i)) {
            return Ok(nested);
        }
        let name = i.expect_ident_cloned()?.to_ascii_lowercase();
        i.expect_colon()?;
        let start = i.position();
        while i.next().is_ok() {}
        let value = i.slice_from(start).trim().to_string();
        Ok(declaration_supported(&name, &value))
    })
}

fn declaration_supported(name: &str, value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    if name.starts_with("--") {
        return true;
    }
    let name = name.strip_prefix("-webkit-").unwrap_or(name);
    KNOWN_PROPERTIES.binary_search(&name).is_ok()
}
