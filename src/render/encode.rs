use crate::platform::decode_data_uri;
use crate::render::DOCTYPE;
use base64::Engine as _;
use percent_encoding::{percent_decode, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything `encodeURIComponent` escapes.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Turn text into one byte per code unit of its UTF-8 form, ready for
/// base64.
///
/// Percent-encode everything outside the unreserved set, collapse each
/// `%XX` back into the byte it names, except that a collapsed `%` is kept
/// as `%25`, then decode the escapes that remain.
pub fn reencode(text: &str) -> Vec<u8> {
    let encoded = utf8_percent_encode(text, URI_COMPONENT).to_string();

    let bytes = encoded.as_bytes();
    let mut collapsed = Vec::with_capacity(text.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let escape = bytes
            .get(i + 1..i + 3)
            .filter(|_| bytes[i] == b'%')
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escape {
            Some(b'%') => {
                collapsed.extend_from_slice(b"%25");
                i += 3;
            }
            Some(b) => {
                collapsed.push(b);
                i += 3;
            }
            None => {
                collapsed.push(bytes[i]);
                i += 1;
            }
        }
    }

    percent_decode(&collapsed).collect()
}

/// `data:image/svg+xml;base64,...` for inlined markup, doctype included.
pub fn inlined_svg_to_data_uri(markup: &str) -> String {
    let document = format!("{}{}", DOCTYPE, markup);
    format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(reencode(&document))
    )
}

/// The markup carried by an SVG data URI, doctype included.
pub fn data_uri_to_markup(uri: &str) -> Option<String> {
    let (_, bytes) = decode_data_uri(uri)?;
    String::from_utf8(bytes).ok()
}
