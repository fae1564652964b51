//! Minimal HTML handling for status bodies
//!
//! Mastodon hands out sanitized HTML with a small, predictable vocabulary
//! (`p`, `br`, `a`, `span`). We only need to turn it into plain text, so a
//! streaming tag stripper and a separate entity decoder are enough.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref ANCHOR_REGEX: Regex =
        Regex::new(r"(?is)<a\s([^>]*)>(.*?)</a\s*>").expect("anchor pattern is valid");
    static ref HREF_REGEX: Regex =
        Regex::new(r#"(?i)\bhref\s*=\s*"([^"]*)""#).expect("href pattern is valid");
    static ref CLASS_REGEX: Regex =
        Regex::new(r#"(?i)\bclass\s*=\s*"([^"]*)""#).expect("class pattern is valid");
    static ref BREAK_REGEX: Regex = Regex::new(r"(?i)<br\s*/?>").expect("br pattern is valid");
    static ref PARAGRAPH_REGEX: Regex =
        Regex::new(r"(?i)</p>\s*<p(?:\s[^>]*)?>").expect("paragraph pattern is valid");
}

/// Replace links with their target URL
///
/// The visible link text is dropped and only the `href` survives. Mentions and
/// hashtags (anchors carrying a `mention` class) keep their text instead, so
/// `@user` and `#tag` read the same on the other side.
pub fn rewrite_anchors(html: &str) -> String {
    ANCHOR_REGEX
        .replace_all(html, |caps: &Captures| {
            let attributes = &caps[1];
            let inner = &caps[2];

            let is_mention = CLASS_REGEX
                .captures(attributes)
                .map(|c| c[1].split_whitespace().any(|class| class == "mention"))
                .unwrap_or(false);

            match HREF_REGEX.captures(attributes) {
                Some(href) if !is_mention => href[1].to_string(),
                _ => inner.to_string(),
            }
        })
        .into_owned()
}

/// Turn `<br>` into newlines and paragraph boundaries into blank lines
pub fn convert_breaks(html: &str) -> String {
    let text = BREAK_REGEX.replace_all(html, "\n");
    PARAGRAPH_REGEX.replace_all(&text, "\n\n").into_owned()
}

/// Remove every tag, keeping only text content
///
/// A `<` only opens a tag when followed by a letter, `/`, `!` or `?`, so plain
/// text such as `1 < 2` passes through untouched. Quoted attribute values may
/// contain `>`.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }

        let opens_tag = matches!(
            chars.peek(),
            Some(next) if next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?')
        );
        if !opens_tag {
            out.push(c);
            continue;
        }

        let mut quote: Option<char> = None;
        for inner in chars.by_ref() {
            match (quote, inner) {
                (Some(q), ch) if ch == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(inner),
                (None, '>') => break,
                (None, _) => {}
            }
        }
    }

    out
}

/// Decode HTML character references
///
/// Handles the named entities that show up in status bodies plus decimal and
/// hexadecimal numeric references. Anything unrecognised is left as written.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];

        match candidate.find(';') {
            Some(semi) if semi > 1 && semi <= 12 => {
                let name = &candidate[1..semi];
                match decode_reference(name) {
                    Some(decoded) => {
                        out.push(decoded);
                        rest = &candidate[semi + 1..];
                    }
                    None => {
                        out.push('&');
                        rest = &candidate[1..];
                    }
                }
            }
            _ => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    let decoded = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "middot" => '·',
        "bull" => '•',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "euro" => '€',
        "pound" => '£',
        "deg" => '°',
        "times" => '×',
        _ => return None,
    };
    Some(decoded)
}
