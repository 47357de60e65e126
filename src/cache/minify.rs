//! HTML whitespace and comment reduction.
//!
//! The contents of `script`, `style`, `pre`, `code` and `textarea` elements
//! and IE conditional comments are copied verbatim. Everything else has
//! comments stripped and whitespace runs collapsed to one space; whitespace
//! that only separates two block-level tags is dropped.

use super::hooks::Hooks;

const PRESERVED_ELEMENTS: [&str; 5] = ["script", "style", "pre", "code", "textarea"];

const BLOCK_ELEMENTS: &[&str] = &[
    "!doctype",
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "dd",
    "details",
    "dialog",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "head",
    "header",
    "hgroup",
    "hr",
    "html",
    "li",
    "link",
    "main",
    "meta",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "table",
    "tbody",
    "td",
    "tfoot",
    "th",
    "thead",
    "title",
    "tr",
    "ul",
];

const CONDITIONAL_OPEN: &str = "<!--[if";
const CONDITIONAL_CLOSE: &str = "<![endif]-->";

#[derive(Debug)]
enum Segment<'a> {
    Tag { text: String, block: bool },
    Text(String),
    Raw(&'a str),
}

/// Minify unless a registered hook vetoes it for this document.
pub fn minify_with(html: &str, hooks: &Hooks) -> String {
    if is_blank(html) {
        return String::new();
    }
    if !hooks.should_minify(html) {
        return html.to_string();
    }
    minify(html)
}

/// Minify a document.
pub fn minify(html: &str) -> String {
    if is_blank(html) {
        return String::new();
    }

    let segments = tokenize(html);
    let mut out = String::with_capacity(html.len());

    for (index, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Tag { text, .. } => out.push_str(text),
            Segment::Raw(raw) => out.push_str(raw),
            Segment::Text(text) => {
                let collapsed = collapse_whitespace(text);
                if collapsed == " " && separates_blocks(&segments, index) {
                    continue;
                }
                out.push_str(&collapsed);
            }
        }
    }

    out.trim_matches(|c: char| c.is_ascii_whitespace())
        .to_string()
}

fn is_blank(html: &str) -> bool {
    html.trim_matches(|c: char| c.is_ascii_whitespace())
        .is_empty()
}

fn tokenize(html: &str) -> Vec<Segment<'_>> {
    let bytes = html.as_bytes();
    let mut segments = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }

        let rest = &html[pos..];

        if rest.starts_with("<!--") {
            push_text(&mut segments, &html[text_start..pos]);
            if rest.starts_with(CONDITIONAL_OPEN) {
                let end = rest
                    .find(CONDITIONAL_CLOSE)
                    .map(|i| i + CONDITIONAL_CLOSE.len())
                    .unwrap_or(rest.len());
                segments.push(Segment::Raw(&rest[..end]));
                pos += end;
            } else {
                match rest[4..].find("-->") {
                    Some(i) => pos += 4 + i + 3,
                    None => {
                        segments.push(Segment::Raw(rest));
                        pos = bytes.len();
                    }
                }
            }
            text_start = pos;
            continue;
        }

        let tag_len = match opens_tag(rest).then(|| tag_length(rest)).flatten() {
            Some(len) => len,
            None => {
                pos += 1;
                continue;
            }
        };

        push_text(&mut segments, &html[text_start..pos]);
        let raw_tag = &rest[..tag_len];
        let name = tag_name(raw_tag);
        let closing = raw_tag.starts_with("</");
        segments.push(Segment::Tag {
            text: collapse_tag(raw_tag),
            block: BLOCK_ELEMENTS.contains(&name.as_str()),
        });
        pos += tag_len;

        if !closing && !raw_tag.ends_with("/>") && PRESERVED_ELEMENTS.contains(&name.as_str()) {
            let body = &html[pos..];
            let end = find_closing_tag(body, &name).unwrap_or(body.len());
            if end > 0 {
                segments.push(Segment::Raw(&body[..end]));
            }
            pos += end;
        }

        text_start = pos;
    }

    push_text(&mut segments, &html[text_start..]);
    segments
}

fn push_text<'a>(segments: &mut Vec<Segment<'a>>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(previous)) = segments.last_mut() {
        previous.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}

/// `<` followed by a letter, `/letter` or `!` starts markup; anything else is text.
fn opens_tag(rest: &str) -> bool {
    let bytes = rest.as_bytes();
    match bytes.get(1) {
        Some(b) if b.is_ascii_alphabetic() || *b == b'!' => true,
        Some(b'/') => bytes.get(2).is_some_and(u8::is_ascii_alphabetic),
        _ => false,
    }
}

/// Length of the tag starting at `rest`, honoring quoted attribute values.
fn tag_length(rest: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in rest.as_bytes().iter().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i + 1),
            None => {}
        }
    }
    None
}

fn tag_name(raw_tag: &str) -> String {
    raw_tag
        .trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '!' || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

fn find_closing_tag(body: &str, name: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut from = 0;
    while let Some(offset) = body[from..].find("</") {
        let start = from + offset;
        let name_start = start + 2;
        let name_end = name_start + name.len();
        if name_end <= bytes.len()
            && bytes[name_start..name_end].eq_ignore_ascii_case(name.as_bytes())
            && bytes
                .get(name_end)
                .is_none_or(|b| *b == b'>' || b.is_ascii_whitespace())
        {
            return Some(start);
        }
        from = start + 2;
    }
    None
}

/// Collapse whitespace between attributes, leaving quoted values intact.
fn collapse_tag(raw_tag: &str) -> String {
    let mut out = String::with_capacity(raw_tag.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in raw_tag.chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && c != '>' {
            out.push(' ');
        }
        pending_space = false;
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }

    out
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn separates_blocks(segments: &[Segment<'_>], index: usize) -> bool {
    let is_block = |segment: Option<&Segment<'_>>| {
        matches!(segment, Some(Segment::Tag { block: true, .. }))
    };
    index > 0 && is_block(segments.get(index - 1)) && is_block(segments.get(index + 1))
}
