//! Content sniffing for response bodies.
//!
//! Declared `Content-Type` headers are unreliable during development (static
//! servers guess from extensions, error pages are often `text/plain`), so the
//! decision to inject is made from the body bytes alone.
//!
//! Detection follows the WHATWG MIME sniffing order: byte order marks, HTML
//! tag signatures, XML and SVG, document and media magic numbers, then a
//! binary check. Text that passes all of these is split into stylesheets,
//! scripts, JSON and plain text with lexical heuristics.

/// Number of leading bytes considered.
pub const SNIFF_LEN: usize = 512;

/// Classification of a response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sniffed {
    /// No bytes at all.
    Empty,
    /// HTML document or fragment with a recognised leading tag.
    Html,
    /// Text that is not recognised as any structured format.
    PlainText,
    /// CSS stylesheet.
    Css,
    /// JavaScript source.
    JavaScript,
    /// JSON document.
    Json,
    /// XML document.
    Xml,
    /// Anything else, with the detected MIME type.
    Other(&'static str),
}

impl Sniffed {
    /// Whether the reload script may be appended to this body.
    pub fn is_injectable(self) -> bool {
        matches!(self, Self::Html | Self::PlainText)
    }
}

/// HTML signatures, matched case-insensitively after leading whitespace and
/// followed by a space or `>`.
const HTML_SIGNATURES: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Exact-prefix magic numbers.
const MAGIC: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\r\n\x1A\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"ID3", "audio/mpeg"),
    (b"OggS\x00", "application/ogg"),
    (b"MThd\x00\x00\x00\x06", "audio/midi"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
    (b"OTTO", "font/otf"),
    (b"\x00\x01\x00\x00", "font/ttf"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

/// Classify a body from its first [`SNIFF_LEN`] bytes.
pub fn sniff(body: &[u8]) -> Sniffed {
    let data = &body[..body.len().min(SNIFF_LEN)];
    if data.is_empty() {
        return Sniffed::Empty;
    }

    if data.starts_with(b"\xFE\xFF") {
        return Sniffed::Other("text/plain; charset=utf-16be");
    }
    if data.starts_with(b"\xFF\xFE") {
        return Sniffed::Other("text/plain; charset=utf-16le");
    }
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);

    let text = trim_leading_whitespace(data);
    if HTML_SIGNATURES
        .iter()
        .any(|sig| starts_with_tag(text, sig))
    {
        return Sniffed::Html;
    }
    if text.starts_with(b"<?xml") {
        return Sniffed::Xml;
    }
    if starts_with_tag(text, b"<SVG") {
        return Sniffed::Other("image/svg+xml");
    }

    if let Some(mime) = magic(data) {
        return Sniffed::Other(mime);
    }
    if data.iter().copied().any(is_binary_byte) {
        return Sniffed::Other("application/octet-stream");
    }

    classify_text(text)
}

fn magic(data: &[u8]) -> Option<&'static str> {
    if let Some((_, mime)) = MAGIC.iter().find(|(sig, _)| data.starts_with(sig)) {
        return Some(*mime);
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") {
        match &data[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wave"),
            b"AVI " => return Some("video/avi"),
            _ => {}
        }
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some("video/mp4");
    }
    None
}

/// Control bytes that never appear in text.
fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|&b| !is_whitespace(b))
        .unwrap_or(data.len());
    &data[start..]
}

/// Case-insensitive tag prefix followed by a tag-terminating byte.
fn starts_with_tag(data: &[u8], sig: &[u8]) -> bool {
    if data.len() <= sig.len() {
        return false;
    }
    if !data[..sig.len()].eq_ignore_ascii_case(sig) {
        return false;
    }
    matches!(data[sig.len()], b' ' | b'>' | b'\t' | b'\n' | b'\r' | b'/')
}

/// Split text into stylesheets, scripts, JSON and plain text.
fn classify_text(text: &[u8]) -> Sniffed {
    let Ok(text) = std::str::from_utf8(text).or_else(|e| {
        // The window may cut a multi-byte character in half
        std::str::from_utf8(&text[..e.valid_up_to()])
    }) else {
        return Sniffed::PlainText;
    };

    let Some(text) = skip_block_comments(text) else {
        // Unterminated leading comment: a license header longer than the window
        return Sniffed::JavaScript;
    };
    if text.is_empty() {
        return Sniffed::PlainText;
    }

    if is_json(text) {
        Sniffed::Json
    } else if is_javascript(text) {
        Sniffed::JavaScript
    } else if is_css(text) {
        Sniffed::Css
    } else {
        Sniffed::PlainText
    }
}

/// Skip leading `/* ... */` comments. `None` if one is not closed.
fn skip_block_comments(mut text: &str) -> Option<&str> {
    loop {
        text = text.trim_start();
        let Some(rest) = text.strip_prefix("/*") else {
            return Some(text);
        };
        let end = rest.find("*/")?;
        text = &rest[end + 2..];
    }
}

fn is_json(text: &str) -> bool {
    if let Some(rest) = text.strip_prefix('{') {
        let rest = rest.trim_start();
        return rest.starts_with('"') || rest.starts_with('}');
    }
    if let Some(rest) = text.strip_prefix('[') {
        let rest = rest.trim_start();
        return rest.starts_with(['"', '{', '[', ']', '-'])
            || rest.starts_with(|c: char| c.is_ascii_digit())
            || ["true", "false", "null"]
                .iter()
                .any(|literal| rest.starts_with(literal));
    }
    false
}

const SCRIPT_PREFIXES: &[&str] = &[
    "\"use strict\"",
    "'use strict'",
    "//",
    "#!",
    "(function",
    "(()",
    "(async",
    "!function",
];

const GLOBAL_OBJECTS: &[&str] = &[
    "window",
    "document",
    "console",
    "module",
    "exports",
    "require",
    "globalThis",
    "self",
];

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Leading identifier and the text after it.
fn split_ident(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !is_ident_char(c))
        .unwrap_or(text.len());
    text.split_at(end)
}

fn is_javascript(text: &str) -> bool {
    if SCRIPT_PREFIXES.iter().any(|p| text.starts_with(p)) {
        return true;
    }

    let (word, rest) = split_ident(text);
    let after = rest.trim_start();
    let spaced = rest.starts_with(char::is_whitespace);
    let ident_follows = |s: &str| !split_ident(s).0.is_empty();

    let keyword = match word {
        "function" => after.starts_with(['(', '*']) || (spaced && ident_follows(after)),
        "const" | "let" | "var" => {
            spaced && (after.starts_with(['{', '[']) || declaration_follows(after))
        }
        "import" => {
            spaced
                && (after.starts_with(['{', '*', '"', '\''])
                    || first_line(after).contains(" from "))
        }
        "export" => {
            let (next, _) = split_ident(after);
            spaced
                && (after.starts_with(['{', '*'])
                    || matches!(
                        next,
                        "default" | "const" | "let" | "var" | "function" | "class" | "async"
                    ))
        }
        "class" => {
            let (_, tail) = split_ident(after);
            let tail = tail.trim_start();
            spaced && ident_follows(after) && (tail.starts_with('{') || tail.starts_with("extends"))
        }
        "async" => after.starts_with('(') || (spaced && after.starts_with("function")),
        "if" | "for" | "while" | "switch" => after.starts_with('('),
        w if GLOBAL_OBJECTS.contains(&w) => rest.starts_with(['.', '(', '[']),
        _ => false,
    };

    keyword || is_dotted_call(text)
}

/// `name =`, `name;` or `name,` after a declaration keyword.
fn declaration_follows(text: &str) -> bool {
    let (name, rest) = split_ident(text);
    let rest = rest.trim_start();
    !name.is_empty()
        && (rest.starts_with([';', ',']) || (rest.starts_with('=') && !rest.starts_with("==")))
}

/// `a.b(` or `$.c.d (` at the start of the text.
fn is_dotted_call(text: &str) -> bool {
    let (head, mut rest) = split_ident(text);
    if head.is_empty() {
        return false;
    }
    let mut segments = 0;
    while let Some(tail) = rest.strip_prefix('.') {
        let (ident, tail) = split_ident(tail);
        if ident.is_empty() {
            return false;
        }
        segments += 1;
        rest = tail;
    }
    segments > 0 && rest.trim_start().starts_with('(')
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

const CSS_AT_RULES: &[&str] = &[
    "@charset",
    "@import",
    "@media",
    "@font-face",
    "@keyframes",
    "@supports",
    "@layer",
    "@namespace",
    "@page",
    ":root",
];

/// Selector list followed by a declaration block.
fn is_css(text: &str) -> bool {
    if CSS_AT_RULES.iter().any(|rule| text.starts_with(rule)) {
        return true;
    }

    let Some(open) = text.find('{') else {
        return false;
    };
    let selector = text[..open].trim();
    if selector.is_empty() {
        return false;
    }
    let selector_chars = selector.chars().all(|c| {
        c.is_alphanumeric() || c.is_whitespace() || ".#,:>*+~[]=\"'_-()|^$@%".contains(c)
    });
    if !selector_chars
        || (selector.contains('=') && !selector.contains('['))
        || !looks_like_selector(selector)
    {
        return false;
    }

    let block = &text[open + 1..];
    let block = block.find('}').map_or(block, |close| &block[..close]);
    let block = block.trim();
    block.is_empty() || block.contains(':')
}

/// Element names accepted as bare type selectors.
const TYPE_SELECTORS: &[&str] = &[
    "a", "article", "aside", "blockquote", "body", "button", "code", "div", "footer", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "html", "img", "input", "label", "li", "main",
    "nav", "ol", "p", "pre", "section", "span", "table", "td", "th", "tr", "ul",
];

/// A class, id, attribute, pseudo-class or combinator, or only known or
/// custom element names. Prose like `Hello world` is neither.
fn looks_like_selector(selector: &str) -> bool {
    if selector.contains(['.', '#', '[', ':', '*', '>', '+', '~']) {
        return true;
    }
    selector
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .all(|word| {
            TYPE_SELECTORS.contains(&word)
                || (word.contains('-')
                    && word
                        .bytes()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sniff_empty() {
        assert_eq!(sniff(b""), Sniffed::Empty);
    }

    #[test]
    fn test_sniff_html_document() {
        assert_eq!(
            sniff(b"<html><body>hello world</body></html>"),
            Sniffed::Html
        );
        assert_eq!(sniff(b"<!DOCTYPE html>\n<html></html>"), Sniffed::Html);
        assert_eq!(sniff(b"<!doctype html><title>x</title>"), Sniffed::Html);
    }

    #[test]
    fn test_sniff_html_after_whitespace_and_bom() {
        assert_eq!(sniff(b"  \n\t<div class=\"x\">hi</div>"), Sniffed::Html);
        assert_eq!(sniff(b"\xEF\xBB\xBF<!DOCTYPE html>"), Sniffed::Html);
    }

    #[test]
    fn test_sniff_html_signature_needs_terminator() {
        // "<abbr" is not "<a" followed by a terminator
        assert_eq!(sniff(b"<abbr>x</abbr>"), Sniffed::PlainText);
        assert_eq!(sniff(b"<p>text</p>"), Sniffed::Html);
        assert_eq!(sniff(b"<br/>"), Sniffed::Html);
    }

    #[test]
    fn test_sniff_plain_text() {
        assert_eq!(sniff(b"some error"), Sniffed::PlainText);
        assert_eq!(sniff(b"404 page not found\n"), Sniffed::PlainText);
        assert_eq!(sniff(b"let me explain"), Sniffed::PlainText);
        assert_eq!(sniff(b"if you want to"), Sniffed::PlainText);
        assert_eq!(sniff(b"import this"), Sniffed::PlainText);
        assert_eq!(sniff(b"hello {world}"), Sniffed::PlainText);
        assert_eq!(sniff(b"Hello world {key: value}"), Sniffed::PlainText);
        assert_eq!(sniff(b"config loaded {port: 3000}"), Sniffed::PlainText);
        assert_eq!(sniff(b"e.g. (see below)"), Sniffed::PlainText);
    }

    #[test]
    fn test_sniff_utf16_is_not_injectable() {
        let sniffed = sniff(b"\xFF\xFEh\x00i\x00");
        assert_eq!(sniffed, Sniffed::Other("text/plain; charset=utf-16le"));
        assert!(!sniffed.is_injectable());
    }

    #[test]
    fn test_sniff_xml_and_svg() {
        assert_eq!(sniff(b"<?xml version=\"1.0\"?><feed/>"), Sniffed::Xml);
        assert_eq!(
            sniff(b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>"),
            Sniffed::Other("image/svg+xml")
        );
    }

    #[test]
    fn test_sniff_images() {
        assert_eq!(
            sniff(b"\x00\x00\x01\x00\x01\x00\x10\x10"),
            Sniffed::Other("image/x-icon")
        );
        assert_eq!(
            sniff(b"\x89PNG\r\n\x1A\n\x00\x00\x00\rIHDR"),
            Sniffed::Other("image/png")
        );
        assert_eq!(sniff(b"GIF89a\x01\x00"), Sniffed::Other("image/gif"));
        assert_eq!(sniff(b"\xFF\xD8\xFF\xE0"), Sniffed::Other("image/jpeg"));
        assert_eq!(
            sniff(b"RIFF\x24\x00\x00\x00WEBPVP8 "),
            Sniffed::Other("image/webp")
        );
    }

    #[test]
    fn test_sniff_documents_fonts_archives() {
        assert_eq!(sniff(b"%PDF-1.7\n"), Sniffed::Other("application/pdf"));
        assert_eq!(sniff(b"wOF2\x00\x01"), Sniffed::Other("font/woff2"));
        assert_eq!(
            sniff(b"\x1F\x8B\x08\x00\x00"),
            Sniffed::Other("application/x-gzip")
        );
        assert_eq!(sniff(b"PK\x03\x04\x14\x00"), Sniffed::Other("application/zip"));
        assert_eq!(sniff(b"\x00asm\x01\x00\x00\x00"), Sniffed::Other("application/wasm"));
        assert_eq!(
            sniff(b"\x00\x00\x00\x18ftypmp42"),
            Sniffed::Other("video/mp4")
        );
    }

    #[test]
    fn test_sniff_binary_control_bytes() {
        assert_eq!(
            sniff(b"abc\x01\x02def"),
            Sniffed::Other("application/octet-stream")
        );
    }

    #[test]
    fn test_sniff_css() {
        assert_eq!(sniff(b"body { color: red }"), Sniffed::Css);
        assert_eq!(sniff(b"a:hover{text-decoration:none}"), Sniffed::Css);
        assert_eq!(sniff(b"@media screen { .x { margin: 0 } }"), Sniffed::Css);
        assert_eq!(sniff(b"/* license */\nbody{margin:0}"), Sniffed::Css);
        assert_eq!(sniff(b"input[type=\"text\"] { width: 100% }"), Sniffed::Css);
        assert_eq!(sniff(b".nav > li.active, #main { }"), Sniffed::Css);
        assert_eq!(sniff(b"h1, p { margin: 0 }"), Sniffed::Css);
        assert_eq!(sniff(b"site-header { display: block }"), Sniffed::Css);
    }

    #[test]
    fn test_sniff_javascript() {
        assert_eq!(sniff(b"console.log('hello world')"), Sniffed::JavaScript);
        assert_eq!(sniff(b"function foo() {}"), Sniffed::JavaScript);
        assert_eq!(sniff(b"const x = 1;"), Sniffed::JavaScript);
        assert_eq!(sniff(b"let { a, b } = obj;"), Sniffed::JavaScript);
        assert_eq!(sniff(b"import { h } from 'preact';"), Sniffed::JavaScript);
        assert_eq!(sniff(b"import React from \"react\";"), Sniffed::JavaScript);
        assert_eq!(sniff(b"export default {}"), Sniffed::JavaScript);
        assert_eq!(sniff(b"'use strict';\nvar a;"), Sniffed::JavaScript);
        assert_eq!(sniff(b"(function () {})();"), Sniffed::JavaScript);
        assert_eq!(sniff(b"// comment\nfoo()"), Sniffed::JavaScript);
        assert_eq!(sniff(b"document.addEventListener('x', f)"), Sniffed::JavaScript);
        assert_eq!(sniff(b"$.ajax({})"), Sniffed::JavaScript);
        assert_eq!(sniff(b"if (a) { b: c }"), Sniffed::JavaScript);
        assert_eq!(sniff(b"class App extends Base {}"), Sniffed::JavaScript);
    }

    #[test]
    fn test_sniff_unterminated_comment_is_script() {
        let mut body = b"/*! bundle license\n".to_vec();
        body.extend(std::iter::repeat_n(b'x', SNIFF_LEN));
        assert_eq!(sniff(&body), Sniffed::JavaScript);
    }

    #[test]
    fn test_sniff_json() {
        assert_eq!(sniff(b"{\"a\":1}"), Sniffed::Json);
        assert_eq!(sniff(b"  { }"), Sniffed::Json);
        assert_eq!(sniff(b"[1, 2, 3]"), Sniffed::Json);
        assert_eq!(sniff(b"[{\"id\": 1}]"), Sniffed::Json);
        assert_eq!(sniff(b"[]"), Sniffed::Json);
        assert_eq!(sniff(b"[INFO] server started"), Sniffed::PlainText);
    }

    #[test]
    fn test_sniff_only_looks_at_window() {
        let mut body = vec![b'a'; SNIFF_LEN];
        body.extend_from_slice(b"\x00\x01\x02");
        assert_eq!(sniff(&body), Sniffed::PlainText);
    }

    #[test]
    fn test_sniff_truncated_multibyte_character() {
        let mut body = vec![b'a'; SNIFF_LEN - 1];
        body.extend_from_slice("é".as_bytes());
        assert_eq!(sniff(&body), Sniffed::PlainText);
    }

    #[test]
    fn test_injectable_kinds() {
        assert!(Sniffed::Html.is_injectable());
        assert!(Sniffed::PlainText.is_injectable());
        assert!(!Sniffed::Empty.is_injectable());
        assert!(!Sniffed::Css.is_injectable());
        assert!(!Sniffed::JavaScript.is_injectable());
        assert!(!Sniffed::Json.is_injectable());
        assert!(!Sniffed::Xml.is_injectable());
        assert!(!Sniffed::Other("image/png").is_injectable());
    }
}
