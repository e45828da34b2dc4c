//! Pulls `<channel>` and `<programme>` elements out of upstream guide bodies
//!
//! Upstream feeds come in two shapes: a standalone XMLTV document, or a body
//! whose `<tv>` payload is fine but whose outer wrapper is not (stray
//! namespace prefixes, an encoding declaration glued onto a fragment, ...).

use super::element::{is_legal_reference, parse_document, RawElement};
use crate::error::{EpgError, Result};

pub const TAG_TV: &str = "tv";
pub const TAG_CHANNEL: &str = "channel";
pub const TAG_PROGRAMME: &str = "programme";

/// Elements extracted from one feed, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub channels: Vec<RawElement>,
    pub programmes: Vec<RawElement>,
}

/// How a body is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedShape {
    /// Well-formed document rooted at `<tv>`
    Standalone,
    /// Payload between the first `<tv ...>` and the last `</tv>`, re-wrapped
    Wrapped,
}

impl FeedShape {
    pub fn label(&self) -> &'static str {
        match self {
            FeedShape::Standalone => "standalone",
            FeedShape::Wrapped => "wrapped fragment",
        }
    }
}

/// Outcome of the structural probe
enum Probe {
    /// Parsed as-is; the root is kept so the body is not parsed twice
    Standalone(RawElement),
    /// Not usable as-is but carries a `<tv>` payload
    Wrapped { standalone_err: String },
    Unusable(String),
}

fn probe(body: &str) -> Probe {
    let standalone_err = match parse_document(body) {
        Ok(root) if root.name == TAG_TV => return Probe::Standalone(root),
        Ok(root) => format!("root element is <{}>, not <tv>", root.name),
        Err(why) => why,
    };
    match tv_payload(body) {
        Some(_) => Probe::Wrapped { standalone_err },
        None => Probe::Unusable(standalone_err),
    }
}

/// Extract from a body of unknown shape, trying each strategy in turn
pub fn extract(body: &str) -> Result<(FeedShape, Feed)> {
    match probe(body) {
        Probe::Standalone(root) => Ok((FeedShape::Standalone, split(root))),
        Probe::Wrapped { standalone_err } => {
            let feed = extract_wrapped(body).map_err(|e| {
                EpgError::parse(format!("{}; as fragment: {}", standalone_err, reason(e)))
            })?;
            Ok((FeedShape::Wrapped, feed))
        }
        Probe::Unusable(why) => Err(EpgError::parse(format!("no <tv> payload found ({})", why))),
    }
}

fn reason(e: EpgError) -> String {
    match e {
        EpgError::Parse { reason } => reason,
        other => other.to_string(),
    }
}

/// Extract from a body that must be a standalone `<tv>` document
pub fn extract_standalone(body: &str) -> Result<Feed> {
    let root = parse_document(body).map_err(EpgError::parse)?;
    if root.name != TAG_TV {
        return Err(EpgError::parse(format!("root element is <{}>, not <tv>", root.name)));
    }
    Ok(split(root))
}

fn extract_wrapped(body: &str) -> Result<Feed> {
    let inner = tv_payload(body).ok_or_else(|| EpgError::parse("no <tv> payload found"))?;
    let wrapped = format!("<tv>{}</tv>", sanitize(&strip_declarations(inner.trim())));
    let root = parse_document(&wrapped).map_err(EpgError::parse)?;
    Ok(split(root))
}

fn split(root: RawElement) -> Feed {
    let mut feed = Feed::default();
    for el in root.take_elements(&[TAG_CHANNEL, TAG_PROGRAMME]) {
        if el.name == TAG_CHANNEL {
            feed.channels.push(el);
        } else {
            feed.programmes.push(el);
        }
    }
    feed
}

/// Text between the end of the first `<tv ...>` opening tag and the last `</tv>`
fn tv_payload(body: &str) -> Option<&str> {
    let open = find_tv_open(body)?;
    let content_start = open + body[open..].find('>')? + 1;
    // `<tv/>` has no payload
    if body[..content_start].ends_with("/>") {
        return None;
    }
    let close = body.rfind("</tv>")?;
    (close >= content_start).then(|| &body[content_start..close])
}

/// Drop `<?xml ...?>` declarations, which are only legal at the very start of a document
fn strip_declarations(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut rest = fragment;
    while let Some(at) = rest.find("<?xml") {
        let is_decl = matches!(rest.as_bytes().get(at + 5), Some(b' ' | b'\t' | b'\r' | b'\n' | b'?'));
        let Some(end) = rest[at..].find("?>").filter(|_| is_decl) else {
            out.push_str(&rest[..at + 5]);
            rest = &rest[at + 5..];
            continue;
        };
        out.push_str(&rest[..at]);
        rest = &rest[at + end + 2..];
    }
    out.push_str(rest);
    out
}

/// Position of `<tv` followed by whitespace, `>` or `/`; skips `<tvg...` and friends
fn find_tv_open(body: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = body[from..].find("<tv") {
        let at = from + rel;
        match body.as_bytes().get(at + 3) {
            Some(b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n') => return Some(at),
            _ => from = at + 3,
        }
    }
    None
}

/// Repair the damage most often seen in scraped fragments: control characters
/// that are illegal in XML 1.0 and bare ampersands.
pub fn sanitize(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + fragment.len() / 32);
    for (i, c) in fragment.char_indices() {
        match c {
            '\t' | '\n' | '\r' => out.push(c),
            '\u{0}'..='\u{1f}' | '\u{7f}' => out.push(' '),
            '&' if !is_valid_entity_start(&fragment.as_bytes()[i..]) => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

/// Check if bytes starting with & open a reference the parser will accept
fn is_valid_entity_start(bytes: &[u8]) -> bool {
    // Bodies longer than 11 bytes are left to be escaped
    let Some(end) = bytes.iter().take(13).position(|&b| b == b';') else {
        return false;
    };
    std::str::from_utf8(&bytes[1..end]).is_ok_and(is_legal_reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANDALONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="upstream">
  <channel id="bbc1">
    <display-name>BBC One</display-name>
    <icon src="http://example.com/bbc1.png"/>
  </channel>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="bbc1">
    <title>News at Noon</title>
    <desc>Daily news broadcast</desc>
  </programme>
  <programme start="20240115130000 +0000" stop="20240115140000 +0000" channel="bbc1">
    <title>Afternoon</title>
  </programme>
</tv>"#;

    #[test]
    fn test_standalone() {
        let (shape, feed) = extract(STANDALONE).unwrap();
        assert_eq!(shape, FeedShape::Standalone);
        assert_eq!(feed.channels.len(), 1);
        assert_eq!(feed.channels[0].attr("id").as_deref(), Some("bbc1"));
        assert_eq!(feed.programmes.len(), 2);
        assert_eq!(feed.programmes[0].child("title").unwrap().text(), "News at Noon");
        assert_eq!(feed.programmes[1].attr("start").as_deref(), Some("20240115130000 +0000"));
    }

    #[test]
    fn test_wrapped_fragment_with_broken_wrapper() {
        // Undeclared namespace prefix on the wrapper and a second declaration
        let body = r#"<?xml version="1.0"?><html><tv xmlns:x="u" x:broken><?xml version="1.0" encoding="utf-8"?>
<programme start="20240101000000 +0000" channel="c1"><title>Show &amp; Tell</title></programme>
</tv></body>"#;
        let (shape, feed) = extract(body).unwrap();
        assert_eq!(shape, FeedShape::Wrapped);
        assert_eq!(feed.programmes.len(), 1);
        assert_eq!(feed.programmes[0].child("title").unwrap().text(), "Show & Tell");
    }

    #[test]
    fn test_wrapped_fragment_is_sanitized() {
        let body = "garbage <tv date=\"x\">\u{1}<programme start=\"1\" channel=\"c\"><title>Fish & Chips</title></programme></tv> trailing";
        let (shape, feed) = extract(body).unwrap();
        assert_eq!(shape, FeedShape::Wrapped);
        assert_eq!(feed.programmes[0].child("title").unwrap().text(), "Fish & Chips");
    }

    #[test]
    fn test_tvg_prefix_is_not_a_tv_tag() {
        let body = "<tvguide><tv><programme start=\"1\" channel=\"c\"/></tv></tvguide";
        let (shape, feed) = extract(body).unwrap();
        assert_eq!(shape, FeedShape::Wrapped);
        assert_eq!(feed.programmes.len(), 1);
    }

    #[test]
    fn test_unusable_bodies_are_errors() {
        for body in ["", "not xml at all", "<tv/> trailing", "<html><body>503</body></html>", "<tv><programme></tv"] {
            let err = extract(body).unwrap_err();
            assert!(matches!(err, EpgError::Parse { .. }), "{body:?} gave {err:?}");
        }
    }

    #[test]
    fn test_empty_guide_is_not_an_error() {
        let (shape, feed) = extract("<tv/>").unwrap();
        assert_eq!(shape, FeedShape::Standalone);
        assert_eq!(feed, Feed::default());
    }

    #[test]
    fn test_strip_declarations() {
        assert_eq!(strip_declarations("<?xml version=\"1.0\"?><a/>"), "<a/>");
        assert_eq!(strip_declarations("<a/><?xml-stylesheet href=\"s\"?>"), "<a/><?xml-stylesheet href=\"s\"?>");
        assert_eq!(strip_declarations("<a/><?xml"), "<a/><?xml");
    }

    #[test]
    fn test_broken_fragment_reports_both_attempts() {
        let err = extract("<tv><programme><title></programme></tv>").unwrap_err();
        assert!(err.to_string().contains("as fragment"));
    }

    #[test]
    fn test_extract_standalone_is_strict() {
        assert_eq!(extract_standalone(STANDALONE).unwrap().programmes.len(), 2);
        assert!(extract_standalone("junk <tv><programme start=\"1\" channel=\"c\"/></tv>").is_err());
        assert!(extract_standalone("<guide/>").is_err());
    }

    #[test]
    fn test_undeclared_entities_are_escaped_in_fragments() {
        let body = r#"<tv><programme start="1" channel="x"><title>Tom&nbsp;Jerry &#0;</title></programme></tv>"#;
        assert!(extract_standalone(body).is_err());

        let (shape, feed) = extract(body).unwrap();
        assert_eq!(shape, FeedShape::Wrapped);
        assert_eq!(feed.programmes[0].child("title").unwrap().text(), "Tom&nbsp;Jerry &#0;");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a & b"), "a &amp; b");
        assert_eq!(sanitize("&amp; &lt; &#169; &#xA9;"), "&amp; &lt; &#169; &#xA9;");
        assert_eq!(sanitize("AT&T"), "AT&amp;T");
        assert_eq!(sanitize("&#12"), "&amp;#12");
        assert_eq!(sanitize("Tom&nbsp;Jerry &#0; &#X41;"), "Tom&amp;nbsp;Jerry &amp;#0; &amp;#X41;");
        assert_eq!(sanitize("x\u{0}y\u{7f}z\tw"), "x y z\tw");
    }
}
