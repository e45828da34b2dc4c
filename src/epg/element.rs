//! Owned XML element tree
//!
//! Upstream elements are kept in their escaped form so that text, entity
//! references and attribute values are written back exactly as received.

use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::borrow::Cow;
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(RawElement),
    /// Escaped character data, entity references included
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub name: String,
    /// (name, escaped value) in document order
    attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl RawElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attrs: Vec::new(), children: Vec::new() }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::Text(escape(text).into_owned()));
        self
    }

    pub fn with_child(mut self, child: RawElement) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Unescaped attribute value
    pub fn attr(&self, key: &str) -> Option<Cow<'_, str>> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, raw)| unescape(raw).unwrap_or(Cow::Borrowed(raw.as_str())))
    }

    /// Replace the attribute in place, or append it
    pub fn set_attr(&mut self, key: &str, value: &str) {
        let escaped = escape(value).into_owned();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = escaped,
            None => self.attrs.push((key.to_string(), escaped)),
        }
    }

    /// Set the attribute and move it to the front of the attribute list
    pub fn stamp_attr(&mut self, key: &str, value: &str) {
        self.attrs.retain(|(k, _)| k != key);
        self.attrs.insert(0, (key.to_string(), escape(value).into_owned()));
    }

    pub fn attr_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.iter().map(|(k, _)| k.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &RawElement> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&RawElement> {
        self.elements().find(|el| el.name == name)
    }

    /// Concatenated, unescaped text of direct text children
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(raw) => out.push_str(&unescape(raw).unwrap_or(Cow::Borrowed(raw.as_str()))),
                Node::CData(data) => out.push_str(data),
                _ => {}
            }
        }
        out
    }

    /// Pull out every descendant whose tag is in `names`, in document order.
    ///
    /// A matching element is taken whole; its own descendants are not searched.
    pub fn take_elements(self, names: &[&str]) -> Vec<RawElement> {
        let mut found = Vec::new();
        collect_into(self.children, names, &mut found);
        found
    }

    pub fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), String> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attrs {
            start.push_attribute((key.as_bytes(), value.as_bytes()));
        }

        if self.children.is_empty() {
            return emit(writer, Event::Empty(start));
        }
        emit(writer, Event::Start(start))?;

        // Whitespace between child elements is layout, not content
        let structural = self.children.iter().any(|n| matches!(n, Node::Element(_)));
        for node in &self.children {
            match node {
                Node::Element(el) => el.write_to(writer)?,
                Node::Text(raw) if structural && raw.trim().is_empty() => {}
                Node::Text(raw) => emit(writer, Event::Text(BytesText::from_escaped(raw.as_str())))?,
                Node::CData(data) => emit(writer, Event::CData(BytesCData::new(data.as_str())))?,
                Node::Comment(text) => emit(writer, Event::Comment(BytesText::from_escaped(text.as_str())))?,
            }
        }
        emit(writer, Event::End(BytesEnd::new(self.name.as_str())))
    }

    fn push_text(&mut self, raw: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(raw);
        } else {
            self.children.push(Node::Text(raw.to_string()));
        }
    }

    fn from_start(e: &BytesStart) -> Result<Self, String> {
        let mut el = RawElement::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
        for attr in e.attributes() {
            let attr = attr.map_err(|err| format!("bad attribute on <{}>: {}", el.name, err))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            check_references(&value).map_err(|err| format!("attribute {} on <{}>: {}", key, el.name, err))?;
            el.attrs.push((key, value));
        }
        Ok(el)
    }
}

fn collect_into(children: Vec<Node>, names: &[&str], found: &mut Vec<RawElement>) {
    for node in children {
        if let Node::Element(el) = node {
            if names.contains(&el.name.as_str()) {
                found.push(el);
            } else {
                collect_into(el.children, names, found);
            }
        }
    }
}

/// True for the body of a reference (`amp`, `#169`, `#xA9`) that a
/// document without a DTD may contain: one of the five predefined entities,
/// or a character reference to a legal XML 1.0 character.
pub fn is_legal_reference(name: &str) -> bool {
    match name {
        "amp" | "lt" | "gt" | "quot" | "apos" => true,
        _ => name.strip_prefix('#').and_then(decode_char_ref).is_some_and(is_xml_char),
    }
}

fn decode_char_ref(num: &str) -> Option<char> {
    let (digits, radix) = match num.strip_prefix('x') {
        Some(hex) => (hex, 16),
        None => (num, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok().and_then(char::from_u32)
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{d7ff}' | '\u{e000}'..='\u{fffd}' | '\u{10000}'..='\u{10ffff}')
}

/// Every `&` in escaped text must open a legal, terminated reference
fn check_references(raw: &str) -> Result<(), String> {
    let mut rest = raw;
    while let Some(at) = rest.find('&') {
        let tail = &rest[at + 1..];
        let Some(end) = tail.find(';') else {
            return Err("unterminated reference".to_string());
        };
        let name = &tail[..end];
        if !is_legal_reference(name) {
            return Err(format!("undefined or illegal reference &{};", name));
        }
        rest = &tail[end + 1..];
    }
    Ok(())
}

pub fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}

/// Parse a complete document and return its root element.
///
/// Fails on anything that is not well-formed: mismatched or unclosed tags,
/// several root elements, or character data outside the root.
pub fn parse_document(xml: &str) -> Result<RawElement, String> {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<RawElement> = Vec::new();
    let mut root: Option<RawElement> = None;

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| format!("XML error at byte {}: {}", position, e))?;

        match event {
            Event::Start(e) => {
                if stack.is_empty() && root.is_some() {
                    return Err("more than one root element".to_string());
                }
                stack.push(RawElement::from_start(&e)?);
            }
            Event::Empty(e) => {
                let el = RawElement::from_start(&e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(e) => {
                let el = stack.pop().ok_or_else(|| {
                    format!("unexpected </{}>", String::from_utf8_lossy(e.name().as_ref()))
                })?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(e) => {
                let raw = String::from_utf8_lossy(&e);
                check_references(&raw).map_err(|err| format!("{} at byte {}", err, position))?;
                match stack.last_mut() {
                    Some(parent) => parent.push_text(&raw),
                    None if raw.trim().is_empty() => {}
                    None => return Err(format!("text outside root element at byte {}", position)),
                }
            }
            Event::GeneralRef(e) => {
                let name = String::from_utf8_lossy(&e);
                if !is_legal_reference(&name) {
                    return Err(format!("undefined or illegal reference &{}; at byte {}", name, position));
                }
                match stack.last_mut() {
                    Some(parent) => parent.push_text(&format!("&{};", name)),
                    None => return Err(format!("entity reference outside root at byte {}", position)),
                }
            }
            Event::CData(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::CData(String::from_utf8_lossy(&e).into_owned()));
                }
            }
            Event::Comment(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Comment(String::from_utf8_lossy(&e).into_owned()));
                }
            }
            Event::Eof => break,
            // Declarations, processing instructions and doctypes carry no guide data
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed <{}> at end of document", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn attach(stack: &mut [RawElement], root: &mut Option<RawElement>, el: RawElement) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
        Ok(())
    } else if root.is_some() {
        Err("more than one root element".to_string())
    } else {
        *root = Some(el);
        Ok(())
    }
}
