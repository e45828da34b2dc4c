//! Serializes a merged guide as a pretty-printed XMLTV document

use super::element::{emit, parse_document, RawElement};
use super::extract::{TAG_CHANNEL, TAG_TV};
use super::merge::{ChannelElement, MergedDocument};
use crate::error::{EpgError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::writer::Writer;
use std::fs;
use std::path::Path;

pub const GENERATOR_NAME: &str = "epg-merge";
pub const PROVENANCE_ATTR: &str = "source";

#[derive(Debug, Clone, Copy)]
pub struct AssembleOptions {
    /// Write each programme's contributing channel name as a `source` attribute
    pub provenance: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self { provenance: true }
    }
}

fn channel_element(channel: &ChannelElement) -> RawElement {
    let mut el = RawElement::new(TAG_CHANNEL).with_attr("id", &channel.id).with_child(
        RawElement::new("display-name")
            .with_attr("lang", &channel.lang)
            .with_text(&channel.display_name),
    );
    if let Some(logo) = &channel.logo {
        el = el.with_child(RawElement::new("icon").with_attr("src", logo));
    }
    el
}

/// Render all channels, then all programmes, under one `<tv>` root.
///
/// The result is re-parsed before it is returned; a document that does not
/// read back is an `EpgError::Assembly`.
pub fn assemble(doc: &MergedDocument, options: AssembleOptions) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None))).map_err(EpgError::assembly)?;
    let mut root = BytesStart::new(TAG_TV);
    root.push_attribute(("generator-info-name", GENERATOR_NAME));
    emit(&mut writer, Event::Start(root)).map_err(EpgError::assembly)?;

    for channel in &doc.channels {
        channel_element(channel).write_to(&mut writer).map_err(EpgError::assembly)?;
    }
    for programme in &doc.programmes {
        let written = if options.provenance {
            let mut el = programme.element.clone();
            el.set_attr(PROVENANCE_ATTR, &programme.source);
            el.write_to(&mut writer)
        } else {
            programme.element.write_to(&mut writer)
        };
        written.map_err(EpgError::assembly)?;
    }

    emit(&mut writer, Event::End(BytesEnd::new(TAG_TV))).map_err(EpgError::assembly)?;

    let raw = String::from_utf8(writer.into_inner()).map_err(EpgError::assembly)?;
    let text = strip_blank_lines(&raw);
    validate(&text)?;
    Ok(text)
}

fn strip_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// The document must read back as well-formed XML rooted at `<tv>`
pub fn validate(text: &str) -> Result<()> {
    let root = parse_document(text).map_err(EpgError::assembly)?;
    if root.name != TAG_TV {
        return Err(EpgError::assembly(format!("root element is <{}>", root.name)));
    }
    Ok(())
}

pub fn write_document(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).map_err(|source| EpgError::Write { path: path.to_path_buf(), source })
}
