//! Exclusive XML canonicalization (C14N).
//!
//! A focused implementation covering the subset of exclusive C14N that
//! SAML signatures exercise: attribute ordering, empty-element
//! expansion, character escaping, and removal of the XML declaration
//! and comments. Both the digest computation and the `SignedInfo`
//! verification run through this function, so signer and verifier agree
//! on the byte form.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

/// Canonicalize an XML fragment.
pub fn canonicalize(xml: &str) -> SamlResult<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut out = String::with_capacity(xml.len());

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                write_tag(&mut out, &e, false)?;
            }
            Ok(Event::Empty(e)) => {
                // C14N expands empty elements to start/end pairs.
                write_tag(&mut out, &e, true)?;
            }
            Ok(Event::End(e)) => {
                out.push_str("</");
                out.push_str(
                    std::str::from_utf8(e.name().as_ref())
                        .map_err(|e| SamlError::InvalidResponse(e.to_string()))?,
                );
                out.push('>');
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| SamlError::InvalidResponse(e.to_string()))?;
                out.push_str(&escape_text(&text));
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                out.push_str(&escape_text(&text));
            }
            // Declaration, comments, and PIs are dropped by C14N.
            Ok(Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => return Err(SamlError::InvalidResponse(format!("XML parse error: {e}"))),
            Ok(_) => {}
        }
    }

    Ok(out)
}

fn write_tag(
    out: &mut String,
    e: &quick_xml::events::BytesStart<'_>,
    empty: bool,
) -> SamlResult<()> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| SamlError::InvalidResponse(e.to_string()))?
        .to_string();

    // Namespace declarations sort before ordinary attributes, each
    // group alphabetically.
    let mut ns_attrs: Vec<(String, String)> = Vec::new();
    let mut attrs: Vec<(String, String)> = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SamlError::InvalidResponse(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| SamlError::InvalidResponse(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| SamlError::InvalidResponse(e.to_string()))?
            .to_string();
        if key == "xmlns" || key.starts_with("xmlns:") {
            ns_attrs.push((key, value));
        } else {
            attrs.push((key, value));
        }
    }
    ns_attrs.sort();
    attrs.sort();

    out.push('<');
    out.push_str(&name);
    for (key, value) in ns_attrs.iter().chain(attrs.iter()) {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');

    if empty {
        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }
    Ok(())
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\r', "&#xD;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
        .replace('\t', "&#x9;")
        .replace('\n', "&#xA;")
        .replace('\r', "&#xD;")
}
