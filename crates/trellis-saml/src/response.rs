//! Response parsing and validity-window enforcement.

use chrono::{DateTime, Duration, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use crate::error::{SamlError, SamlResult};

/// Accepted clock skew when enforcing the assertion validity window.
pub const CLOCK_SKEW_SECONDS: i64 = 300;

/// Subject, attributes, and conditions pulled from a response document.
#[derive(Debug, Default)]
pub struct ParsedResponse {
    pub name_id: Option<String>,
    /// Attribute name to values; single values stay scalar, repeated
    /// `AttributeValue` elements become arrays.
    pub attributes: HashMap<String, serde_json::Value>,
    pub not_before: Option<String>,
    pub not_on_or_after: Option<String>,
}

/// Parse the assertion content of a decoded response document.
pub fn parse_response(xml: &str) -> SamlResult<ParsedResponse> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parsed = ParsedResponse::default();
    let mut in_name_id = false;
    let mut in_attribute_value = false;
    let mut current_attribute: Option<String> = None;
    let mut current_values: Vec<String> = Vec::new();
    let mut name_id = String::new();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                saw_root = true;
                let local = e.local_name();
                let name = std::str::from_utf8(local.as_ref()).unwrap_or("");

                match name {
                    "NameID" => in_name_id = true,
                    "Conditions" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            let value = attr.unescape_value().unwrap_or_default().to_string();
                            match key {
                                "NotBefore" => parsed.not_before = Some(value),
                                "NotOnOrAfter" => parsed.not_on_or_after = Some(value),
                                _ => {}
                            }
                        }
                    }
                    "Attribute" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "Name" {
                                current_attribute =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                        current_values.clear();
                    }
                    "AttributeValue" => in_attribute_value = true,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                let name = std::str::from_utf8(local.as_ref()).unwrap_or("");
                match name {
                    "NameID" => in_name_id = false,
                    "AttributeValue" => in_attribute_value = false,
                    "Attribute" => {
                        if let Some(attr_name) = current_attribute.take() {
                            let value = match current_values.len() {
                                0 => serde_json::Value::Null,
                                1 => serde_json::Value::String(current_values.remove(0)),
                                _ => serde_json::json!(std::mem::take(&mut current_values)),
                            };
                            if !value.is_null() {
                                parsed.attributes.insert(attr_name, value);
                            }
                        }
                        current_values.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if in_name_id {
                    name_id.push_str(&text);
                } else if in_attribute_value {
                    current_values.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SamlError::InvalidResponse(format!("XML parse error: {e}")));
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err(SamlError::InvalidResponse("empty document".to_string()));
    }

    if !name_id.is_empty() {
        parsed.name_id = Some(name_id);
    }
    Ok(parsed)
}

/// Enforce the `Conditions` validity window against the current time,
/// allowing [`CLOCK_SKEW_SECONDS`] of skew on both bounds. Absent
/// bounds are not enforced.
pub fn check_conditions(parsed: &ParsedResponse, now: DateTime<Utc>) -> SamlResult<()> {
    let skew = Duration::seconds(CLOCK_SKEW_SECONDS);

    if let Some(not_before) = &parsed.not_before {
        let bound = parse_instant(not_before)?;
        if now + skew < bound {
            return Err(SamlError::AssertionNotYetValid {
                not_before: not_before.clone(),
            });
        }
    }

    if let Some(not_on_or_after) = &parsed.not_on_or_after {
        let bound = parse_instant(not_on_or_after)?;
        if now - skew >= bound {
            return Err(SamlError::AssertionExpired {
                not_on_or_after: not_on_or_after.clone(),
            });
        }
    }

    Ok(())
}

fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidResponse(format!("Invalid timestamp '{value}': {e}")))
}
