//! PATCH application for User resources.
//!
//! Only the attributes the directory actually stores are writable:
//! `userName`, `active`, `name.givenName`, `name.familyName`, and the
//! work email value. Operations against any other path are logged and
//! ignored rather than rejected, since Azure AD and Okta both send
//! attributes we do not track.

use crate::models::{ScimPatchOp, ScimPatchRequest};

/// Accumulated field changes from a PATCH request.
#[derive(Debug, Default, PartialEq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub active: Option<bool>,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

impl UserPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == UserPatch::default()
    }
}

/// Reduce a PATCH request to field changes.
#[must_use]
pub fn apply_user_patch(request: &ScimPatchRequest) -> UserPatch {
    let mut patch = UserPatch::default();
    for op in &request.operations {
        apply_op(&mut patch, op);
    }
    patch
}

fn apply_op(patch: &mut UserPatch, op: &ScimPatchOp) {
    let op_kind = op.op.to_lowercase();
    if op_kind == "remove" {
        if let Some(path) = op.path.as_deref() {
            remove_path(patch, path);
        }
        return;
    }
    if op_kind != "add" && op_kind != "replace" {
        tracing::warn!(op = %op.op, "ignoring unsupported PATCH operation");
        return;
    }

    match op.path.as_deref() {
        Some(path) => {
            if let Some(value) = &op.value {
                apply_path(patch, path, value);
            }
        }
        // No path: the value is a partial resource object (Azure AD
        // style); each key applies as its own path.
        None => {
            if let Some(serde_json::Value::Object(fields)) = &op.value {
                for (key, value) in fields {
                    if key == "name" {
                        if let serde_json::Value::Object(name) = value {
                            for (sub, sub_value) in name {
                                apply_path(patch, &format!("name.{sub}"), sub_value);
                            }
                        }
                    } else {
                        apply_path(patch, key, value);
                    }
                }
            } else {
                tracing::warn!("ignoring pathless PATCH operation with non-object value");
            }
        }
    }
}

fn apply_path(patch: &mut UserPatch, path: &str, value: &serde_json::Value) {
    match normalize_path(path).as_str() {
        "username" => patch.username = value_as_string(value),
        "active" => patch.active = value_as_bool(value),
        "name.givenname" => patch.given_name = value_as_string(value),
        "name.familyname" => patch.family_name = value_as_string(value),
        r#"emails[type eq "work"].value"# => patch.email = value_as_string(value),
        other => {
            tracing::warn!(path = %other, "ignoring PATCH for unsupported attribute path");
        }
    }
}

/// Clear an optional attribute. An empty string stands for "cleared"
/// downstream; required attributes cannot be removed and are ignored.
fn remove_path(patch: &mut UserPatch, path: &str) {
    match normalize_path(path).as_str() {
        "name.givenname" => patch.given_name = Some(String::new()),
        "name.familyname" => patch.family_name = Some(String::new()),
        other => {
            tracing::warn!(path = %other, "ignoring PATCH remove for non-removable path");
        }
    }
}

/// Lowercase the attribute path outside of quoted filter values.
fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_quotes = false;
    for ch in path.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
        }
        if in_quotes {
            out.push(ch);
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Azure AD sends booleans as the strings "True" and "False".
fn value_as_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
