//! Username derivation for provisioned accounts.
//!
//! Usernames are lowercase `[a-z0-9._-]`. Candidates are tried in
//! order: `first.last`, the email local part, then a random fallback.

use trellis_core::FederatedIdentity;

/// Reduce an arbitrary string to the username alphabet. Whitespace
/// becomes a dot; anything else outside `[a-z0-9._-]` is dropped, and
/// leading or trailing separators are trimmed.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.to_lowercase().chars() {
        match ch {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => out.push(ch),
            c if c.is_whitespace() => out.push('.'),
            _ => {}
        }
    }
    out.trim_matches(|c| c == '.' || c == '_' || c == '-').to_string()
}

/// Derive the base username candidate for an identity.
#[must_use]
pub fn base_candidate(identity: &FederatedIdentity) -> String {
    if let (Some(first), Some(last)) = (&identity.first_name, &identity.last_name) {
        let candidate = sanitize(&format!("{first}.{last}"));
        if !candidate.is_empty() {
            return candidate;
        }
    }

    if let Some(local_part) = identity.email.split('@').next() {
        let candidate = sanitize(local_part);
        if !candidate.is_empty() {
            return candidate;
        }
    }

    random_fallback()
}

/// Append a numeric suffix to resolve a collision: `jane.doe2`,
/// `jane.doe3`, and so on.
#[must_use]
pub fn with_suffix(base: &str, attempt: u32) -> String {
    format!("{base}{}", attempt + 1)
}

fn random_fallback() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("user-{suffix}")
}
