//! Peer address normalization and the tolerant matching used to recognize
//! calls placed by the hardware bridge.

use core::fmt;

/// Marker carried in every URI the hardware bridge dials.
const SESSION_MARKER: &str = "clbsessionid";
const INFO_MARKER: &str = "clbinfo";

/// Extensions reserved for the bridge. Some engines drop the session
/// marker from the logged URI, these still identify the call.
const RESERVED_EXTENSIONS: [&str; 2] = ["sip:ext1@", "sip:ext2@"];

/// A peer URI reduced to scheme and user part, lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallIdentity(String);

impl CallIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Truncate `raw` at the first `@` or `;` and lower-case it.
///
/// Total: anything that is not a well-formed URI still yields the best-effort
/// truncation of the input.
pub fn normalize(raw: &str) -> CallIdentity {
    let trimmed = raw.trim();
    let end = trimmed.find(['@', ';']).unwrap_or(trimmed.len());
    CallIdentity(trimmed[..end].to_lowercase())
}

/// True if either identity contains the other. Empty identities match nothing.
pub fn matches(a: &CallIdentity, b: &CallIdentity) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.0.contains(b.as_str()) || b.0.contains(a.as_str())
}

/// True if `uri` carries a bridge marker or starts with a reserved extension.
pub fn is_hardware_marked(uri: &str) -> bool {
    let lower = uri.trim().to_lowercase();
    lower.contains(SESSION_MARKER)
        || lower.contains(INFO_MARKER)
        || RESERVED_EXTENSIONS.iter().any(|ext| lower.starts_with(ext))
}

/// The part of `uri` used to find a call to hang up: everything from the
/// session marker onward when present, otherwise the whole lower-cased URI.
pub fn session_marker(uri: &str) -> String {
    let lower = uri.trim().to_lowercase();
    match lower.find(SESSION_MARKER) {
        Some(idx) if idx > 0 => lower[idx..].to_string(),
        _ => lower,
    }
}
