//! Participant identity resolution
//!
//! A participant identifier is resolved exactly once per page load: a URL
//! query parameter wins, otherwise an interactive prompt is consulted. A
//! declined prompt yields no identity; tracking continues without one.

/// Query parameter carrying the participant identifier.
pub const IDENTITY_PARAM: &str = "id";

/// Interactive fallback for identity resolution.
///
/// The host supplies whatever "prompt the user" means in its environment;
/// tests supply a canned answer. Returning `None` means the user declined.
pub trait IdentityPrompt {
    fn prompt(&mut self) -> Option<String>;
}

/// A prompt that always declines. Useful for headless replay.
#[derive(Debug, Default)]
pub struct NoPrompt;

impl IdentityPrompt for NoPrompt {
    fn prompt(&mut self) -> Option<String> {
        None
    }
}

/// Resolve a participant identity from a raw query string, falling back to
/// the prompt only when the parameter is absent or empty.
pub fn resolve_identity(query: &str, prompt: &mut dyn IdentityPrompt) -> Option<String> {
    if let Some(id) = query_param(query, IDENTITY_PARAM) {
        if !id.is_empty() {
            return Some(id);
        }
    }
    prompt.prompt().filter(|id| !id.is_empty())
}

/// Extract a single parameter from a query string (with or without a leading
/// `?`). First occurrence wins. Values are percent-decoded for the common
/// `%XX` escapes and `+` as space.
pub fn query_param(query: &str, name: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        if key == name {
            return Some(percent_decode(parts.next().unwrap_or("")));
        }
    }
    None
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push((hi * 16 + lo) as u8);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
