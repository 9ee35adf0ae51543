//! Task name sanitization

use once_cell::sync::Lazy;
use regex::Regex;

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\-._]+").expect("static regex is valid"));

/// Strip every character outside `[A-Za-z0-9-._]` so the name is usable as a
/// routing key and queue name.
pub fn sanitize_name(name: &str) -> String {
    DISALLOWED.replace_all(name, "").into_owned()
}
