//! Body extraction from the provider's nested part tree.
//!
//! Providers deliver the message body as a tree of MIME parts with
//! base64url-encoded data. Extraction walks the tree depth-first,
//! preferring `text/plain` and falling back to stripped `text/html`.

use base64::Engine;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value;

// Providers are inconsistent about padding, so accept both forms.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Extract readable text from a payload tree.
///
/// Returns the first non-empty `text/plain` part in document order,
/// else the first `text/html` part with tags stripped, else "".
pub fn extract_text(payload: &Value) -> String {
    if let Some(text) = find_part(payload, "text/plain") {
        return text;
    }
    if let Some(html) = find_part(payload, "text/html") {
        return strip_html(&html);
    }
    String::new()
}

fn find_part(node: &Value, mime: &str) -> Option<String> {
    let node_mime = node.get("mimeType").and_then(|m| m.as_str()).unwrap_or("");
    if node_mime.eq_ignore_ascii_case(mime)
        && let Some(data) = node.pointer("/body/data").and_then(|d| d.as_str())
        && let Some(decoded) = decode_part(data)
        && !decoded.trim().is_empty()
    {
        return Some(decoded);
    }

    if let Some(parts) = node.get("parts").and_then(|p| p.as_array()) {
        for part in parts {
            if let Some(found) = find_part(part, mime) {
                return Some(found);
            }
        }
    }
    None
}

fn decode_part(data: &str) -> Option<String> {
    let bytes = URL_SAFE_LENIENT.decode(data.as_bytes()).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Strip HTML tags from content (basic). Block-level closers become
/// newlines so line-oriented heuristics downstream still work.
pub fn strip_html(html: &str) -> String {
    let with_breaks = html
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n")
        .replace("</div>", "\n")
        .replace("</li>", "\n");

    let mut result = String::new();
    let mut in_tag = false;
    for ch in with_breaks.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    result
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
