//! Reading signals out of the page URL.
//!
//! The fragment carries `key` and `key=value` tokens separated by `&`. Values are form-decoded:
//! `+` is a space and `%XX` sequences are percent-decoded.
use regex::Regex;
use url::form_urlencoded;

use crate::{settings::UrlSettings, Window};

/// Return `true` if `key` appears in the fragment as a bare token or as the key of a pair.
pub fn has_hash_key(window: &dyn Window, key: &str) -> bool {
    let Ok(regex) = Regex::new(&format!("(^|#|&){}(=|&|$)", regex::escape(key))) else {
        return false;
    };
    regex.is_match(&window.location_hash())
}

/// Decoded value for `key` in the fragment. Missing and empty values both yield `None`.
pub fn hash_value(window: &dyn Window, key: &str) -> Option<String> {
    extract_value(&window.location_hash(), '#', key)
}

/// Decoded value for `key` in the query string. Missing and empty values both yield `None`.
pub fn query_value(window: &dyn Window, key: &str) -> Option<String> {
    extract_value(&window.location_search(), '?', key)
}

/// The kill switch: no allocation, persistence or execution happens when present.
pub fn is_disabled(window: &dyn Window, url: &UrlSettings) -> bool {
    has_hash_key(window, &url.disable_token)
}

pub fn is_debug_enabled(window: &dyn Window, url: &UrlSettings) -> bool {
    has_hash_key(window, &url.debug_token)
}

fn extract_value(source: &str, lead: char, key: &str) -> Option<String> {
    let pattern = format!(
        r"^{}?(?:.*&)?{}=([^&]*).*$",
        regex::escape(&lead.to_string()),
        regex::escape(key)
    );
    let regex = Regex::new(&pattern).ok()?;
    let raw = regex.captures(source)?.get(1)?.as_str();
    if raw.is_empty() {
        return None;
    }
    Some(decode_component(raw))
}

fn decode_component(raw: &str) -> String {
    // Prefixing a dummy key keeps any `=` inside `raw` part of the decoded value.
    form_urlencoded::parse(format!("v={raw}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}
