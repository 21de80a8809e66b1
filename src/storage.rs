//! Persistence of JSON values across page loads.
//!
//! Web storage is preferred, the cookie is the last resort. A backend is only trusted after a
//! write-then-read probe succeeds.
use std::rc::Rc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::{
    window::{Storage, Window},
    Error,
};

const PROBE_KEY: &str = "nuk_mvt_storage_test";
const PROBE_VALUE: &str = "ping";

/// How long values should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    /// localStorage, then sessionStorage, then a permanent cookie.
    #[default]
    Local,
    /// sessionStorage, then a session cookie.
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Local,
    Session,
}

/// Attributes appended to a cookie write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

impl CookieOptions {
    /// Cookie kept until the end of the browsing session.
    pub fn session() -> Self {
        CookieOptions {
            path: Some("/".to_owned()),
            ..Default::default()
        }
    }

    /// Cookie that never expires in practice.
    pub fn permanent() -> Self {
        CookieOptions {
            path: Some("/".to_owned()),
            expires: NaiveDate::from_ymd_opt(9999, 12, 31)
                .and_then(|date| date.and_hms_opt(23, 59, 59))
                .map(|datetime| datetime.and_utc()),
            ..Default::default()
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    fn to_cookie_suffix(&self) -> String {
        let mut suffix = String::new();
        if let Some(domain) = &self.domain {
            suffix.push_str(&format!(";domain={domain}"));
        }
        if let Some(path) = &self.path {
            suffix.push_str(&format!(";path={path}"));
        }
        if let Some(expires) = &self.expires {
            suffix.push_str(&format!(
                ";expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        suffix
    }
}

/// Tiered key-value persistence. `get` and `set` never fail: problems are logged and degrade to
/// "nothing stored".
pub struct PersistentStore {
    window: Rc<dyn Window>,
    persistence: Persistence,
}

impl PersistentStore {
    pub fn new(window: Rc<dyn Window>, persistence: Persistence) -> Self {
        PersistentStore {
            window,
            persistence,
        }
    }

    /// Look `key` up in the same order `set` writes it: every usable web storage tier, then the
    /// cookie. A tier that rejected the last write may have been skipped by `set`, so a miss in one
    /// tier is not final.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.usable_storages()
            .find_map(|(tier, storage)| match storage.get_item(key) {
                Ok(Some(raw)) => serde_json::from_str(&raw)
                    .inspect_err(|err| {
                        log::warn!(target: "mvt", key, tier:debug = tier; "unreadable stored value: {err}")
                    })
                    .ok(),
                Ok(None) => None,
                Err(err) => {
                    log::warn!(target: "mvt", key, tier:debug = tier; "{err}");
                    None
                }
            })
            .or_else(|| get_cookie(&*self.window, key))
    }

    pub fn set(&self, key: &str, value: &serde_json::Value) {
        let serialized = value.to_string();

        for (tier, storage) in self.usable_storages() {
            match storage.set_item(key, &serialized) {
                Ok(()) => return,
                Err(err) => {
                    log::warn!(target: "mvt", key, tier:debug = tier; "write failed, falling back: {err}");
                    // An older value left here would shadow the one written further down.
                    if let Err(err) = storage.remove_item(key) {
                        log::warn!(target: "mvt", key, tier:debug = tier; "unable to clear stale value: {err}");
                    }
                }
            }
        }

        let error = Error::StorageUnavailable("no web storage accepted the write".to_owned());
        log::warn!(target: "mvt", key; "{error}, using a cookie");

        let options = match self.persistence {
            Persistence::Local => CookieOptions::permanent(),
            Persistence::Session => CookieOptions::session(),
        };
        set_cookie(&*self.window, key, value, &options);
    }

    fn tiers(&self) -> &'static [Tier] {
        match self.persistence {
            Persistence::Local => &[Tier::Local, Tier::Session],
            Persistence::Session => &[Tier::Session],
        }
    }

    fn usable_storages(&self) -> impl Iterator<Item = (Tier, &dyn Storage)> + '_ {
        self.tiers().iter().filter_map(|&tier| {
            let storage = match tier {
                Tier::Local => self.window.local_storage(),
                Tier::Session => self.window.session_storage(),
            }?;
            is_storage_available(storage).then_some((tier, storage))
        })
    }
}

/// Probe a backend with a sentinel write/read/remove cycle.
fn is_storage_available(storage: &dyn Storage) -> bool {
    let probe = || -> crate::Result<bool> {
        storage.set_item(PROBE_KEY, PROBE_VALUE)?;
        let value = storage.get_item(PROBE_KEY)?;
        storage.remove_item(PROBE_KEY)?;
        Ok(value.as_deref() == Some(PROBE_VALUE))
    };
    probe().unwrap_or(false)
}

/// Read a cookie written by [`set_cookie`].
///
/// If the cookie string starts with `key`, that entry wins; otherwise the last `; key=` entry is
/// used.
pub fn get_cookie(window: &dyn Window, key: &str) -> Option<serde_json::Value> {
    let key = regex::escape(key);
    let regex = Regex::new(&format!(r"^(?:{key}|.*;\s*{key})\s*=\s*([^;]*)")).ok()?;
    let cookie = window.cookie();
    let raw = regex.captures(&cookie)?.get(1)?.as_str();
    if raw.is_empty() {
        return None;
    }

    decode_cookie(raw)
        .inspect_err(|err| log::warn!(target: "mvt", "unreadable cookie: {err}"))
        .ok()
}

/// Write `value` as a base64-encoded JSON cookie.
pub fn set_cookie(window: &dyn Window, key: &str, value: &serde_json::Value, options: &CookieOptions) {
    let encoded = STANDARD.encode(value.to_string());
    window.set_cookie(&format!("{key}={encoded}{}", options.to_cookie_suffix()));
}

fn decode_cookie(raw: &str) -> crate::Result<serde_json::Value> {
    let bytes = STANDARD
        .decode(raw)
        .map_err(|err| Error::StorageUnavailable(format!("invalid cookie encoding: {err}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}
