//! The page environment an experiment run operates on.
//!
//! Nothing in this crate reaches for a global window. Every component receives the [`Window`] it
//! works with, so a run can be pointed at a real browser binding or at [`MemoryWindow`].
mod memory;

pub use memory::{MemoryStorage, MemoryWindow};

use crate::Result;

/// A key-value web storage backend (`localStorage` / `sessionStorage`).
///
/// Every operation may fail: browsers throw from storage in private mode or when the quota is
/// exceeded.
pub trait Storage {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// Handle to an element matched by a selector query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub selector: String,
    pub position: usize,
}

/// Capabilities of the page an experiment run is executed in.
pub trait Window {
    /// Fragment part of the page URL, including the leading `#` if present.
    fn location_hash(&self) -> String;
    /// Query part of the page URL, including the leading `?` if present.
    fn location_search(&self) -> String;

    fn local_storage(&self) -> Option<&dyn Storage>;
    fn session_storage(&self) -> Option<&dyn Storage>;

    /// The `document.cookie` string: `name=value` pairs separated by `; `.
    fn cookie(&self) -> String;
    /// Equivalent of assigning to `document.cookie`: sets a single cookie, options included.
    fn set_cookie(&self, cookie: &str);

    /// Append a `<style>` element with the given text to the document head.
    fn append_style(&self, css: &str) -> Result<()>;
    fn query_selector_all(&self, selector: &str) -> Vec<ElementRef>;

    /// Write a line to the developer console.
    fn console_log(&self, message: &str);

    /// Read a string value from a well-known global slot.
    fn global(&self, name: &str) -> Option<String>;
    fn set_global(&self, name: &str, value: String);
}
