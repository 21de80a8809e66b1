use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
};

use url::Url;

use super::{ElementRef, Storage, Window};
use crate::{Error, Result};

/// In-memory web storage. Can be switched into a failing mode to behave like a browser that
/// throws from every storage call.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
    failing: bool,
    quota: Option<usize>,
    accesses: Cell<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A storage where every operation fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Reject writes whose value is longer than `bytes`, like a browser whose storage quota is
    /// nearly used up.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Number of `get_item`/`set_item`/`remove_item` calls made so far.
    pub fn accesses(&self) -> usize {
        self.accesses.get()
    }

    /// Raw stored string, bypassing access accounting.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn check(&self) -> Result<()> {
        self.accesses.set(self.accesses.get() + 1);
        if self.failing {
            Err(Error::StorageUnavailable("storage access denied".to_owned()))
        } else {
            Ok(())
        }
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        if self.quota.is_some_and(|quota| value.len() > quota) {
            return Err(Error::StorageUnavailable(format!("quota exceeded writing {key:?}")));
        }
        self.items
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.check()?;
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// A self-contained page environment.
///
/// ```
/// # use mvt::{MemoryWindow, Window};
/// let window = MemoryWindow::from_url("https://example.com/?code=7#mvt=2.1").unwrap();
/// assert_eq!(window.location_search(), "?code=7");
/// assert_eq!(window.location_hash(), "#mvt=2.1");
/// ```
#[derive(Debug)]
pub struct MemoryWindow {
    hash: RefCell<String>,
    search: RefCell<String>,
    local_storage: Option<MemoryStorage>,
    session_storage: Option<MemoryStorage>,
    cookies: RefCell<Vec<(String, String)>>,
    cookie_writes: RefCell<Vec<String>>,
    styles: RefCell<Vec<String>>,
    has_head: bool,
    console: RefCell<Vec<String>>,
    globals: RefCell<HashMap<String, String>>,
    elements: RefCell<HashMap<String, usize>>,
}

impl Default for MemoryWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWindow {
    /// A blank page with working local and session storage.
    pub fn new() -> Self {
        MemoryWindow {
            hash: RefCell::new(String::new()),
            search: RefCell::new(String::new()),
            local_storage: Some(MemoryStorage::new()),
            session_storage: Some(MemoryStorage::new()),
            cookies: RefCell::new(Vec::new()),
            cookie_writes: RefCell::new(Vec::new()),
            styles: RefCell::new(Vec::new()),
            has_head: true,
            console: RefCell::new(Vec::new()),
            globals: RefCell::new(HashMap::new()),
            elements: RefCell::new(HashMap::new()),
        }
    }

    /// A blank page whose location is taken from `url`.
    pub fn from_url(url: &str) -> std::result::Result<Self, url::ParseError> {
        let url = Url::parse(url)?;
        let window = Self::new();
        if let Some(query) = url.query() {
            *window.search.borrow_mut() = format!("?{query}");
        }
        if let Some(fragment) = url.fragment() {
            *window.hash.borrow_mut() = format!("#{fragment}");
        }
        Ok(window)
    }

    pub fn with_hash(self, hash: &str) -> Self {
        self.set_hash(hash);
        self
    }

    pub fn with_search(self, search: &str) -> Self {
        *self.search.borrow_mut() = search.to_owned();
        self
    }

    /// Replace (or remove with `None`) the local storage backend.
    pub fn with_local_storage(mut self, storage: Option<MemoryStorage>) -> Self {
        self.local_storage = storage;
        self
    }

    /// Replace (or remove with `None`) the session storage backend.
    pub fn with_session_storage(mut self, storage: Option<MemoryStorage>) -> Self {
        self.session_storage = storage;
        self
    }

    /// A document without a `<head>`, where style injection fails.
    pub fn without_head(mut self) -> Self {
        self.has_head = false;
        self
    }

    pub fn with_elements(self, selector: &str, count: usize) -> Self {
        self.add_elements(selector, count);
        self
    }

    pub fn set_hash(&self, hash: &str) {
        *self.hash.borrow_mut() = hash.to_owned();
    }

    /// Make `count` more elements match `selector`.
    pub fn add_elements(&self, selector: &str, count: usize) {
        *self
            .elements
            .borrow_mut()
            .entry(selector.to_owned())
            .or_default() += count;
    }

    pub fn memory_local_storage(&self) -> Option<&MemoryStorage> {
        self.local_storage.as_ref()
    }

    pub fn memory_session_storage(&self) -> Option<&MemoryStorage> {
        self.session_storage.as_ref()
    }

    /// Every raw string assigned through [`Window::set_cookie`], in order.
    pub fn cookie_writes(&self) -> Vec<String> {
        self.cookie_writes.borrow().clone()
    }

    pub fn styles(&self) -> Vec<String> {
        self.styles.borrow().clone()
    }

    pub fn console_lines(&self) -> Vec<String> {
        self.console.borrow().clone()
    }
}

impl Window for MemoryWindow {
    fn location_hash(&self) -> String {
        self.hash.borrow().clone()
    }

    fn location_search(&self) -> String {
        self.search.borrow().clone()
    }

    fn local_storage(&self) -> Option<&dyn Storage> {
        self.local_storage.as_ref().map(|s| s as &dyn Storage)
    }

    fn session_storage(&self) -> Option<&dyn Storage> {
        self.session_storage.as_ref().map(|s| s as &dyn Storage)
    }

    fn cookie(&self) -> String {
        self.cookies
            .borrow()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_cookie(&self, cookie: &str) {
        self.cookie_writes.borrow_mut().push(cookie.to_owned());

        // Options (path, expires, ...) only matter to a real browser.
        let pair = cookie.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim().to_owned();
        let value = value.trim().to_owned();

        let mut cookies = self.cookies.borrow_mut();
        match cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => cookies.push((name, value)),
        }
    }

    fn append_style(&self, css: &str) -> Result<()> {
        if !self.has_head {
            return Err(Error::Style("document has no head".to_owned()));
        }
        self.styles.borrow_mut().push(css.to_owned());
        Ok(())
    }

    fn query_selector_all(&self, selector: &str) -> Vec<ElementRef> {
        let count = self.elements.borrow().get(selector).copied().unwrap_or(0);
        (0..count)
            .map(|position| ElementRef {
                selector: selector.to_owned(),
                position,
            })
            .collect()
    }

    fn console_log(&self, message: &str) {
        self.console.borrow_mut().push(message.to_owned());
    }

    fn global(&self, name: &str) -> Option<String> {
        self.globals.borrow().get(name).cloned()
    }

    fn set_global(&self, name: &str, value: String) {
        self.globals.borrow_mut().insert(name.to_owned(), value);
    }
}
