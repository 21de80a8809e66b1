use std::collections::HashMap;

use derive_more::From;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{location, ExperimentId, Window};

/// A persisted allocation entry.
///
/// Anything that is not a non-negative integer (a hand-edited value, or an override index too
/// large to parse) is kept as `Invalid` instead of failing the whole map. Invalid entries are
/// treated as "not allocated yet".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum AllocationValue {
    Index(usize),
    Invalid(serde_json::Value),
}

impl AllocationValue {
    pub fn as_index(&self) -> Option<usize> {
        match self {
            AllocationValue::Index(index) => Some(*index),
            AllocationValue::Invalid(_) => None,
        }
    }
}

/// Experiment id (as a string key) to allocated variation index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationMap {
    entries: HashMap<String, AllocationValue>,
}

impl AllocationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocated index for `id`, if a valid one exists.
    pub fn get(&self, id: ExperimentId) -> Option<usize> {
        self.entries.get(&id.to_string())?.as_index()
    }

    pub fn insert(&mut self, id: ExperimentId, index: usize) {
        self.entries
            .insert(id.to_string(), AllocationValue::Index(index));
    }

    /// Raw entry under `key`, exactly as persisted or overridden.
    pub fn entry(&self, key: &str) -> Option<&AllocationValue> {
        self.entries.get(key)
    }

    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<AllocationValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AllocationValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Decode a persisted map. Anything that is not a JSON object yields an empty map.
    pub fn from_json_value(value: serde_json::Value) -> AllocationMap {
        serde_json::from_value(value).unwrap_or_else(|err| {
            log::warn!(target: "mvt", "discarding unreadable allocation map: {err}");
            AllocationMap::default()
        })
    }
}

impl<K: Into<String>> FromIterator<(K, usize)> for AllocationMap {
    fn from_iter<I: IntoIterator<Item = (K, usize)>>(iter: I) -> Self {
        AllocationMap {
            entries: iter
                .into_iter()
                .map(|(key, index)| (key.into(), AllocationValue::Index(index)))
                .collect(),
        }
    }
}

/// Overlay the allocations forced through the URL fragment on top of `persisted`.
///
/// The fragment parameter (`#mvt=2.4-3.27`) is a `-`-separated list of `id.index` pairs. A
/// malformed value is logged and ignored. `persisted` is never modified.
pub fn merge_overrides(
    window: &dyn Window,
    persisted: &AllocationMap,
    override_param: &str,
) -> AllocationMap {
    let mut merged = persisted.clone();

    let Some(overrides) = location::hash_value(window, override_param) else {
        return merged;
    };

    if !is_well_formed(&overrides) {
        window.console_log("nuk-mvt:bad query values");
        log::warn!(target: "mvt", overrides = overrides.as_str(); "ignoring malformed allocation override");
        return merged;
    }

    for pair in overrides.split('-') {
        let Some((id, index)) = pair.split_once('.') else {
            continue;
        };
        let value = match index.parse::<usize>() {
            Ok(index) => AllocationValue::Index(index),
            Err(_) => AllocationValue::Invalid(serde_json::Value::Null),
        };
        log::debug!(target: "mvt", experiment = id; "allocation forced by override");
        merged.insert_raw(id, value);
    }

    merged
}

fn is_well_formed(overrides: &str) -> bool {
    Regex::new(r"^[0-9]+\.[0-9]+(-[0-9]+\.[0-9]+)*$")
        .map(|regex| regex.is_match(overrides))
        .unwrap_or(false)
}
