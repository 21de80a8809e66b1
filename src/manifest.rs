//! Registry of experiment names and ids, kept next to the experiment sources.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, ExperimentId, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// Experiments still being drafted may not have an id yet.
    #[serde(default)]
    pub id: Option<ExperimentId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    experiments: HashMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Manifest> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn entry(&self, key: &str) -> Result<&ManifestEntry> {
        self.experiments
            .get(key)
            .ok_or_else(|| Error::UnknownExperiment(key.to_owned()))
    }
}
