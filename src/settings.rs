use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Declarative runner settings, typically loaded from the framework `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub analytics: AnalyticsSettings,
    pub url: UrlSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Key the allocation map is persisted under.
    pub key: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            key: StorageSettings::DEFAULT_KEY.to_owned(),
        }
    }
}

impl StorageSettings {
    pub const DEFAULT_KEY: &'static str = "nuk_mvt";
}

/// How the tracking string is encoded and where it is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsSettings {
    /// Prepended to every `experiment:variation` entry.
    pub prefix: String,
    pub separator: String,
    /// Global slot receiving the tracking string.
    pub variable: String,
    /// Global slot receiving the last error report.
    pub error: String,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            separator: "-".to_owned(),
            variable: "nuk_mvt_tracking".to_owned(),
            error: "nuk_mvt_error".to_owned(),
        }
    }
}

/// Fragment tokens understood by the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UrlSettings {
    pub override_param: String,
    pub disable_token: String,
    pub debug_token: String,
}

impl Default for UrlSettings {
    fn default() -> Self {
        Self {
            override_param: "mvt".to_owned(),
            disable_token: "disable_ab_tests".to_owned(),
            debug_token: "debug_ab_tests".to_owned(),
        }
    }
}

/// Partial overrides for [`Settings`], applied field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsOverrides {
    pub storage_key: Option<String>,
    pub analytics_prefix: Option<String>,
    pub analytics_separator: Option<String>,
    pub analytics_variable: Option<String>,
    pub analytics_error: Option<String>,
}

impl Settings {
    /// Parse a framework configuration document.
    pub fn from_json(json: &str) -> Result<Settings> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply per-build overrides on top of the loaded settings.
    pub fn apply(&mut self, overrides: SettingsOverrides) -> &mut Self {
        let SettingsOverrides {
            storage_key,
            analytics_prefix,
            analytics_separator,
            analytics_variable,
            analytics_error,
        } = overrides;

        if let Some(key) = storage_key {
            self.storage.key = key;
        }
        if let Some(prefix) = analytics_prefix {
            self.analytics.prefix = prefix;
        }
        if let Some(separator) = analytics_separator {
            self.analytics.separator = separator;
        }
        if let Some(variable) = analytics_variable {
            self.analytics.variable = variable;
        }
        if let Some(error) = analytics_error {
            self.analytics.error = error;
        }
        self
    }
}

/// Per-product configuration with one block of constants per deployment environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductConfig {
    pub product: String,
    pub environments: HashMap<String, serde_json::Value>,
}

/// The product configuration resolved for a single environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub product: String,
    pub environment: serde_json::Value,
}

impl EnvironmentConfig {
    /// String constant from the environment block, e.g. `"code"` or `"domain"`.
    pub fn constant(&self, name: &str) -> Option<&str> {
        self.environment.get(name)?.as_str()
    }
}

impl ProductConfig {
    pub fn from_json(json: &str) -> Result<ProductConfig> {
        Ok(serde_json::from_str(json)?)
    }

    /// Names of all declared environments, sorted.
    pub fn environment_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.environments.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn environment(&self, name: &str) -> Result<EnvironmentConfig> {
        let environment = self
            .environments
            .get(name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_owned()))?;

        Ok(EnvironmentConfig {
            product: self.product.clone(),
            environment: environment.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn parse_framework_config() {
        let settings =
            Settings::from_json(&fs::read_to_string("tests/data/framework-config.json").unwrap())
                .unwrap();

        assert_eq!(settings.storage.key, "nuk_mvt_allocations");
        assert_eq!(settings.analytics.prefix, "C");
        assert_eq!(settings.analytics.separator, "-");
        // Missing sections fall back to defaults.
        assert_eq!(settings.url, UrlSettings::default());
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut settings = Settings::default();
        settings.apply(SettingsOverrides {
            storage_key: Some("custom".to_owned()),
            analytics_prefix: Some("X".to_owned()),
            ..Default::default()
        });

        assert_eq!(settings.storage.key, "custom");
        assert_eq!(settings.analytics.prefix, "X");
        assert_eq!(settings.analytics.separator, "-");
    }

    #[test]
    fn resolve_product_environment() {
        let product =
            ProductConfig::from_json(&fs::read_to_string("tests/data/product-config.json").unwrap())
                .unwrap();

        assert_eq!(product.environment_names(), vec!["live", "staging"]);

        let staging = product.environment("staging").unwrap();
        assert_eq!(staging.product, "complex-website");
        assert_eq!(staging.constant("code"), Some("1234"));

        assert!(matches!(
            product.environment("qa"),
            Err(Error::UnknownEnvironment(name)) if name == "qa"
        ));
    }
}
