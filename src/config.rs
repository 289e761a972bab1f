//! Settings for include resolution, query parameters and pagination.
//!
//! Loading order:
//!
//! 1. Defaults.
//! 2. A TOML or JSON file, picked by extension.
//! 3. `JSONAPI_*` environment variables.
//!
//! | Env var | Setting |
//! |---|---|
//! | `JSONAPI_MAX_INCLUDE_PATHS` | `max_include_paths` |
//! | `JSONAPI_MAX_RELATIONS` | `max_relations` |
//! | `JSONAPI_STRICT_INCLUDES` | `strict_includes` |
//! | `JSONAPI_DEFAULT_PAGE_LIMIT` | `default_page_limit` |
//! | `JSONAPI_MAX_PAGE_LIMIT` | `max_page_limit` |
//! | `JSONAPI_MAX_SORTS` | `max_sorts` |
//! | `JSONAPI_BASE_URL` | `base_url` |

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::types::{IncludeOptions, DEFAULT_MAX_PATHS, DEFAULT_MAX_RELATIONS};

/// Default maximum number of `sort` fields per request.
pub const DEFAULT_MAX_SORTS: usize = 3;

const ENV_PREFIX: &str = "JSONAPI_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub max_include_paths: usize,
    pub max_relations: usize,
    pub strict_includes: bool,
    pub default_page_limit: Option<usize>,
    pub max_page_limit: Option<usize>,
    pub max_sorts: usize,
    /// Prefix for `self`, `related` and pagination links.
    pub base_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_include_paths: DEFAULT_MAX_PATHS,
            max_relations: DEFAULT_MAX_RELATIONS,
            strict_includes: true,
            default_page_limit: None,
            max_page_limit: None,
            max_sorts: DEFAULT_MAX_SORTS,
            base_url: None,
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self, LoadError> {
        let settings: Self =
            toml::from_str(content).map_err(|source| LoadError::InvalidToml { source })?;
        settings.validate()
    }

    pub fn from_json_str(content: &str) -> Result<Self, LoadError> {
        let settings: Self =
            serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })?;
        settings.validate()
    }

    /// Load from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            return Err(LoadError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(LoadError::InvalidSettings {
                message: format!(
                    "{}: expected a .toml or .json settings file",
                    path.display()
                ),
            }),
        }
    }

    /// Apply `JSONAPI_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), LoadError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `JSONAPI_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), LoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("MAX_INCLUDE_PATHS") {
            self.max_include_paths = parse_var("MAX_INCLUDE_PATHS", &v)?;
        }
        if let Some(v) = var("MAX_RELATIONS") {
            self.max_relations = parse_var("MAX_RELATIONS", &v)?;
        }
        if let Some(v) = var("STRICT_INCLUDES") {
            self.strict_includes = parse_bool("STRICT_INCLUDES", &v)?;
        }
        if let Some(v) = var("DEFAULT_PAGE_LIMIT") {
            self.default_page_limit = Some(parse_var("DEFAULT_PAGE_LIMIT", &v)?);
        }
        if let Some(v) = var("MAX_PAGE_LIMIT") {
            self.max_page_limit = Some(parse_var("MAX_PAGE_LIMIT", &v)?);
        }
        if let Some(v) = var("MAX_SORTS") {
            self.max_sorts = parse_var("MAX_SORTS", &v)?;
        }
        if let Some(v) = var("BASE_URL") {
            self.base_url = if v.is_empty() { None } else { Some(v) };
        }

        let validated = self.clone().validate()?;
        *self = validated;
        Ok(())
    }

    pub fn include_options(&self) -> IncludeOptions {
        IncludeOptions::new()
            .max_paths(self.max_include_paths)
            .max_relations(self.max_relations)
            .strict(self.strict_includes)
    }

    fn validate(self) -> Result<Self, LoadError> {
        let invalid = |message: String| Err(LoadError::InvalidSettings { message });

        if self.max_include_paths == 0 {
            return invalid("max_include_paths must be at least 1".into());
        }
        if self.max_relations == 0 {
            return invalid("max_relations must be at least 1".into());
        }
        if self.default_page_limit == Some(0) || self.max_page_limit == Some(0) {
            return invalid("page limits must be at least 1".into());
        }
        if let (Some(default), Some(max)) = (self.default_page_limit, self.max_page_limit) {
            if default > max {
                return invalid(format!(
                    "default_page_limit ({}) exceeds max_page_limit ({})",
                    default, max
                ));
            }
        }
        if let Some(base) = &self.base_url {
            if let Err(e) = url::Url::parse(base) {
                return invalid(format!("base_url \"{}\" is not a URL: {}", base, e));
            }
        }
        Ok(self)
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, LoadError> {
    value.trim().parse().map_err(|_| LoadError::InvalidSettings {
        message: format!("{}{}: cannot parse \"{}\"", ENV_PREFIX, name, value),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, LoadError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(LoadError::InvalidSettings {
            message: format!("{}{}: expected a boolean, got \"{}\"", ENV_PREFIX, name, value),
        }),
    }
}
