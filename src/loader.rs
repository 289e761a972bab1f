//! Document loading from various sources.
//!
//! Handles loading declarations and datasets from files, strings, and
//! HTTP URLs.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::LoadError;
use crate::memory::MemoryStore;
use crate::schema::{Declaration, SchemaRegistry};
use crate::validator::validate_declaration;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_document(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_document_str(&content)
}

/// Load a JSON document from a string.
pub fn load_document_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a JSON document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails, the server
/// answers with an error status, or the body isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Value, LoadError> {
    let network = |source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    tracing::debug!(url, "fetching document");
    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a document from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_document_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}

/// Load and validate a declaration.
pub fn load_declaration(source: &str) -> Result<Declaration, LoadError> {
    let document = load_document_auto(source)?;
    validate_declaration(&document)?;
    Declaration::from_value(&document)
}

/// Load a declaration and build its registry.
pub fn load_registry(source: &str) -> Result<Arc<SchemaRegistry>, LoadError> {
    let registry = SchemaRegistry::from_declaration(load_declaration(source)?)?;
    tracing::info!(source, resource_types = registry.len(), "loaded declaration");
    Ok(registry)
}

/// Load a dataset into a [`MemoryStore`].
pub fn load_dataset(source: &str) -> Result<MemoryStore, LoadError> {
    let store = MemoryStore::from_value(&load_document_auto(source)?)?;
    tracing::info!(source, records = store.len(), "loaded dataset");
    Ok(store)
}
