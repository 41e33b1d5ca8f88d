//! Error types for image discovery and rewriting.
//!
//! Each concern owns a small enum; `Error` folds them together for the
//! binary and for callers that do not care which layer failed.

use thiserror::Error;

/// Errors produced while parsing an image reference string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// The reference string was empty
    #[error("blank image reference")]
    Blank,

    /// The reference string does not have a `[domain/]path[:tag]` shape
    #[error("malformed image reference {0:?}")]
    Malformed(String),
}

/// Errors raised by a workload when its containers are mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// No image declaration was found under the requested container name
    #[error("did not find container {container} in {resource}")]
    ContainerNotFound {
        /// Requested container name
        container: String,
        /// Resource that was searched
        resource: String,
    },

    /// A write-back instruction points at a location the values no longer have
    #[error("image location {0} no longer exists in values")]
    StaleLocation(String),
}

/// Errors from reading a manifest stream or a values payload.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The stream is not valid YAML
    #[error("parsing {source_name}: {error}")]
    Yaml {
        /// Where the stream came from (file path, "stdin", ...)
        source_name: String,
        #[source]
        error: serde_yaml::Error,
    },

    /// A document lacks a field every resource must carry
    #[error("{source_name}: document {index} has no {field}")]
    MissingField {
        source_name: String,
        index: usize,
        field: &'static str,
    },

    /// Two documents in one stream share a resource id
    #[error("{source_name}: duplicate definition of {id}")]
    DuplicateResource { source_name: String, id: String },

    /// `spec.values` is present but is not a mapping
    #[error("values must be a mapping, got {0}")]
    InvalidValues(String),

    /// Rendering the stream back to YAML failed
    #[error("rendering manifest: {0}")]
    Render(#[source] serde_yaml::Error),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {error}")]
    Read {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("parsing {path}: {error}")]
    Parse {
        path: String,
        #[source]
        error: toml::de::Error,
    },
}

/// Top-level error for the library and the `hr-images` binary.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The command line named something the manifest does not contain
    #[error("{0}")]
    Usage(String),
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
