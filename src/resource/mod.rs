//! Resource model shared by everything that reads or rewrites manifests.
//!
//! - `BaseObject` - kind, namespace and name every resource carries
//! - `Container` - a named image found in a resource
//! - `Workload` - resources whose container images can be listed and changed

pub mod helmrelease;
pub mod manifest;
pub mod values;

use serde::Serialize;
use serde_yaml::Value;

use crate::error::{ManifestError, ResourceError};
use crate::image::ImageRef;

pub use helmrelease::{FluxHelmRelease, ImageLocation, ImageShape, RELEASE_CONTAINER_NAME};
pub use manifest::{Manifest, Resource, parse_multidoc};
pub use values::Values;

/// Namespace assumed when a namespaced resource does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A container name and the image it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub name: String,
    pub image: ImageRef,
}

/// A deployable resource that exposes containers and can have their images
/// changed.
pub trait Workload {
    /// Containers in a stable order.
    fn containers(&self) -> Vec<Container>;

    /// Point `container` at `image`, leaving everything else as it was.
    fn set_container_image(&mut self, container: &str, image: &ImageRef)
    -> Result<(), ResourceError>;
}

/// Identity fields common to every Kubernetes object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseObject {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl BaseObject {
    /// Read identity fields from a decoded document. `index` is the
    /// document's position in its stream, for error messages.
    pub fn from_value(value: &Value, source: &str, index: usize) -> Result<Self, ManifestError> {
        let missing = |field| ManifestError::MissingField {
            source_name: source.to_string(),
            index,
            field,
        };

        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("kind"))?;
        let metadata = value.get("metadata");
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| missing("metadata.name"))?;
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty());
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default();

        Ok(Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        })
    }

    /// `<namespace>:<kind>/<name>`, kind lowercased.
    pub fn resource_id(&self) -> String {
        format!(
            "{}:{}/{}",
            self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
            self.kind.to_lowercase(),
            self.name
        )
    }
}
