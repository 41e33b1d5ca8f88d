//! Multi-document manifest streams.
//!
//! A stream is split on YAML document boundaries; each document becomes a
//! `Resource` keyed by `<namespace>:<kind>/<name>`. Helm releases are
//! interpreted as workloads, everything else is carried through as-is so
//! the stream can be rendered back out.

use std::collections::BTreeMap;

use log::debug;
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::ManifestError;
use crate::resource::{BaseObject, FluxHelmRelease, Workload};

/// One document of a manifest stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    HelmRelease(FluxHelmRelease),
    Other { base: BaseObject, raw: Value },
}

impl Resource {
    pub fn base(&self) -> &BaseObject {
        match self {
            Self::HelmRelease(fhr) => &fhr.base,
            Self::Other { base, .. } => base,
        }
    }

    pub fn id(&self) -> String {
        self.base().resource_id()
    }

    pub fn as_workload(&self) -> Option<&dyn Workload> {
        match self {
            Self::HelmRelease(fhr) => Some(fhr),
            Self::Other { .. } => None,
        }
    }

    pub fn as_workload_mut(&mut self) -> Option<&mut dyn Workload> {
        match self {
            Self::HelmRelease(fhr) => Some(fhr),
            Self::Other { .. } => None,
        }
    }

    pub fn to_yaml_value(&self) -> Value {
        match self {
            Self::HelmRelease(fhr) => fhr.to_yaml_value(),
            Self::Other { raw, .. } => raw.clone(),
        }
    }
}

/// The resources of a stream, in document order and addressable by id.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    resources: Vec<Resource>,
    index: BTreeMap<String, usize>,
}

impl Manifest {
    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Resource> {
        let i = *self.index.get(id)?;
        self.resources.get_mut(i)
    }

    /// Resource ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources that expose containers, keyed by id.
    pub fn workloads(&self) -> BTreeMap<String, &dyn Workload> {
        self.resources
            .iter()
            .filter_map(|r| r.as_workload().map(|w| (r.id(), w)))
            .collect()
    }

    /// Render the stream back out, one document per resource, in the order
    /// they were read.
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        let mut out = String::new();
        for resource in &self.resources {
            let doc = serde_yaml::to_string(&resource.to_yaml_value())
                .map_err(ManifestError::Render)?;
            out.push_str("---\n");
            out.push_str(&doc);
        }
        Ok(out)
    }
}

/// Parse a `---`-separated stream of Kubernetes documents. `source` names
/// the stream in error messages.
pub fn parse_multidoc(bytes: &[u8], source: &str) -> Result<Manifest, ManifestError> {
    let mut manifest = Manifest::default();

    for (index, document) in serde_yaml::Deserializer::from_slice(bytes).enumerate() {
        let raw = Value::deserialize(document).map_err(|error| ManifestError::Yaml {
            source_name: source.to_string(),
            error,
        })?;
        if raw.is_null() {
            continue;
        }

        let base = BaseObject::from_value(&raw, source, index)?;
        let id = base.resource_id();
        if manifest.index.contains_key(&id) {
            return Err(ManifestError::DuplicateResource {
                source_name: source.to_string(),
                id,
            });
        }

        let resource = if FluxHelmRelease::is_helm_release_kind(&base.kind) {
            Resource::HelmRelease(FluxHelmRelease::from_yaml(raw, base)?)
        } else {
            Resource::Other { base, raw }
        };
        debug!("Parsed {} from {}", id, source);

        manifest.index.insert(id, manifest.resources.len());
        manifest.resources.push(resource);
    }

    Ok(manifest)
}
