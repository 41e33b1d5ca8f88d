use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::resource::{Manifest, parse_multidoc};

/// Read and parse a manifest file; `-` reads stdin.
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let (bytes, source) = if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        (buf, "stdin".to_string())
    } else {
        (std::fs::read(path)?, path.display().to_string())
    };
    log::info!("Reading manifest from {}", source);
    Ok(parse_multidoc(&bytes, &source)?)
}

/// Pick the workload a command applies to: the one named, or the only one
/// in the manifest.
pub fn resolve_workload_id(manifest: &Manifest, resource: Option<&str>) -> Result<String> {
    if let Some(id) = resource {
        return match manifest.get(id) {
            Some(r) if r.as_workload().is_some() => Ok(id.to_string()),
            Some(_) => Err(Error::Usage(format!("{} has no containers to change", id))),
            None => Err(Error::Usage(format!("resource {} not found", id))),
        };
    }

    let workloads = manifest.workloads();
    let mut ids = workloads.keys();
    match (ids.next(), ids.next()) {
        (Some(id), None) => Ok(id.clone()),
        (None, _) => Err(Error::Usage("no Helm releases found".to_string())),
        (Some(_), Some(_)) => Err(Error::Usage(format!(
            "several Helm releases found, choose one with --resource: {}",
            workloads.keys().cloned().collect::<Vec<_>>().join(", ")
        ))),
    }
}
