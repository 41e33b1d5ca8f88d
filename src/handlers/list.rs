use std::path::Path;

use colored::*;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::Result;
use crate::resource::{Container, Manifest};

use super::utils::{read_manifest, resolve_workload_id};

/// Containers of one resource, as listed by `hr-images list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceContainers {
    pub resource: String,
    pub containers: Vec<Container>,
}

/// Containers of every workload in the manifest, or of just `resource`.
pub fn collect_containers(
    manifest: &Manifest,
    resource: Option<&str>,
) -> Result<Vec<ResourceContainers>> {
    let listing = match resource {
        Some(_) => {
            let id = resolve_workload_id(manifest, resource)?;
            let containers = manifest
                .get(&id)
                .and_then(|r| r.as_workload())
                .map(|w| w.containers())
                .unwrap_or_default();
            vec![ResourceContainers {
                resource: id,
                containers,
            }]
        }
        None => manifest
            .workloads()
            .into_iter()
            .map(|(id, w)| ResourceContainers {
                resource: id,
                containers: w.containers(),
            })
            .collect(),
    };
    Ok(listing)
}

pub fn format_table(listing: &[ResourceContainers]) -> String {
    let mut output = String::new();
    for entry in listing {
        output.push_str(&format!("{}\n", entry.resource.bright_white().bold()));
        if entry.containers.is_empty() {
            output.push_str(&format!("  {}\n", "(no images found)".dimmed()));
            continue;
        }
        let width = entry
            .containers
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0);
        for container in &entry.containers {
            let name = format!("{:width$}", container.name, width = width);
            output.push_str(&format!(
                "  {}  {}\n",
                name.cyan(),
                container.image.to_string().green()
            ));
        }
    }
    output
}

pub fn handle_list(
    file: &Path,
    resource: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let manifest = read_manifest(file)?;
    let listing = collect_containers(&manifest, resource)?;
    log::info!("Listed {} resource(s)", listing.len());

    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&listing)?),
        OutputFormat::Table => Ok(format_table(&listing)),
    }
}
