//! # Helm release images
//!
//! Finds the container images declared in the `values` of Flux Helm
//! releases and rewrites them without knowing the chart's schema.
//!
//! ## Features
//!
//! - **Convention-based detection**: `image: repo:tag`, `image` + `tag`,
//!   and `image: {repository, tag}`, either release-wide or per container
//! - **Shape-preserving writes**: an image is written back in the layout
//!   it was read from
//! - **Stable ordering**: containers are always reported in sorted key order
//! - **Either origin**: values decoded from manifest YAML or from API JSON
//!
//! ## Example
//!
//! ```rust
//! use helmrelease_images::Values;
//! use helmrelease_images::resource::helmrelease;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut values = Values::from_yaml_str("db:\n  image: bitnami/mariadb\n  tag: '10.1'\n")?;
//! let containers = helmrelease::containers(&values);
//! assert_eq!(containers[0].name, "db");
//!
//! let newer = containers[0].image.with_new_tag("10.2");
//! helmrelease::set_container_image(&mut values, "db", &newer)?;
//! assert_eq!(helmrelease::containers(&values)[0].image.to_string(), "bitnami/mariadb:10.2");
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod image;
pub mod resource;

// Re-export commonly used types and functions
pub use error::{Error, Result};
pub use image::{ImageName, ImageRef};
pub use resource::{
    Container, FluxHelmRelease, Manifest, RELEASE_CONTAINER_NAME, Values, Workload,
    parse_multidoc,
};
use cli::Commands;

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run one command and return what it would print.
pub fn run_command(command: Commands, config: &config::types::Config) -> Result<String> {
    match command {
        Commands::List {
            file,
            resource,
            format,
        } => handlers::handle_list(
            &file,
            resource.as_deref(),
            format.unwrap_or(config.output.format),
        ),
        Commands::Set {
            file,
            resource,
            container,
            image,
            tag,
            in_place,
        } => {
            let in_place = in_place || config.write.in_place;
            let output = handlers::handle_set(
                &file,
                handlers::SetOptions {
                    resource,
                    container,
                    image,
                    tag,
                    in_place,
                    create_backup: config.write.create_backup,
                },
            )?;
            Ok(if in_place { String::new() } else { output })
        }
    }
}
