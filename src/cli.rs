use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

pub use crate::config::types::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "hr-images")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "List and update container images in Helm release values")]
#[command(long_about = "Finds the container images declared in the `values` of Flux Helm releases, whatever conventional shape the chart uses for them, and rewrites them in place without disturbing the rest of the manifest.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", env = "HR_IMAGES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the containers and images of every Helm release in a manifest
    List {
        /// Manifest file (multi-document YAML); `-` reads stdin
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only list this resource (`<namespace>:<kind>/<name>`)
        #[arg(short, long, value_name = "ID")]
        resource: Option<String>,

        /// Output format (defaults to the configured format)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Change the image of one container
    #[command(group(ArgGroup::new("target").required(true).args(["image", "tag"])))]
    Set {
        /// Manifest file (multi-document YAML); `-` reads stdin
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Resource to change; may be omitted when the file has a single release
        #[arg(short, long, value_name = "ID")]
        resource: Option<String>,

        /// Container name, `chart-image` for a release-wide image
        #[arg(long, value_name = "NAME")]
        container: String,

        /// Full new image reference
        #[arg(long, value_name = "REF")]
        image: Option<String>,

        /// New tag, keeping the current repository
        #[arg(long, value_name = "TAG")]
        tag: Option<String>,

        /// Write the result back to FILE instead of stdout
        #[arg(short, long)]
        in_place: bool,
    },
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
