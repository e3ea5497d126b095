use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Install and start the grid, its nginx site and certificate
    Install {
        /// Overwrite generated files that were edited by hand
        #[arg(long)]
        force: bool,
        /// Do not pull images before starting
        #[arg(long)]
        skip_pull: bool,
        /// Seconds to wait for the hub to report ready
        #[arg(long, default_value_t = 120)]
        ready_timeout: u64,
    },
    /// Allocate ports and write the generated files only
    Render {
        /// Overwrite generated files that were edited by hand
        #[arg(long)]
        force: bool,
    },
    /// Show the ports an installation would use right now
    Ports {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        config_file: PathBuf,
    },
    /// Ask the hub whether the grid is ready
    Status {
        /// Installation directory (defaults to the configured one)
        #[arg(long)]
        install_dir: Option<PathBuf>,
    },
    /// Check generated files against their recorded checksums
    Verify {
        /// Installation directory (defaults to the configured one)
        #[arg(long)]
        install_dir: Option<PathBuf>,
    },
    /// Run the generated Python smoke test
    Smoke {
        /// Installation directory (defaults to the configured one)
        #[arg(long)]
        install_dir: Option<PathBuf>,
        /// Grid URL to test instead of the public one
        #[arg(long)]
        url: Option<String>,
    },
    /// Stop the grid and remove its nginx site
    Uninstall {
        /// Installation directory (defaults to the configured one)
        #[arg(long)]
        install_dir: Option<PathBuf>,
        /// Also delete the certificate and the installation directory
        #[arg(long)]
        purge: bool,
    },
}
