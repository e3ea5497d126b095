use anyhow::{anyhow, Context, Result};
use clap::Parser;
use console::style;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use gridup::cli::Commands;
use gridup::config::{self, prompt::TermPrompter, schema::ProxyConfig, InstallConfig};
use gridup::core::health::{self, HubStatus};
use gridup::core::{tester, InstallOptions, Installer, PortPlan};
use gridup::render::GridDescriptor;
use gridup::tools::{DryRunRunner, SystemRunner, ToolRunner};
use gridup::utils::checksum::Drift;
use gridup::utils::net;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "gridup")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log external commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Never prompt; fail when a required value is missing
    #[arg(long, global = true)]
    non_interactive: bool,
}

impl Cli {
    fn runner(&self) -> Box<dyn ToolRunner> {
        if self.dry_run {
            Box::new(DryRunRunner)
        } else {
            Box::new(SystemRunner::new())
        }
    }

    fn resolve_config(&self) -> Result<InstallConfig> {
        let interactive = !self.non_interactive && console::Term::stderr().is_term();
        config::resolve_config(self.config.as_deref(), interactive, &mut TermPrompter::new())
    }

    /// Settings that only need to be read, not completed: the file when one
    /// is given, defaults otherwise.
    fn stored_config(&self) -> Result<InstallConfig> {
        match &self.config {
            Some(path) => config::read_config(path),
            None => Ok(InstallConfig::default()),
        }
    }

    fn install_dir(&self, explicit: Option<PathBuf>) -> Result<PathBuf> {
        match explicit {
            Some(dir) => Ok(dir),
            None => Ok(self.stored_config()?.install_dir),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("gridup={},warn", log_level))
        .with_writer(std::io::stderr)
        .init();

    info!("gridup v{} starting", env!("CARGO_PKG_VERSION"));

    match run(&cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("✗ {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Install {
            force,
            skip_pull,
            ready_timeout,
        } => {
            let config = cli.resolve_config()?;
            let options = InstallOptions {
                force: *force,
                skip_pull: *skip_pull,
                dry_run: cli.dry_run,
                ready_timeout: Duration::from_secs(*ready_timeout),
            };
            let installer = Installer::new(config, options, cli.runner())?;
            let summary = installer.install().await?;

            println!();
            println!("{} {}", style("Selenium Grid:").bold(), summary.public_url);
            print_plan(&summary.plan);
            if let Some(nodes) = summary.ready_nodes {
                println!("{} {}", style("Registered nodes:").bold(), nodes);
            }
            println!(
                "{} {}",
                style("Manage with:").bold(),
                installer.config().install_dir.join(gridup::render::MANAGE_SCRIPT).display()
            );
            Ok(())
        }
        Commands::Render { force } => {
            let config = cli.resolve_config()?;
            let options = InstallOptions {
                force: *force,
                ..InstallOptions::default()
            };
            let installer = Installer::new(config, options, cli.runner())?;
            let probe = net::system_probe();
            let (plan, written) = installer.render(probe.as_ref())?;

            print_plan(&plan);
            for path in written {
                println!("  wrote {}", path.display());
            }
            Ok(())
        }
        Commands::Ports { json } => {
            let config = cli.resolve_config()?;
            let installer = Installer::new(config, InstallOptions::default(), cli.runner())?;
            let probe = net::system_probe();
            let plan = installer.plan_ports(probe.as_ref())?;

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&plan).context("Failed to serialize port plan")?
                );
            } else {
                print_plan(&plan);
            }
            Ok(())
        }
        Commands::Validate { config_file } => {
            info!("Validating configuration: {}", config_file.display());
            config::load_config(config_file)?;
            info!("✓ Configuration is valid");
            Ok(())
        }
        Commands::Status { install_dir } => {
            let install_dir = cli.install_dir(install_dir.clone())?;
            let descriptor = GridDescriptor::load(&install_dir)?;
            let hub_url = descriptor.hub_url.clone();
            let status = tokio::task::spawn_blocking(move || health::fetch_status(&hub_url))
                .await
                .context("Status check task failed")??;
            print_status(&descriptor, &status);
            if status.value.ready {
                Ok(())
            } else {
                Err(anyhow!("Grid is not ready: {}", status.value.message))
            }
        }
        Commands::Verify { install_dir } => {
            let install_dir = cli.install_dir(install_dir.clone())?;
            verify(&install_dir)
        }
        Commands::Smoke { install_dir, url } => {
            let install_dir = cli.install_dir(install_dir.clone())?;
            let runner = cli.runner();
            let result = tester::run_smoke_test(runner.as_ref(), &install_dir, url.as_deref()).await?;
            if let Some(message) = &result.message {
                println!("{}", message);
            }
            if result.success {
                info!("✓ Smoke test passed");
                Ok(())
            } else {
                Err(anyhow!("Smoke test failed"))
            }
        }
        Commands::Uninstall { install_dir, purge } => {
            let install_dir = cli.install_dir(install_dir.clone())?;
            let proxy: ProxyConfig = cli.stored_config()?.proxy;
            let runner = cli.runner();
            Installer::uninstall(&install_dir, runner.as_ref(), &proxy, *purge, cli.dry_run).await?;
            info!("✓ Selenium Grid removed");
            Ok(())
        }
    }
}

fn print_plan(plan: &PortPlan) {
    println!("{} {}", style("Hub port:").bold(), plan.hub_port);
    for node in &plan.nodes {
        println!("  {:<12} noVNC {}", node.name, node.vnc_port);
    }
}

fn print_status(descriptor: &GridDescriptor, status: &HubStatus) {
    let state = if status.value.ready {
        style("ready").green()
    } else {
        style("not ready").red()
    };
    println!("{} {} ({})", style("Grid:").bold(), descriptor.public_url, state);
    println!("{} {}", style("Message:").bold(), status.value.message);
    println!(
        "{} {} of {} configured, {} slots",
        style("Nodes:").bold(),
        status.node_count(),
        descriptor.nodes.len(),
        status.slot_count()
    );
    for node in &status.value.nodes {
        println!("  {} {}", node.uri, node.availability);
    }
}

fn verify(install_dir: &Path) -> Result<()> {
    let (drift, untracked) = Installer::verify_artifacts(install_dir)?;

    for name in &untracked {
        warn!("Not generated by gridup: {}", name);
    }

    if drift.is_empty() {
        info!("✓ All generated files match their checksums");
        return Ok(());
    }

    for item in &drift {
        match item {
            Drift::Modified { name } => println!("  modified  {}", name),
            Drift::Missing { name } => println!("  missing   {}", name),
        }
    }
    Err(anyhow!(
        "{} generated files differ from what gridup wrote",
        drift.len()
    ))
}
