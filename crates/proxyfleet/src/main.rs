//! proxyfleet
//!
//! Provisions proxy nodes over SSH and publishes a combined Clash subscription

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use eyre::WrapErr;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

use proxyfleet_core::FleetEvent;
use proxyfleet_link::{ProtocolKind, parse_link};
use proxyfleet_routing::aggregate;

mod config;
mod factory;
mod output;

use config::{BackendKind, Config};

#[derive(Parser)]
#[command(name = "proxyfleet")]
#[command(about = "Provision proxy nodes and publish a Clash subscription", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $PROXYFLEET_CONFIG, ./proxyfleet.toml, /etc/proxyfleet/proxyfleet.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision every host and publish the routing config
    Deploy {
        /// JSON inventory, overrides the config file
        #[arg(short, long)]
        inventory: Option<PathBuf>,

        #[arg(long, value_enum)]
        backend: Option<BackendKind>,

        /// Protocol for the sing-box backend
        #[arg(long)]
        protocol: Option<ProtocolKind>,

        /// Hosts provisioned at once
        #[arg(short = 'j', long)]
        parallel: Option<usize>,

        /// Only write the routing config locally
        #[arg(long)]
        no_distribute: bool,
    },

    /// Validate config and inventory without connecting
    Check {
        #[arg(short, long)]
        inventory: Option<PathBuf>,
    },

    /// Rebuild the routing config from a subscriptions file
    Render {
        /// Defaults to the configured subscriptions file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Defaults to the configured local path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let (mut config, source) = match &cli.config {
        Some(path) => (Config::load(path)?, Some(path.clone())),
        None => Config::load_default()?,
    };
    init_tracing(&config.general.log_level, cli.log_json);
    match &source {
        Some(path) => tracing::debug!(path = %path.display(), "config loaded"),
        None => tracing::warn!("no config file found, using defaults"),
    }

    match cli.command {
        Commands::Deploy {
            inventory,
            backend,
            protocol,
            parallel,
            no_distribute,
        } => {
            if let Some(backend) = backend {
                config.profile.backend = backend;
            }
            if let Some(protocol) = protocol {
                config.profile.protocol = protocol;
            }
            if let Some(parallel) = parallel {
                config.general.parallelism = parallel;
            }
            if no_distribute {
                config.distribution.enabled = false;
            }
            deploy(&config, inventory).await
        }
        Commands::Check { inventory } => check(&config, inventory),
        Commands::Render { input, output } => render(&config, input, output),
    }
}

async fn deploy(config: &Config, inventory: Option<PathBuf>) -> Result<()> {
    let hosts = config.hosts(inventory.as_deref())?;
    let profile = config.provision_profile()?;
    let orchestrator = factory::orchestrator(config, profile);
    let distributor = factory::distributor(config);

    let progress = tokio::spawn(log_progress(orchestrator.subscribe()));

    let result = orchestrator.run(&hosts, distributor.as_ref()).await;
    drop(orchestrator);
    progress.await.ok();

    let outcome = result?;
    output::write_subscriptions(&config.general.subscriptions_file, &outcome.report)?;
    print!("{}", output::summary(&outcome));
    Ok(())
}

/// Log fleet events until the orchestrator goes away, returning how many were seen
async fn log_progress(mut events: broadcast::Receiver<FleetEvent>) -> usize {
    let mut seen = 0;
    loop {
        match events.recv().await {
            Ok(FleetEvent::HostStateChanged { host, to, .. }) if to.is_terminal() => {
                tracing::info!(%host, state = %to, "host progress");
            }
            Ok(FleetEvent::HostStateChanged { host, to, .. }) => {
                tracing::debug!(%host, state = %to, "host progress");
            }
            Ok(FleetEvent::HostFinished { host, success }) => {
                tracing::info!(%host, success, "host finished");
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "progress events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        }
        seen += 1;
    }
    seen
}

fn check(config: &Config, inventory: Option<PathBuf>) -> Result<()> {
    let hosts = config.hosts(inventory.as_deref())?;
    let profile = config.provision_profile()?;

    for host in &hosts {
        host.credential
            .validate()
            .wrap_err_with(|| format!("host `{}`", host.alias))?;
    }

    println!(
        "{} hosts, backend {} ({}), port {}",
        hosts.len(),
        profile.backend.name(),
        profile.backend.protocol(),
        profile.listen_port
    );
    for host in &hosts {
        println!(
            "  {}  {}@{}:{} ({})",
            host.alias,
            host.ssh_user,
            host.url_host(),
            host.ssh_port,
            host.credential.method()
        );
    }
    Ok(())
}

fn render(config: &Config, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let input = input.unwrap_or_else(|| config.general.subscriptions_file.clone());
    let output = output.unwrap_or_else(|| config.distribution.local_path.clone());

    let content = std::fs::read_to_string(&input)
        .wrap_err_with(|| format!("failed to read {}", input.display()))?;
    let records: Vec<_> = output::parse_subscriptions(&content)
        .into_iter()
        .filter_map(|(alias, link)| parse_link(&link, &alias))
        .collect();

    let routing = aggregate(&records, &config.routing);
    let yaml = routing.to_yaml()?;
    std::fs::write(&output, yaml).wrap_err_with(|| format!("failed to write {}", output.display()))?;

    println!("{} proxies written to {}", routing.proxies.len(), output.display());
    Ok(())
}
