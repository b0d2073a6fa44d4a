use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use hearth::{MergedConfiguration, PropertySources, Server, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "hearth", version, about = "Embeddable server bootstrapper")]
struct Cli {
    /// Logical name of the property resource to load.
    #[arg(long)]
    config: Option<String>,

    /// Resource roots searched for properties, conf directories and
    /// certificates. Defaults to the working directory.
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// Override a single option, repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(error) = run(Cli::parse()).await {
        tracing::error!(%error, "startup failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let sources = if cli.roots.is_empty() {
        PropertySources::default()
    } else {
        PropertySources::new(cli.roots.clone())
    };

    let mut config = ServerConfig::default();
    let resource = cli
        .config
        .unwrap_or_else(|| config.properties_resource.clone());
    config.load_from(&resource, &sources)?;

    if !cli.overrides.is_empty() {
        let mut entries = Vec::with_capacity(cli.overrides.len());
        for raw in &cli.overrides {
            let Some((key, value)) = raw.split_once('=') else {
                return Err(format!("invalid --set '{raw}', expected KEY=VALUE").into());
            };
            entries.push((key.to_string(), value.to_string()));
        }
        config.bind_bag(MergedConfiguration::from_entries("cli", entries))?;
    }

    tracing::debug!(
        config = %serde_json::to_string_pretty(&config)?,
        "effective configuration"
    );

    let server = Server::with_parts(
        config,
        sources,
        hearth::EnvOverlay::new(),
        Box::new(hearth::TcpContainer::new()),
    );
    server.start()?;
    server.wait().await;
    Ok(())
}
