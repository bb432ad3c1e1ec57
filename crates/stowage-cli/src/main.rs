mod cli;
mod config;
mod files;
mod secrets;
mod storage;

use clap::Parser;
use color_eyre::Result;
use secrecy::{ExposeSecret, SecretString};
use stowage_core::{
    persister::{checksum, Persister},
    secrets::SecretsKeeper,
    Identifiable,
};
use stowage_storage::key_provider::generate_encoded_key;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use uuid::Uuid;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    cli::ConfigCommand,
    config::{Config, SecretsConfig},
    storage::ConfiguredKeeper,
};

/// Entry point wiring the CLI to the configured persister and keeper.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    dispatch(cli::Cli::parse()).await
}

async fn dispatch(cli: cli::Cli) -> Result<()> {
    // Only commands that touch storage need a parseable config.
    let load_config = || config::load(cli.config.as_deref());
    match cli.command.clone() {
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&load_config()?).await?,
        cli::Command::Config(ConfigCommand::Init { generate_key }) => {
            init_config(cli.config.clone(), generate_key)?;
        }
        cli::Command::File(cmd) => files::handle(cmd, &load_config()?).await?,
        cli::Command::Secret(cmd) => secrets::handle(cmd, &load_config()?).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info. Logs go to stderr so command
    // output (file content, secrets) stays pipeable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("stowage {}", env!("CARGO_PKG_VERSION"));
}

pub(crate) async fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    Ok(buf)
}

/// Round-trips a probe through both configured backends.
async fn run_health_check(config: &Config) -> Result<()> {
    let persister = storage::persister_from_config(config)?;
    match storage::keeper_from_config(config)? {
        ConfiguredKeeper::File(keeper) => run_store_health(&persister, &keeper).await?,
        ConfiguredKeeper::Keyring(keeper) => run_store_health(&persister, &keeper).await?,
    }
    println!("Persister: ok");
    println!("Secrets keeper: ok");
    Ok(())
}

async fn run_store_health<P, K>(persister: &P, keeper: &K) -> Result<()>
where
    P: Persister,
    K: SecretsKeeper,
{
    persister.init().await?;
    let file_check = probe_persister(persister).await;
    persister.close().await?;
    file_check?;
    info!(persister = %persister.name(), "persister healthy");

    keeper.init().await?;
    let secret_check = probe_keeper(keeper).await;
    keeper.close().await?;
    secret_check?;
    info!(keeper = %keeper.name(), "secrets keeper healthy");
    Ok(())
}

const PROBE_PAYLOAD: &str = "ok";

/// Per-run name so the check never clobbers an entry the user stored.
fn probe_name() -> String {
    format!("probe-{}", Uuid::new_v4())
}

async fn probe_persister<P: Persister>(persister: &P) -> Result<()> {
    let name = probe_name();
    let receipt = persister
        .save_file("health", &name, PROBE_PAYLOAD)
        .await?;
    let round_trip = persister.load_file("health", &name).await?;
    persister.delete_file("health", &name).await?;

    if round_trip != PROBE_PAYLOAD || receipt.checksum != checksum(PROBE_PAYLOAD) {
        color_eyre::eyre::bail!("persister round-trip failed");
    }
    Ok(())
}

async fn probe_keeper<K: SecretsKeeper>(keeper: &K) -> Result<()> {
    let probe_path = format!("health/{}", probe_name());
    keeper
        .save_secret(&probe_path, SecretString::from(PROBE_PAYLOAD))
        .await?;
    let round_trip = keeper.load_secret(&probe_path).await?;
    keeper.delete_secret(&probe_path).await?;

    if round_trip.expose_secret() != PROBE_PAYLOAD {
        color_eyre::eyre::bail!("secrets keeper round-trip failed");
    }
    Ok(())
}

/// Returns whether a new file was written.
fn init_config(path: Option<std::path::PathBuf>, generate_key: bool) -> Result<bool> {
    let path = match path {
        Some(path) => path,
        None => config::default_path()?,
    };
    let mut defaults = Config::default();
    if generate_key {
        defaults.secrets = Some(SecretsConfig {
            master_key: Some(generate_encoded_key().expose_secret().to_string()),
            ..SecretsConfig::default()
        });
    }
    if path.exists() {
        warn!(path = %path.display(), "config already exists, leaving it untouched");
        return Ok(false);
    }
    let path = config::write_if_missing(&defaults, &path)?;
    println!("Config initialized at {}", path.display());
    Ok(true)
}
