use color_eyre::Result;
use secrecy::{ExposeSecret, SecretString};
use stowage_core::secrets::SecretsKeeper;

use crate::{
    cli::SecretCommand,
    config,
    storage::{self, ConfiguredKeeper},
};

/// Execute a secret subcommand against the configured keeper.
pub async fn handle(cmd: SecretCommand, config: &config::Config) -> Result<()> {
    let output = match storage::keeper_from_config(config)? {
        ConfiguredKeeper::File(keeper) => with_keeper(&keeper, cmd).await?,
        ConfiguredKeeper::Keyring(keeper) => with_keeper(&keeper, cmd).await?,
    };
    println!("{output}");
    Ok(())
}

async fn with_keeper<K: SecretsKeeper>(keeper: &K, cmd: SecretCommand) -> Result<String> {
    keeper.init().await?;
    let outcome = run(keeper, cmd).await;
    keeper.close().await?;
    outcome
}

/// Run `cmd` against an initialized keeper, returning what to print.
pub async fn run<K: SecretsKeeper>(keeper: &K, cmd: SecretCommand) -> Result<String> {
    match cmd {
        SecretCommand::Set { path, value } => {
            let value = match value {
                Some(value) => value,
                None => crate::read_stdin()
                    .await?
                    .trim_end_matches(['\r', '\n'])
                    .to_string(),
            };
            keeper.save_secret(&path, SecretString::from(value)).await?;
            Ok(format!("Stored secret at {path}"))
        }
        SecretCommand::Get { path } => {
            let secret = keeper.load_secret(&path).await?;
            Ok(secret.expose_secret().to_string())
        }
        SecretCommand::Delete { path } => {
            keeper.delete_secret(&path).await?;
            Ok(format!("Deleted secret at {path}"))
        }
    }
}
