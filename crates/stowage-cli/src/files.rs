use color_eyre::Result;
use stowage_core::persister::Persister;

use crate::{cli::FileCommand, config, storage};

/// Execute a file subcommand against the configured persister.
pub async fn handle(cmd: FileCommand, config: &config::Config) -> Result<()> {
    let persister = storage::persister_from_config(config)?;
    persister.init().await?;
    let outcome = run(&persister, cmd).await;
    persister.close().await?;
    println!("{}", outcome?);
    Ok(())
}

/// Run `cmd` against an initialized persister, returning what to print.
pub async fn run<P: Persister>(persister: &P, cmd: FileCommand) -> Result<String> {
    match cmd {
        FileCommand::Save {
            path,
            name,
            content,
            from,
        } => {
            let content = match (content, from) {
                (Some(content), _) => content,
                (None, Some(file)) => tokio::fs::read_to_string(&file).await?,
                (None, None) => crate::read_stdin().await?,
            };
            let receipt = persister.save_file(&path, &name, &content).await?;
            Ok(format!(
                "Saved {} (sha256 {}, {} bytes)",
                receipt.location, receipt.checksum, receipt.bytes
            ))
        }
        FileCommand::Load { path, name } => Ok(persister.load_file(&path, &name).await?),
        FileCommand::Delete { path, name } => {
            persister.delete_file(&path, &name).await?;
            Ok(format!("Deleted {path}/{name}"))
        }
    }
}
