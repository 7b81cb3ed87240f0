use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vaultkv::VaultClient;
use vaultkv_config::VaultConfig;

mod args;

use args::{into_map, patch_map, Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays parseable JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("vaultkv=info".parse()?)
                .add_directive("vaultkv_config=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = VaultConfig::load_and_resolve(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    let client = config
        .build_client()
        .context("Failed to create vault client")?;

    run(&client, args.command).await
}

async fn run(client: &VaultClient, command: Command) -> Result<()> {
    match command {
        Command::Read { path, key } => {
            let secret = match key {
                Some(key) => client.read_key(&path, &key).await?,
                None => client.read(&path).await?,
            };
            println!("{}", serde_json::to_string_pretty(&secret)?);
        }
        Command::Create {
            engine,
            name,
            data,
            options,
        } => {
            if data.is_empty() && options.is_empty() {
                client.create_empty(&engine, &name).await?;
            } else {
                client
                    .create(&engine, &name, into_map(data), into_map(options))
                    .await?;
            }
            tracing::info!("Created {}/{}", engine, name);
        }
        Command::Patch {
            engine,
            name,
            data,
            delete,
            options,
        } => {
            client
                .patch(&engine, &name, patch_map(data, delete), into_map(options))
                .await?;
            tracing::info!("Patched {}/{}", engine, name);
        }
        Command::Destroy {
            engine,
            name,
            version,
        } => {
            client.destroy(&engine, &name, version).await?;
            tracing::info!("Destroy requested for {}/{}", engine, name);
        }
    }

    Ok(())
}
