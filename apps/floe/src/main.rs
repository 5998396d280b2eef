//! floe: resumable, tree-hash verified archive transfers.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use floe_engine::{DownloadInput, Downloader, UploadInput, Uploader};
use floe_vault::LocalVault;
use tracing_subscriber::EnvFilter;

use config::FloeConfig;

#[derive(Parser)]
#[command(name = "floe")]
#[command(about = "Resumable multi-part archive upload and verified download")]
#[command(version)]
struct Cli {
    /// Account that owns the vault ("-" for your own account)
    #[arg(long, global = true)]
    account_id: Option<String>,

    /// Part size in bytes (1 MiB times a power of two)
    #[arg(long, global = true)]
    part_size: Option<u64>,

    /// Number of parts transferred concurrently
    #[arg(long, short, global = true)]
    jobs: Option<usize>,

    /// Directory served as the vault service
    #[arg(long, global = true)]
    vault_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file as a new archive, or resume an interrupted upload
    Upload {
        /// Upload id printed by an earlier, interrupted run
        #[arg(long)]
        upload_id: Option<String>,
        /// Vault name
        vault: String,
        /// File to upload
        file: PathBuf,
    },
    /// Download the output of a retrieval job into a new file
    Download {
        /// Retrieval job id
        #[arg(long)]
        job_id: String,
        /// Vault name
        vault: String,
        /// Destination file (must not exist)
        file: PathBuf,
    },
    /// Start a retrieval job for an archive and print its job id
    Retrieve {
        /// Vault name
        vault: String,
        /// Archive id returned by upload
        archive_id: String,
    },
}

impl Cli {
    fn apply(&self, mut config: FloeConfig) -> FloeConfig {
        if let Some(account_id) = &self.account_id {
            config.account_id = account_id.clone();
        }
        if let Some(part_size) = self.part_size {
            config.part_size = part_size;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(vault_root) = &self.vault_root {
            config.vault_root = vault_root.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info,floe=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = cli.apply(FloeConfig::load()?);
    let vault = Arc::new(
        LocalVault::new(&config.vault_root)
            .with_context(|| format!("cannot open vault root {}", config.vault_root.display()))?,
    );

    match cli.command {
        Commands::Upload {
            upload_id,
            vault: vault_name,
            file,
        } => {
            let input = UploadInput {
                account_id: config.account_id,
                vault_name,
                file_name: file,
                upload_id,
                part_size: config.part_size,
            };
            let outcome = Uploader::new(vault, input)
                .upload(config.jobs)
                .await
                .context("upload failed")?;
            println!("archive id: {}", outcome.archive_id);
            println!("location:   {}", outcome.location);
            println!("tree hash:  {}", outcome.tree_hash);
        }
        Commands::Download {
            job_id,
            vault: vault_name,
            file,
        } => {
            let input = DownloadInput {
                account_id: config.account_id,
                vault_name,
                file_name: file.clone(),
                job_id,
                part_size: config.part_size,
            };
            let outcome = Downloader::new(vault, input)
                .download(config.jobs)
                .await
                .context("download failed")?;
            println!(
                "{}: {} bytes, tree hash {}",
                file.display(),
                outcome.archive_size,
                outcome.tree_hash
            );
        }
        Commands::Retrieve {
            vault: vault_name,
            archive_id,
        } => {
            let job_id = vault
                .initiate_retrieval(&config.account_id, &vault_name, &archive_id)
                .await
                .context("retrieval failed")?;
            println!("{job_id}");
        }
    }

    Ok(())
}
