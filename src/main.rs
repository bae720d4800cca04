//! # regassist CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `regassist serve` | Start the web chat UI |
//! | `regassist ask "<question>"` | Ask one question and print the formatted answer |
//! | `regassist metadata` | Write metadata sidecars for every PDF in the data folder |
//! | `regassist storage sync` | Mirror the data folder into the S3 bucket |
//! | `regassist storage list` | List objects in the S3 bucket |
//! | `regassist config` | Print the effective configuration |
//!
//! ## Examples
//!
//! ```bash
//! APP_PASSWORD=s3cret regassist serve
//! regassist ask "Do I need a permit to sell fireworks?"
//! regassist metadata --root ./data
//! regassist storage sync --bucket my-regulations
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use regassist::assistant::Assistant;
use regassist::classify;
use regassist::config::{self, Config};
use regassist::server;
use regassist::storage::{self, ObjectStore, S3Client};

/// Regulations assistant: chat over a managed knowledge base, plus the
/// utilities that prepare its documents.
#[derive(Parser)]
#[command(name = "regassist", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it is missing.
    #[arg(long, global = true, default_value = "./config/regassist.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web chat UI.
    Serve,

    /// Ask a single question and print the formatted answer.
    Ask {
        /// The question text.
        question: String,
    },

    /// Generate `.metadata.json` sidecars for every PDF under the data root.
    ///
    /// Existing sidecars are overwritten.
    Metadata {
        /// Data root (overrides `[metadata].root`).
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Object storage utilities.
    Storage {
        #[command(subcommand)]
        action: StorageAction,
    },

    /// Print the effective configuration (password redacted).
    Config,
}

#[derive(Subcommand)]
enum StorageAction {
    /// Upload every file under the local folder, keyed by relative path.
    ///
    /// Creates the bucket if it does not exist.
    Sync {
        /// Local folder (overrides `[storage].root`).
        #[arg(long)]
        root: Option<PathBuf>,
        /// Bucket name (overrides `[storage].bucket`).
        #[arg(long)]
        bucket: Option<String>,
    },
    /// List objects in the bucket.
    List {
        /// Only keys starting with this prefix.
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask { question } => {
            let assistant = Assistant::from_config(&cfg)?;
            let reply = assistant.reply(&question).await?;
            println!("{}", reply.content);
        }
        Commands::Metadata { root } => {
            let root = root.unwrap_or_else(|| cfg.metadata.root.clone());
            let min_chars = cfg.metadata.min_text_chars;
            let summary = tokio::task::spawn_blocking(move || {
                classify::generate_metadata(&root, min_chars)
            })
            .await
            .context("metadata task panicked")??;

            println!("Complete! Processed {} documents.", summary.processed);
            println!("Found {} potentially scanned files.", summary.scanned);
            if summary.failed > 0 {
                println!("Failed to write {} sidecars.", summary.failed);
            }
        }
        Commands::Storage { action } => match action {
            StorageAction::Sync { root, bucket } => {
                if let Some(bucket) = bucket {
                    cfg.storage.bucket = bucket;
                }
                let root = root.unwrap_or_else(|| cfg.storage.root.clone());
                let client = S3Client::from_config(&cfg)?;
                let summary = storage::mirror_folder(&client, &root).await?;
                println!(
                    "Uploaded {} files to s3://{}",
                    summary.uploaded,
                    client.bucket()
                );
                if summary.failed > 0 {
                    println!("{} files failed to upload.", summary.failed);
                }
            }
            StorageAction::List { prefix } => {
                let client = S3Client::from_config(&cfg)?;
                let objects = client.list_objects(&prefix).await?;
                for obj in &objects {
                    println!("{:>12}  {}", obj.size, obj.key);
                }
                println!("{} objects in s3://{}", objects.len(), client.bucket());
            }
        },
        Commands::Config => {
            print_config(&cfg);
        }
    }

    Ok(())
}

fn print_config(cfg: &Config) {
    let kb = &cfg.knowledge_base;
    println!("knowledge_base.id        {}", kb.id);
    println!("knowledge_base.region    {}", kb.region);
    println!("knowledge_base.model_arn {}", kb.model_arn());
    if let Some(ref endpoint) = kb.endpoint_url {
        println!("knowledge_base.endpoint  {}", endpoint);
    }
    println!("citations.style          {}", cfg.citations.style);
    println!("citations.link_base_url  {}", cfg.citations.link_base_url);
    println!("server.bind              {}", cfg.server.bind);
    println!(
        "server.password          {}",
        if cfg.server.password.is_some() { "<set>" } else { "<none>" }
    );
    println!("server.session_idle_secs {}", cfg.server.session_idle_secs);
    println!("server.max_sessions      {}", cfg.server.max_sessions);
    println!("metadata.root            {}", cfg.metadata.root.display());
    println!("metadata.min_text_chars  {}", cfg.metadata.min_text_chars);
    println!("storage.bucket           {}", cfg.storage.bucket);
    println!("storage.region           {}", cfg.storage_region());
    println!("storage.root             {}", cfg.storage.root.display());
}

/// Logs go to stderr so command output on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
