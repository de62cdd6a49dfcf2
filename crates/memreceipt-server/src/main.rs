//! memreceipt - signed receipts for memory write, search and revoke.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memreceipt::store::SqliteStore;
use memreceipt::verify::{
    parse_receipt_json, BundledKeys, FallbackTrust, HttpTrustSource, TrustSource, Verifier,
};
use memreceipt::{MemoryService, Receipt, ServiceConfig};

#[derive(Parser)]
#[command(name = "memreceipt")]
#[command(version)]
#[command(about = "Signed, content-derived receipts for memory operations")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEMRECEIPT_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the configuration file)
    #[arg(long, env = "MEMRECEIPT_DATABASE")]
    database: Option<PathBuf>,

    /// Hex master key sealing signing keys at rest
    #[arg(long, env = "MEMRECEIPT_MASTER_KEY", hide_env_values = true)]
    master_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on (overrides the configuration file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Retire the active signing key and activate a new one
    RotateKey,

    /// Print the published key document
    Document,

    /// Verify a receipt file (JSON or canonical CBOR)
    Verify {
        /// Receipt file
        #[arg(long)]
        receipt: PathBuf,

        /// Key document or key list to verify against offline
        #[arg(long)]
        keys: Option<PathBuf>,

        /// Issuer (did:web or URL) whose published keys to fetch
        #[arg(long)]
        issuer: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("memreceipt={0},memreceipt_server={0},tower_http=info", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(database) = cli.database {
        config.database = Some(database);
    }
    if let Some(master_key) = cli.master_key {
        config.master_key = Some(master_key);
    }
    config.validate()?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            serve(config).await
        }
        Commands::RotateKey => {
            let service = open_service(config).await?;
            let key = service.rotate_key().await?;
            println!("{}", serde_json::to_string_pretty(&key)?);
            Ok(())
        }
        Commands::Document => {
            let service = open_service(config).await?;
            let document = service.key_document().await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        Commands::Verify {
            receipt,
            keys,
            issuer,
        } => verify(config, &receipt, keys.as_deref(), issuer.as_deref()).await,
    }
}

async fn open_service(config: ServiceConfig) -> Result<MemoryService<SqliteStore>> {
    let store = match &config.database {
        Some(path) => SqliteStore::open(path)
            .with_context(|| format!("open database {}", path.display()))?,
        None => {
            tracing::warn!("no database configured, using an in-memory store");
            SqliteStore::open_memory()?
        }
    };
    Ok(MemoryService::open(Arc::new(store), config).await?)
}

async fn serve(config: ServiceConfig) -> Result<()> {
    let bind = config.bind.clone();
    let service = Arc::new(open_service(config).await?);
    let app = memreceipt_server::router(service);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    tracing::info!(addr = %listener.local_addr()?, "memreceipt listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

fn read_receipt(path: &Path) -> Result<Receipt> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    match std::str::from_utf8(&bytes) {
        Ok(text) if text.trim_start().starts_with('{') => Ok(parse_receipt_json(text)?),
        _ => Ok(Receipt::from_cbor(&bytes)?),
    }
}

async fn verify(
    config: ServiceConfig,
    receipt_path: &Path,
    keys: Option<&Path>,
    issuer: Option<&str>,
) -> Result<()> {
    let receipt = read_receipt(receipt_path)?;

    let bundled = match keys {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            Some(Arc::new(BundledKeys::from_json(&json)?))
        }
        None => None,
    };

    let result = match (issuer, bundled) {
        (Some(issuer), bundled) => {
            let remote = Arc::new(HttpTrustSource::new(issuer, config.trust_timeout())?);
            let trust: Arc<dyn TrustSource> = match bundled {
                Some(bundled) => Arc::new(FallbackTrust::new(remote.clone(), bundled)),
                None => remote.clone(),
            };
            Verifier::new(trust).with_revocations(remote).verify(&receipt).await?
        }
        (None, Some(bundled)) => Verifier::new(bundled).verify(&receipt).await?,
        (None, None) => open_service(config).await?.verify(&receipt).await?,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.signature_valid {
        bail!(
            "receipt is not valid: {}",
            result.reason.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}
