use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};

use xmds_player::config::{PlayerConfig, TransportConfig};
use xmds_player::crypto::{self, RsaKeyPair};
use xmds_player::services::manager::{ServicesState, start_services};
use xmds_player::services::stats_upload::StatsUploadService;
use xmds_player::stats::StatsStore;
use xmds_player::system::HardwareKey;
use xmds_player::transport::{TransportContext, Url};
use xmds_player::xmds::{PlayerSettings, RequiredItems, XmdsClient};

const RSA_KEY_BITS: usize = 2048;

#[derive(Parser, Debug)]
#[command(name = "xmds-player", about = "XMDS digital signage player")]
struct Args {
    /// CMS base address
    #[arg(long, global = true, default_value = "http://localhost")]
    cms_url: String,

    /// CMS server key
    #[arg(long, global = true, default_value = "")]
    server_key: String,

    #[arg(long, global = true, default_value = "xmds-player")]
    display_name: String,

    #[arg(long, global = true, default_value_t = 1)]
    client_code: i32,

    #[arg(long, global = true, default_value = env!("CARGO_PKG_VERSION"))]
    client_version: String,

    /// Directory for keys, settings and the stats database
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, global = true)]
    public_key: Option<PathBuf>,

    #[arg(long, global = true)]
    private_key: Option<PathBuf>,

    #[arg(long, global = true)]
    stats_db: Option<PathBuf>,

    /// Collection interval in seconds until the CMS sends its own
    #[arg(long, global = true, default_value_t = 900)]
    collect_interval: u64,

    #[arg(long, global = true, default_value_t = 50)]
    stats_batch_size: usize,

    /// Stage timeouts in seconds; 0 disables the limit
    #[arg(long, global = true)]
    resolve_timeout: Option<u64>,

    #[arg(long, global = true)]
    connect_timeout: Option<u64>,

    #[arg(long, global = true)]
    handshake_timeout: Option<u64>,

    #[arg(long, global = true)]
    write_timeout: Option<u64>,

    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register the display and store the settings it receives
    Register,
    /// Print the required files manifest
    RequiredFiles,
    /// Fetch one widget resource
    Resource {
        layout_id: i32,
        region_id: i32,
        media_id: i32,
    },
    /// Inspect or upload the local statistics queue
    Stats {
        #[command(subcommand)]
        action: StatsAction,
    },
    /// Run collection and stats upload until interrupted
    Run,
    /// Create the display RSA key pair
    Keygen {
        /// Replace existing keys
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum StatsAction {
    Count,
    /// Upload everything queued now
    Flush,
    /// Drop every queued record
    Clear,
}

impl Args {
    fn player_config(&self) -> PlayerConfig {
        let stage = |override_secs: Option<u64>, default: Option<Duration>| match override_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => default,
        };
        let defaults = TransportConfig::default();

        PlayerConfig {
            cms_url: self.cms_url.clone(),
            server_key: self.server_key.clone(),
            display_name: self.display_name.clone(),
            client_code: self.client_code,
            client_version: self.client_version.clone(),
            public_key_path: self
                .public_key
                .clone()
                .unwrap_or_else(|| self.data_dir.join("public.der")),
            private_key_path: self
                .private_key
                .clone()
                .unwrap_or_else(|| self.data_dir.join("private.der")),
            stats_db_path: self
                .stats_db
                .clone()
                .unwrap_or_else(|| self.data_dir.join("stats.db")),
            settings_path: self.data_dir.join("settings.xml"),
            collect_interval: Duration::from_secs(self.collect_interval),
            stats_batch_size: self.stats_batch_size,
            transport: TransportConfig {
                resolve_timeout: stage(self.resolve_timeout, defaults.resolve_timeout),
                connect_timeout: stage(self.connect_timeout, defaults.connect_timeout),
                handshake_timeout: stage(self.handshake_timeout, defaults.handshake_timeout),
                write_timeout: stage(self.write_timeout, defaults.write_timeout),
                read_timeout: stage(self.read_timeout, defaults.read_timeout),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.parse().unwrap_or_default()),
        )
        .init();

    info!("xmds-player v{} starting", env!("CARGO_PKG_VERSION"));
    let config = args.player_config();

    match args.command {
        Command::Keygen { force } => keygen(&config, force),
        Command::Register => {
            let client = xmds_client(&config)?;
            let registration = client
                .register_display(config.client_code, &config.client_version, &config.display_name)
                .await
                .context("RegisterDisplay failed")?;
            registration
                .settings
                .save_to(&config.settings_path)
                .context("cannot save settings")?;

            println!(
                "status: {:?} ({})",
                registration.status.code, registration.status.message
            );
            for (name, value) in registration.settings.iter() {
                println!("  {name} = {value}");
            }
            Ok(())
        }
        Command::RequiredFiles => {
            let items = xmds_client(&config)?
                .required_files()
                .await
                .context("RequiredFiles failed")?;
            for file in &items.files {
                println!("{file}");
            }
            for resource in &items.resources {
                println!("{resource}");
            }
            Ok(())
        }
        Command::Resource {
            layout_id,
            region_id,
            media_id,
        } => {
            let body = xmds_client(&config)?
                .get_resource(layout_id, region_id, media_id)
                .await
                .context("GetResource failed")?;
            println!("{body}");
            Ok(())
        }
        Command::Stats { action } => {
            let store = StatsStore::open(&config.stats_db_path)?;
            match action {
                StatsAction::Count => println!("{}", store.records_count()?),
                StatsAction::Clear => println!("removed {}", store.remove_all()?),
                StatsAction::Flush => {
                    let client = xmds_client(&config)?;
                    let uploaded =
                        StatsUploadService::upload_pending(&store, &client, config.stats_batch_size)
                            .await?;
                    println!("uploaded {uploaded}, {} left", store.records_count()?);
                }
            }
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: PlayerConfig) -> Result<()> {
    let settings = match PlayerSettings::load_from(&config.settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Using default settings: {}", e);
            PlayerSettings::default()
        }
    };

    let state = Arc::new(RwLock::new(ServicesState::new(settings, config.collect_interval)));
    let store = Arc::new(StatsStore::open(&config.stats_db_path)?);
    let client = Arc::new(xmds_client(&config)?);
    let config = Arc::new(config);

    // Media download lives outside this binary; report what it would fetch
    let (downloads_tx, mut downloads_rx) = mpsc::channel::<RequiredItems>(4);
    let downloader = tokio::spawn(async move {
        while let Some(items) = downloads_rx.recv().await {
            for file in &items.files {
                info!("Required: {}", file);
            }
            for resource in &items.resources {
                info!("Required: {}", resource);
            }
        }
    });

    let handles = start_services(state, client, store, config, downloads_tx);

    tokio::signal::ctrl_c().await?;
    for handle in handles {
        handle.abort();
    }
    downloader.abort();
    info!("xmds-player shutdown");
    Ok(())
}

fn xmds_client(config: &PlayerConfig) -> Result<XmdsClient> {
    if config.server_key.is_empty() {
        bail!("--server-key is required to talk to the CMS");
    }

    let context = TransportContext::new(config.transport.clone())?;
    let cms = Url::parse(&config.cms_url)?;
    let (hardware_key, mac) = HardwareKey::generate().context("cannot determine hardware key")?;

    let keys = load_or_create_keys(&config.public_key_path, &config.private_key_path)?;
    let public_key = crypto::public_key_to_string(&keys.public_key)?;

    Ok(XmdsClient::new(context, &cms, config.server_key.clone(), &hardware_key)
        .with_mac_address(mac)
        .with_public_key(public_key))
}

fn load_or_create_keys(public_path: &Path, private_path: &Path) -> Result<RsaKeyPair> {
    if public_path.exists() && private_path.exists() {
        return Ok(crypto::load_rsa_keys(public_path, private_path)?);
    }

    info!("Generating {}-bit RSA key pair", RSA_KEY_BITS);
    let keys = crypto::generate_rsa_keys(RSA_KEY_BITS)?;
    crypto::save_rsa_keys(&keys, public_path, private_path)?;
    Ok(keys)
}

fn keygen(config: &PlayerConfig, force: bool) -> Result<()> {
    if config.private_key_path.exists() && !force {
        bail!(
            "{} already exists; pass --force to replace it",
            config.private_key_path.display()
        );
    }

    let keys = crypto::generate_rsa_keys(RSA_KEY_BITS)?;
    crypto::save_rsa_keys(&keys, &config.public_key_path, &config.private_key_path)?;
    println!("{}", crypto::public_key_to_string(&keys.public_key)?);
    Ok(())
}
