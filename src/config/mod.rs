use std::path::PathBuf;
use std::time::Duration;

/// Top-level player configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// CMS base address, e.g. `https://cms.example.com`
    pub cms_url: String,
    pub server_key: String,
    pub display_name: String,
    pub client_code: i32,
    pub client_version: String,
    pub public_key_path: PathBuf,
    pub private_key_path: PathBuf,
    pub stats_db_path: PathBuf,
    pub settings_path: PathBuf,
    /// Used until the CMS pushes its own `collectInterval`
    pub collect_interval: Duration,
    /// Records sent per SubmitStats call
    pub stats_batch_size: usize,
    pub transport: TransportConfig,
}

/// Per-stage limits for transport sessions. `None` waits forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub resolve_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub handshake_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(30)),
            handshake_timeout: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(60)),
            read_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl TransportConfig {
    /// No stage limits at all
    pub fn unbounded() -> Self {
        Self {
            resolve_timeout: None,
            connect_timeout: None,
            handshake_timeout: None,
            write_timeout: None,
            read_timeout: None,
        }
    }

    /// Same limit for every stage; zero seconds disables limits
    pub fn uniform(secs: u64) -> Self {
        if secs == 0 {
            return Self::unbounded();
        }
        let limit = Some(Duration::from_secs(secs));
        Self {
            resolve_timeout: limit,
            connect_timeout: limit,
            handshake_timeout: limit,
            write_timeout: limit,
            read_timeout: limit,
        }
    }
}
