/// Collection service.
/// Registers the display and hands the required files manifest to the downloader.
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::PlayerConfig;
use crate::error::PlayerError;
use crate::services::manager::ServicesState;
use crate::xmds::{RegistrationStatus, RequiredItems, XmdsClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionOutcome {
    /// Registered but not authorised yet; no manifest requested
    NotReady(RegistrationStatus),
    Manifest { files: usize, resources: usize },
}

pub struct CollectionService;

impl CollectionService {
    /// Collect now, then every `collectInterval`. Errors are logged and the
    /// next cycle runs as scheduled.
    pub async fn run(
        state: Arc<RwLock<ServicesState>>,
        client: Arc<XmdsClient>,
        config: Arc<PlayerConfig>,
        downloads: mpsc::Sender<RequiredItems>,
    ) {
        loop {
            match Self::collect_once(&state, &client, &config, &downloads).await {
                Ok(CollectionOutcome::Manifest { files, resources }) => {
                    info!("Collection done: {} file(s), {} resource(s)", files, resources);
                }
                Ok(CollectionOutcome::NotReady(status)) => {
                    info!("Display awaiting authorisation: {}", status.message);
                }
                Err(e) => warn!("Collection failed: {}", e),
            }

            let interval = state.read().await.collect_interval();
            debug!("Next collection in {:?}", interval);
            time::sleep(interval).await;
        }
    }

    pub async fn collect_once(
        state: &RwLock<ServicesState>,
        client: &XmdsClient,
        config: &PlayerConfig,
        downloads: &mpsc::Sender<RequiredItems>,
    ) -> Result<CollectionOutcome, PlayerError> {
        let registration = client
            .register_display(config.client_code, &config.client_version, &config.display_name)
            .await?;

        if let Err(e) = registration.settings.save_to(&config.settings_path) {
            warn!("Failed to persist settings: {}", e);
        }
        {
            let mut state = state.write().await;
            state.settings = registration.settings;
            state.registration = Some(registration.status.clone());
            state.last_collection = Some(Utc::now());
        }

        if !registration.status.is_ready() {
            return Ok(CollectionOutcome::NotReady(registration.status));
        }

        let items = client.required_files().await?;
        let outcome = CollectionOutcome::Manifest {
            files: items.files.len(),
            resources: items.resources.len(),
        };
        if downloads.send(items).await.is_err() {
            warn!("Downloader is gone, manifest dropped");
        }
        Ok(outcome)
    }
}
