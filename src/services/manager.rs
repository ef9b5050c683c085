/// Services manager: shared state and startup of the background loops.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::PlayerConfig;
use crate::services::collection::CollectionService;
use crate::services::stats_upload::StatsUploadService;
use crate::stats::StatsStore;
use crate::xmds::{PlayerSettings, RegistrationStatus, RequiredItems, XmdsClient};

/// Shared services state
pub struct ServicesState {
    pub settings: PlayerSettings,
    /// Outcome of the last successful RegisterDisplay
    pub registration: Option<RegistrationStatus>,
    pub last_collection: Option<DateTime<Utc>>,
    pub last_upload: Option<DateTime<Utc>>,
    fallback_interval: Duration,
}

impl ServicesState {
    pub fn new(settings: PlayerSettings, fallback_interval: Duration) -> Self {
        Self {
            settings,
            registration: None,
            last_collection: None,
            last_upload: None,
            fallback_interval,
        }
    }

    /// CMS-provided interval once registered, the configured one before.
    pub fn collect_interval(&self) -> Duration {
        match self.registration {
            Some(_) => self.settings.collect_interval(),
            None => self.fallback_interval,
        }
    }
}

/// Start all background services
pub fn start_services(
    state: Arc<RwLock<ServicesState>>,
    client: Arc<XmdsClient>,
    store: Arc<StatsStore>,
    config: Arc<PlayerConfig>,
    downloads: mpsc::Sender<RequiredItems>,
) -> Vec<JoinHandle<()>> {
    info!("Starting background services");

    // Register + required files, every collectInterval
    let collection = {
        let state = state.clone();
        let client = client.clone();
        let config = config.clone();
        tokio::spawn(async move {
            CollectionService::run(state, client, config, downloads).await;
        })
    };

    // Statistics upload
    let upload = tokio::spawn(async move {
        StatsUploadService::run(state, store, client, config.stats_batch_size).await;
    });

    vec![collection, upload]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_before_and_after_registration() {
        let settings = PlayerSettings::from_pairs([("collectInterval", "300")]);
        let mut state = ServicesState::new(settings, Duration::from_secs(30));
        assert_eq!(state.collect_interval(), Duration::from_secs(30));

        state.registration = Some(RegistrationStatus {
            code: crate::xmds::RegistrationCode::Ready,
            message: String::new(),
        });
        assert_eq!(state.collect_interval(), Duration::from_secs(300));
    }
}
