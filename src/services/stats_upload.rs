/// Statistics upload service.
/// Drains the local stats queue to the CMS while stats are enabled.
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time;
use tracing::{debug, info, warn};

use crate::error::PlayerError;
use crate::services::manager::ServicesState;
use crate::stats::{StatsStore, UploadOutcome, upload_pass};
use crate::xmds::XmdsClient;

pub struct StatsUploadService;

impl StatsUploadService {
    pub async fn run(
        state: Arc<RwLock<ServicesState>>,
        store: Arc<StatsStore>,
        client: Arc<XmdsClient>,
        batch_size: usize,
    ) {
        loop {
            let (enabled, interval) = {
                let state = state.read().await;
                (state.settings.stats_enabled(), state.collect_interval())
            };

            if enabled {
                match Self::upload_pending(&store, &client, batch_size).await {
                    Ok(0) => debug!("No playback records to upload"),
                    Ok(n) => {
                        info!("Uploaded {} playback records", n);
                        state.write().await.last_upload = Some(Utc::now());
                    }
                    Err(e) => warn!("Stats upload failed: {}", e),
                }
            } else {
                debug!("Stats disabled by CMS, upload skipped");
            }

            time::sleep(interval).await;
        }
    }

    /// Upload batches until the queue is empty or the CMS stops accepting.
    /// Returns the number of records delivered.
    pub async fn upload_pending(
        store: &StatsStore,
        client: &XmdsClient,
        batch_size: usize,
    ) -> Result<usize, PlayerError> {
        let mut total = 0;
        loop {
            match upload_pass(store, client, batch_size.max(1)).await? {
                UploadOutcome::Uploaded(n) => total += n,
                UploadOutcome::Empty | UploadOutcome::Rejected => return Ok(total),
            }
        }
    }
}
