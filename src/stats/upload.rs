/// Stat XML formatting and the retrieve, submit, remove upload pass.
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use tracing::{debug, info, warn};

use super::record::RecordDto;
use super::store::StatsStore;
use crate::error::PlayerError;
use crate::xmds::XmdsClient;

const STAT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Nothing was queued
    Empty,
    /// The CMS accepted this many records and they were removed
    Uploaded(usize),
    /// The CMS answered but refused the batch; records stay queued
    Rejected,
}

fn stat_date(at: DateTime<Utc>) -> String {
    at.format(STAT_DATE_FORMAT).to_string()
}

/// Render records as the `<stats>` document SubmitStats expects.
pub fn format_stats(records: &[RecordDto]) -> String {
    let mut xml = String::from("<stats>");
    for record in records {
        xml.push_str(&format!(
            "<stat type=\"{}\" fromdt=\"{}\" todt=\"{}\" scheduleid=\"{}\" layoutid=\"{}\"",
            escape(record.record_type().as_str()),
            stat_date(record.started()),
            stat_date(record.finished()),
            record.schedule_id(),
            record.layout_id()
        ));
        if let Some(media_id) = record.media_id() {
            xml.push_str(&format!(" mediaid=\"{media_id}\""));
        }
        xml.push_str(&format!(
            " duration=\"{}\" count=\"{}\"/>",
            record.duration(),
            record.count()
        ));
    }
    xml.push_str("</stats>");
    xml
}

/// Send the oldest `batch_size` records. They are removed only after the CMS
/// confirms them, so a failure anywhere leaves the queue untouched.
pub async fn upload_pass(
    store: &StatsStore,
    client: &XmdsClient,
    batch_size: usize,
) -> Result<UploadOutcome, PlayerError> {
    let batch = store.peek_batch(batch_size)?;
    if batch.rows == 0 {
        return Ok(UploadOutcome::Empty);
    }
    if batch.records.is_empty() {
        warn!("Dropping {} unreadable stats rows", batch.rows);
        store.remove(batch.rows)?;
        return Ok(UploadOutcome::Uploaded(0));
    }

    debug!("Submitting {} playback records", batch.records.len());
    let accepted = client.submit_stats(&format_stats(&batch.records)).await?;
    if !accepted {
        warn!("CMS rejected {} playback records", batch.records.len());
        return Ok(UploadOutcome::Rejected);
    }

    store.remove(batch.rows)?;
    info!("Uploaded {} playback records", batch.records.len());
    Ok(UploadOutcome::Uploaded(batch.records.len()))
}
