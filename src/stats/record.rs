/// Playback record as stored and uploaded.
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Layout,
    Media,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Layout => "layout",
            RecordType::Media => "media",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "layout" => Some(RecordType::Layout),
            "media" => Some(RecordType::Media),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record finished at {finished} before it started at {started}")]
    FinishedBeforeStarted {
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
    },

    #[error("media record without a media id")]
    MissingMediaId,

    #[error("record count must be positive, got {0}")]
    InvalidCount(i32),
}

impl RecordError {
    pub fn domain(&self) -> &'static str {
        "stats"
    }
}

/// One playback record. Only constructible through the validating
/// constructors, so `finished >= started` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDto {
    id: Option<i64>,
    record_type: RecordType,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
    schedule_id: i32,
    layout_id: i32,
    media_id: Option<i32>,
    duration: i64,
    count: i32,
}

impl RecordDto {
    pub fn layout(
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
        schedule_id: i32,
        layout_id: i32,
    ) -> Result<Self, RecordError> {
        Self::new(RecordType::Layout, started, finished, schedule_id, layout_id, None, 1)
    }

    pub fn media(
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
        schedule_id: i32,
        layout_id: i32,
        media_id: i32,
    ) -> Result<Self, RecordError> {
        Self::new(
            RecordType::Media,
            started,
            finished,
            schedule_id,
            layout_id,
            Some(media_id),
            1,
        )
    }

    /// Duration is derived from the two timestamps.
    pub fn new(
        record_type: RecordType,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
        schedule_id: i32,
        layout_id: i32,
        media_id: Option<i32>,
        count: i32,
    ) -> Result<Self, RecordError> {
        if finished < started {
            return Err(RecordError::FinishedBeforeStarted { started, finished });
        }
        if record_type == RecordType::Media && media_id.is_none() {
            return Err(RecordError::MissingMediaId);
        }
        if count < 1 {
            return Err(RecordError::InvalidCount(count));
        }

        Ok(Self {
            id: None,
            record_type,
            started,
            finished,
            schedule_id,
            layout_id,
            media_id,
            duration: (finished - started).num_seconds(),
            count,
        })
    }

    pub(crate) fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Store row id; `None` until read back from the store.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn finished(&self) -> DateTime<Utc> {
        self.finished
    }

    pub fn schedule_id(&self) -> i32 {
        self.schedule_id
    }

    pub fn layout_id(&self) -> i32 {
        self.layout_id
    }

    pub fn media_id(&self) -> Option<i32> {
        self.media_id
    }

    /// Seconds
    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn count(&self) -> i32 {
        self.count
    }
}
