pub mod record;
pub mod schema;
pub mod store;
pub mod upload;

pub use record::{RecordDto, RecordError, RecordType};
pub use store::{Batch, StatsStore, StoreError};
pub use upload::{UploadOutcome, format_stats, upload_pass};
