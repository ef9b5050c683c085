pub mod collection;
pub mod manager;
pub mod stats_upload;
