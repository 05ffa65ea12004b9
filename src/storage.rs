//! Storage subsystem
//!
//! Persistence for captured requests.
//!
//! Components:
//! - `storage_trait`: the `RequestLog` trait the listener appends through.
//! - `types`: the persisted row layout and its header.
//! - `csv_log`: the append-only CSV file implementation.

pub mod csv_log;
pub mod storage_trait;
pub mod types;

pub use csv_log::CsvLogStore;
pub use storage_trait::RequestLog;
pub use types::{LogRow, LOG_HEADER};
