//! Request Log Trait
//!
//! This module defines the `RequestLog` trait, the single seam between the
//! listener and whatever persists captured requests.
//!
//! Implementors are responsible for:
//! - Serializing concurrent callers into one well-defined sequence
//! - Appending each record completely or not at all
//! - Reporting failures instead of retrying them
//!
//! `append` is allowed to block; async callers are expected to move it off the
//! reactor.

use crate::data_capture::types::CapturedRequest;
use crate::error_handling::types::StorageError;

/// An append-only sink for captured requests.
pub trait RequestLog: Send + Sync {
    /// Persists `record`, consuming it.
    ///
    /// Returns once the record is durable, or with the reason it is not. On
    /// error nothing of `record` is left behind.
    fn append(&self, record: CapturedRequest) -> Result<(), StorageError>;
}
