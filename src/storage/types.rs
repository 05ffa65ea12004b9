use serde::{Deserialize, Serialize};

use crate::data_capture::types::CapturedRequest;

/// Column names of the log file, in persisted order.
pub const LOG_HEADER: [&str; 6] = [
    "RemoteAddr",
    "Method",
    "RequestURI",
    "UserAgent",
    "EventTime",
    "HoneypotName",
];

/// One persisted row.
///
/// Field order matches [`LOG_HEADER`]; headers and form fields of the
/// captured request are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRow {
    #[serde(rename = "RemoteAddr")]
    pub remote_addr: String,
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "RequestURI")]
    pub request_uri: String,
    #[serde(rename = "UserAgent")]
    pub user_agent: String,
    #[serde(rename = "EventTime")]
    pub event_time: u64,
    #[serde(rename = "HoneypotName")]
    pub honeypot_name: String,
}

impl From<CapturedRequest> for LogRow {
    fn from(record: CapturedRequest) -> Self {
        Self {
            remote_addr: record.remote_addr,
            method: record.method,
            request_uri: record.request_uri,
            user_agent: record.user_agent,
            event_time: record.event_time,
            honeypot_name: record.honeypot_name,
        }
    }
}
