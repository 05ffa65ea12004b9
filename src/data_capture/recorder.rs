//! Request capture.
//!
//! `RequestRecorder` turns a [`RawRequest`] into a [`CapturedRequest`]. It is
//! purely computational: it never blocks, never fails and never touches the
//! request it was given. Anything it cannot make sense of (a body that is not
//! form-encoded, a query that does not decode, a header that is not UTF-8) is
//! degraded to an empty or lossy value instead of an error, since capture must
//! keep working against hostile clients.

use chrono::Utc;
use log::{debug, trace};
use warp::http::header::{CONTENT_TYPE, USER_AGENT};
use warp::http::HeaderMap;

use super::types::{CapturedRequest, FormFields, HeaderSnapshot, ParsedForm, RawRequest};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Builds immutable request snapshots tagged with the honeypot identifier.
#[derive(Debug, Clone, Default)]
pub struct RequestRecorder {
    honeypot_name: String,
}

impl RequestRecorder {
    pub fn new(honeypot_name: impl Into<String>) -> Self {
        Self {
            honeypot_name: honeypot_name.into(),
        }
    }

    /// Captures `raw`, sampling the wall clock exactly once.
    pub fn capture(&self, raw: &RawRequest) -> CapturedRequest {
        let event_time = u64::try_from(Utc::now().timestamp()).unwrap_or_default();

        let form = parse_form(raw.query(), &raw.headers, &raw.body).into_fields();
        let user_agent = raw
            .headers
            .get(USER_AGENT)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default();
        let remote_addr = raw
            .remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default();

        let captured = CapturedRequest {
            remote_addr,
            peer: raw.remote_addr,
            method: raw.method.as_str().to_string(),
            request_uri: raw.target.clone(),
            headers: HeaderSnapshot::from_header_map(&raw.headers),
            user_agent,
            form,
            event_time,
            honeypot_name: self.honeypot_name.clone(),
        };

        debug!(
            "Captured {} {} from {} ({} header(s), {} form field(s))",
            captured.method,
            captured.request_uri,
            if captured.remote_addr.is_empty() { "unknown peer" } else { captured.remote_addr.as_str() },
            captured.headers.len(),
            captured.form.len()
        );
        captured
    }
}

/// Best-effort extraction of form fields from the body and the query string.
///
/// The body is only considered when it is declared as
/// `application/x-www-form-urlencoded`; its values come before the query's for
/// a shared key. Any decoding failure yields [`ParsedForm::Empty`].
pub fn parse_form(query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> ParsedForm {
    let mut pairs: Vec<(String, String)> = Vec::new();

    if !body.is_empty() && is_form_encoded(headers) {
        match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
            Ok(fields) => pairs.extend(fields),
            Err(e) => {
                debug!("Ignoring undecodable form body: {}", e);
                return ParsedForm::Empty;
            }
        }
    } else if !body.is_empty() {
        trace!("Body of {} byte(s) is not form-encoded, skipping", body.len());
    }

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            Ok(fields) => pairs.extend(fields),
            Err(e) => {
                debug!("Ignoring undecodable query string: {}", e);
                return ParsedForm::Empty;
            }
        }
    }

    if pairs.is_empty() {
        ParsedForm::Empty
    } else {
        ParsedForm::Fields(FormFields::from_pairs(pairs))
    }
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case(FORM_URLENCODED))
        .unwrap_or(false)
}
