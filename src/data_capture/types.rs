//! Common data types used across the data_capture subsystem.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use bytes::Bytes;
use warp::http::{HeaderMap, Method};

/// An inbound HTTP request as handed over by the listener, before capture.
///
/// The recorder only ever borrows it, so the listener keeps full ownership of
/// what arrived on the wire.
#[derive(Debug, Clone)]
pub struct RawRequest {
    /// Peer socket address, when the transport exposes one
    pub remote_addr: Option<SocketAddr>,
    pub method: Method,
    /// Request target exactly as sent on the request line: origin-form
    /// (`/path?query`), absolute-form (`http://host/path`), authority-form
    /// (`host:port`, CONNECT) or `*`
    pub target: String,
    pub headers: HeaderMap,
    /// Request body, possibly truncated to empty by the listener's size bound
    pub body: Bytes,
}

impl RawRequest {
    /// Query part of the request target, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }
}

/// Header multimap with lower-cased names and values in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSnapshot(BTreeMap<String, Vec<String>>);

impl HeaderSnapshot {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers.iter() {
            map.entry(name.as_str().to_ascii_lowercase())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        Self(map)
    }

    /// All values for `name`, matched case-insensitively.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Submitted form fields: each key once, its values in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(BTreeMap<String, Vec<String>>);

impl FormFields {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in pairs {
            map.entry(key).or_default().push(value);
        }
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Outcome of a best-effort form parse.
///
/// There is no error variant: anything that is not form data, or fails to
/// decode, ends up as `Empty`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedForm {
    Fields(FormFields),
    Empty,
}

impl ParsedForm {
    pub fn into_fields(self) -> FormFields {
        match self {
            ParsedForm::Fields(fields) => fields,
            ParsedForm::Empty => FormFields::default(),
        }
    }
}

/// Immutable snapshot of one inbound request.
///
/// Built only by [`RequestRecorder`](super::recorder::RequestRecorder) and
/// handed by value to the log store, which consumes it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub(crate) remote_addr: String,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) method: String,
    pub(crate) request_uri: String,
    pub(crate) headers: HeaderSnapshot,
    pub(crate) user_agent: String,
    pub(crate) form: FormFields,
    pub(crate) event_time: u64,
    pub(crate) honeypot_name: String,
}

impl CapturedRequest {
    /// Peer IP address, empty when unknown.
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Full peer socket address including the source port.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    pub fn headers(&self) -> &HeaderSnapshot {
        &self.headers
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn form(&self) -> &FormFields {
        &self.form
    }

    /// Capture time in whole seconds since the Unix epoch.
    pub fn event_time(&self) -> u64 {
        self.event_time
    }

    pub fn honeypot_name(&self) -> &str {
        &self.honeypot_name
    }
}
