use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{pin_mut, Stream, StreamExt};
use log::{debug, error};
use warp::filters::path::FullPath;
use warp::filters::BoxedFilter;
use warp::http::header::CONTENT_LENGTH;
use warp::http::{HeaderMap, Method, StatusCode};
use warp::reply::{self, Response};
use warp::{Filter, Rejection, Reply};

use crate::data_capture::recorder::RequestRecorder;
use crate::data_capture::types::RawRequest;
use crate::storage::storage_trait::RequestLog;

/// Body sent with every response, whatever happened to the capture.
pub const RESPONSE_BODY: &str = "hello\n";

/// Where a request came from and what it asked for, as seen on the wire.
///
/// [`WebServer`](super::web_server::WebServer) attaches one to every request
/// before routing.
#[derive(Debug, Clone)]
pub struct RequestOrigin {
    pub remote_addr: Option<SocketAddr>,
    /// Request target exactly as sent on the request line
    pub target: String,
}

/// Catch-all route: any method, any path.
///
/// Each request is captured, appended to `log`, and answered with
/// `200 hello\n` once the append attempt has completed.
pub fn capture_route(
    recorder: Arc<RequestRecorder>,
    log: Arc<dyn RequestLog>,
    max_body_bytes: u64,
) -> BoxedFilter<(Response,)> {
    raw_request(max_body_bytes)
        .and_then(move |raw: RawRequest| {
            let recorder = recorder.clone();
            let log = log.clone();
            async move { Ok::<_, Rejection>(handle_capture(raw, &recorder, log).await) }
        })
        .boxed()
}

/// Runs one request through the capture pipeline.
///
/// The append is blocking file I/O, so it is moved to the blocking pool; the
/// response still waits for it. Failures are logged and otherwise ignored.
pub async fn handle_capture(
    raw: RawRequest,
    recorder: &RequestRecorder,
    log: Arc<dyn RequestLog>,
) -> Response {
    let record = recorder.capture(&raw);

    match tokio::task::spawn_blocking(move || log.append(record)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Error logging request {} {}: {}", raw.method, raw.target, e),
        Err(e) => error!("Log append task for {} {} failed: {}", raw.method, raw.target, e),
    }

    fixed_response()
}

pub fn fixed_response() -> Response {
    reply::with_status(RESPONSE_BODY, StatusCode::OK).into_response()
}

/// Assembles a [`RawRequest`] from the parts warp exposes. Never rejects.
fn raw_request(max_body_bytes: u64) -> BoxedFilter<(RawRequest,)> {
    request_origin()
        .and(warp::method())
        .and(warp::header::headers_cloned())
        .and(warp::body::stream())
        .and_then(
            move |origin: RequestOrigin, method: Method, headers: HeaderMap, body| async move {
                let body = read_body(&headers, body, max_body_bytes).await;
                Ok::<_, Rejection>(RawRequest {
                    remote_addr: origin.remote_addr,
                    method,
                    target: origin.target,
                    headers,
                    body,
                })
            },
        )
        .boxed()
}

/// The [`RequestOrigin`] attached by the server, or one rebuilt from warp's
/// view of the request when the route is served some other way. The rebuilt
/// target is origin-form only.
fn request_origin() -> BoxedFilter<(RequestOrigin,)> {
    warp::ext::optional::<RequestOrigin>()
        .and(warp::addr::remote())
        .and(warp::path::full())
        .and(raw_query())
        .map(
            |attached: Option<RequestOrigin>,
             remote_addr: Option<SocketAddr>,
             path: FullPath,
             query: Option<String>| {
                attached.unwrap_or_else(|| RequestOrigin {
                    remote_addr,
                    target: match query {
                        Some(q) => format!("{}?{}", path.as_str(), q),
                        None => path.as_str().to_string(),
                    },
                })
            },
        )
        .boxed()
}

fn raw_query() -> BoxedFilter<(Option<String>,)> {
    warp::query::raw()
        .map(Some)
        .or(warp::any().map(|| None::<String>))
        .unify()
        .boxed()
}

/// Collects the request body, chunked or not, up to `limit` bytes.
///
/// A body that declares or streams more than `limit` bytes, or breaks off
/// mid-transfer, is captured as empty.
async fn read_body<S, B>(headers: &HeaderMap, body: S, limit: u64) -> Bytes
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(len) = declared.filter(|len| *len > limit) {
        debug!("Ignoring body of {} byte(s), limit is {}", len, limit);
        return Bytes::new();
    }

    pin_mut!(body);
    let mut collected = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!("Body read failed: {}", e);
                return Bytes::new();
            }
        };
        if (collected.len() + chunk.remaining()) as u64 > limit {
            debug!("Ignoring streamed body over {} byte(s)", limit);
            return Bytes::new();
        }
        collected.put(chunk);
    }
    collected.freeze()
}
