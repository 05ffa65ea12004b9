use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn, Service};
use hyper::{Body, Request, Server};
use log::{error, info};
use warp::filters::BoxedFilter;
use warp::reply::Response;

use crate::data_capture::recorder::RequestRecorder;
use crate::error_handling::types::NetworkError;
use crate::storage::storage_trait::RequestLog;

use super::routes::{capture_route, RequestOrigin};

/// HTTP listener serving the catch-all capture route.
///
/// Every accepted connection is served on its own task by the runtime; a
/// connection that breaks only takes itself down.
pub struct WebServer {
    routes: BoxedFilter<(Response,)>,
}

impl WebServer {
    /// Create a new WebServer appending to `log`
    pub fn new(recorder: RequestRecorder, log: Arc<dyn RequestLog>, max_body_bytes: u64) -> Self {
        Self {
            routes: capture_route(Arc::new(recorder), log, max_body_bytes),
        }
    }

    /// Binds `addr` and returns the bound address together with the serving
    /// future, which resolves once `shutdown` fires and in-flight requests
    /// have been answered.
    ///
    /// Binding happens eagerly so the caller can refuse to start on failure.
    /// Must be called from within a Tokio runtime.
    pub fn bind<S>(
        self,
        addr: SocketAddr,
        shutdown: S,
    ) -> Result<(SocketAddr, impl Future<Output = ()>), NetworkError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let routes = warp::service(self.routes);
        let make_service = make_service_fn(move |conn: &AddrStream| {
            let remote_addr = conn.remote_addr();
            let routes = routes.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |mut req: Request<Body>| {
                    // warp only sees the path and query, keep the target as sent
                    let target = req.uri().to_string();
                    req.extensions_mut().insert(RequestOrigin {
                        remote_addr: Some(remote_addr),
                        target,
                    });
                    routes.clone().call(req)
                }))
            }
        });

        let server = Server::try_bind(&addr)
            .map_err(|e| {
                error!("Unable to bind {}: {}", addr, e);
                NetworkError::BindError(addr, e.to_string())
            })?
            .serve(make_service);
        let bound = server.local_addr();
        info!("Listening on {}", bound);

        let serving = server.with_graceful_shutdown(shutdown);
        Ok((bound, async move {
            if let Err(e) = serving.await {
                error!("Listener on {} stopped with an error: {}", bound, e);
            }
        }))
    }
}
