// Web Interface module root
pub mod routes;
pub mod web_server;

pub use routes::{capture_route, handle_capture, RequestOrigin, RESPONSE_BODY};
pub use web_server::WebServer;
