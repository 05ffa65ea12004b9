use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};

use crate::configuration::config::Config;
use crate::data_capture::recorder::RequestRecorder;
use crate::error_handling::types::*;
use crate::storage::csv_log::CsvLogStore;
use crate::web_interface::web_server::WebServer;

/// Wires the configuration, the log store and the listener together and
/// owns the process lifecycle.
pub struct Controller {
    pub config: Config,
    store: Arc<CsvLogStore>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;
        info!(
            "Capturing on {} into {} (honeypot name: {:?})",
            config.listen_addr(),
            config.log_path.display(),
            config.honeypot_name
        );
        let store = Arc::new(CsvLogStore::new(&config.log_path));
        Ok(Self { config, store })
    }

    pub fn store(&self) -> Arc<CsvLogStore> {
        self.store.clone()
    }

    /// Initializes the log and binds the listener.
    ///
    /// A log that cannot be initialized is not fatal: the header is written
    /// by the first append that succeeds. A bind failure is.
    pub fn start<S>(
        self,
        shutdown: S,
    ) -> Result<(SocketAddr, impl Future<Output = ()>), ControllerError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        if let Err(e) = self.store.initialize() {
            warn!(
                "Request log {} could not be initialized, capture continues best-effort: {}",
                self.store.path().display(),
                e
            );
        }

        let recorder = RequestRecorder::new(self.config.honeypot_name.clone());
        let server = WebServer::new(recorder, self.store.clone(), self.config.max_body_bytes);
        let (bound, serving) = server.bind(self.config.listen_addr(), shutdown)?;

        let store = self.store;
        let serving = async move {
            serving.await;
            info!("Listener stopped, {} request(s) logged", store.appended());
        };
        Ok((bound, serving))
    }

    /// Serves until Ctrl-C.
    pub async fn run(self) -> Result<(), ControllerError> {
        let (_, serving) = self.start(shutdown_signal())?;
        serving.await;
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}
