//! The service as a value: configure, start, inspect, stop.

use std::io;
use std::net::SocketAddr;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use netcom_core::config::LimitsConfig;
use netcom_core::Endpoint;
use netcom_services::{ConnectionRegistry, Dispatcher, LastError};

use crate::transport::{Listener, TransportContext};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server is already running")]
    AlreadyRunning,
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// A presence service bound to one endpoint.
///
/// Holds the registry and the last-error slot for its whole life, so both
/// stay readable after `stop()` or a failed `start()`.
#[derive(Debug)]
pub struct Server {
    endpoint: Endpoint,
    limits: LimitsConfig,
    registry: ConnectionRegistry,
    last_error: LastError,
    shutdown: Option<broadcast::Sender<()>>,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(endpoint: Endpoint, limits: LimitsConfig) -> Self {
        Self {
            endpoint,
            limits,
            registry: ConnectionRegistry::new(),
            last_error: LastError::new(),
            shutdown: None,
            task: None,
            local_addr: None,
        }
    }

    /// Bind and start serving. The socket is bound before this returns, so
    /// a bind failure leaves the server stopped with `last_error` set.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }

        let bind_addr = self.endpoint.bind_addr();
        let bound = match Listener::bind(&self.endpoint).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(b) => b,
            Err(source) => {
                let err = ServerError::Bind {
                    addr: bind_addr,
                    source,
                };
                tracing::error!(endpoint = %self.endpoint, error = %err, "failed to start");
                self.last_error.set(err.to_string());
                return Err(err);
            }
        };

        self.last_error.clear();
        let ctx = TransportContext {
            endpoint: self.endpoint,
            limits: self.limits.clone(),
            dispatcher: Dispatcher::new(self.registry.clone(), self.last_error.clone()),
            last_error: self.last_error.clone(),
        };

        // Subscribe before spawning so a stop() right after start() is seen.
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let task = tokio::spawn(listener.serve(ctx, shutdown_rx));

        tracing::info!(
            endpoint = %self.endpoint,
            %local_addr,
            allowed_remote = ?self.endpoint.allowed_remote(),
            "server started"
        );
        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Stop serving and drop every registration. Closes every TCP
    /// connection and every UDP reply socket. No-op when not running.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = task.await {
            tracing::error!(error = %e, "serving task ended abnormally");
            self.last_error.set(format!("serving task: {e}"));
        }
        let dropped = self.registry.clear();
        self.local_addr = None;
        tracing::info!(endpoint = %self.endpoint, dropped, "server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Most recent error, empty if none since the last successful start.
    pub fn last_error(&self) -> String {
        self.last_error.get()
    }

    /// Address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
