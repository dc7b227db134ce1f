//! Lifecycle coordination for tool provider connections.
//!
//! A single FIFO command queue drained by exactly one worker task. The worker
//! applies at most one lifecycle transition at a time, so two `init`/
//! `terminate` pairs can never interleave. Producers enqueue from any task
//! without blocking.
//!
//! Commands for the same provider name are applied in enqueue order, which is
//! what makes terminate-then-init a safe reconfiguration idiom: a later init
//! is guaranteed to observe the termination already applied.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::store::ProviderConfig;
use crate::types::{CoordinatorConfig, Error, Result};

// =============================================================================
// Connection seam
// =============================================================================

/// A live connection to one tool-serving process.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    /// Tool names currently advertised by the provider.
    fn tool_names(&self) -> Vec<String>;

    /// Diagnostics accumulated since connection establishment.
    fn error_log(&self) -> Vec<String>;

    async fn close(&mut self) -> Result<()>;
}

/// Establishes tool provider connections from their declared configuration.
#[async_trait]
pub trait ToolConnectionFactory: Send + Sync {
    async fn connect(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Box<dyn ToolConnection>>;
}

// =============================================================================
// Commands and views
// =============================================================================

/// A unit of lifecycle work, consumed exactly once in enqueue order.
#[derive(Debug)]
pub enum LifecycleCommand {
    Init {
        name: String,
        config: ProviderConfig,
    },
    Terminate {
        name: String,
    },
}

/// Read-only snapshot of a live connection's runtime state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveView {
    pub tools: Vec<String>,
    pub error_log: Vec<String>,
}

enum WorkerMessage {
    Command(LifecycleCommand),
    /// Acknowledged once every previously enqueued command has been applied.
    Flush(oneshot::Sender<()>),
}

type LiveMap = Arc<RwLock<HashMap<String, Box<dyn ToolConnection>>>>;

// =============================================================================
// Coordinator
// =============================================================================

/// Serializes create/terminate transitions against the live connection set.
///
/// Dropping the coordinator closes the queue; the worker drains what is left
/// and exits.
pub struct LifecycleCoordinator {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    live: LiveMap,
}

impl fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCoordinator").finish_non_exhaustive()
    }
}

impl LifecycleCoordinator {
    /// Start the worker task and return the producer-side handle.
    pub fn spawn(factory: Arc<dyn ToolConnectionFactory>, config: &CoordinatorConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let live: LiveMap = Arc::new(RwLock::new(HashMap::new()));

        tokio::spawn(worker_loop(
            rx,
            live.clone(),
            factory,
            config.connect_timeout,
        ));

        Self { tx, live }
    }

    /// Append a command to the queue. Never blocks the caller.
    pub fn enqueue(&self, command: LifecycleCommand) -> Result<()> {
        self.tx
            .send(WorkerMessage::Command(command))
            .map_err(|_| Error::internal("lifecycle worker is no longer running"))
    }

    /// Wait until every command enqueued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Flush(ack_tx))
            .map_err(|_| Error::internal("lifecycle worker is no longer running"))?;
        ack_rx
            .await
            .map_err(|_| Error::internal("lifecycle worker is no longer running"))
    }

    /// Snapshot the runtime state of one provider, if live.
    pub async fn live_view(&self, name: &str) -> Option<LiveView> {
        self.live.read().await.get(name).map(|conn| LiveView {
            tools: conn.tool_names(),
            error_log: conn.error_log(),
        })
    }

    pub async fn is_live(&self, name: &str) -> bool {
        self.live.read().await.contains_key(name)
    }

    pub async fn live_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.live.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

// =============================================================================
// Worker
// =============================================================================

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    live: LiveMap,
    factory: Arc<dyn ToolConnectionFactory>,
    connect_timeout: Duration,
) {
    while let Some(message) = rx.recv().await {
        match message {
            WorkerMessage::Command(LifecycleCommand::Init { name, config }) => {
                apply_init(&live, factory.as_ref(), connect_timeout, name, config).await;
            }
            WorkerMessage::Command(LifecycleCommand::Terminate { name }) => {
                apply_terminate(&live, &name).await;
            }
            WorkerMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Establish a connection and publish it to the live set. Failure leaves the
/// provider absent; the worker itself never dies.
async fn apply_init(
    live: &LiveMap,
    factory: &dyn ToolConnectionFactory,
    connect_timeout: Duration,
    name: String,
    config: ProviderConfig,
) {
    match timeout(connect_timeout, factory.connect(&name, &config)).await {
        Ok(Ok(connection)) => {
            let mut live = live.write().await;
            if let Some(mut previous) = live.insert(name.clone(), connection) {
                warn!(%name, "replacing existing live connection");
                if let Err(err) = previous.close().await {
                    warn!(%name, "error closing replaced connection: {err}");
                }
            }
            info!(%name, "tool provider connection established");
        }
        Ok(Err(err)) => {
            error!(%name, "tool provider init failed: {err}");
        }
        Err(_) => {
            error!(%name, ?connect_timeout, "tool provider init timed out");
        }
    }
}

async fn apply_terminate(live: &LiveMap, name: &str) {
    let removed = live.write().await.remove(name);
    match removed {
        Some(mut connection) => {
            if let Err(err) = connection.close().await {
                warn!(%name, "error closing connection: {err}");
            }
            info!(%name, "tool provider connection terminated");
        }
        // Terminating a non-live provider is a no-op, not an error.
        None => info!(%name, "terminate for non-live provider ignored"),
    }
}
