//! Process supervisor.
//!
//! Kept apart from CLI parsing and process exit codes so the whole pipeline
//! can run in tests with an injected scanner, sink and in-memory buffer.
//!
//! Tasks run until shutdown. If any of them returns before that, for any
//! reason, the rest are told to stop and the first failure is reported.

use crate::buffer::{BufferError, IngestionBuffer};
use crate::config::{Config, ConfigError, Mode};
use crate::ingest::{self, IngestError, Ingester};
use crate::output::{Sink, SinkError};
use crate::scanner::{Forwarder, ScanError, Scanner};
use crate::uplink::{DrainError, Drainer};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

/// Cancellation signal handed to every long-running task.
pub type Shutdown = watch::Receiver<bool>;

/// Resolve once shutdown is requested or the supervisor is gone.
pub async fn shutdown_requested(shutdown: &mut Shutdown) {
    // An Err means the sender was dropped, which is a stop as well.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Errors returned by [`run`].
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Drain(#[from] DrainError),
    #[error("{0} task exited before shutdown")]
    TaskExited(&'static str),
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

type TaskResult = (&'static str, Result<(), RunError>);

/// Owns the pipeline tasks and their shared shutdown signal.
pub struct Supervisor {
    tasks: JoinSet<TaskResult>,
    stop: watch::Sender<bool>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            tasks: JoinSet::new(),
            stop,
        }
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.stop.subscribe()
    }

    pub fn spawn<F, E>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<RunError>,
    {
        self.tasks
            .spawn(async move { (name, task.await.map_err(Into::into)) });
    }

    /// Wait for `stop` or for the first task to return, then signal
    /// shutdown and join everything.
    pub async fn supervise(mut self, stop: impl Future<Output = ()>) -> Result<(), RunError> {
        if self.tasks.is_empty() {
            return Ok(());
        }

        tokio::pin!(stop);
        let early = tokio::select! {
            _ = &mut stop => {
                info!("shutdown requested");
                None
            }
            joined = self.tasks.join_next() => joined,
        };
        self.stop.send_replace(true);

        let mut result = match early {
            Some(joined) => Err(early_exit(joined)),
            None => Ok(()),
        };
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = task_outcome(joined) {
                if result.is_ok() {
                    result = Err(err);
                } else {
                    warn!(%err, "further task failure during shutdown");
                }
            }
        }
        result
    }
}

fn early_exit(joined: Result<TaskResult, JoinError>) -> RunError {
    let err = match joined {
        Ok((name, Ok(()))) => RunError::TaskExited(name),
        Ok((name, Err(err))) => {
            error!(task = name, %err, "task failed");
            err
        }
        Err(err) => RunError::TaskPanicked(err.to_string()),
    };
    error!(%err, "stopping remaining tasks");
    err
}

fn task_outcome(joined: Result<TaskResult, JoinError>) -> Result<(), RunError> {
    match joined {
        Ok((_, result)) => result,
        Err(err) => Err(RunError::TaskPanicked(err.to_string())),
    }
}

/// Run the pipeline parts `mode` selects until `stop` resolves or a task
/// fails.
///
/// Modes that upload ping the sink first; an unreachable sink is fatal
/// before anything starts.
pub async fn run(
    config: Config,
    mode: Mode,
    scanner: Arc<dyn Scanner>,
    sink: Option<Arc<dyn Sink>>,
    buffer: IngestionBuffer,
    stop: impl Future<Output = ()>,
) -> Result<(), RunError> {
    config.validate(mode)?;

    let sink = match (mode.uploads(), sink) {
        (true, Some(sink)) => {
            sink.ping().await?;
            info!("sink reachable");
            Some(sink)
        }
        (true, None) => {
            return Err(ConfigError::Invalid(format!("mode {mode:?} needs a sink")).into());
        }
        (false, _) => None,
    };

    let mut supervisor = Supervisor::new();

    if mode.scans() {
        let registry = Arc::new(config.registry()?);
        info!(sensors = registry.len(), "monitoring sensors");
        for sensor in registry.iter() {
            info!(identity = %sensor.identity, nickname = %sensor.nickname, model = %sensor.model, "sensor");
        }

        let (tx, rx) = mpsc::channel(config.ingest.channel_capacity);
        let forwarder = Forwarder::new(tx, registry.clone());
        let shutdown = supervisor.shutdown_handle();
        supervisor.spawn("scanner", async move { scanner.scan(forwarder, shutdown).await });

        let ingester = Ingester::new(registry, config.ingest.throttle);
        supervisor.spawn(
            "ingest",
            ingest::run(
                ingester,
                rx,
                buffer.clone(),
                config.ingest.retry(),
                supervisor.shutdown_handle(),
            ),
        );
    }

    if let Some(sink) = sink {
        let drainer = Drainer::new(buffer.clone(), sink, config.uplink_config()?);
        supervisor.spawn("uplink", drainer.run(supervisor.shutdown_handle()));
    }

    info!(?mode, "pipeline started");
    let result = supervisor.supervise(stop).await;

    match buffer.run_blocking(|b| b.depth()).await {
        Ok(pending) => info!(pending, "pipeline stopped"),
        Err(err) => warn!(%err, "pipeline stopped, buffer depth unknown"),
    }
    result
}
