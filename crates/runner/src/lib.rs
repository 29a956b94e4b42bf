//! Supervisor for the service's long-running processes.
//!
//! Each process is registered under a name and receives a shared
//! [`CancellationToken`]. The runner:
//! - runs all processes concurrently
//! - cancels everything on SIGINT/SIGTERM or when any process fails
//! - runs closers afterwards, bounded by a timeout
//!
//! # Example
//!
//! ```no_run
//! use telemetry_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("tick");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub type BoxedProcessFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A named process: takes a cancellation token and runs until it is cancelled or fails
pub struct AppProcess {
    name: String,
    start: Box<dyn FnOnce(CancellationToken) -> BoxedProcessFuture + Send>,
}

/// Cleanup hook run after all processes have stopped
pub type Closer = Box<dyn FnOnce() -> BoxedProcessFuture + Send>;

/// Outcome of waiting on the process set
#[derive(Debug)]
enum ProcessExit {
    Clean,
    Failed { name: String, error: anyhow::Error },
}

pub struct Runner {
    app_processes: Vec<AppProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with a 10 second closer timeout
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Registers a process under `name`
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.app_processes.push(AppProcess {
            name: name.into(),
            start: Box::new(move |token| Box::pin(process(token))),
        });
        self
    }

    /// Registers a closer; all closers run even if some fail
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(move || Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Uses an externally owned token so callers can trigger shutdown
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Runs all processes, then closers, then exits the process
    ///
    /// Exit code is 1 when a process failed, 0 otherwise.
    pub async fn run(self) {
        let token = self.cancellation_token.clone();
        spawn_signal_handlers(token.clone());

        let exit = Self::supervise(self.app_processes, token).await;

        if !self.closers.is_empty() {
            tracing::info!("Running closers with timeout of {:?}", self.closer_timeout);
            match tokio::time::timeout(self.closer_timeout, Self::run_closers(self.closers)).await
            {
                Ok(()) => tracing::info!("All closers completed"),
                Err(_) => tracing::error!("Closers timed out after {:?}", self.closer_timeout),
            }
        }

        match exit {
            ProcessExit::Failed { name, error } => {
                tracing::error!(process = %name, "Application exiting with error: {:#}", error);
                std::process::exit(1);
            }
            ProcessExit::Clean => {
                tracing::info!("Application exiting normally");
                std::process::exit(0);
            }
        }
    }

    /// Waits until every process has stopped, cancelling the rest on the first failure
    async fn supervise(processes: Vec<AppProcess>, token: CancellationToken) -> ProcessExit {
        let mut join_set = JoinSet::new();

        for process in processes {
            let process_token = token.clone();
            let name = process.name;
            tracing::info!(process = %name, "starting process");
            join_set.spawn(async move {
                let result = (process.start)(process_token).await;
                (name, result)
            });
        }

        let mut exit = ProcessExit::Clean;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::debug!(process = %name, "process completed");
                }
                Ok((name, Err(error))) => {
                    if !token.is_cancelled() {
                        tracing::error!(process = %name, "process error: {:#}", error);
                        exit = ProcessExit::Failed { name, error };
                        token.cancel();
                    }
                }
                Err(err) => {
                    tracing::error!("process panicked: {}", err);
                    token.cancel();
                }
            }
        }

        exit
    }

    async fn run_closers(closers: Vec<Closer>) {
        let mut closer_set = JoinSet::new();

        for closer in closers {
            closer_set.spawn(async move { closer().await });
        }

        while let Some(result) = closer_set.join_next().await {
            match result {
                Ok(Ok(())) => tracing::debug!("Closer completed successfully"),
                Ok(Err(err)) => tracing::error!("Closer error: {:#}", err),
                Err(err) => tracing::error!("Closer panicked: {}", err),
            }
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => tracing::error!("Error setting up signal handler: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
                token.cancel();
            }
            Err(err) => tracing::error!("Error setting up SIGTERM handler: {}", err),
        }
    });
}
