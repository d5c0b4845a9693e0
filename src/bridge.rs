// Blocking entry into async flows
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::McpClientConfig;
use crate::errors::{McpClientError, Result};

/// Which scheduler, if any, the calling thread is running inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerContext {
    /// Plain synchronous code.
    Inactive,
    /// A multi-thread runtime worker; it can give up its thread while blocking.
    MultiThread,
    /// A current-thread runtime; blocking here would stall the only worker.
    CurrentThread,
}

impl SchedulerContext {
    pub fn detect() -> Self {
        match Handle::try_current() {
            Err(_) => SchedulerContext::Inactive,
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::CurrentThread => SchedulerContext::CurrentThread,
                _ => SchedulerContext::MultiThread,
            },
        }
    }
}

/// Runs an async flow to completion from synchronous code.
///
/// Outside a runtime a transient current-thread runtime is built for the flow
/// and shut down before returning. Inside a multi-thread runtime the flow is
/// driven on the existing runtime while the worker blocks in place. Inside a
/// current-thread runtime the flow gets its own transient runtime on a helper
/// thread. Every path enforces the same timeout: when it elapses the flow's
/// token is cancelled and the flow gets `cancel_grace` to wind down. A flow
/// that returns `Ok` inside the grace period keeps its value, so a batch can
/// report what finished before the deadline. Anything else becomes
/// [`McpClientError::Timeout`], and a flow still running is aborted.
#[derive(Debug, Clone, Copy)]
pub struct SyncBridge {
    timeout: Duration,
    cancel_grace: Duration,
}

impl SyncBridge {
    pub fn new(timeout: Duration, cancel_grace: Duration) -> Self {
        Self {
            timeout,
            cancel_grace,
        }
    }

    pub fn from_config(config: &McpClientConfig) -> Self {
        Self::new(config.bridge_timeout, config.cancel_grace)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn run<T, F, Fut>(&self, make: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let context = SchedulerContext::detect();
        debug!(?context, timeout = ?self.timeout, "bridging async flow");
        match context {
            SchedulerContext::Inactive => self.run_transient(make),
            SchedulerContext::MultiThread => {
                let handle = Handle::current();
                let (limit, grace) = (self.timeout, self.cancel_grace);
                tokio::task::block_in_place(move || handle.block_on(drive(make, limit, grace)))
            }
            SchedulerContext::CurrentThread => {
                let bridge = *self;
                std::thread::spawn(move || bridge.run_transient(make))
                    .join()
                    .map_err(|_| McpClientError::Scheduler("bridge thread panicked".to_string()))?
            }
        }
    }

    fn run_transient<T, F, Fut>(&self, make: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| McpClientError::Scheduler(format!("failed to build runtime: {e}")))?;
        let result = runtime.block_on(drive(make, self.timeout, self.cancel_grace));
        runtime.shutdown_timeout(self.cancel_grace);
        result
    }
}

async fn drive<T, F, Fut>(make: F, limit: Duration, grace: Duration) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let token = CancellationToken::new();
    let mut task = tokio::spawn(make(token.clone()));

    match tokio::time::timeout(limit, &mut task).await {
        Ok(joined) => joined
            .map_err(|e| McpClientError::Scheduler(format!("bridged task failed: {e}")))?,
        Err(_) => {
            warn!(?limit, "bridged flow timed out; cancelling");
            token.cancel();
            match tokio::time::timeout(grace, &mut task).await {
                Ok(Ok(Ok(settled))) => {
                    debug!("bridged flow settled after cancellation");
                    Ok(settled)
                }
                Ok(_) => Err(McpClientError::Timeout(limit)),
                Err(_) => {
                    task.abort();
                    Err(McpClientError::Timeout(limit))
                }
            }
        }
    }
}
