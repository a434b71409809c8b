use std::time::Duration;
use tokio::sync::watch;

use crate::{DispatchError, DispatchResult};
use super::state::Load;

/// Publishes the dispatcher load and lets callers wait for it to reach zero
pub(crate) struct IdleCoordinator {
    load: watch::Sender<Load>,
}

impl IdleCoordinator {
    pub(crate) fn new() -> Self {
        let (load, _) = watch::channel(Load::default());
        Self { load }
    }

    /// Record the current load, waking waiters only if it changed
    pub(crate) fn publish(&self, current: Load) {
        self.load.send_if_modified(|load| {
            if *load == current {
                return false;
            }
            *load = current;
            true
        });
    }

    pub(crate) fn current(&self) -> Load {
        *self.load.borrow()
    }

    /// Resolve once nothing is pending, running or waiting to retry
    pub(crate) async fn wait(&self, timeout: Duration) -> DispatchResult<()> {
        let mut rx = self.load.subscribe();

        // The borrow guard from `wait_for` must not outlive `rx`
        let idle = async { rx.wait_for(Load::is_idle).await.map(|_| ()) };
        let outcome = tokio::time::timeout(timeout, idle).await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DispatchError::Internal("Load signal closed".to_string())),
            Err(_) => Err(DispatchError::IdleTimeout { waited: timeout }),
        }
    }
}
