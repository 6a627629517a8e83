//! Background action submissions owned by the console.

use std::future::Future;

use tokio::task::JoinSet;
use tracing::{info, warn};

/// Submissions still in flight. Finished ones are reaped as new ones start.
#[derive(Debug, Default)]
pub struct PendingActions {
    tasks: JoinSet<()>,
}

impl PendingActions {
    /// Start `submission` in the background.
    pub fn spawn<F>(&mut self, submission: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap();
        self.tasks.spawn(submission);
    }

    /// Number of submissions not yet reaped.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    fn reap(&mut self) {
        while let Some(done) = self.tasks.try_join_next() {
            if let Err(e) = done {
                warn!(error = %e, "Action task failed");
            }
        }
    }

    /// Wait for every submission to finish. Returns how many were waited on.
    pub async fn drain(&mut self) -> usize {
        self.reap();
        let waiting = self.len();
        if waiting > 0 {
            info!(pending = waiting, "Waiting for pending actions");
        }
        while let Some(done) = self.tasks.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "Action task failed");
            }
        }
        waiting
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_slow_submissions() {
        let confirmed = Arc::new(AtomicU32::new(0));
        let mut pending = PendingActions::default();
        for secs in [1, 5] {
            let confirmed = Arc::clone(&confirmed);
            pending.spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                confirmed.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(pending.len(), 2);

        assert_eq!(pending.drain().await, 2);
        assert_eq!(confirmed.load(Ordering::SeqCst), 2);
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_submissions_are_reaped() {
        let mut pending = PendingActions::default();
        pending.spawn(async {});
        tokio::time::sleep(Duration::from_millis(1)).await;
        pending.spawn(async {
            tokio::time::sleep(Duration::from_secs(1)).await;
        });
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.drain().await, 1);
    }
}
