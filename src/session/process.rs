//! Browser process supervision.
//!
//! The child is moved into a watcher task. Dropping the guard (or calling
//! [`ProcessGuard::kill`]) asks the task to kill the process; the task
//! reports the exit either way.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;

use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

// ============================================================================
// ProcessGuard
// ============================================================================

/// Owns a browser process for the lifetime of a session.
pub(crate) struct ProcessGuard {
    /// Process ID for logging.
    pid: u32,
    /// Dropping this sender kills the process.
    kill_tx: Option<oneshot::Sender<()>>,
    /// Watcher task.
    task: Option<JoinHandle<()>>,
}

impl ProcessGuard {
    /// Starts supervising `child`. `on_exit` runs once the process is gone.
    pub(crate) fn spawn<F>(child: Child, on_exit: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pid = child.id().unwrap_or(0);
        let (kill_tx, kill_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            watch(child, pid, kill_rx).await;
            on_exit.await;
        });

        debug!(pid, "Process guard created");
        Self {
            pid,
            kill_tx: Some(kill_tx),
            task: Some(task),
        }
    }

    /// Kills the process and waits for the watcher to finish.
    pub(crate) async fn kill(&mut self) {
        self.kill_tx.take();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            debug!(pid = self.pid, error = %e, "Process watcher failed");
        }
    }

    /// Returns the process ID.
    #[inline]
    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if self.kill_tx.take().is_some() {
            debug!(pid = self.pid, "Process guard dropped, killing process");
        }
    }
}

/// Waits for the process to exit, killing it when asked.
async fn watch(mut child: Child, pid: u32, kill_rx: oneshot::Receiver<()>) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            debug!(pid, "Killing browser process");
            if let Err(e) = child.kill().await {
                debug!(pid, error = %e, "Failed to kill process");
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) => info!(pid, %status, "Browser process exited"),
        Err(e) => debug!(pid, error = %e, "Failed to wait for process"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::process::Command;

    #[tokio::test]
    async fn test_exit_runs_callback() {
        let child = Command::new("true").spawn().expect("spawn");
        let (done_tx, done_rx) = oneshot::channel();

        let _guard = ProcessGuard::spawn(child, async move {
            let _ = done_tx.send(());
        });

        done_rx.await.expect("exit callback");
    }

    #[tokio::test]
    async fn test_kill_stops_long_running_process() {
        let child = Command::new("sleep").arg("30").spawn().expect("spawn");
        let exited = Arc::new(AtomicBool::new(false));

        let mut guard = ProcessGuard::spawn(child, {
            let exited = Arc::clone(&exited);
            async move { exited.store(true, Ordering::SeqCst) }
        });
        assert!(guard.pid() > 0);

        guard.kill().await;
        assert!(exited.load(Ordering::SeqCst));
    }
}
