//! Process monitor
//!
//! Waits for the child to exit (or for a kill request), lets the capture
//! pipeline drain the remaining output, then records the exit under the
//! lifecycle lock. It runs beside the capture task, never inside it, so
//! output written during shutdown is not lost to a read-then-wait ordering.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::child;
use crate::instance::Shared;

/// Everything the monitor owns for one run
pub(crate) struct MonitorTask {
    pub shared: Arc<Shared>,
    pub child: Child,
    pub pid: u32,
    pub capture: JoinHandle<()>,
    pub kill: CancellationToken,
    pub drain_timeout: Duration,
}

impl MonitorTask {
    pub(crate) async fn run(self) {
        let MonitorTask {
            shared,
            mut child,
            pid,
            mut capture,
            kill,
            drain_timeout,
        } = self;

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = kill.cancelled() => None,
        };
        let waited = match exited {
            Some(status) => status,
            None => {
                if let Err(e) = child::terminate(&mut child, pid) {
                    warn!(instance = %shared.id, pid = %pid, error = %e, "Kill failed");
                    shared.console.append(&format!("[kill failed: {e}]"));
                }
                child.wait().await
            }
        };

        match tokio::time::timeout(drain_timeout, &mut capture).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                shared.console.append(&format!("[console reader error] {e}"));
            }
            Err(_) => {
                // Something outside the process group still holds the pipe.
                warn!(instance = %shared.id, pid = %pid, "Output still open after exit, detaching reader");
                capture.abort();
                let _ = capture.await;
                shared
                    .console
                    .append("[console reader stopped: output still open after exit]");
            }
        }

        shared.record_exit(pid, waited).await;
    }
}
