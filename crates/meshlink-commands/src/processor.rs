//! Command processor.
//!
//! A single worker drains the dispatcher's queue in order, waits for a
//! rate-limit token, executes each command on the transport and publishes
//! the outcome. A second task periodically sweeps expired debounce records.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::command::{CommandOutcome, EntryState};
use crate::dispatcher::Dispatcher;
use crate::queue::QueueEntry;
use crate::transport::{ExecutionError, Transport};

/// Upper bound on the debounce sweep period.
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(3600);

/// Command processor.
pub struct CommandProcessor {
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
    running: Arc<RwLock<bool>>,
    shutdown: Arc<RwLock<Option<watch::Sender<bool>>>>,
    task_handles: Arc<RwLock<Vec<JoinHandle<()>>>>,
}

impl CommandProcessor {
    /// Create a new command processor.
    pub fn new(dispatcher: Dispatcher, transport: Arc<dyn Transport>) -> Self {
        Self {
            dispatcher,
            transport,
            running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(RwLock::new(None)),
            task_handles: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Start the processor. Calling it while running does nothing.
    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let (tx, rx) = watch::channel(false);
        *self.shutdown.write().await = Some(tx);

        let worker = tokio::spawn(run_worker(
            self.dispatcher.clone(),
            self.transport.clone(),
            rx.clone(),
        ));
        let sweeper = tokio::spawn(run_sweeper(self.dispatcher.clone(), rx));

        let mut tasks = self.task_handles.write().await;
        tasks.push(worker);
        tasks.push(sweeper);

        tracing::info!(transport = self.transport.name(), "Command processor started");
    }

    /// Stop the processor and wait for its tasks. A command already handed
    /// to the transport finishes first. Queued commands stay queued, and a
    /// command still waiting for a token goes back to the head of the queue.
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        drop(running);

        if let Some(tx) = self.shutdown.write().await.take() {
            let _ = tx.send(true);
        }

        let handles: Vec<_> = self.task_handles.write().await.drain(..).collect();
        for handle in handles {
            handle.await.ok();
        }
    }

    /// Stop the processor and abandon everything still queued.
    pub async fn shutdown(&self) {
        self.stop().await;
        let abandoned = self.dispatcher.abandon_pending();
        if abandoned > 0 {
            tracing::warn!(abandoned, "Abandoned queued commands on shutdown");
        }
        tracing::info!("Command processor shut down");
    }

    /// Check if processor is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

async fn run_worker(
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("Command worker started");

    loop {
        let entry = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            entry = dispatcher.next_entry() => entry,
        };

        let waited = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                tracing::debug!(
                    request_id = %entry.command.request_id,
                    "Worker stopping, returning command to the queue"
                );
                dispatcher.requeue_front(entry);
                break;
            }
            waited = dispatcher.limiter().acquire() => waited,
        };

        dispatch_entry(&dispatcher, transport.as_ref(), entry, waited).await;
    }

    tracing::debug!("Command worker stopped");
}

async fn dispatch_entry(
    dispatcher: &Dispatcher,
    transport: &dyn Transport,
    mut entry: QueueEntry,
    waited: Duration,
) {
    entry.state = EntryState::Executing;
    let kind = entry.command.kind;
    let started = std::time::Instant::now();

    let result = AssertUnwindSafe(transport.execute(kind, &entry.command.parameters))
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(Ok(payload)) => CommandOutcome::executed(&entry.command, payload),
        Ok(Err(e)) => CommandOutcome::failed(&entry.command, &e),
        Err(panic) => {
            let error = ExecutionError::Transport(format!(
                "transport panicked: {}",
                panic_message(panic.as_ref())
            ));
            tracing::error!(
                kind = %kind,
                request_id = %entry.command.request_id,
                "Transport panicked while executing command"
            );
            CommandOutcome::failed(&entry.command, &error)
        }
    };

    let success = outcome.success;
    let message = outcome.message.clone();
    entry.resolve(outcome);
    dispatcher.record_processed();

    if success {
        tracing::info!(
            kind = %kind,
            request_id = %entry.command.request_id,
            entry = %entry.id,
            waited_ms = waited.as_millis() as u64,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command executed"
        );
    } else {
        tracing::warn!(
            kind = %kind,
            request_id = %entry.command.request_id,
            entry = %entry.id,
            error = %message,
            "Command failed"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_sweeper(dispatcher: Dispatcher, mut shutdown: watch::Receiver<bool>) {
    let config = dispatcher.config();
    let period = config.debounce_window().min(MAX_SWEEP_PERIOD);
    if !config.debounce_enabled || period.is_zero() {
        return;
    }

    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let purged = dispatcher.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired debounce records");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
