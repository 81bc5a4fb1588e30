// Client half of the background task protocol
use crate::infrastructure::background_service::BackgroundChannel;
use crate::infrastructure::background_task::{BackgroundTask, BackgroundTaskResponse, TaskError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, TaskError>>>>>;

/// Sends named tasks to a background worker and correlates the responses
/// by id. Calls complete in whatever order the worker finishes them.
pub struct BackgroundServiceClient {
    next_id: AtomicU64,
    pending: PendingCalls,
    tasks: UnboundedSender<String>,
}

impl BackgroundServiceClient {
    /// Attach to a worker channel. Must be called inside a tokio runtime.
    pub fn new(channel: BackgroundChannel) -> Self {
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(pump_responses(pending.clone(), channel.responses));

        Self {
            next_id: AtomicU64::new(0),
            pending,
            tasks: channel.tasks,
        }
    }

    /// Dispatch `task_name`. The task is serialized and sent before this
    /// returns; the future only waits for the response.
    pub fn run(
        &self,
        task_name: &str,
        parameters: Vec<Value>,
    ) -> impl Future<Output = Result<Value, TaskError>> + Send + use<> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();

        let task = BackgroundTask {
            id,
            task_name: task_name.to_string(),
            parameters,
        };
        let sent = match serde_json::to_string(&task) {
            Ok(frame) => {
                self.pending.lock().insert(id, tx);
                if self.tasks.send(frame).is_err() {
                    tracing::error!(id, task = task_name, "Unable to deliver task to background service");
                    self.pending.lock().remove(&id);
                }
                Ok(())
            }
            Err(e) => Err(TaskError::from(e)),
        };

        async move {
            sent?;
            rx.await.unwrap_or(Err(TaskError::Disconnected))
        }
    }

    /// Number of calls still waiting for a response.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

async fn pump_responses(pending: PendingCalls, mut responses: UnboundedReceiver<String>) {
    while let Some(frame) = responses.recv().await {
        let response: BackgroundTaskResponse = match serde_json::from_str(&frame) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Undecodable response from background service: {}", e);
                continue;
            }
        };

        let Some(completion) = pending.lock().remove(&response.id) else {
            tracing::warn!(id = response.id, "Unknown response from background service");
            continue;
        };

        let result = if response.success && !response.error {
            Ok(response.payload)
        } else {
            Err(TaskError::from_payload(response.payload))
        };
        // The caller may have dropped its future.
        let _ = completion.send(result);
    }

    let orphaned = {
        let mut pending = pending.lock();
        let count = pending.len();
        pending.clear();
        count
    };
    if orphaned > 0 {
        tracing::warn!(orphaned, "Background service closed with calls still pending");
    }
}
