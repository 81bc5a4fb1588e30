// Worker half of the background task protocol
use crate::infrastructure::background_task::{BackgroundTask, BackgroundTaskResponse, TaskFailure};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub type TaskHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Text frames flowing between the client and an isolated worker.
pub struct BackgroundChannel {
    pub tasks: UnboundedSender<String>,
    pub responses: UnboundedReceiver<String>,
}

/// Table of named operations executed on behalf of a
/// [`BackgroundServiceClient`](super::background_client::BackgroundServiceClient).
pub struct BackgroundService {
    name: String,
    operations: HashMap<String, TaskHandler>,
}

impl BackgroundService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: HashMap::new(),
        }
    }

    pub fn register<F, Fut>(mut self, task_name: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: TaskHandler = Arc::new(move |parameters| -> BoxFuture<'static, anyhow::Result<Value>> {
            Box::pin(handler(parameters))
        });
        self.operations.insert(task_name.to_string(), handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one task to completion. Unknown names and handler errors become
    /// failed responses.
    pub async fn handle(&self, task: BackgroundTask) -> BackgroundTaskResponse {
        let Some(handler) = self.operations.get(&task.task_name).cloned() else {
            tracing::warn!(task = %task.task_name, service = %self.name, "Background task not found");
            return BackgroundTaskResponse::fail(task.id, TaskFailure::not_found(&task.task_name, &self.name));
        };

        tracing::debug!(id = task.id, task = %task.task_name, "Running background task");
        match handler(task.parameters).await {
            Ok(payload) => BackgroundTaskResponse::pass(task.id, payload),
            Err(e) => {
                tracing::error!(id = task.id, task = %task.task_name, "Background task failed: {:#}", e);
                BackgroundTaskResponse::fail(task.id, TaskFailure::failed(&e))
            }
        }
    }

    /// Move the service onto its own task. Every received task is executed
    /// concurrently, so responses can come back in any order.
    pub fn spawn(self) -> BackgroundChannel {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        tokio::spawn(Arc::new(self).run(task_rx, response_tx));

        BackgroundChannel {
            tasks: task_tx,
            responses: response_rx,
        }
    }

    async fn run(self: Arc<Self>, mut tasks: UnboundedReceiver<String>, responses: UnboundedSender<String>) {
        tracing::info!(service = %self.name, "Background service started");

        while let Some(frame) = tasks.recv().await {
            let task: BackgroundTask = match serde_json::from_str(&frame) {
                Ok(task) => task,
                Err(e) => {
                    tracing::error!(service = %self.name, "Discarding undecodable task frame: {}", e);
                    continue;
                }
            };

            let service = self.clone();
            let responses = responses.clone();
            tokio::spawn(async move {
                let response = service.handle(task).await;
                match serde_json::to_string(&response) {
                    Ok(frame) => {
                        if responses.send(frame).is_err() {
                            tracing::warn!(id = response.id, "Client went away before the response was delivered");
                        }
                    }
                    Err(e) => tracing::error!(id = response.id, "Unable to encode task response: {}", e),
                }
            });
        }

        tracing::info!(service = %self.name, "Background service shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_service() -> BackgroundService {
        BackgroundService::new("EchoService")
            .register("echo", |parameters| async move { Ok(Value::Array(parameters)) })
            .register("explode", |_| async move { Err(anyhow::anyhow!("kaboom")) })
    }

    fn task(id: u64, name: &str) -> BackgroundTask {
        BackgroundTask {
            id,
            task_name: name.to_string(),
            parameters: vec![json!(1), json!("two")],
        }
    }

    #[tokio::test]
    async fn test_known_task_passes() {
        let response = echo_service().handle(task(1, "echo")).await;
        assert_eq!(response, BackgroundTaskResponse::pass(1, json!([1, "two"])));
    }

    #[tokio::test]
    async fn test_unknown_task_fails_without_stopping() {
        let mut channel = echo_service().spawn();

        channel.tasks.send(serde_json::to_string(&task(1, "missing")).unwrap()).unwrap();
        let frame = channel.responses.recv().await.unwrap();
        let response: BackgroundTaskResponse = serde_json::from_str(&frame).unwrap();
        assert_eq!(response.id, 1);
        assert!(response.error);
        assert_eq!(response.payload["kind"], "not_found");

        // Garbage is skipped and the worker keeps serving.
        channel.tasks.send("not json".to_string()).unwrap();
        channel.tasks.send(serde_json::to_string(&task(2, "echo")).unwrap()).unwrap();
        let frame = channel.responses.recv().await.unwrap();
        let response: BackgroundTaskResponse = serde_json::from_str(&frame).unwrap();
        assert_eq!(response.id, 2);
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failure() {
        let response = echo_service().handle(task(5, "explode")).await;
        assert!(response.error);
        assert_eq!(response.payload["kind"], "failed");
        assert_eq!(response.payload["message"], "kaboom");
    }
}
