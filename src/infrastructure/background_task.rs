// Wire types shared by the background service and its client
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A named operation sent to the background service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundTask {
    pub id: u64,
    pub task_name: String,
    pub parameters: Vec<Value>,
}

/// Reply to a [`BackgroundTask`], correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTaskResponse {
    pub id: u64,
    pub success: bool,
    pub error: bool,
    pub payload: Value,
}

impl BackgroundTaskResponse {
    pub fn pass(id: u64, payload: Value) -> Self {
        Self {
            id,
            success: true,
            error: false,
            payload,
        }
    }

    pub fn fail(id: u64, failure: TaskFailure) -> Self {
        Self {
            id,
            success: false,
            error: true,
            payload: serde_json::to_value(&failure).unwrap_or(Value::String(failure.message)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Failed,
}

/// Error payload carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn not_found(task_name: &str, controller: &str) -> Self {
        Self {
            kind: FailureKind::NotFound,
            message: format!(
                "Background task \"{}\" not found in \"{}\" controller",
                task_name, controller
            ),
        }
    }

    pub fn failed(error: &anyhow::Error) -> Self {
        Self {
            kind: FailureKind::Failed,
            message: format!("{:#}", error),
        }
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    NotFound(String),

    #[error("Background task failed: {0}")]
    Failed(String),

    #[error("Background service disconnected")]
    Disconnected,

    #[error("Background task serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskError {
    /// Interpret the payload of a failed response.
    pub fn from_payload(payload: Value) -> Self {
        match serde_json::from_value::<TaskFailure>(payload.clone()) {
            Ok(TaskFailure {
                kind: FailureKind::NotFound,
                message,
            }) => TaskError::NotFound(message),
            Ok(TaskFailure {
                kind: FailureKind::Failed,
                message,
            }) => TaskError::Failed(message),
            Err(_) => match payload {
                Value::String(message) => TaskError::Failed(message),
                other => TaskError::Failed(other.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_wire_format() {
        let task = BackgroundTask {
            id: 7,
            task_name: "fetchChartData".to_string(),
            parameters: vec![json!({"id": "m1"}), json!("range")],
        };
        let wire = serde_json::to_value(&task).unwrap();
        assert_eq!(wire["taskName"], "fetchChartData");
        assert_eq!(wire["parameters"][1], "range");
    }

    #[test]
    fn test_failure_payload_maps_to_error() {
        let response = BackgroundTaskResponse::fail(3, TaskFailure::not_found("explode", "MonitorsBackgroundService"));
        assert!(response.error);
        assert!(!response.success);

        match TaskError::from_payload(response.payload) {
            TaskError::NotFound(message) => {
                assert_eq!(message, "Background task \"explode\" not found in \"MonitorsBackgroundService\" controller")
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(matches!(TaskError::from_payload(json!("boom")), TaskError::Failed(m) if m == "boom"));
    }
}
