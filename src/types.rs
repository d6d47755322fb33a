use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Severity attached to breadcrumbs and message captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

/// A log crumb captured out-of-band and attached to the next report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub message: String,
    pub category: String,
    pub level: Level,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Breadcrumb {
    pub fn new(message: impl Into<String>, category: impl Into<String>, level: Level) -> Self {
        Self {
            message: message.into(),
            category: category.into(),
            level,
            timestamp: Utc::now(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Identity of the user a report was captured on behalf of.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, Value>,
}

impl UserInfo {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()), ..Default::default() }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Snapshot of the host process taken at format time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub os: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub sdk_version: String,
}

/// URL/referrer pair describing the request the error occurred under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

/// The unit that flows through the pipeline.
///
/// Built once by the format stage; after that, only the redaction pass may
/// mutate `message`, `stack_trace`, `context`, `user`, or `breadcrumbs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    pub exception_class: String,
    pub stack_trace: String,
    /// Source file of the first recognizable stack frame, or `"unknown"`.
    pub file: String,
    /// Line of the first recognizable stack frame, or 0.
    pub line: u32,
    pub project: String,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
    /// Opaque id assigned once per shipper instance.
    pub session_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<Breadcrumb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
}

impl ErrorReport {
    /// Serialized size in bytes, as it would go on the wire uncompressed.
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// A report parked in the offline queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedItem {
    pub id: Uuid,
    pub report: ErrorReport,
    pub enqueued_at: DateTime<Utc>,
    /// Delivery failures only; admission to the queue does not count.
    pub attempts: u32,
}

impl QueuedItem {
    pub fn new(report: ErrorReport) -> Self {
        Self {
            id: Uuid::new_v4(),
            report,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }
}

/// Batch wrapper sent as a single webhook body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEnvelope {
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub count: usize,
    pub reports: Vec<ErrorReport>,
}

impl BatchEnvelope {
    pub fn new(reports: Vec<ErrorReport>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            created_at: Utc::now(),
            count: reports.len(),
            reports,
        }
    }

    pub fn single(report: ErrorReport) -> Self {
        Self::new(vec![report])
    }
}
