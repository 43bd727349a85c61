//! Classified error records
//!
//! An [`ErrorRecord`] is the unit every other component works with: the
//! handler counts them, the monitor aggregates them and the recovery engine
//! retries them. Records are assembled with a consuming builder and are
//! read-only once handed to the subsystem.

use crate::error::ResilienceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Closed taxonomy of failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Realtime socket connection dropped or refused
    ConnectionTransport,
    /// Outbound realtime message could not be delivered
    MessageSend,
    /// Inbound message could not be decoded
    MessageParse,
    /// Database connection lost or refused
    PersistenceConnection,
    /// Database query failed
    PersistenceQuery,
    /// Notification could not be created
    NotificationCreate,
    /// Notification fan-out failed
    NotificationBroadcast,
    /// Caller supplied invalid input
    Validation,
    /// Identity could not be established
    Authentication,
    /// Caller exceeded a rate limit
    RateLimit,
    /// Anything the classifier could not place
    Unknown,
}

impl ErrorCategory {
    /// All categories in declaration order
    pub const ALL: [ErrorCategory; 11] = [
        ErrorCategory::ConnectionTransport,
        ErrorCategory::MessageSend,
        ErrorCategory::MessageParse,
        ErrorCategory::PersistenceConnection,
        ErrorCategory::PersistenceQuery,
        ErrorCategory::NotificationCreate,
        ErrorCategory::NotificationBroadcast,
        ErrorCategory::Validation,
        ErrorCategory::Authentication,
        ErrorCategory::RateLimit,
        ErrorCategory::Unknown,
    ];

    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ConnectionTransport => "connection_transport",
            ErrorCategory::MessageSend => "message_send",
            ErrorCategory::MessageParse => "message_parse",
            ErrorCategory::PersistenceConnection => "persistence_connection",
            ErrorCategory::PersistenceQuery => "persistence_query",
            ErrorCategory::NotificationCreate => "notification_create",
            ErrorCategory::NotificationBroadcast => "notification_broadcast",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Severity used when a record of this category is built without one
    pub fn default_severity(&self) -> ErrorSeverity {
        match self {
            ErrorCategory::PersistenceConnection => ErrorSeverity::Critical,
            ErrorCategory::ConnectionTransport
            | ErrorCategory::PersistenceQuery
            | ErrorCategory::Authentication => ErrorSeverity::High,
            ErrorCategory::MessageParse | ErrorCategory::Validation => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Whether records of this category are retryable unless stated otherwise
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::ConnectionTransport
                | ErrorCategory::MessageSend
                | ErrorCategory::PersistenceConnection
                | ErrorCategory::PersistenceQuery
                | ErrorCategory::NotificationCreate
                | ErrorCategory::NotificationBroadcast
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        ErrorCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ResilienceError::config(format!("Unknown error category: {s}")))
    }
}

/// Urgency tier, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation fields attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Resident, guard or admin the failure concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// Tenant / community scope key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_key: Option<String>,
    /// Request/session ID for correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Originating component (socket id, worker name, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    /// Inbound request ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Client metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the context was created
    pub timestamp: DateTime<Utc>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorContext {
    /// Create an empty context stamped with the current time
    pub fn new() -> Self {
        Self {
            subject_id: None,
            scope_key: None,
            correlation_id: None,
            component_id: None,
            request_id: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_subject_id<S: Into<String>>(mut self, id: S) -> Self {
        self.subject_id = Some(id.into());
        self
    }

    pub fn with_scope_key<S: Into<String>>(mut self, key: S) -> Self {
        self.scope_key = Some(key.into());
        self
    }

    pub fn with_correlation_id<S: Into<String>>(mut self, id: S) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_component_id<S: Into<String>>(mut self, id: S) -> Self {
        self.component_id = Some(id.into());
        self
    }

    pub fn with_request_id<S: Into<String>>(mut self, id: S) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Add metadata to error context
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merge `other` into this context.
    ///
    /// Fields set in `other` overwrite ours, metadata is merged key by key.
    /// The creation timestamp of `self` is kept.
    pub fn merge(&mut self, other: ErrorContext) {
        let ErrorContext {
            subject_id,
            scope_key,
            correlation_id,
            component_id,
            request_id,
            metadata,
            timestamp: _,
        } = other;

        if subject_id.is_some() {
            self.subject_id = subject_id;
        }
        if scope_key.is_some() {
            self.scope_key = scope_key;
        }
        if correlation_id.is_some() {
            self.correlation_id = correlation_id;
        }
        if component_id.is_some() {
            self.component_id = component_id;
        }
        if request_id.is_some() {
            self.request_id = request_id;
        }
        self.metadata.extend(metadata);
    }

    /// Look up a metadata value as a string
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Immutable classified representation of a failure
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    id: Uuid,
    message: String,
    category: ErrorCategory,
    severity: ErrorSeverity,
    context: ErrorContext,
    retryable: bool,
    cause: Option<Arc<anyhow::Error>>,
    timestamp: DateTime<Utc>,
}

/// Flat serialized form of an [`ErrorRecord`] for logs and reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedRecord {
    pub id: Uuid,
    pub message: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub context: ErrorContext,
}

impl ErrorRecord {
    /// Create a record with the category's default severity and retryability
    pub fn new<S: Into<String>>(category: ErrorCategory, message: S) -> Self {
        let context = ErrorContext::new();
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            category,
            severity: category.default_severity(),
            retryable: category.default_retryable(),
            timestamp: context.timestamp,
            context,
            cause: None,
        }
    }

    /// Wrap a raw fault the caller could not classify
    pub fn unclassified<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCategory::Unknown, message)
            .with_severity(ErrorSeverity::Medium)
            .retryable(false)
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::ConnectionTransport, msg)
    }

    pub fn message_send<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::MessageSend, msg)
    }

    pub fn message_parse<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::MessageParse, msg)
    }

    pub fn persistence_connection<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::PersistenceConnection, msg)
    }

    pub fn persistence_query<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::PersistenceQuery, msg)
    }

    pub fn notification_create<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::NotificationCreate, msg)
    }

    pub fn notification_broadcast<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::NotificationBroadcast, msg)
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::Validation, msg)
    }

    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::Authentication, msg)
    }

    pub fn rate_limit<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorCategory::RateLimit, msg)
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Replace the context; the record keeps its own timestamp
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        self.cause = Some(Arc::new(cause.into()));
        self
    }

    /// Backdate (or postdate) the record, e.g. when replaying a captured fault
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub(crate) fn merge_context(&mut self, extra: ErrorContext) {
        self.context.merge(extra);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Flatten into a serializable structure
    pub fn serialize(&self) -> SerializedRecord {
        SerializedRecord {
            id: self.id,
            message: self.message.clone(),
            category: self.category,
            severity: self.severity,
            retryable: self.retryable,
            cause: self.cause.as_ref().map(|c| format!("{c:#}")),
            recorded_at: self.timestamp,
            context: self.context.clone(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.category, self.severity, self.message)
    }
}

impl std::error::Error for ErrorRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| &**e as &(dyn std::error::Error + 'static))
    }
}

impl From<anyhow::Error> for ErrorRecord {
    fn from(err: anyhow::Error) -> Self {
        ErrorRecord::unclassified(err.to_string()).with_cause(err)
    }
}

impl From<std::io::Error> for ErrorRecord {
    fn from(err: std::io::Error) -> Self {
        ErrorRecord::unclassified(err.to_string()).with_cause(err)
    }
}

/// Subsystem errors keep their own retryability and are tagged with their type
impl From<ResilienceError> for ErrorRecord {
    fn from(err: ResilienceError) -> Self {
        let retryable = err.is_retryable();
        let context = ErrorContext::new().with_metadata("error_type", err.error_type());
        ErrorRecord::unclassified(err.to_string())
            .retryable(retryable)
            .with_context(context)
            .with_cause(err)
    }
}

impl From<&str> for ErrorRecord {
    fn from(msg: &str) -> Self {
        ErrorRecord::unclassified(msg)
    }
}

impl From<String> for ErrorRecord {
    fn from(msg: String) -> Self {
        ErrorRecord::unclassified(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_category_from_str() {
        assert_eq!(
            "persistence-query".parse::<ErrorCategory>().unwrap(),
            ErrorCategory::PersistenceQuery
        );
        assert_eq!(
            "RATE_LIMIT".parse::<ErrorCategory>().unwrap(),
            ErrorCategory::RateLimit
        );
        assert!("gate_jammed".parse::<ErrorCategory>().is_err());
    }

    #[test]
    fn test_category_defaults() {
        let record = ErrorRecord::transport("socket closed");
        assert_eq!(record.category(), ErrorCategory::ConnectionTransport);
        assert_eq!(record.severity(), ErrorSeverity::High);
        assert!(record.is_retryable());

        let record = ErrorRecord::validation("plate number missing");
        assert_eq!(record.severity(), ErrorSeverity::Low);
        assert!(!record.is_retryable());
    }

    #[test]
    fn test_raw_fault_is_unknown_medium_not_retryable() {
        let record: ErrorRecord = anyhow::anyhow!("boom").into();
        assert_eq!(record.category(), ErrorCategory::Unknown);
        assert_eq!(record.severity(), ErrorSeverity::Medium);
        assert!(!record.is_retryable());
        assert!(record.cause().is_some());
        assert!(std::error::Error::source(&record).is_some());
    }

    #[test]
    fn test_subsystem_error_keeps_retryability() {
        let record: ErrorRecord = ResilienceError::timeout("ocr service").into();
        assert_eq!(record.category(), ErrorCategory::Unknown);
        assert!(record.is_retryable());
        assert_eq!(record.context().metadata_str("error_type"), Some("timeout_error"));

        let record: ErrorRecord = ResilienceError::config("bad interval").into();
        assert!(!record.is_retryable());
        assert_eq!(record.context().metadata_str("error_type"), Some("config_error"));
    }

    #[test]
    fn test_context_merge_last_write_wins() {
        let mut base = ErrorContext::new()
            .with_subject_id("resident-1")
            .with_scope_key("village-a")
            .with_metadata("ua", "ios");
        let created = base.timestamp;

        base.merge(
            ErrorContext::new()
                .with_scope_key("village-b")
                .with_request_id("req-9")
                .with_metadata("ua", "android")
                .with_metadata("ip", "10.0.0.1"),
        );

        assert_eq!(base.subject_id.as_deref(), Some("resident-1"));
        assert_eq!(base.scope_key.as_deref(), Some("village-b"));
        assert_eq!(base.request_id.as_deref(), Some("req-9"));
        assert_eq!(base.metadata_str("ua"), Some("android"));
        assert_eq!(base.metadata_str("ip"), Some("10.0.0.1"));
        assert_eq!(base.timestamp, created);
    }

    #[test]
    fn test_serialize_is_flat() {
        let record = ErrorRecord::persistence_query("deadlock detected")
            .with_context(ErrorContext::new().with_scope_key("village-a"))
            .with_cause(std::io::Error::new(std::io::ErrorKind::Other, "db"));

        let value = serde_json::to_value(record.serialize()).unwrap();
        assert_eq!(value["category"], "persistence_query");
        assert_eq!(value["severity"], "high");
        assert_eq!(value["scope_key"], "village-a");
        assert_eq!(value["retryable"], true);
        assert_eq!(value["cause"], "db");
        assert!(value.get("context").is_none());
    }

    #[test]
    fn test_display() {
        let record = ErrorRecord::rate_limit("too many visitor passes");
        assert_eq!(
            record.to_string(),
            "[rate_limit/medium] too many visitor passes"
        );
    }
}
