use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a stream within a connection.
///
/// Streams are keyed by name plus an optional namespace, and the pair is what the
/// status store and stats tracker index by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl StreamKey {
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
        }
    }

    pub fn unnamespaced(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}:{}", namespace, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Scope of a state message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateScope {
    Global,
    Stream,
    Legacy,
}

/// Stream status reported by a connector through a trace message.
///
/// This is the protocol-level status emitted by connectors, distinct from the
/// run state the pipeline derives from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorStreamStatus {
    Started,
    Running,
    Complete,
    Incomplete,
}

/// Extra information attached to a rate-limited stream status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitedMetadata {
    /// Epoch milliseconds at which the connector expects its quota to reset.
    pub quota_reset: i64,
}

/// A single data record emitted by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMessage {
    pub stream: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub data: serde_json::Value,
    pub emitted_at: i64,
}

impl RecordMessage {
    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.stream.clone(), self.namespace.clone())
    }
}

/// A checkpoint emitted by a source and echoed back by a destination.
///
/// The `id` is an opaque, strictly increasing integer attached upstream. Matching the
/// id a destination acknowledges against the latest id seen from the source is how the
/// pipeline decides a stream has fully flushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub scope: StateScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamKey>,
    pub id: u64,
    pub data: serde_json::Value,
}

/// Out-of-band diagnostics emitted by a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trace_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceMessage {
    StreamStatus(StreamStatusTrace),
    Error(ErrorTrace),
    Estimate(EstimateTrace),
    Analytics(AnalyticsTrace),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatusTrace {
    pub stream: StreamKey,
    pub status: ConnectorStreamStatus,
    /// Present when an incomplete status is caused by rate limiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limited: Option<RateLimitedMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTrace {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_estimate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_estimate: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsTrace {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecMessage {
    pub connection_specification: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMessage {
    pub streams: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatusMessage {
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A single protocol message exchanged with a connector.
///
/// Only [`Message::Record`] and [`Message::State`] are forwarded from the source to
/// the destination; the remaining kinds are consumed by the pipeline itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Record(RecordMessage),
    State(StateMessage),
    Trace(TraceMessage),
    Control(ControlMessage),
    Log(LogMessage),
    Spec(SpecMessage),
    Catalog(CatalogMessage),
    ConnectionStatus(ConnectionStatusMessage),
}

impl Message {
    /// Builds a record message for the given stream with the supplied payload.
    pub fn record(stream: &StreamKey, data: serde_json::Value, emitted_at: i64) -> Self {
        Message::Record(RecordMessage {
            stream: stream.name.clone(),
            namespace: stream.namespace.clone(),
            data,
            emitted_at,
        })
    }

    /// Builds a stream-scoped state message with the given checkpoint id.
    pub fn stream_state(stream: &StreamKey, id: u64, data: serde_json::Value) -> Self {
        Message::State(StateMessage {
            scope: StateScope::Stream,
            stream: Some(stream.clone()),
            id,
            data,
        })
    }

    /// Builds a global-scoped state message with the given checkpoint id.
    pub fn global_state(id: u64, data: serde_json::Value) -> Self {
        Message::State(StateMessage {
            scope: StateScope::Global,
            stream: None,
            id,
            data,
        })
    }

    /// Builds a stream status trace message.
    pub fn stream_status(stream: &StreamKey, status: ConnectorStreamStatus) -> Self {
        Message::Trace(TraceMessage::StreamStatus(StreamStatusTrace {
            stream: stream.clone(),
            status,
            rate_limited: None,
        }))
    }

    /// Returns the stream this message belongs to, where one can be resolved.
    ///
    /// Global and legacy state messages, non-stream traces and the remaining message
    /// kinds have no stream affinity and return [`None`].
    pub fn stream_key(&self) -> Option<StreamKey> {
        match self {
            Message::Record(record) => Some(record.stream_key()),
            Message::State(state) => match state.scope {
                StateScope::Stream => state.stream.clone(),
                StateScope::Global | StateScope::Legacy => None,
            },
            Message::Trace(TraceMessage::StreamStatus(status)) => Some(status.stream.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_stream_key_display() {
        let plain = StreamKey::unnamespaced("users");
        let namespaced = StreamKey::new("users", Some("public".to_string()));

        assert_eq!(plain.to_string(), "users");
        assert_eq!(namespaced.to_string(), "public:users");
    }

    #[test]
    fn test_stream_key_extraction() {
        let key = StreamKey::unnamespaced("users");

        let record = Message::record(&key, json!({"id": 1}), 0);
        let stream_state = Message::stream_state(&key, 1, json!({"cursor": 1}));
        let global_state = Message::global_state(1, json!({"cursor": 1}));
        let status = Message::stream_status(&key, ConnectorStreamStatus::Running);
        let log = Message::Log(LogMessage {
            level: LogLevel::Info,
            message: "hello".to_string(),
        });

        assert_eq!(record.stream_key(), Some(key.clone()));
        assert_eq!(stream_state.stream_key(), Some(key.clone()));
        assert_eq!(global_state.stream_key(), None);
        assert_eq!(status.stream_key(), Some(key));
        assert_eq!(log.stream_key(), None);
    }

    #[test]
    fn test_message_serialization_envelope() {
        let key = StreamKey::unnamespaced("users");
        let record = Message::record(&key, json!({"id": 7}), 42);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "RECORD");
        assert_eq!(value["stream"], "users");
        assert_eq!(value["data"]["id"], 7);

        let parsed: Message = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_trace_serialization_envelope() {
        let key = StreamKey::unnamespaced("users");
        let trace = Message::stream_status(&key, ConnectorStreamStatus::Complete);

        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(value["type"], "TRACE");
        assert_eq!(value["trace_type"], "STREAM_STATUS");
        assert_eq!(value["status"], "COMPLETE");
    }
}
