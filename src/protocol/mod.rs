//! Kernel message protocol
//!
//! The envelope every request, reply and notification travels in:
//!
//! ```text
//! { header: { msg_id, msg_type, session, ... },
//!   parent_header?: { ... },
//!   metadata: { ... },
//!   content: <type-specific> }
//! ```
//!
//! Contents are kept as raw JSON on the envelope and decoded on demand into
//! the typed structs below, so messages the bridge does not understand are
//! relayed untouched.

mod error;
mod turn;

pub use error::ProtocolError;
pub use turn::{TurnHandle, TurnTracker};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MSG_ID: AtomicU64 = AtomicU64::new(1);

fn next_msg_id() -> String {
    format!("wk-{:016x}", NEXT_MSG_ID.fetch_add(1, Ordering::Relaxed))
}

/// Message types the bridge inspects
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MsgType {
    ExecuteRequest,
    ExecuteReply,
    Status,
    Stream,
    InputRequest,
    InputReply,
    Other(String),
}

impl MsgType {
    pub fn as_str(&self) -> &str {
        match self {
            MsgType::ExecuteRequest => "execute_request",
            MsgType::ExecuteReply => "execute_reply",
            MsgType::Status => "status",
            MsgType::Stream => "stream",
            MsgType::InputRequest => "input_request",
            MsgType::InputReply => "input_reply",
            MsgType::Other(s) => s,
        }
    }
}

impl From<&str> for MsgType {
    fn from(s: &str) -> Self {
        match s {
            "execute_request" => MsgType::ExecuteRequest,
            "execute_reply" => MsgType::ExecuteReply,
            "status" => MsgType::Status,
            "stream" => MsgType::Stream,
            "input_request" => MsgType::InputRequest,
            "input_reply" => MsgType::InputReply,
            other => MsgType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message header
///
/// Every field defaults so an empty `{}` parent header still decodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub msg_id: String,
    #[serde(default)]
    pub msg_type: String,
    #[serde(default)]
    pub session: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub date: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A kernel protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: Header,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_header: Option<Header>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Top-level session mirror some front ends read instead of the header's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl Message {
    /// Build a message with a fresh id
    pub fn new(msg_type: MsgType, session: impl Into<String>, content: Value) -> Self {
        Self {
            header: Header {
                msg_id: next_msg_id(),
                msg_type: msg_type.as_str().to_string(),
                session: session.into(),
                ..Header::default()
            },
            parent_header: None,
            metadata: Map::new(),
            content,
            channel: None,
            session: None,
        }
    }

    /// Build a reply/notification whose parent is `parent`
    pub fn child_of(parent: &Message, msg_type: MsgType, content: Value) -> Self {
        let mut msg = Self::new(msg_type, parent.header.session.clone(), content);
        msg.parent_header = Some(parent.header.clone());
        msg
    }

    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channel = Some(channel.to_string());
        self
    }

    pub fn msg_type(&self) -> MsgType {
        MsgType::from(self.header.msg_type.as_str())
    }

    pub fn is(&self, msg_type: &MsgType) -> bool {
        self.header.msg_type == msg_type.as_str()
    }

    /// Decode the content as `T`
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.content)
    }

    /// Overwrite the session on both the header and the top-level mirror
    pub fn stamp_session(&mut self, session: &str) {
        self.header.session = session.to_string();
        self.session = Some(session.to_string());
    }

    /// True for `status` messages reporting `execution_state: "idle"`
    pub fn is_idle_status(&self) -> bool {
        self.is(&MsgType::Status)
            && self
                .content
                .get("execution_state")
                .and_then(Value::as_str)
                == Some(ExecutionState::Idle.as_str())
    }

    pub fn execute_request(session: &str, code: impl Into<String>) -> Self {
        Self::new(
            MsgType::ExecuteRequest,
            session,
            to_value(&ExecuteRequest {
                code: code.into(),
                silent: false,
                store_history: true,
            }),
        )
        .with_channel("shell")
    }

    pub fn status(parent: &Message, state: ExecutionState) -> Self {
        Self::child_of(
            parent,
            MsgType::Status,
            to_value(&Status {
                execution_state: state,
            }),
        )
        .with_channel("iopub")
    }

    pub fn stream(parent: &Message, name: StreamName, text: impl Into<String>) -> Self {
        Self::child_of(
            parent,
            MsgType::Stream,
            to_value(&Stream {
                name,
                text: text.into(),
            }),
        )
        .with_channel("iopub")
    }

    pub fn input_request(parent: &Message, prompt: impl Into<String>, password: bool) -> Self {
        Self::child_of(
            parent,
            MsgType::InputRequest,
            to_value(&InputRequest {
                prompt: prompt.into(),
                password,
            }),
        )
        .with_channel("stdin")
    }

    pub fn input_reply(session: &str, value: impl Into<String>) -> Self {
        Self::new(
            MsgType::InputReply,
            session,
            to_value(&InputReply {
                value: value.into(),
                status: "ok".to_string(),
            }),
        )
        .with_channel("stdin")
    }
}

fn to_value<T: Serialize>(content: &T) -> Value {
    // Content structs hold only strings, bools and integers.
    serde_json::to_value(content).unwrap_or(Value::Null)
}

/// Interpreter execution state carried by `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Busy,
    Idle,
    Starting,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Busy => "busy",
            ExecutionState::Idle => "idle",
            ExecutionState::Starting => "starting",
        }
    }
}

/// Output stream name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub silent: bool,
    #[serde(default = "default_true")]
    pub store_history: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub execution_state: ExecutionState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub name: StreamName,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub password: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputReply {
    pub value: String,
    #[serde(default)]
    pub status: String,
}

/// Error payload of an `execute_reply`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteReplyError {
    pub execution_count: u64,
    pub status: String,
    pub ename: String,
    pub evalue: String,
    pub traceback: String,
}

/// Low-level text output that bypasses the structured protocol
///
/// Serialized as `{"_stream": {...}}` with no header; the controller turns it
/// into a proper `stream` (and, for stderr, an error `execute_reply`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideStream {
    pub name: StreamName,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evalue: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traceback: Vec<String>,
    #[serde(
        default,
        rename = "executionCount",
        skip_serializing_if = "Option::is_none"
    )]
    pub execution_count: Option<u64>,
}

impl SideStream {
    /// The protocol messages a side-channel record stands for
    ///
    /// A stderr record first yields an error `execute_reply` on the shell
    /// channel, then the `stream` on iopub. Both are parented to `parent`
    /// and carry its session (empty if there is none).
    pub fn into_messages(self, parent: Option<&Header>) -> Vec<Message> {
        let session = parent.map(|h| h.session.as_str()).unwrap_or_default();
        let mut out = Vec::with_capacity(2);

        if self.name == StreamName::Stderr {
            let reply = ExecuteReplyError {
                execution_count: self.execution_count.unwrap_or_default(),
                status: "error".to_string(),
                ename: self.ename.clone().unwrap_or_default(),
                evalue: self.evalue.clone().unwrap_or_default(),
                traceback: self.traceback.concat(),
            };
            out.push(Message::new(MsgType::ExecuteReply, session, to_value(&reply)).with_channel("shell"));
        }

        let stream = Stream {
            name: self.name,
            text: self.text,
        };
        out.push(Message::new(MsgType::Stream, session, to_value(&stream)).with_channel("iopub"));

        for msg in &mut out {
            msg.stamp_session(session);
            msg.parent_header = parent.cloned();
        }
        out
    }
}

/// Anything the worker posts back to the controller, as it looks on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerPost {
    Message(Message),
    Side {
        #[serde(rename = "_stream")]
        stream: SideStream,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_msg_type_round_names() {
        assert_eq!(MsgType::from("status"), MsgType::Status);
        assert_eq!(MsgType::from("comm_open"), MsgType::Other("comm_open".into()));
        assert_eq!(MsgType::InputReply.as_str(), "input_reply");
    }

    #[test]
    fn test_empty_parent_header_decodes() {
        let raw = json!({
            "header": {"msg_id": "1", "msg_type": "execute_request", "session": "S1"},
            "parent_header": {},
            "content": {"code": "1 + 1"}
        });
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.msg_type(), MsgType::ExecuteRequest);
        assert_eq!(msg.parent_header.as_ref().unwrap().msg_type, "");
        let req: ExecuteRequest = msg.content_as().unwrap();
        assert_eq!(req.code, "1 + 1");
        assert!(req.store_history);
    }

    #[test]
    fn test_idle_detection() {
        let parent = Message::execute_request("S1", "x");
        assert!(Message::status(&parent, ExecutionState::Idle).is_idle_status());
        assert!(!Message::status(&parent, ExecutionState::Busy).is_idle_status());
        assert!(!Message::stream(&parent, StreamName::Stdout, "idle").is_idle_status());
    }

    #[test]
    fn test_stamp_session() {
        let mut msg = Message::new(MsgType::Stream, "", Value::Null);
        msg.stamp_session("S9");
        assert_eq!(msg.header.session, "S9");
        assert_eq!(msg.session.as_deref(), Some("S9"));
    }

    #[test]
    fn test_worker_post_side_stream() {
        let raw = json!({"_stream": {"name": "stderr", "text": "boom", "evalue": "boom",
                                     "traceback": [], "executionCount": 3}});
        match serde_json::from_value::<WorkerPost>(raw).unwrap() {
            WorkerPost::Side { stream } => {
                assert_eq!(stream.name, StreamName::Stderr);
                assert_eq!(stream.execution_count, Some(3));
            }
            other => panic!("expected side stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stderr_side_stream_synthesizes_error_reply() {
        let parent = Message::execute_request("S7", "raise");
        let stream = SideStream {
            name: StreamName::Stderr,
            text: "boom".into(),
            ename: Some("Error".into()),
            evalue: Some("boom".into()),
            traceback: vec!["a".into(), "b".into()],
            execution_count: Some(4),
        };

        let msgs = stream.into_messages(Some(&parent.header));
        assert_eq!(msgs.len(), 2);

        let reply = &msgs[0];
        assert_eq!(reply.msg_type(), MsgType::ExecuteReply);
        assert_eq!(reply.channel.as_deref(), Some("shell"));
        assert_eq!(reply.header.session, "S7");
        let content: ExecuteReplyError = reply.content_as().unwrap();
        assert_eq!(content.status, "error");
        assert_eq!(content.execution_count, 4);
        assert_eq!(content.traceback, "ab");

        let out = &msgs[1];
        assert_eq!(out.msg_type(), MsgType::Stream);
        assert_eq!(out.channel.as_deref(), Some("iopub"));
        assert_eq!(out.parent_header.as_ref().unwrap().msg_id, parent.header.msg_id);
    }

    #[test]
    fn test_stdout_side_stream_without_parent() {
        let stream = SideStream {
            name: StreamName::Stdout,
            text: "hi\n".into(),
            ename: None,
            evalue: None,
            traceback: Vec::new(),
            execution_count: None,
        };
        let msgs = stream.into_messages(None);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].session.as_deref(), Some(""));
        assert!(msgs[0].parent_header.is_none());
        assert_eq!(msgs[0].content_as::<Stream>().unwrap().text, "hi\n");
    }

    #[test]
    fn test_unique_msg_ids() {
        let a = Message::new(MsgType::Status, "s", Value::Null);
        let b = Message::new(MsgType::Status, "s", Value::Null);
        assert_ne!(a.header.msg_id, b.header.msg_id);
    }
}
