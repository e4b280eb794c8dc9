//! Protocol violations
//!
//! The host UI is expected to respect these rules; when it does not, the
//! bridge reports which rule was broken instead of misbehaving.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// `input_reply` arrived with no pending input request
    #[error("input_reply received but no input request is pending")]
    UnexpectedInputReply,

    /// A second `input_request` before the first was answered
    #[error("input_request received while another input request is pending")]
    InputAlreadyPending,

    /// A request reached the interpreter while a turn was still open
    #[error("request {incoming} dispatched while turn for {open} is still open")]
    TurnAlreadyOpen { open: String, incoming: String },

    /// The turn's tracker went away before an idle status was seen
    #[error("execution turn abandoned before completion")]
    TurnAbandoned,

    /// The input request's waiter went away before a reply was delivered
    #[error("input request abandoned before a reply arrived")]
    InputAbandoned,

    /// Operation attempted before the kernel became ready
    #[error("kernel is not ready")]
    NotReady,

    /// Operation attempted after dispose
    #[error("kernel has been disposed")]
    Disposed,

    /// Message could not be decoded
    #[error("malformed {msg_type} message: {reason}")]
    Malformed { msg_type: String, reason: String },
}
