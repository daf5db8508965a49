//! Per-connection session state.
//!
//! A session walks `AwaitHeader → AwaitBody → Decode → Dispatch →
//! BuildResponse → Send → Cleanup → Closed`. Failures jump ahead: a request
//! that cannot be decoded goes straight to `BuildResponse`, a dead stream
//! goes straight to `Cleanup`. Every session ends in `Closed` exactly once.

use std::fmt;
use std::net::SocketAddr;

use tracing::trace;

use mediaferry_protocol::{ProtocolError, Status};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitHeader,
    AwaitBody,
    Decode,
    Dispatch,
    BuildResponse,
    Send,
    Cleanup,
    Closed,
}

impl SessionState {
    /// Snake-case name, as logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitHeader => "await_header",
            Self::AwaitBody => "await_body",
            Self::Decode => "decode",
            Self::Dispatch => "dispatch",
            Self::BuildResponse => "build_response",
            Self::Send => "send",
            Self::Cleanup => "cleanup",
            Self::Closed => "closed",
        }
    }

    /// Returns true if `next` may follow `self`.
    pub fn can_enter(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (AwaitHeader, AwaitBody | BuildResponse | Cleanup)
                | (AwaitBody, Decode | Cleanup)
                | (Decode, Dispatch | BuildResponse)
                | (Dispatch, BuildResponse)
                | (BuildResponse, Send)
                | (Send, Cleanup)
                | (Cleanup, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle record of one connection.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    trail: Vec<SessionState>,
    status: Option<Status>,
    error: Option<ProtocolError>,
}

impl Session {
    /// Starts a session in `AwaitHeader`.
    pub fn new(peer: SocketAddr) -> Self {
        trace!(peer = %peer, state = %SessionState::AwaitHeader, "Session started");
        Self {
            peer,
            trail: vec![SessionState::AwaitHeader],
            status: None,
            error: None,
        }
    }

    /// Moves to `next`.
    pub fn enter(&mut self, next: SessionState) {
        let from = self.state();
        debug_assert!(from.can_enter(next), "invalid session transition {from} -> {next}");
        trace!(peer = %self.peer, from = %from, state = %next, "Session transition");
        self.trail.push(next);
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.trail
            .last()
            .copied()
            .unwrap_or(SessionState::AwaitHeader)
    }

    /// Every state visited, in order.
    pub fn trail(&self) -> &[SessionState] {
        &self.trail
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns true once the session reached `Closed`.
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Records the status of the response that was sent.
    pub fn responded(&mut self, status: Status) {
        self.status = Some(status);
    }

    /// Records the transport error that ended the exchange.
    pub fn abort(&mut self, error: ProtocolError) {
        self.error = Some(error);
    }

    /// Status of the response sent, if one was.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Transport error that ended the exchange, if any.
    pub fn error(&self) -> Option<&ProtocolError> {
        self.error.as_ref()
    }

    /// Consumes the session, yielding its transport error, if any.
    pub fn into_error(self) -> Option<ProtocolError> {
        self.error
    }
}
