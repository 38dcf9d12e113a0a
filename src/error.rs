//! The typed error hierarchy used by every module, including `main`.
//!
//! Every fallible operation in this crate returns `Result<T, KtalkError>` so
//! the event loop can tell the one recoverable condition — a signal-
//! interrupted `select!` — apart from every other error, which is always
//! fatal. `main` formats the final `"<context>: <diagnostic>"` line itself
//! (see [`Context`] and `main::staged`) rather than collapsing into a
//! separate boundary error type; unlike the teacher, nothing here ever
//! needs to unify errors from unrelated crates under one umbrella type.
//!
//! The variants mirror spec section 7's error kinds one-to-one: Usage,
//! Transport, Protocol, Authentication, Session, Signal.

use std::fmt;

/// A single error produced anywhere in the handshake, channel, transport, or
/// UI layers.
#[derive(Debug, thiserror::Error)]
pub enum KtalkError {
    /// Malformed command line.
    #[error("usage: {0}")]
    Usage(String),

    /// Socket/DNS/bind/connect failure.
    #[error("{0}")]
    Transport(String),

    /// Frame parse failure, unexpected EOF, or a length outside 1..=1024.
    #[error("{0}")]
    Protocol(String),

    /// Credential retrieval, principal parsing, key establishment, or
    /// AP-REQ construction/verification failure.
    #[error("{0}")]
    Authentication(String),

    /// `seal`/`open` failure once the session is established.
    #[error("{0}")]
    Session(String),

    /// The user pressed the interrupt key. Not printed with the `<context>:`
    /// prefix the other variants get — `main` recognizes this variant and
    /// exits 0 with the fixed message from spec section 4.9.
    #[error("exiting due to interrupt")]
    Signal,
}

impl KtalkError {
    /// True for the one error that is not a failure: the user asked to quit.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, KtalkError::Signal)
    }
}

impl From<std::io::Error> for KtalkError {
    fn from(e: std::io::Error) -> Self {
        KtalkError::Transport(e.to_string())
    }
}

/// A named step in the pipeline an error is attributed to, used to format
/// `main`'s `"<context>: <diagnostic>"` stderr line (spec section 7).
pub struct Context(pub &'static str);

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
