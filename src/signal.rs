//! Signal handling (spec section 4.9).
//!
//! ktalk.c installs handlers for `SIGINT` (tear down the connection and
//! restore the terminal before exiting) and `SIGWINCH` (note that the
//! terminal was resized and redraw on the next idle moment, rather than
//! redrawing from inside the handler itself — curses explicitly forbids
//! calling most of its own API from a signal handler). `tokio::signal::unix`
//! gives each of those an async `Stream` instead of a handler function, so
//! both become ordinary branches in [`crate::event_loop`]'s `select!`
//! rather than asynchronous-signal-unsafe code.

use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::error::KtalkError;

/// The two signal streams the event loop selects over.
pub struct Signals {
    pub interrupt: Signal,
    pub resize: Signal,
}

impl Signals {
    pub fn install() -> Result<Self, KtalkError> {
        let interrupt = signal(SignalKind::interrupt())
            .map_err(|e| KtalkError::Transport(format!("installing SIGINT handler: {e}")))?;
        let resize = signal(SignalKind::window_change())
            .map_err(|e| KtalkError::Transport(format!("installing SIGWINCH handler: {e}")))?;
        Ok(Signals { interrupt, resize })
    }
}
