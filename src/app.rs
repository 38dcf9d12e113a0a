//! Chat session state (spec section 4.7/4.8).
//!
//! ktalk.c keeps this state as a handful of globals: the receive window's
//! scrollback, the send window's in-progress line and cursor column, and a
//! `quit` flag checked after every `select()` wakeup. `App` is that same
//! shape gathered into one struct so [`crate::ui`] can render it
//! immutably and [`crate::event_loop`] can mutate it from one place.

use crate::frame::MAX_FRAME_LEN;

/// One line that has appeared in the receive pane: something the peer sent,
/// a local system notice (connection established, peer left), or the
/// one-time startup banner (spec section 4.7: rendered in a visually
/// distinct, reverse-video attribute).
#[derive(Debug, Clone)]
pub enum ReceivedLine {
    Peer(String),
    System(String),
    Banner(String),
}

/// Encode a composed line for the wire (spec section 3's `ChatLine`): the
/// payload is always the raw line followed by a terminating NUL byte, which
/// `open` must preserve so the receiver could treat it as a C string.
/// ktalk.c's curses path already has the typed CR/LF sitting in the
/// composition buffer when Enter completes it; crossterm's `KeyCode::Enter`
/// carries no character of its own, so the newline is appended here instead.
pub fn encode_chat_line(line: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(line.len() + 2);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');
    bytes.push(0);
    bytes
}

/// Strip the wire NUL terminator (and any trailing CR/LF) for display.
pub fn decode_chat_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

pub struct App {
    pub peer_name: String,
    pub received: Vec<ReceivedLine>,
    pub composing: String,
    pub cursor: usize,
    pub should_quit: bool,
}

impl App {
    pub fn new(peer_name: String) -> Self {
        App {
            peer_name,
            received: Vec::new(),
            composing: String::new(),
            cursor: 0,
            should_quit: false,
        }
    }

    pub fn push_peer_line(&mut self, line: String) {
        self.received.push(ReceivedLine::Peer(line));
    }

    pub fn push_system_line(&mut self, line: String) {
        self.received.push(ReceivedLine::System(line));
    }

    /// Split a (possibly multi-line) startup banner into one
    /// `ReceivedLine::Banner` per line, so [`crate::ui`] can render each row
    /// in the receive pane the same way it renders any other line.
    pub fn push_banner(&mut self, banner: String) {
        for line in banner.trim_end_matches('\n').split('\n') {
            self.received.push(ReceivedLine::Banner(line.to_string()));
        }
    }

    /// Insert `c` at the cursor, refusing once the composed line (including
    /// the newline and NUL terminator [`encode_chat_line`] adds on send)
    /// would exceed the frame cap.
    pub fn insert_char(&mut self, c: char) {
        if self.composing.len() + c.len_utf8() + 2 > MAX_FRAME_LEN {
            return;
        }
        let byte_idx = self.char_to_byte_index(self.cursor);
        self.composing.insert(byte_idx, c);
        self.cursor += 1;
    }

    /// Delete the character before the cursor, curses' usual backspace
    /// behavior.
    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let byte_idx = self.char_to_byte_index(self.cursor - 1);
        self.composing.remove(byte_idx);
        self.cursor -= 1;
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        if self.cursor < self.composing.chars().count() {
            self.cursor += 1;
        }
    }

    /// Take the composed line for sending, clearing the buffer and
    /// resetting the cursor to column zero the way pressing Enter does in
    /// ktalk.c.
    pub fn take_composed_line(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.composing)
    }

    fn char_to_byte_index(&self, char_idx: usize) -> usize {
        self.composing
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.composing.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_and_deletes_at_cursor() {
        let mut app = App::new("bob".into());
        app.insert_char('h');
        app.insert_char('i');
        assert_eq!(app.composing, "hi");
        app.move_cursor_left();
        app.insert_char('a');
        assert_eq!(app.composing, "hai");
        app.backspace();
        assert_eq!(app.composing, "hi");
    }

    #[test]
    fn refuses_to_grow_past_the_frame_cap() {
        let mut app = App::new("bob".into());
        app.composing = "x".repeat(MAX_FRAME_LEN - 1);
        app.cursor = app.composing.chars().count();
        app.insert_char('y');
        assert_eq!(app.composing.len(), MAX_FRAME_LEN - 1);
    }

    #[test]
    fn take_composed_line_clears_buffer_and_cursor() {
        let mut app = App::new("bob".into());
        app.insert_char('h');
        app.insert_char('i');
        let taken = app.take_composed_line();
        assert_eq!(taken, "hi");
        assert_eq!(app.composing, "");
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn cursor_right_does_not_overrun_the_line() {
        let mut app = App::new("bob".into());
        app.insert_char('a');
        app.move_cursor_right();
        assert_eq!(app.cursor, 1);
    }

    #[test]
    fn encode_appends_newline_and_nul() {
        let bytes = encode_chat_line("hello");
        assert_eq!(bytes, b"hello\n\0");
    }

    #[test]
    fn decode_strips_nul_and_line_ending() {
        assert_eq!(decode_chat_line(b"hello\n\0"), "hello");
        assert_eq!(decode_chat_line(b"hello\r\n\0"), "hello");
    }

    #[test]
    fn decode_tolerates_a_missing_nul() {
        assert_eq!(decode_chat_line(b"hello\n"), "hello");
    }

    #[test]
    fn push_banner_splits_into_one_line_per_row() {
        let mut app = App::new("bob".into());
        app.push_banner("Foreign party authenticates as alice@TEST\n\nWARNING!\ncaution\n".into());
        assert_eq!(app.received.len(), 4);
        match &app.received[0] {
            ReceivedLine::Banner(text) => assert_eq!(text, "Foreign party authenticates as alice@TEST"),
            other => panic!("expected a banner line, got {other:?}"),
        }
        match &app.received[1] {
            ReceivedLine::Banner(text) => assert_eq!(text, ""),
            other => panic!("expected a blank banner line, got {other:?}"),
        }
    }
}
