//! Color theme for the split-pane terminal UI (spec section 4.7).
//!
//! ktalk.c draws with plain curses attributes — `A_REVERSE` for the
//! separator banner, default terminal colors for both message panes — not a
//! themeable palette. This keeps the teacher's `Theme` struct shape (one
//! named `Color` slot per semantic role, looked up everywhere rather than
//! scattering `Color::*` literals through the rendering code) but trims it
//! down to the handful of roles ktalk's two-pane layout actually has.

use ratatui::style::Color;

/// A complete color palette for the split-pane chat UI.
pub struct Theme {
    pub border: Color,
    pub border_focused: Color,

    pub receive_text: Color,
    pub send_text: Color,
    pub text_dim: Color,

    pub banner_fg: Color,
    pub banner_bg: Color,

    pub error: Color,
}

impl Theme {
    /// The one palette ktalk ships: default foreground on the terminal's
    /// own background, matching curses' unthemed look.
    pub fn default_palette() -> Self {
        Self {
            border: Color::DarkGray,
            border_focused: Color::White,

            receive_text: Color::Reset,
            send_text: Color::Reset,
            text_dim: Color::DarkGray,

            // Matches curses' A_REVERSE: foreground and background swapped
            // relative to normal text.
            banner_fg: Color::Black,
            banner_bg: Color::White,

            error: Color::Red,
        }
    }
}
