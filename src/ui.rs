//! Split-pane rendering (spec section 4.7).
//!
//! ktalk.c's curses layout is two scrolling windows stacked with a one-line
//! separator between them: the top `LINES/2 - 1` rows show what the peer has
//! said, the middle row is a plain horizontal rule drawn with curses'
//! `whline`, and everything below is the local composition line with a live
//! cursor. Laid out here with `ratatui::layout::Layout` instead of raw row
//! arithmetic, but the three regions and their relative sizing are the same;
//! the peer's name and identity instead surface in `receive_win`'s own
//! border title and in the startup banner line printed before the first
//! draw (see [`crate::banner`]).

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::app::{App, ReceivedLine};
use crate::theme::Theme;

/// The three pane heights spec section 4.7 pins for a screen of `rows` rows:
/// `receive_win` gets `floor(rows/2)`, `sep_win` exactly one, and `send_win`
/// whatever is left (`rows - floor(rows/2) - 1`). Kept as a free function so
/// a resize's row split can be asserted without rendering a real frame.
fn pane_heights(rows: u16) -> (u16, u16, u16) {
    let receive = rows / 2;
    let send = rows.saturating_sub(receive).saturating_sub(1);
    (receive, 1, send)
}

/// Split the screen per [`pane_heights`] — fixed row counts rather than
/// `Constraint::Min`/`Percentage`, so a resize always lands on the exact
/// split spec section 8 scenario 6 pins (40 rows -> 20/1/19).
pub fn draw(frame: &mut Frame, app: &App, theme: &Theme) {
    let area = frame.area();
    let (receive_rows, sep_rows, send_rows) = pane_heights(area.height);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(receive_rows),
            Constraint::Length(sep_rows),
            Constraint::Length(send_rows),
        ])
        .split(area);

    draw_receive_pane(frame, chunks[0], app, theme);
    draw_separator(frame, chunks[1], theme);
    draw_send_pane(frame, chunks[2], app, theme);
}

fn draw_receive_pane(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let lines: Vec<Line> = app
        .received
        .iter()
        .map(|line| match line {
            ReceivedLine::Peer(text) => Line::from(Span::styled(text.clone(), Style::default().fg(theme.receive_text))),
            ReceivedLine::System(text) => Line::from(Span::styled(
                format!("-- {text} --"),
                Style::default().fg(theme.text_dim).italic(),
            )),
            ReceivedLine::Banner(text) => Line::from(Span::styled(
                text.clone(),
                Style::default().fg(theme.banner_fg).bg(theme.banner_bg),
            )),
        })
        .collect();

    // Scroll so the most recent lines are visible once the pane fills up,
    // the way a curses scrolling window does automatically.
    let visible_rows = area.height.saturating_sub(2) as usize;
    let scroll = lines.len().saturating_sub(visible_rows) as u16;

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(format!(" {} ", app.peer_name)),
        )
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

/// `sep_win`: a one-row horizontal rule, the curses `whline` equivalent of
/// drawing a line of box-drawing characters across the full pane width.
fn draw_separator(frame: &mut Frame, area: Rect, theme: &Theme) {
    let rule = "─".repeat(area.width as usize);
    let separator = Paragraph::new(rule).style(Style::default().fg(theme.border));
    frame.render_widget(separator, area);
}

fn draw_send_pane(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let paragraph = Paragraph::new(app.composing.as_str())
        .style(Style::default().fg(theme.send_text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border_focused)),
        );
    frame.render_widget(paragraph, area);

    // Position the terminal's real cursor inside the send pane, offset by
    // the border and the composed-line scroll column.
    let cursor_x = area.x + 1 + app.cursor as u16;
    let cursor_y = area.y + 1;
    frame.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(2)), cursor_y));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_from_24_to_40_rows_matches_spec_scenario_6() {
        let (receive, sep, send) = pane_heights(40);
        assert_eq!(receive, 20);
        assert_eq!(sep, 1);
        assert_eq!(send, 19);
        assert_eq!(receive + sep + send, 40);
    }

    #[test]
    fn pane_heights_sum_to_the_screen_rows_for_any_real_terminal() {
        // `sep_win` always costs one row, so a screen shorter than that has
        // no sensible split; every real terminal is taller.
        for rows in [1u16, 2, 3, 24, 25, 80, 200] {
            let (receive, sep, send) = pane_heights(rows);
            assert_eq!(receive + sep + send, rows);
        }
    }
}
