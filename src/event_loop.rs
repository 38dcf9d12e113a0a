//! The cooperative, single-threaded event loop (spec section 4.8).
//!
//! ktalk.c's main loop is one `select()` call over three file descriptors:
//! the socket, stdin, and the self-pipe a signal handler writes to. Nothing
//! here ever spawns a worker task for the *chat* logic itself — the one
//! exception is [`spawn_frame_reader`] below, which exists purely to make
//! socket reads safe to select over (see its doc comment) and owns no state
//! any other part of the session touches, so it doesn't break the
//! single-authoritative-task model `AuthContext`/`App`/the terminal rely on.
//! `tokio::select!` plays the same role `select()` did, multiplexing the
//! frame channel, the terminal's `EventStream`, and the two signal streams
//! from [`crate::signal`] onto one task.

use std::io::Stdout;

use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::io::{AsyncBufReadExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::App;
use crate::error::KtalkError;
use crate::frame::{read_frame, write_frame, FrameEvent};
use crate::krb5::channel::SecureChannel;
use crate::signal::Signals;
use crate::theme::Theme;
use crate::ui;

/// How many completed frames the reader task may get ahead of the consumer
/// by before it blocks on `send` — plenty for a single chat peer, since the
/// consumer drains one frame per loop iteration.
const FRAME_CHANNEL_CAPACITY: usize = 8;

/// Read frames off `reader` on a dedicated task and forward each one through
/// an mpsc channel, so the event loop can select over `rx.recv()` instead of
/// `read_frame` itself.
///
/// `read_frame` accumulates a length prefix and payload across multiple
/// `.await` points on function-local state. `tokio::select!` drops a losing
/// branch's future outright, so selecting over `read_frame(&mut reader)`
/// directly would silently discard any bytes it had already pulled off the
/// socket the moment a keystroke, signal, or stdin line won the same
/// `select!` iteration — the next call would then misinterpret the rest of
/// that frame as a fresh length prefix, a protocol error that kills the
/// session under perfectly ordinary interactive use. Moving the read loop to
/// its own task sidesteps this: the task is never cancelled mid-read, and
/// the channel `recv()` the event loop actually selects over *is*
/// cancellation-safe (a dropped `recv()` future simply leaves its item in
/// the channel for the next call).
///
/// The task stops after forwarding the first `Closed` or `Err` — there is
/// nothing more to read once the session has ended one way or the other.
fn spawn_frame_reader(mut reader: ReadHalf<TcpStream>) -> mpsc::Receiver<Result<FrameEvent, KtalkError>> {
    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        loop {
            let event = read_frame(&mut reader).await;
            let is_terminal = !matches!(event, Ok(FrameEvent::Frame(_)));
            if tx.send(event).await.is_err() {
                return;
            }
            if is_terminal {
                return;
            }
        }
    });
    rx
}

/// Drive the chat session until the peer disconnects, the user quits, or an
/// unrecoverable error occurs.
///
/// `Signal` is a dedicated variant of [`KtalkError`] rather than a special
/// `Ok` return, so `main` can tell "the user asked to leave" (exit 0, spec
/// section 4.9's fixed farewell message) apart from every other ending.
pub async fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    mut channel: SecureChannel,
    mut app: App,
) -> Result<(), KtalkError> {
    let theme = Theme::default_palette();
    let mut signals = Signals::install()?;
    let mut terminal_events = EventStream::new();
    let mut frames = spawn_frame_reader(reader);

    terminal.draw(|frame| ui::draw(frame, &app, &theme))?;

    loop {
        tokio::select! {
            frame_event = frames.recv() => {
                match frame_event {
                    Some(Ok(FrameEvent::Frame(sealed))) => {
                        let plaintext = channel.open(&sealed)?;
                        app.push_peer_line(crate::app::decode_chat_line(&plaintext));
                    }
                    Some(Ok(FrameEvent::Closed)) => {
                        app.push_system_line(format!("{} has left", app.peer_name));
                        terminal.draw(|frame| ui::draw(frame, &app, &theme))?;
                        info!(peer = %app.peer_name, "peer closed the connection");
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(KtalkError::Protocol(
                            "frame reader task ended without reporting a close or error".into(),
                        ))
                    }
                }
            }

            Some(event) = terminal_events.next() => {
                let event = event.map_err(|e| KtalkError::Transport(format!("reading terminal events: {e}")))?;
                if let Some(line) = handle_terminal_event(&mut app, event)? {
                    let sealed = channel.seal(&crate::app::encode_chat_line(&line));
                    write_frame(&mut writer, &sealed).await?;
                }
                if app.should_quit {
                    return Err(KtalkError::Signal);
                }
            }

            _ = signals.interrupt.recv() => {
                return Err(KtalkError::Signal);
            }

            _ = signals.resize.recv() => {
                // Deferred redraw: the handler (here, this branch) does no
                // more than note that a redraw is due; the actual terminal
                // query and repaint happens in the ordinary draw call
                // below, just as ktalk.c defers repainting out of its
                // SIGWINCH handler to the next pass through its main loop.
                warn!("terminal resized");
            }
        }

        terminal.draw(|frame| ui::draw(frame, &app, &theme))?;
    }
}

/// The `-c` (line mode) counterpart of [`run`]: ktalk.c's `else { ... }`
/// branch that skips curses entirely, reading whole lines from stdin with
/// ordinary blocking I/O and printing received frames straight to stdout.
/// Still a single `tokio::select!`, just over stdin lines instead of raw
/// terminal events, and with no screen to redraw or restore on exit. Frame
/// reads go through [`spawn_frame_reader`] for the same cancellation-safety
/// reason as [`run`] — `stdin_lines.next_line()` is itself cancellation-safe,
/// but that doesn't help the socket side of the same `select!`.
pub async fn run_line_mode(
    reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    mut channel: SecureChannel,
    peer_name: &str,
    startup_banner: Option<String>,
) -> Result<(), KtalkError> {
    use std::io::Write;

    if let Some(banner) = startup_banner {
        print!("{banner}");
        std::io::stdout().flush().ok();
    }

    let mut signals = Signals::install()?;
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut frames = spawn_frame_reader(reader);

    loop {
        tokio::select! {
            frame_event = frames.recv() => {
                match frame_event {
                    Some(Ok(FrameEvent::Frame(sealed))) => {
                        let plaintext = channel.open(&sealed)?;
                        println!("{}", crate::app::decode_chat_line(&plaintext));
                        std::io::stdout().flush().ok();
                    }
                    Some(Ok(FrameEvent::Closed)) => {
                        println!("-- {peer_name} has left --");
                        info!(peer = peer_name, "peer closed the connection");
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(KtalkError::Protocol(
                            "frame reader task ended without reporting a close or error".into(),
                        ))
                    }
                }
            }

            line = stdin_lines.next_line() => {
                let line = line.map_err(|e| KtalkError::Transport(format!("reading stdin: {e}")))?;
                match line {
                    Some(text) => {
                        let sealed = channel.seal(&crate::app::encode_chat_line(&text));
                        write_frame(&mut writer, &sealed).await?;
                    }
                    None => return Ok(()),
                }
            }

            _ = signals.interrupt.recv() => {
                return Err(KtalkError::Signal);
            }

            _ = signals.resize.recv() => {}
        }
    }
}

/// Translate one terminal event into app-state mutation, returning a
/// completed line when Enter was pressed.
fn handle_terminal_event(app: &mut App, event: Event) -> Result<Option<String>, KtalkError> {
    let Event::Key(key) = event else {
        return Ok(None);
    };
    if key.kind != KeyEventKind::Press {
        return Ok(None);
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.should_quit = true;
            Ok(None)
        }
        KeyCode::Enter => {
            let line = app.take_composed_line();
            if line.is_empty() {
                Ok(None)
            } else {
                Ok(Some(line))
            }
        }
        KeyCode::Backspace => {
            app.backspace();
            Ok(None)
        }
        KeyCode::Left => {
            app.move_cursor_left();
            Ok(None)
        }
        KeyCode::Right => {
            app.move_cursor_right();
            Ok(None)
        }
        KeyCode::Char(c) => {
            app.insert_char(c);
            Ok(None)
        }
        _ => Ok(None),
    }
}
