//! `ktalk` — a two-party, Kerberos user-to-user authenticated encrypted
//! terminal chat.
//!
//! ktalk.c dispatches on `argc` alone: two positional arguments means
//! "listen for a connection from this principal", four means "connect to
//! this principal at this host and port", with an optional leading
//! `-e <messenger>` pair shifted off before that count is taken. There is no
//! subcommand keyword anywhere in the invocation — `ktalk alice` and
//! `ktalk alice dialup 4115` are both complete, self-describing command
//! lines. `Cli` below keeps that shape (`-d`/`-c`/`-e` flags plus a bare
//! positional tail) rather than a clap subcommand enum, and [`Cli::role`]
//! does the same argument-count dispatch the C source's `if (argc == 2) ...
//! else if (argc == 4)` does.

mod address;
mod app;
mod banner;
mod error;
mod event_loop;
mod frame;
mod invite;
mod krb5;
mod signal;
mod theme;
mod transport;
mod ui;

use std::path::PathBuf;

use clap::Parser;
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::error::{Context, KtalkError};
use crate::krb5::{ccache, channel::SecureChannel, config::Krb5Config, handshake, kdc, Principal};

#[derive(Debug, Parser)]
#[command(
    name = "ktalk",
    about = "Two-party, Kerberos user-to-user authenticated encrypted chat"
)]
struct Cli {
    /// Enable debug-level tracing to stderr.
    #[arg(short = 'd')]
    debug: bool,

    /// Disable curses mode; read stdin line by line instead.
    #[arg(short = 'c')]
    line_mode: bool,

    /// External messenger to invoke instead of publishing a notification
    /// (listener role only).
    #[arg(short = 'e', value_name = "MESSENGER")]
    messenger: Option<PathBuf>,

    /// `<peer_principal>` (listener) or `<peer_principal> <host> <port>`
    /// (connector) — dispatched by count, see [`Cli::role`].
    #[arg(value_name = "ARGS", num_args = 1..=3)]
    args: Vec<String>,
}

/// Which half of the protocol this invocation plays, resolved from the
/// positional argument count the same way ktalk.c's `mode` local is.
enum Role {
    Listen { peer_principal: String },
    Connect {
        peer_principal: String,
        host: String,
        port: u16,
    },
}

impl Cli {
    fn role(&self) -> Result<Role, KtalkError> {
        match self.args.as_slice() {
            [peer] => Ok(Role::Listen {
                peer_principal: peer.clone(),
            }),
            [peer, host, port] => {
                if self.messenger.is_some() {
                    return Err(KtalkError::Usage(
                        "-e is only valid with the listener's single-argument form".into(),
                    ));
                }
                let port = port
                    .parse()
                    .map_err(|_| KtalkError::Usage(format!("invalid port {port:?}")))?;
                Ok(Role::Connect {
                    peer_principal: peer.clone(),
                    host: host.clone(),
                    port,
                })
            }
            _ => Err(KtalkError::Usage(
                "ktalk [-d] [-c] [-e <messenger>] <peer_principal>\n       \
                 ktalk [-d] [-c] <peer_principal> <host> <port>"
                    .into(),
            )),
        }
    }
}

/// Prefix a failed step's error with the stage it happened in, the Rust
/// rendering of spec section 7's `"<context>: <diagnostic>"` stderr line —
/// `KtalkError::Signal` passes through untouched since it is never printed
/// that way.
fn staged<T>(context: &'static str, result: Result<T, KtalkError>) -> Result<T, KtalkError> {
    result.map_err(|e| match e {
        KtalkError::Signal => KtalkError::Signal,
        KtalkError::Usage(m) => KtalkError::Usage(format!("{}: {m}", Context(context))),
        KtalkError::Transport(m) => KtalkError::Transport(format!("{}: {m}", Context(context))),
        KtalkError::Protocol(m) => KtalkError::Protocol(format!("{}: {m}", Context(context))),
        KtalkError::Authentication(m) => {
            KtalkError::Authentication(format!("{}: {m}", Context(context)))
        }
        KtalkError::Session(m) => KtalkError::Session(format!("{}: {m}", Context(context))),
    })
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) if e.is_interrupt() => {
            println!("exiting due to interrupt");
            0
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), KtalkError> {
    let role = cli.role()?;
    let line_mode = cli.line_mode;

    // SAFETY: called once, before any other task is spawned, matching
    // ktalk.c's own `putenv` immediately after mode dispatch and before any
    // krb5 call.
    unsafe {
        std::env::set_var("KRB5_KTNAME", "/dev/null");
    }

    let krb5_config = staged("reading krb5 configuration", Krb5Config::load_default())?;
    let local_realm = krb5_config.default_realm.clone().ok_or_else(|| {
        KtalkError::Authentication("no default_realm configured in krb5.conf".into())
    })?;

    let ccache_path = ccache::default_ccache_path();
    let credentials = staged(
        "loading credential cache",
        ccache::load(&ccache_path, &local_realm),
    )?;
    debug!(client = %credentials.client, "loaded credentials");

    match role {
        Role::Listen { peer_principal } => {
            let peer_principal = Principal::parse(&peer_principal, &local_realm)?;
            run_listener(
                credentials,
                &local_realm,
                peer_principal,
                cli.messenger.as_deref(),
                line_mode,
            )
            .await
        }
        Role::Connect {
            peer_principal,
            host,
            port,
        } => {
            let peer_principal = Principal::parse(&peer_principal, &local_realm)?;
            run_connector(
                credentials,
                &krb5_config,
                &local_realm,
                peer_principal,
                &host,
                port,
                line_mode,
            )
            .await
        }
    }
}

async fn run_listener(
    credentials: ccache::Credentials,
    local_realm: &str,
    expected_peer: Principal,
    messenger: Option<&std::path::Path>,
    line_mode: bool,
) -> Result<(), KtalkError> {
    let (listener, port) = staged(
        "binding listener socket",
        transport::listen_with_port_probe(transport::FIRST_PORT),
    )?;
    println!("waiting for connection on port {port} .... ");

    let local_host = invite::local_host_label();
    if let Err(e) = invite::invite(messenger, &expected_peer, &credentials.client, &local_host, port)
    {
        warn!(error = %e, "could not send connection invitation; the peer can still dial in directly");
    }

    let stream = staged("accepting connection", transport::accept(&listener).await)?;
    println!("connection established.");
    drop(listener);

    let endpoint = address::Endpoint::from_socket(&stream)?;
    debug!(local = %endpoint.local, peer = %endpoint.peer, "connection endpoints");
    let local_addr = address::to_inet_addr(endpoint.local)?;
    let peer_addr = address::to_inet_addr(endpoint.peer)?;

    let tgt_entry = ccache::find_own_tgt(&credentials.ccache, local_realm)?;
    let ticket = kdc::UserToUserTicket::from_own_tgt(tgt_entry);

    let (mut reader, mut writer) = tokio::io::split(stream);

    frame::write_frame(&mut writer, &ticket.ticket_bytes).await?;

    let ap_req_bytes = match frame::read_frame(&mut reader).await? {
        frame::FrameEvent::Frame(bytes) => bytes,
        frame::FrameEvent::Closed => {
            return Err(KtalkError::Protocol(
                "peer closed the connection before sending an AP-REQ".into(),
            ))
        }
    };
    let authenticated_peer = staged(
        "verifying peer AP-REQ",
        handshake::verify_ap_req(&ap_req_bytes, &ticket, local_realm),
    )?;
    info!(peer = %authenticated_peer, "peer authenticated");

    let startup_banner = banner::StartupBanner::compose(authenticated_peer.clone(), &expected_peer);

    let channel = SecureChannel::new(
        ticket.session_key_type,
        ticket.session_key,
        handshake::INITIAL_SEQUENCE_NUMBER,
        handshake::INITIAL_SEQUENCE_NUMBER,
        local_addr,
        peer_addr,
    )?;

    drive_session(
        reader,
        writer,
        channel,
        authenticated_peer.to_string(),
        Some(startup_banner.render()),
        line_mode,
    )
    .await
}

async fn run_connector(
    credentials: ccache::Credentials,
    krb5_config: &Krb5Config,
    local_realm: &str,
    peer_principal: Principal,
    host: &str,
    port: u16,
    line_mode: bool,
) -> Result<(), KtalkError> {
    let addr = staged(
        "resolving peer host",
        transport::resolve_first(host, port).await,
    )?;
    let stream = staged("connecting to peer", transport::connect(addr).await)?;
    println!("connected.");

    let endpoint = address::Endpoint::from_socket(&stream)?;
    debug!(local = %endpoint.local, peer = %endpoint.peer, "connection endpoints");
    let local_addr = address::to_inet_addr(endpoint.local)?;
    let peer_addr = address::to_inet_addr(endpoint.peer)?;

    let (mut reader, mut writer) = tokio::io::split(stream);

    let peer_ticket_bytes = match frame::read_frame(&mut reader).await? {
        frame::FrameEvent::Frame(bytes) => bytes,
        frame::FrameEvent::Closed => {
            return Err(KtalkError::Protocol(
                "peer closed the connection before sending its ticket".into(),
            ))
        }
    };

    let tgt_entry = ccache::find_own_tgt(&credentials.ccache, local_realm)?;

    let kdc_addr = krb5_config
        .kdcs_for(&peer_principal.realm)
        .first()
        .ok_or_else(|| {
            KtalkError::Authentication(format!(
                "no kdc configured for realm {}",
                peer_principal.realm
            ))
        })?;

    let ticket = staged(
        "requesting user-to-user ticket",
        kdc::request_user_to_user_ticket(
            kdc_addr,
            &credentials.client,
            &peer_principal,
            tgt_entry,
            &peer_ticket_bytes,
        )
        .await,
    )?;

    let ap_req_bytes = handshake::build_ap_req(&ticket, &credentials.client)?;
    frame::write_frame(&mut writer, &ap_req_bytes).await?;

    let channel = SecureChannel::new(
        ticket.session_key_type,
        ticket.session_key,
        handshake::INITIAL_SEQUENCE_NUMBER,
        handshake::INITIAL_SEQUENCE_NUMBER,
        local_addr,
        peer_addr,
    )?;

    // The connector never learns the listener's identity back over the
    // wire (no AP-REP is exchanged, see `krb5::handshake`), so unlike the
    // listener it has no startup banner to show.
    drive_session(reader, writer, channel, peer_principal.to_string(), None, line_mode).await
}

/// Run either the curses event loop or the line-mode loop, owning terminal
/// setup/teardown for the curses case.
async fn drive_session(
    reader: tokio::io::ReadHalf<tokio::net::TcpStream>,
    writer: tokio::io::WriteHalf<tokio::net::TcpStream>,
    channel: SecureChannel,
    peer_name: String,
    startup_banner: Option<String>,
    line_mode: bool,
) -> Result<(), KtalkError> {
    if line_mode {
        return event_loop::run_line_mode(reader, writer, channel, &peer_name, startup_banner).await;
    }

    enable_raw_mode()?;
    execute!(std::io::stdout(), EnterAlternateScreen)?;
    let mut terminal = ratatui::Terminal::new(ratatui::backend::CrosstermBackend::new(
        std::io::stdout(),
    ))?;

    let mut app = App::new(peer_name);
    if let Some(banner) = startup_banner {
        app.push_banner(banner);
    }

    let result = event_loop::run(&mut terminal, reader, writer, channel, app).await;

    disable_raw_mode()?;
    execute!(std::io::stdout(), LeaveAlternateScreen)?;

    result
}
