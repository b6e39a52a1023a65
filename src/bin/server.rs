use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use jeux::logger::Logger;
use jeux::service::run_connection;
use jeux::session::ClientSession;
use jeux::AppState;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "jeux",
    version,
    about = "Matchmaking and game server for two-player tic-tac-toe",
    long_about = "Accepts TCP clients, authenticates them by name, relays \
                  invitations and moves, and maintains per-player Elo \
                  ratings. Verbosity is controlled by JEUX_LOG (warn, info, \
                  verbose, debug, trace), not a flag; see src/service.rs for \
                  the wire protocol."
)]
struct Args {
    /// TCP port to listen on
    #[arg(short = 'p', long)]
    port: u16,
}

// ── DISPLAY EVENTS ────────────────────────────────────────────────────────────

enum Event<'a> {
    Listening { port: u16 },
    Accepted { addr: SocketAddr },
    AcceptError { reason: String },
    RegistryFull { addr: SocketAddr },
    ShuttingDown,
    Drained,
    Quit { reason: &'a str },
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Listening { port } => write!(f, "Server listening on port {port}"),
            Event::Accepted { addr } => write!(f, "Accepted connection from {addr}"),
            Event::AcceptError { reason } => write!(f, "Accept error: {reason}"),
            Event::RegistryFull { addr } => {
                write!(f, "Client registry full, dropping connection from {addr}")
            }
            Event::ShuttingDown => write!(f, "SIGHUP received, shutting down"),
            Event::Drained => write!(f, "All connections drained, exiting"),
            Event::Quit { reason } => write!(f, "Exiting: {reason}"),
        }
    }
}

async fn handle_connection(state: Arc<AppState>, stream: TcpStream, addr: SocketAddr) {
    let (mut read_half, write_half) = stream.into_split();
    let session = ClientSession::new(write_half);

    if state.clients.register(Arc::clone(&session)).is_err() {
        state.log.warn(Event::RegistryFull { addr });
        session.request_shutdown();
        return;
    }

    state.log.verbose(Event::Accepted { addr });
    run_connection(Arc::clone(&state), &mut read_half, session).await;
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    let log = Logger::from_env();
    let state = AppState::new(log);

    let listener = match TcpListener::bind(("0.0.0.0", args.port)).await {
        Ok(l) => l,
        Err(e) => {
            state.log.warn(Event::Quit {
                reason: &e.to_string(),
            });
            return std::process::ExitCode::FAILURE;
        }
    };
    state.log.info(Event::Listening { port: args.port });

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            state.log.warn(Event::Quit {
                reason: &format!("failed to install SIGHUP handler: {e}"),
            });
            return std::process::ExitCode::FAILURE;
        }
    };

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            handle_connection(state, stream, addr).await;
                        });
                    }
                    Err(e) => {
                        state.log.warn(Event::AcceptError { reason: e.to_string() });
                    }
                }
            }
            _ = hangup.recv() => {
                state.log.info(Event::ShuttingDown);
                break;
            }
        }
    }

    state.clients.shutdown_all();
    state.clients.wait_for_empty().await;
    state.players.finalize(&state.clients);
    state.log.info(Event::Drained);

    std::process::ExitCode::SUCCESS
}
