//! Per-connection dispatch loop: reads packets, calls into `ClientSession`,
//! replies ACK/NACK, and drives logout on EOF.
//!
//! Grounded on `examples/original_source/src/server.c`'s
//! `jeux_client_service`, whose dispatch table is reproduced in the match
//! below, and on the teacher's `bin/server.rs` `Event` logging pattern.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ProtoError;
use crate::game::Role;
use crate::protocol::{decode_from, Packet, PacketType};
use crate::session::ClientSession;
use crate::AppState;

enum Event<'a> {
    LoggedIn { name: &'a str },
    LoginRejected { name: &'a str },
    Invited { from: &'a str, to: &'a str },
    InvitationClosed { id: u8, verb: &'static str },
    GameEnded { winner: Option<Role> },
    UnknownPacketType { kind: u8 },
    Disconnected,
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::LoggedIn { name } => write!(f, "{name} logged in"),
            Event::LoginRejected { name } => write!(f, "login rejected: {name} already in use"),
            Event::Invited { from, to } => write!(f, "{from} invited {to}"),
            Event::InvitationClosed { id, verb } => write!(f, "invitation {id} {verb}"),
            Event::GameEnded { winner } => write!(f, "game ended, winner={winner:?}"),
            Event::UnknownPacketType { kind } => write!(f, "unknown packet type 0x{kind:02x}"),
            Event::Disconnected => write!(f, "connection closed"),
        }
    }
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(i) => &bytes[..i],
        None => bytes,
    }
}

fn payload_text(pkt: &Packet) -> String {
    String::from_utf8_lossy(trim_nul(&pkt.payload)).into_owned()
}

/// Runs the per-connection service loop to completion: consumes packets
/// from `reader` until EOF, dispatching each onto `session`. `session` must
/// already be registered with `state.clients`.
pub async fn run_connection<R>(state: Arc<AppState>, reader: &mut R, session: Arc<ClientSession>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let pkt = match decode_from(reader).await {
            Ok(pkt) => pkt,
            Err(_) => {
                state.log.debug(Event::Disconnected);
                break;
            }
        };

        match dispatch(&state, &session, &pkt).await {
            Ok(DispatchOutcome::Ack(role, payload)) => {
                let _ = session.send_ack(pkt.header.id, role, payload);
            }
            Ok(DispatchOutcome::NoReply) => {}
            Err(e) => {
                state.log.verbose(format!("request failed: {e}"));
                let _ = session.send_nack(pkt.header.id);
            }
        }
    }

    if session.logged_in_player().await.is_some() {
        let _ = session.logout().await;
    }
    state.clients.unregister(&session);
}

enum DispatchOutcome {
    Ack(u8, Vec<u8>),
    NoReply,
}

async fn dispatch(
    state: &Arc<AppState>,
    session: &Arc<ClientSession>,
    pkt: &Packet,
) -> Result<DispatchOutcome, ProtoError> {
    let Some(kind) = pkt.kind() else {
        state.log.warn(Event::UnknownPacketType {
            kind: pkt.header.kind,
        });
        return Err(ProtoError::protocol("unknown packet type"));
    };

    // Every action but LOGIN requires an established identity.
    if !matches!(kind, PacketType::Login) && session.logged_in_player().await.is_none() {
        return Err(ProtoError::protocol("not logged in"));
    }

    match kind {
        PacketType::Login => {
            let name = payload_text(pkt);
            if state.clients.lookup(&name).await.is_some() {
                state.log.info(Event::LoginRejected { name: &name });
                return Err(ProtoError::invalid("name already in use"));
            }
            let player = state.players.register(&name);
            session.login(player).await?;
            state.log.info(Event::LoggedIn { name: &name });
            Ok(DispatchOutcome::Ack(0, Vec::new()))
        }

        PacketType::Users => {
            let players = state.clients.all_players().await;
            let mut text = String::new();
            for p in &players {
                text.push_str(p.name());
                text.push('\t');
                text.push_str(&p.rating().to_string());
                text.push('\n');
            }
            text.pop(); // no trailing newline
            Ok(DispatchOutcome::Ack(0, text.into_bytes()))
        }

        PacketType::Invite => {
            let name = payload_text(pkt);
            let (source_role, target_role) = match pkt.header.role {
                1 => (Role::Second, Role::First),
                2 => (Role::First, Role::Second),
                _ => return Err(ProtoError::invalid("invite role must be 1 or 2")),
            };
            let target = state
                .clients
                .lookup(&name)
                .await
                .ok_or_else(|| ProtoError::invalid("no such user"))?;
            let source_id = session
                .make_invitation(Arc::clone(&target), source_role, target_role)
                .await?;
            let my_name = session
                .logged_in_player()
                .await
                .map(|p| p.name().to_string())
                .unwrap_or_default();
            state.log.info(Event::Invited {
                from: &my_name,
                to: &name,
            });
            Ok(DispatchOutcome::Ack(0, vec![source_id]))
        }

        PacketType::Revoke => {
            session.revoke(pkt.header.id).await?;
            state.log.verbose(Event::InvitationClosed {
                id: pkt.header.id,
                verb: "revoked",
            });
            Ok(DispatchOutcome::Ack(0, Vec::new()))
        }

        PacketType::Decline => {
            session.decline(pkt.header.id).await?;
            state.log.verbose(Event::InvitationClosed {
                id: pkt.header.id,
                verb: "declined",
            });
            Ok(DispatchOutcome::Ack(0, Vec::new()))
        }

        PacketType::Accept => {
            let board = session.accept(pkt.header.id).await?;
            Ok(DispatchOutcome::Ack(0, board.into_bytes()))
        }

        PacketType::Move => {
            let move_str = payload_text(pkt);
            session.make_move(pkt.header.id, &move_str).await?;
            Ok(DispatchOutcome::Ack(0, Vec::new()))
        }

        PacketType::Resign => {
            session.resign_game(pkt.header.id).await?;
            state.log.verbose(Event::InvitationClosed {
                id: pkt.header.id,
                verb: "resigned",
            });
            Ok(DispatchOutcome::Ack(0, Vec::new()))
        }

        _ => Err(ProtoError::protocol("client may not send a server-to-client packet type")),
    }
}
