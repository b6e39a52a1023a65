//! Per-connection state: identity, invitation list, outbound packet actor.
//!
//! Grounded on `examples/original_source/src/client.c`, which this module's
//! operations are a near line-for-line port of (see DESIGN.md). The raw
//! write-mutex the original wraps around a shared file descriptor is
//! replaced here by an `mpsc`-fed writer task that owns the TCP write half
//! — see SPEC_FULL.md §4.6.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::error::{ProtoError, ProtoResult};
use crate::game::{self, Role};
use crate::invitation::{Invitation, InvitationState};
use crate::player::{rating_update, GameResult, Player};
use crate::protocol::{encode_into, Packet, PacketType};

struct SessionState {
    player: Option<Arc<Player>>,
    invitations: Vec<(u8, Arc<Invitation>)>,
    next_id: u8,
}

impl SessionState {
    fn new() -> Self {
        Self {
            player: None,
            invitations: Vec::new(),
            next_id: 0,
        }
    }
}

pub struct ClientSession {
    outbound: mpsc::UnboundedSender<Packet>,
    shutdown: Arc<Notify>,
    state: Mutex<SessionState>,
}

fn is_same(a: &ClientSession, b: &Arc<ClientSession>) -> bool {
    std::ptr::eq(a, b.as_ref())
}

impl ClientSession {
    /// Spawns the dedicated writer task over `writer` and returns a handle
    /// shared with the registry and every Invitation this session joins.
    pub fn new<W>(writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        tokio::spawn(run_writer(writer, rx, Arc::clone(&shutdown)));
        Arc::new(Self {
            outbound: tx,
            shutdown,
            state: Mutex::new(SessionState::new()),
        })
    }

    /// A session with no live peer, for invitation/game unit tests that
    /// need a real `ClientSession` identity but never inspect its bytes.
    #[cfg(test)]
    pub fn for_test() -> Arc<Self> {
        let (sink, _far_end) = tokio::io::duplex(1024);
        Self::new(sink)
    }

    /// Requests the writer task to half-close its socket and stop. Used by
    /// `ClientRegistry::shutdown_all`.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn logged_in_player(&self) -> Option<Arc<Player>> {
        self.state.lock().await.player.clone()
    }

    pub async fn login(&self, player: Arc<Player>) -> ProtoResult<()> {
        let mut state = self.state.lock().await;
        if state.player.is_some() {
            return Err(ProtoError::protocol("already logged in"));
        }
        state.player = Some(player);
        Ok(())
    }

    /// Walks the invitation list, resigning/revoking/declining each entry
    /// as appropriate, then releases the player. Matches `client_logout`.
    pub async fn logout(&self) -> ProtoResult<()> {
        {
            let state = self.state.lock().await;
            if state.player.is_none() {
                return Err(ProtoError::protocol("not logged in"));
            }
        }

        let invitations = self.state.lock().await.invitations.clone();
        for (id, inv) in invitations {
            let is_source = is_same(self, inv.source());
            let in_progress = match inv.game().await {
                Some(g) => !g.is_over().await,
                None => false,
            };
            let _ = if in_progress {
                self.resign_game(id).await
            } else if is_source {
                self.revoke(id).await
            } else {
                self.decline(id).await
            };
        }

        self.state.lock().await.player = None;
        Ok(())
    }

    pub fn send_packet(&self, pkt: Packet) -> ProtoResult<()> {
        self.outbound.send(pkt).map_err(|_| ProtoError::Disconnected)
    }

    pub fn send_ack(&self, id: u8, role: u8, payload: Vec<u8>) -> ProtoResult<()> {
        self.send_packet(Packet::new(PacketType::Ack, id, role, payload))
    }

    pub fn send_nack(&self, id: u8) -> ProtoResult<()> {
        self.send_packet(Packet::empty(PacketType::Nack, id, 0))
    }

    async fn add_invitation(&self, inv: Arc<Invitation>) -> u8 {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        state.invitations.push((id, inv));
        id
    }

    /// Removes by object identity. Returns the local id that was in use.
    async fn remove_invitation(&self, inv: &Arc<Invitation>) -> Option<u8> {
        let mut state = self.state.lock().await;
        let pos = state
            .invitations
            .iter()
            .position(|(_, i)| Arc::ptr_eq(i, inv))?;
        Some(state.invitations.remove(pos).0)
    }

    async fn local_id_of(&self, inv: &Arc<Invitation>) -> Option<u8> {
        self.state
            .lock()
            .await
            .invitations
            .iter()
            .find(|(_, i)| Arc::ptr_eq(i, inv))
            .map(|(id, _)| *id)
    }

    async fn lookup_invitation(&self, id: u8) -> Option<Arc<Invitation>> {
        self.state
            .lock()
            .await
            .invitations
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, inv)| Arc::clone(inv))
    }

    /// Creates an Invitation with `self` as source, adds it to both lists,
    /// and sends `INVITED` to the target. Returns the source-side local id.
    pub async fn make_invitation(
        self: &Arc<Self>,
        target: Arc<ClientSession>,
        source_role: Role,
        target_role: Role,
    ) -> ProtoResult<u8> {
        let player = self
            .logged_in_player()
            .await
            .ok_or_else(|| ProtoError::protocol("not logged in"))?;
        let inv = Invitation::create(Arc::clone(self), Arc::clone(&target), source_role, target_role)?;
        let source_id = self.add_invitation(Arc::clone(&inv)).await;
        let target_id = target.add_invitation(Arc::clone(&inv)).await;
        target.send_packet(Packet::new(
            PacketType::Invited,
            target_id,
            Role::to_wire(Some(target_role)),
            player.name().as_bytes().to_vec(),
        ))?;
        Ok(source_id)
    }

    /// Source-only. Only valid while Open.
    pub async fn revoke(&self, id: u8) -> ProtoResult<()> {
        let inv = self
            .lookup_invitation(id)
            .await
            .ok_or_else(|| ProtoError::invalid("unknown invitation id"))?;
        if !is_same(self, inv.source()) {
            return Err(ProtoError::invalid("only the source may revoke"));
        }
        if inv.state().await != InvitationState::Open {
            return Err(ProtoError::invalid("invitation is not open"));
        }
        inv.close(None).await?;
        self.remove_invitation(&inv).await;
        let target = inv.target();
        let target_id = target
            .remove_invitation(&inv)
            .await
            .ok_or_else(|| ProtoError::invalid("target had no matching invitation"))?;
        target.send_packet(Packet::empty(PacketType::Revoked, target_id, 0))?;
        Ok(())
    }

    /// Target-only. Only valid while Open.
    pub async fn decline(&self, id: u8) -> ProtoResult<()> {
        let inv = self
            .lookup_invitation(id)
            .await
            .ok_or_else(|| ProtoError::invalid("unknown invitation id"))?;
        if !is_same(self, inv.target()) {
            return Err(ProtoError::invalid("only the target may decline"));
        }
        if inv.state().await != InvitationState::Open {
            return Err(ProtoError::invalid("invitation is not open"));
        }
        inv.close(None).await?;
        self.remove_invitation(&inv).await;
        let source = inv.source();
        let source_id = source
            .remove_invitation(&inv)
            .await
            .ok_or_else(|| ProtoError::invalid("source had no matching invitation"))?;
        source.send_packet(Packet::empty(PacketType::Declined, source_id, 0))?;
        Ok(())
    }

    /// Target-only. Only valid while Open. Returns the board text that
    /// belongs on the caller's own ACK (non-empty only if the target plays
    /// First).
    pub async fn accept(&self, id: u8) -> ProtoResult<String> {
        let inv = self
            .lookup_invitation(id)
            .await
            .ok_or_else(|| ProtoError::invalid("unknown invitation id"))?;
        if !is_same(self, inv.target()) {
            return Err(ProtoError::invalid("only the target may accept"));
        }
        if inv.state().await != InvitationState::Open {
            return Err(ProtoError::invalid("invitation is not open"));
        }
        let game = inv.accept().await?;
        let board = game.unparse_state().await;

        let source = inv.source();
        let source_id = source
            .local_id_of(&inv)
            .await
            .ok_or_else(|| ProtoError::invalid("source had no matching invitation"))?;
        let source_payload = if inv.source_role() == Role::First {
            board.clone().into_bytes()
        } else {
            Vec::new()
        };
        source.send_packet(Packet::new(PacketType::Accepted, source_id, 0, source_payload))?;

        Ok(if inv.target_role() == Role::First {
            board
        } else {
            String::new()
        })
    }

    /// Valid on either side, only while Accepted with a game in progress.
    pub async fn resign_game(&self, id: u8) -> ProtoResult<()> {
        let inv = self
            .lookup_invitation(id)
            .await
            .ok_or_else(|| ProtoError::invalid("unknown invitation id"))?;
        if inv.state().await != InvitationState::Accepted {
            return Err(ProtoError::invalid("invitation is not accepted"));
        }
        let game = inv
            .game()
            .await
            .ok_or_else(|| ProtoError::invalid("no game in progress"))?;
        if game.is_over().await {
            return Err(ProtoError::invalid("game is already over"));
        }

        let is_source = is_same(self, inv.source());
        let my_role = if is_source {
            inv.source_role()
        } else {
            inv.target_role()
        };
        inv.close(Some(my_role)).await?;
        self.remove_invitation(&inv).await;
        let opponent = if is_source { inv.target() } else { inv.source() };
        let opponent_id = opponent
            .remove_invitation(&inv)
            .await
            .ok_or_else(|| ProtoError::invalid("opponent had no matching invitation"))?;

        let caller_player = self
            .logged_in_player()
            .await
            .ok_or_else(|| ProtoError::protocol("not logged in"))?;
        let opponent_player = opponent
            .logged_in_player()
            .await
            .ok_or_else(|| ProtoError::protocol("opponent not logged in"))?;
        // The caller always loses a resignation: p1 = caller, so p2 (opponent) wins.
        rating_update(&caller_player, &opponent_player, GameResult::P2Win);

        let winner = game.winner().await;
        let wire = Role::to_wire(winner);
        opponent.send_packet(Packet::empty(PacketType::Resigned, opponent_id, 0))?;
        self.send_packet(Packet::empty(PacketType::Ended, id, wire))?;
        opponent.send_packet(Packet::empty(PacketType::Ended, opponent_id, wire))?;
        Ok(())
    }

    /// Parses and applies `move_str` for the caller's role in invitation
    /// `id`, notifying the opponent and (if the game ends) closing out the
    /// invitation and posting ratings.
    pub async fn make_move(&self, id: u8, move_str: &str) -> ProtoResult<()> {
        let inv = self
            .lookup_invitation(id)
            .await
            .ok_or_else(|| ProtoError::invalid("unknown invitation id"))?;
        if inv.state().await != InvitationState::Accepted {
            return Err(ProtoError::invalid("invitation is not accepted"));
        }
        let game = inv
            .game()
            .await
            .ok_or_else(|| ProtoError::invalid("no game in progress"))?;
        if game.is_over().await {
            return Err(ProtoError::invalid("game is already over"));
        }

        let is_source = is_same(self, inv.source());
        let my_role = if is_source {
            inv.source_role()
        } else {
            inv.target_role()
        };
        let mv = game::parse_move(Some(my_role), move_str)
            .ok_or_else(|| ProtoError::invalid("malformed move"))?;
        game.apply_move(mv).await.map_err(ProtoError::invalid)?;

        let opponent = if is_source { inv.target() } else { inv.source() };
        let opponent_id = opponent
            .local_id_of(&inv)
            .await
            .ok_or_else(|| ProtoError::invalid("opponent had no matching invitation"))?;
        let board = game.unparse_state().await;

        if game.is_over().await {
            let winner = game.winner().await;
            let result = match winner {
                None => GameResult::Draw,
                Some(w) if w == my_role => GameResult::P1Win,
                _ => GameResult::P2Win,
            };
            let caller_player = self
                .logged_in_player()
                .await
                .ok_or_else(|| ProtoError::protocol("not logged in"))?;
            let opponent_player = opponent
                .logged_in_player()
                .await
                .ok_or_else(|| ProtoError::protocol("opponent not logged in"))?;
            rating_update(&caller_player, &opponent_player, result);

            let mut payload = Vec::with_capacity(board.len() + 1);
            payload.push(b'\n');
            payload.extend_from_slice(board.as_bytes());
            opponent.send_packet(Packet::new(PacketType::Moved, opponent_id, 0, payload))?;

            inv.close(None).await?;
            self.remove_invitation(&inv).await;
            opponent.remove_invitation(&inv).await;

            let wire = Role::to_wire(winner);
            self.send_packet(Packet::empty(PacketType::Ended, id, wire))?;
            opponent.send_packet(Packet::empty(PacketType::Ended, opponent_id, wire))?;
        } else {
            let suffix = match game.next_to_move().await {
                Role::First => "X to move",
                Role::Second => "O to move",
            };
            let mut payload = Vec::with_capacity(board.len() + suffix.len() + 2);
            payload.push(b'\n');
            payload.extend_from_slice(board.as_bytes());
            payload.push(b'\n');
            payload.extend_from_slice(suffix.as_bytes());
            payload.push(b'\n');
            opponent.send_packet(Packet::new(PacketType::Moved, opponent_id, 0, payload))?;
        }
        Ok(())
    }
}

async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Packet>,
    shutdown: Arc<Notify>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    use tokio::io::AsyncWriteExt;
    loop {
        tokio::select! {
            pkt = rx.recv() => {
                match pkt {
                    Some(pkt) => {
                        // Best-effort: a write failure here means the peer
                        // has gone away; its own service loop will observe
                        // EOF on its next read.
                        let _ = encode_into(&mut writer, &pkt).await;
                    }
                    None => break,
                }
            }
            _ = shutdown.notified() => {
                let _ = writer.shutdown().await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;

    async fn logged_in(name: &str) -> Arc<ClientSession> {
        let s = ClientSession::for_test();
        s.login(Player::new(name)).await.unwrap();
        s
    }

    #[tokio::test]
    async fn login_twice_fails() {
        let s = logged_in("alice").await;
        assert!(s.login(Player::new("alice")).await.is_err());
    }

    #[tokio::test]
    async fn make_invitation_then_decline_round_trips_ids() {
        let alice = logged_in("alice").await;
        let bob = logged_in("bob").await;
        let source_id = alice
            .make_invitation(Arc::clone(&bob), Role::First, Role::Second)
            .await
            .unwrap();
        let bob_side = bob
            .lookup_invitation(0)
            .await
            .expect("bob should have an entry at id 0");
        let alice_side = alice.lookup_invitation(source_id).await.unwrap();
        assert!(Arc::ptr_eq(&bob_side, &alice_side));
        bob.decline(0).await.unwrap();
        assert!(alice.lookup_invitation(source_id).await.is_none());
        assert!(bob.lookup_invitation(0).await.is_none());
    }

    #[tokio::test]
    async fn revoke_by_non_source_fails() {
        let alice = logged_in("alice").await;
        let bob = logged_in("bob").await;
        let _ = alice
            .make_invitation(Arc::clone(&bob), Role::First, Role::Second)
            .await
            .unwrap();
        assert!(bob.revoke(0).await.is_err());
    }

    #[tokio::test]
    async fn accept_creates_game_and_removes_on_win() {
        let alice = logged_in("alice").await;
        let bob = logged_in("bob").await;
        let source_id = alice
            .make_invitation(Arc::clone(&bob), Role::First, Role::Second)
            .await
            .unwrap();
        let ack_board = bob.accept(0).await.unwrap();
        // Bob (target) plays Second, so his own ack carries no board.
        assert!(ack_board.is_empty());

        alice.make_move(source_id, "1->X").await.unwrap();
        bob.make_move(0, "4->O").await.unwrap();
        alice.make_move(source_id, "2->X").await.unwrap();
        bob.make_move(0, "5->O").await.unwrap();
        alice.make_move(source_id, "3->X").await.unwrap();

        assert!(alice.lookup_invitation(source_id).await.is_none());
        assert!(bob.lookup_invitation(0).await.is_none());
        assert_eq!(alice.logged_in_player().await.unwrap().rating(), 1516);
        assert_eq!(bob.logged_in_player().await.unwrap().rating(), 1484);
    }

    #[tokio::test]
    async fn logout_revokes_open_invitation() {
        let alice = logged_in("alice").await;
        let bob = logged_in("bob").await;
        alice
            .make_invitation(Arc::clone(&bob), Role::First, Role::Second)
            .await
            .unwrap();
        alice.logout().await.unwrap();
        assert!(bob.lookup_invitation(0).await.is_none());
        assert!(alice.logged_in_player().await.is_none());
    }
}
