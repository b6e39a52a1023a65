//! The three-state handle joining exactly two client sessions.
//!
//! Grounded on `examples/original_source/src/invitation.c`: `inv_create`'s
//! source != target check, `inv_accept`'s Open -> Accepted transition and
//! Game creation, and `inv_close`'s resignation-on-close rule are all
//! ported directly.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ProtoError, ProtoResult};
use crate::game::{Game, Role};
use crate::session::ClientSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationState {
    Open,
    Accepted,
    Closed,
}

struct InvitationInner {
    state: InvitationState,
    game: Option<Arc<Game>>,
}

pub struct Invitation {
    source: Arc<ClientSession>,
    target: Arc<ClientSession>,
    source_role: Role,
    target_role: Role,
    inner: Mutex<InvitationInner>,
}

impl Invitation {
    /// Fails if `source` and `target` are the same session, matching
    /// `inv_create`'s identity check in the original.
    pub fn create(
        source: Arc<ClientSession>,
        target: Arc<ClientSession>,
        source_role: Role,
        target_role: Role,
    ) -> ProtoResult<Arc<Invitation>> {
        if Arc::ptr_eq(&source, &target) {
            return Err(ProtoError::invalid("cannot invite yourself"));
        }
        Ok(Arc::new(Invitation {
            source,
            target,
            source_role,
            target_role,
            inner: Mutex::new(InvitationInner {
                state: InvitationState::Open,
                game: None,
            }),
        }))
    }

    pub fn source(&self) -> &Arc<ClientSession> {
        &self.source
    }

    pub fn target(&self) -> &Arc<ClientSession> {
        &self.target
    }

    pub fn source_role(&self) -> Role {
        self.source_role
    }

    pub fn target_role(&self) -> Role {
        self.target_role
    }

    pub async fn state(&self) -> InvitationState {
        self.inner.lock().await.state
    }

    pub async fn game(&self) -> Option<Arc<Game>> {
        self.inner.lock().await.game.clone()
    }

    /// Transitions Open -> Accepted and creates the Game.
    pub async fn accept(&self) -> ProtoResult<Arc<Game>> {
        let mut inner = self.inner.lock().await;
        if inner.state != InvitationState::Open {
            return Err(ProtoError::invalid("invitation is not open"));
        }
        let game = Arc::new(Game::create());
        inner.game = Some(Arc::clone(&game));
        inner.state = InvitationState::Accepted;
        Ok(game)
    }

    /// Closes the invitation. If it is Accepted with a Game still in
    /// progress, `resigning_role` must be `Some` and is used to resign that
    /// game; if the Game is already over, `resigning_role` is ignored. An
    /// Open invitation closes unconditionally (revoke/decline).
    pub async fn close(&self, resigning_role: Option<Role>) -> ProtoResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            InvitationState::Closed => return Err(ProtoError::invalid("invitation already closed")),
            InvitationState::Open => {}
            InvitationState::Accepted => {
                let game = inner.game.clone().expect("Accepted invitation has a game");
                if !game.is_over().await {
                    let role = resigning_role
                        .ok_or_else(|| ProtoError::invalid("resignation requires a role"))?;
                    game.resign(role)
                        .await
                        .map_err(ProtoError::invalid)?;
                }
            }
        }
        inner.state = InvitationState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ClientSession;

    fn fresh_session() -> Arc<ClientSession> {
        ClientSession::for_test()
    }

    #[tokio::test]
    async fn create_rejects_self_invitation() {
        let s = fresh_session();
        let err = Invitation::create(Arc::clone(&s), Arc::clone(&s), Role::First, Role::Second)
            .unwrap_err();
        assert!(matches!(err, ProtoError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn accept_transitions_to_accepted_and_creates_game() {
        let a = fresh_session();
        let b = fresh_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        assert_eq!(inv.state().await, InvitationState::Open);
        let game = inv.accept().await.unwrap();
        assert_eq!(inv.state().await, InvitationState::Accepted);
        assert!(!game.is_over().await);
    }

    #[tokio::test]
    async fn accept_twice_fails() {
        let a = fresh_session();
        let b = fresh_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        inv.accept().await.unwrap();
        assert!(inv.accept().await.is_err());
    }

    #[tokio::test]
    async fn close_open_invitation_needs_no_role() {
        let a = fresh_session();
        let b = fresh_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        inv.close(None).await.unwrap();
        assert_eq!(inv.state().await, InvitationState::Closed);
    }

    #[tokio::test]
    async fn close_accepted_in_progress_requires_role_and_resigns() {
        let a = fresh_session();
        let b = fresh_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        inv.accept().await.unwrap();
        assert!(inv.close(None).await.is_err());
        inv.close(Some(Role::Second)).await.unwrap();
        assert_eq!(inv.state().await, InvitationState::Closed);
        let game = inv.game().await.unwrap();
        assert!(game.is_over().await);
        assert_eq!(game.winner().await, Some(Role::First));
    }

    #[tokio::test]
    async fn close_accepted_already_over_ignores_role() {
        let a = fresh_session();
        let b = fresh_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        inv.accept().await.unwrap();
        let game = inv.game().await.unwrap();
        game.resign(Role::First).await.unwrap();
        inv.close(None).await.unwrap();
        assert_eq!(inv.state().await, InvitationState::Closed);
    }

    #[tokio::test]
    async fn close_twice_fails() {
        let a = fresh_session();
        let b = fresh_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        inv.close(None).await.unwrap();
        assert!(inv.close(None).await.is_err());
    }
}
