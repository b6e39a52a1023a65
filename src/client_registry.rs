//! The bounded set of live connections, with by-name lookup and a
//! wait-until-empty barrier used during shutdown.
//!
//! Grounded on `examples/original_source/src/client_registry.c`: the fixed
//! capacity of 64 slots and the register/unregister/lookup/all_players/
//! shutdown_all shape are ported directly. `wait_for_empty` replaces the
//! original's semaphore-plus-flag (flagged in SPEC_FULL.md §9 as buggy
//! under multiple waiters) with `tokio::sync::Notify`, using the
//! create-then-check pattern that closes the "count reaches zero just
//! before the waiter subscribes" race.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::{ProtoError, ProtoResult};
use crate::player::Player;
use crate::session::ClientSession;

pub const CAPACITY: usize = 64;

pub struct ClientRegistry {
    slots: Mutex<Vec<Option<Arc<ClientSession>>>>,
    empty: Notify,
}

impl ClientRegistry {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(CAPACITY);
        slots.resize_with(CAPACITY, || None);
        Self {
            slots: Mutex::new(slots),
            empty: Notify::new(),
        }
    }

    /// Inserts `session` into the first free slot. Fails if all 64 slots
    /// are occupied.
    pub fn register(&self, session: Arc<ClientSession>) -> ProtoResult<()> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or_else(|| ProtoError::invalid("client registry is full"))?;
        *slot = Some(session);
        Ok(())
    }

    /// Removes `session` by identity. If this empties the registry, wakes
    /// every `wait_for_empty` waiter.
    pub fn unregister(&self, session: &Arc<ClientSession>) {
        let became_empty = {
            let mut slots = self.slots.lock().unwrap();
            if let Some(slot) = slots
                .iter_mut()
                .find(|s| matches!(s, Some(existing) if Arc::ptr_eq(existing, session)))
            {
                *slot = None;
            }
            slots.iter().all(|s| s.is_none())
        };
        if became_empty {
            self.empty.notify_waiters();
        }
    }

    fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub async fn lookup(&self, name: &str) -> Option<Arc<ClientSession>> {
        for session in self.snapshot() {
            if let Some(player) = session.logged_in_player().await {
                if player.name() == name {
                    return Some(session);
                }
            }
        }
        None
    }

    pub async fn all_players(&self) -> Vec<Arc<Player>> {
        let mut players = Vec::new();
        for session in self.snapshot() {
            if let Some(player) = session.logged_in_player().await {
                players.push(player);
            }
        }
        players
    }

    /// Half-closes every live connection's write side; does not unregister.
    /// Each connection's own service loop observes EOF and unregisters.
    pub fn shutdown_all(&self) {
        for session in self.snapshot() {
            session.request_shutdown();
        }
    }

    pub fn count(&self) -> usize {
        self.slots.lock().unwrap().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Blocks until the registry is empty. Safe to call from any number of
    /// concurrent waiters.
    pub async fn wait_for_empty(&self) {
        loop {
            let notified = self.empty.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_keep_count_consistent() {
        let reg = ClientRegistry::new();
        let a = ClientSession::for_test();
        let b = ClientSession::for_test();
        reg.register(Arc::clone(&a)).unwrap();
        reg.register(Arc::clone(&b)).unwrap();
        assert_eq!(reg.count(), 2);
        reg.unregister(&a);
        assert_eq!(reg.count(), 1);
        reg.unregister(&b);
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn registering_past_capacity_fails() {
        let reg = ClientRegistry::new();
        for _ in 0..CAPACITY {
            reg.register(ClientSession::for_test()).unwrap();
        }
        assert!(reg.register(ClientSession::for_test()).is_err());
    }

    #[tokio::test]
    async fn lookup_finds_by_logged_in_name() {
        let reg = ClientRegistry::new();
        let s = ClientSession::for_test();
        s.login(Player::new("alice")).await.unwrap();
        reg.register(Arc::clone(&s)).unwrap();
        let found = reg.lookup("alice").await.unwrap();
        assert!(Arc::ptr_eq(&found, &s));
        assert!(reg.lookup("bob").await.is_none());
    }

    #[tokio::test]
    async fn wait_for_empty_resolves_after_last_unregister() {
        let reg = Arc::new(ClientRegistry::new());
        let s = ClientSession::for_test();
        reg.register(Arc::clone(&s)).unwrap();

        let waiter_reg = Arc::clone(&reg);
        let waiter = tokio::spawn(async move {
            waiter_reg.wait_for_empty().await;
        });

        tokio::task::yield_now().await;
        reg.unregister(&s);
        waiter.await.unwrap();
        assert!(reg.is_empty());
    }
}
