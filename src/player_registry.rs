//! Process-wide name -> [`Player`] map.
//!
//! Grounded on `examples/original_source/src/player_registry.c`
//! (`preg_register`'s create-on-first-use semantics) and the registry
//! shape of `examples/other_examples/70adac28_..._player_registry.rs.rs`
//! (a plain map behind a `std::sync::Mutex`, since every critical section
//! here is brief and never awaits).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::player::Player;

pub struct PlayerRegistry {
    players: Mutex<HashMap<String, Arc<Player>>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: Mutex::new(HashMap::new()),
        }
    }

    /// Return the existing player with this name, or create and retain one.
    /// The registry always keeps its own `Arc`; the returned `Arc` is an
    /// additional reference for the caller.
    pub fn register(&self, name: &str) -> Arc<Player> {
        let mut players = self.players.lock().unwrap();
        if let Some(p) = players.get(name) {
            return Arc::clone(p);
        }
        let player = Player::new(name);
        players.insert(name.to_string(), Arc::clone(&player));
        player
    }

    pub fn len(&self) -> usize {
        self.players.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Asserts the precondition the original `preg_fini` required of its
    /// caller ("it is an error to call finalize() before Client Registry is
    /// empty"). The registry's own players are freed when `self` drops;
    /// there is nothing left to do here but check the precondition.
    pub fn finalize(&self, clients: &crate::client_registry::ClientRegistry) {
        debug_assert!(
            clients.is_empty(),
            "PlayerRegistry::finalize called before the client registry drained"
        );
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_creates_on_first_use_and_reuses_thereafter() {
        let reg = PlayerRegistry::new();
        let p1 = reg.register("alice");
        let p2 = reg.register("alice");
        assert!(Arc::ptr_eq(&p1, &p2));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn distinct_names_create_distinct_players() {
        let reg = PlayerRegistry::new();
        let a = reg.register("alice");
        let b = reg.register("bob");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 2);
    }
}
