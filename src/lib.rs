pub mod client_registry;
pub mod error;
pub mod game;
pub mod invitation;
pub mod logger;
pub mod player;
pub mod player_registry;
pub mod protocol;
pub mod service;
pub mod session;

use std::sync::Arc;

use client_registry::ClientRegistry;
use logger::Logger;
use player_registry::PlayerRegistry;

/// Shared context handed to every connection instead of being reached for
/// as global mutable state (see SPEC_FULL.md §9).
pub struct AppState {
    pub clients: ClientRegistry,
    pub players: PlayerRegistry,
    pub log: Logger,
}

impl AppState {
    pub fn new(log: Logger) -> Arc<Self> {
        Arc::new(Self {
            clients: ClientRegistry::new(),
            players: PlayerRegistry::new(),
            log,
        })
    }
}
