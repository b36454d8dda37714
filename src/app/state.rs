//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::lobby::LobbyDirectory;
use crate::registry::MatchRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobbies: Arc<LobbyDirectory>,
    pub registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let lobbies = Arc::new(LobbyDirectory::new(config.lobby_capacity));
        Self {
            config: Arc::new(config),
            lobbies,
            registry: Arc::new(MatchRegistry::new()),
        }
    }
}
