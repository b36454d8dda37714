//! Lobby directory
//!
//! Pre-match grouping only: lobbies route players into a match and carry no
//! simulation state. The directory is shared across connection tasks, so it
//! lives in a DashMap and every operation works on one entry at a time.

use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::ws::protocol::{ConnectionId, LobbyId, LobbyInfo};

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("lobby not found")]
    NotFound,

    #[error("lobby is full")]
    Full,

    #[error("match already started")]
    AlreadyStarted,

    #[error("only the host can start the match")]
    NotHost,

    #[error("already a member of this lobby")]
    AlreadyMember,
}

#[derive(Debug, Clone)]
pub struct Lobby {
    pub id: LobbyId,
    pub name: String,
    pub host: ConnectionId,
    pub members: Vec<ConnectionId>,
    pub started: bool,
}

impl Lobby {
    fn info(&self) -> LobbyInfo {
        LobbyInfo {
            lobby_id: self.id,
            name: self.name.clone(),
            host_id: self.host,
            players: self.members.clone(),
            started: self.started,
        }
    }
}

/// All open lobbies, keyed by lobby id
pub struct LobbyDirectory {
    lobbies: DashMap<LobbyId, Lobby>,
    capacity: usize,
}

impl LobbyDirectory {
    pub fn new(capacity: usize) -> Self {
        Self {
            lobbies: DashMap::new(),
            capacity,
        }
    }

    /// Create a lobby with the caller as host and sole member
    pub fn create(&self, name: String, host: ConnectionId) -> LobbyInfo {
        let lobby = Lobby {
            id: Uuid::new_v4(),
            name,
            host,
            members: vec![host],
            started: false,
        };
        let info = lobby.info();
        info!(lobby_id = %lobby.id, host = %host, "lobby created");
        self.lobbies.insert(lobby.id, lobby);
        info
    }

    pub fn join(&self, lobby_id: LobbyId, connection_id: ConnectionId) -> Result<LobbyInfo, LobbyError> {
        let mut lobby = self.lobbies.get_mut(&lobby_id).ok_or(LobbyError::NotFound)?;
        if lobby.started {
            return Err(LobbyError::AlreadyStarted);
        }
        if lobby.members.contains(&connection_id) {
            return Err(LobbyError::AlreadyMember);
        }
        if lobby.members.len() >= self.capacity {
            return Err(LobbyError::Full);
        }
        lobby.members.push(connection_id);
        Ok(lobby.info())
    }

    /// Remove a member. An emptied lobby is dismantled; a departing host
    /// hands the lobby to the next member. Returns true if the lobby was
    /// dismantled.
    pub fn leave(&self, lobby_id: LobbyId, connection_id: ConnectionId) -> Result<bool, LobbyError> {
        let dismantle = {
            let mut lobby = self.lobbies.get_mut(&lobby_id).ok_or(LobbyError::NotFound)?;
            lobby.members.retain(|m| *m != connection_id);
            if lobby.host == connection_id {
                if let Some(next) = lobby.members.first() {
                    lobby.host = *next;
                }
            }
            lobby.members.is_empty()
        };
        if dismantle {
            self.lobbies.remove(&lobby_id);
            info!(lobby_id = %lobby_id, "lobby dismantled");
        }
        Ok(dismantle)
    }

    /// The lobby currently holding a connection, if any
    pub fn lobby_of(&self, connection_id: ConnectionId) -> Option<LobbyId> {
        self.lobbies
            .iter()
            .find(|entry| entry.value().members.contains(&connection_id))
            .map(|entry| *entry.key())
    }

    /// Flip a lobby to started and return its member list for the match
    pub fn start(
        &self,
        lobby_id: LobbyId,
        requester: ConnectionId,
    ) -> Result<Vec<ConnectionId>, LobbyError> {
        let mut lobby = self.lobbies.get_mut(&lobby_id).ok_or(LobbyError::NotFound)?;
        if lobby.host != requester {
            return Err(LobbyError::NotHost);
        }
        if lobby.started {
            return Err(LobbyError::AlreadyStarted);
        }
        lobby.started = true;
        info!(lobby_id = %lobby_id, members = lobby.members.len(), "lobby started");
        Ok(lobby.members.clone())
    }

    pub fn list(&self) -> Vec<LobbyInfo> {
        self.lobbies.iter().map(|entry| entry.value().info()).collect()
    }

    /// Remove a lobby outright (its match ended)
    pub fn remove(&self, lobby_id: LobbyId) {
        self.lobbies.remove(&lobby_id);
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_join_then_list() {
        let dir = LobbyDirectory::new(10);
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();

        let info = dir.create("duel".into(), host);
        let joined = dir.join(info.lobby_id, guest).unwrap();
        assert_eq!(joined.players.len(), 2);

        let list = dir.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].host_id, host);
    }

    #[test]
    fn capacity_is_enforced() {
        let dir = LobbyDirectory::new(2);
        let info = dir.create("tiny".into(), Uuid::new_v4());
        dir.join(info.lobby_id, Uuid::new_v4()).unwrap();
        assert!(matches!(
            dir.join(info.lobby_id, Uuid::new_v4()),
            Err(LobbyError::Full)
        ));
    }

    #[test]
    fn joining_twice_is_refused() {
        let dir = LobbyDirectory::new(10);
        let host = Uuid::new_v4();
        let info = dir.create("dup".into(), host);
        assert!(matches!(
            dir.join(info.lobby_id, host),
            Err(LobbyError::AlreadyMember)
        ));
    }

    #[test]
    fn empty_lobby_is_dismantled() {
        let dir = LobbyDirectory::new(10);
        let host = Uuid::new_v4();
        let info = dir.create("gone".into(), host);
        let dismantled = dir.leave(info.lobby_id, host).unwrap();
        assert!(dismantled);
        assert!(dir.is_empty());
    }

    #[test]
    fn host_hands_over_on_leave() {
        let dir = LobbyDirectory::new(10);
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let info = dir.create("handover".into(), host);
        dir.join(info.lobby_id, guest).unwrap();

        let dismantled = dir.leave(info.lobby_id, host).unwrap();
        assert!(!dismantled);
        assert_eq!(dir.list()[0].host_id, guest);
    }

    #[test]
    fn only_host_starts_and_only_once() {
        let dir = LobbyDirectory::new(10);
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let info = dir.create("match".into(), host);
        dir.join(info.lobby_id, guest).unwrap();

        assert!(matches!(
            dir.start(info.lobby_id, guest),
            Err(LobbyError::NotHost)
        ));
        let members = dir.start(info.lobby_id, host).unwrap();
        assert_eq!(members.len(), 2);
        assert!(matches!(
            dir.start(info.lobby_id, host),
            Err(LobbyError::AlreadyStarted)
        ));
        // A started lobby rejects latecomers
        assert!(matches!(
            dir.join(info.lobby_id, Uuid::new_v4()),
            Err(LobbyError::AlreadyStarted)
        ));
    }

    #[test]
    fn lobby_of_finds_the_right_lobby() {
        let dir = LobbyDirectory::new(10);
        let host_a = Uuid::new_v4();
        let host_b = Uuid::new_v4();
        let drifter = Uuid::new_v4();
        dir.create("a".into(), host_a);
        let b = dir.create("b".into(), host_b);
        dir.join(b.lobby_id, drifter).unwrap();

        assert_eq!(dir.lobby_of(drifter), Some(b.lobby_id));
        dir.leave(b.lobby_id, drifter).unwrap();
        assert_eq!(dir.lobby_of(drifter), None);
    }
}
