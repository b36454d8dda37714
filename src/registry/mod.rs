//! Match registry and the global sweep
//!
//! The registry owns the shared directories: lobby id -> running match and
//! connection id -> assigned match. Connection tasks and simulation tasks
//! never mutate these directly; structural removals go into queues that one
//! periodic sweep task drains. That keeps every destructive mutation on a
//! single writer and spares the hot paths any lock around iteration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::MatchHandle;
use crate::lobby::LobbyDirectory;
use crate::ws::protocol::{ConnectionId, LobbyId};

/// How long the sweep waits for a stopping simulation task
const STOP_GRACE: Duration = Duration::from_secs(1);

struct MatchEntry {
    handle: MatchHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct RemovalQueues {
    connections: Vec<ConnectionId>,
    matches: Vec<LobbyId>,
    lobbies: Vec<LobbyId>,
    /// connection -> the lobby it must be dropped from
    lobby_members: HashMap<ConnectionId, LobbyId>,
}

/// Shared directory of running matches and connections
pub struct MatchRegistry {
    matches: DashMap<LobbyId, MatchEntry>,
    /// None while the connection is in menus/lobbies, Some once in a match
    connections: DashMap<ConnectionId, Option<LobbyId>>,
    pending: Mutex<RemovalQueues>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            connections: DashMap::new(),
            pending: Mutex::new(RemovalQueues::default()),
        }
    }

    // ---- directories ----------------------------------------------------

    pub fn register_connection(&self, connection_id: ConnectionId) {
        self.connections.insert(connection_id, None);
    }

    /// Point a connection at the match it now plays in
    pub fn assign_connection(&self, connection_id: ConnectionId, match_id: LobbyId) {
        if let Some(mut entry) = self.connections.get_mut(&connection_id) {
            *entry = Some(match_id);
        }
    }

    pub fn connection_match(&self, connection_id: ConnectionId) -> Option<LobbyId> {
        self.connections.get(&connection_id).and_then(|e| *e)
    }

    pub fn unassign_connection(&self, connection_id: ConnectionId) {
        if let Some(mut entry) = self.connections.get_mut(&connection_id) {
            *entry = None;
        }
    }

    pub fn insert_match(&self, handle: MatchHandle, task: JoinHandle<()>) {
        self.matches.insert(
            handle.id,
            MatchEntry {
                handle,
                task: Mutex::new(Some(task)),
            },
        );
    }

    pub fn get_match(&self, id: LobbyId) -> Option<MatchHandle> {
        self.matches.get(&id).map(|e| e.handle.clone())
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches.iter().map(|e| e.handle.player_count()).sum()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ---- removal intake -------------------------------------------------

    pub fn queue_connection_removal(&self, connection_id: ConnectionId) {
        self.pending.lock().connections.push(connection_id);
    }

    pub fn queue_match_removal(&self, match_id: LobbyId) {
        let mut pending = self.pending.lock();
        if !pending.matches.contains(&match_id) {
            pending.matches.push(match_id);
        }
    }

    pub fn queue_lobby_removal(&self, lobby_id: LobbyId) {
        self.pending.lock().lobbies.push(lobby_id);
    }

    pub fn queue_lobby_member_removal(&self, connection_id: ConnectionId, lobby_id: LobbyId) {
        self.pending.lock().lobby_members.insert(connection_id, lobby_id);
    }

    // ---- sweep ----------------------------------------------------------

    /// One reconciliation pass: finished matches are queued for removal,
    /// then every queue is drained.
    pub async fn sweep(&self, lobbies: &LobbyDirectory) {
        for entry in self.matches.iter() {
            if entry.handle.is_finished() {
                self.queue_match_removal(*entry.key());
            }
        }

        let drained = std::mem::take(&mut *self.pending.lock());

        for connection_id in drained.connections {
            self.connections.remove(&connection_id);
            debug!(connection_id = %connection_id, "connection removed");
        }

        for (connection_id, lobby_id) in drained.lobby_members {
            let _ = lobbies.leave(lobby_id, connection_id);
        }

        for lobby_id in drained.lobbies {
            lobbies.remove(lobby_id);
        }

        for match_id in drained.matches {
            self.remove_match(match_id, lobbies).await;
        }
    }

    /// Stop a match's simulation task and drop it from the directory. A
    /// task that misses the grace period is logged and abandoned; the match
    /// is removed regardless.
    async fn remove_match(&self, match_id: LobbyId, lobbies: &LobbyDirectory) {
        let Some((_, entry)) = self.matches.remove(&match_id) else {
            return;
        };
        let _ = entry.handle.stop_tx.send(true);

        // The entry is owned here; unwrap the lock so no guard spans the join
        if let Some(task) = entry.task.into_inner() {
            match tokio::time::timeout(STOP_GRACE, task).await {
                Ok(_) => info!(match_id = %match_id, "match removed"),
                Err(_) => {
                    warn!(match_id = %match_id, "simulation task missed stop deadline, abandoning");
                }
            }
        }

        lobbies.remove(match_id);
        for mut conn in self.connections.iter_mut() {
            if *conn == Some(match_id) {
                *conn = None;
            }
        }
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Dedicated sweep task, independent of any match's tick rate
pub async fn run_sweep(
    registry: Arc<MatchRegistry>,
    lobbies: Arc<LobbyDirectory>,
    interval: Duration,
) {
    info!(interval_ms = interval.as_millis() as u64, "global sweep running");
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        registry.sweep(&lobbies).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{sim_loop, GameMatch};
    use uuid::Uuid;

    #[test]
    fn sweep_task_can_be_spawned_on_the_runtime() {
        // tokio::spawn needs a Send future; holding a parking_lot guard
        // across the join-timeout await would break this
        fn assert_send<F: Send>(_: &F) {}
        let registry = Arc::new(MatchRegistry::new());
        let lobbies = Arc::new(LobbyDirectory::new(10));
        let fut = run_sweep(registry, lobbies, Duration::from_millis(10));
        assert_send(&fut);
    }

    #[tokio::test]
    async fn sweep_applies_queued_connection_removals_only() {
        let registry = MatchRegistry::new();
        let lobbies = LobbyDirectory::new(10);
        let keep = Uuid::new_v4();
        let gone = Uuid::new_v4();
        registry.register_connection(keep);
        registry.register_connection(gone);

        registry.queue_connection_removal(gone);
        registry.sweep(&lobbies).await;

        assert_eq!(registry.connection_count(), 1);
        assert!(registry.connections.contains_key(&keep));
    }

    #[tokio::test]
    async fn sweep_drops_member_from_its_lobby() {
        let registry = MatchRegistry::new();
        let lobbies = LobbyDirectory::new(10);
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let info = lobbies.create("test".into(), host);
        lobbies.join(info.lobby_id, guest).unwrap();

        registry.queue_lobby_member_removal(guest, info.lobby_id);
        registry.sweep(&lobbies).await;

        assert_eq!(lobbies.list()[0].players, vec![host]);
    }

    #[tokio::test]
    async fn sweep_stops_and_removes_a_queued_match() {
        let registry = MatchRegistry::new();
        let lobbies = LobbyDirectory::new(10);
        let players = [Uuid::new_v4(), Uuid::new_v4()];
        let (game_match, handle) = GameMatch::new(Uuid::new_v4(), 3, &players);
        let match_id = handle.id;

        let stop_rx = handle.stop_tx.subscribe();
        let task = tokio::spawn(sim_loop::run(game_match, stop_rx));
        registry.insert_match(handle, task);
        registry.register_connection(players[0]);
        registry.assign_connection(players[0], match_id);
        assert_eq!(registry.active_matches(), 1);

        registry.queue_match_removal(match_id);
        registry.sweep(&lobbies).await;

        assert_eq!(registry.active_matches(), 0);
        assert_eq!(registry.connection_match(players[0]), None);
    }

    #[tokio::test]
    async fn sweep_reaps_finished_matches_unprompted() {
        let registry = MatchRegistry::new();
        let lobbies = LobbyDirectory::new(10);
        let (game_match, handle) = GameMatch::new(Uuid::new_v4(), 3, &[Uuid::new_v4()]);
        let match_id = handle.id;

        // A loop over a match whose members are gone exits on its own
        let stop_rx = handle.stop_tx.subscribe();
        game_match.mark_finished();
        let task = tokio::spawn(sim_loop::run(game_match, stop_rx));
        registry.insert_match(handle, task);

        registry.sweep(&lobbies).await;
        assert_eq!(registry.active_matches(), 0);
    }
}
