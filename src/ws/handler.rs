//! WebSocket session handling
//!
//! One session per connection. The read loop validates and routes inbound
//! commands: lobby traffic is handled against the shared directories, match
//! traffic is enqueued into the owning match's intake. A writer task owns
//! the sink; a forwarder task follows the connection's current match and
//! relays both broadcast streams into the writer.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{sim_loop, GameMatch, PlayerInput};
use crate::lobby::LobbyError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ConnectionId, LobbyId, ServerMsg};

/// Outbound queue depth per connection
const OUTBOUND_BUFFER: usize = 128;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "websocket connected");
    state.registry.register_connection(connection_id);

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_BUFFER);

    let _ = out_tx
        .send(ServerMsg::Welcome {
            connection_id,
            server_time: unix_millis(),
        })
        .await;

    // Writer: owns the sink, drains the outbound queue
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if send_msg(&mut ws_sink, &msg).await.is_err() {
                break;
            }
        }
    });

    // Forwarder: follows the connection's match assignment and relays the
    // reliable event stream and the lossy snapshot stream
    let forwarder = tokio::spawn(forward_match_streams(
        connection_id,
        state.clone(),
        out_tx.clone(),
    ));

    // Read loop
    let rate_limiter = ConnectionRateLimiter::new();
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "unparseable message");
                        continue;
                    }
                };
                dispatch(connection_id, msg, &state, &out_tx, &rate_limiter).await;
            }
            Ok(Message::Close(_)) => {
                debug!(connection_id = %connection_id, "client closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "websocket error");
                break;
            }
        }
    }

    // Disconnect: tell the match, then hand structural cleanup to the sweep
    if let Some(match_id) = state.registry.connection_match(connection_id) {
        if let Some(handle) = state.registry.get_match(match_id) {
            let _ = handle
                .input_tx
                .send(PlayerInput {
                    connection_id,
                    msg: ClientMsg::LeaveMatch,
                    received_at: unix_millis(),
                })
                .await;
        }
    }
    if let Some(lobby_id) = state.lobbies.lobby_of(connection_id) {
        state.registry.queue_lobby_member_removal(connection_id, lobby_id);
    }
    state.registry.queue_connection_removal(connection_id);

    forwarder.abort();
    writer.abort();
    info!(connection_id = %connection_id, "websocket disconnected");
}

/// Route one inbound command
async fn dispatch(
    connection_id: ConnectionId,
    msg: ClientMsg,
    state: &AppState,
    out_tx: &mpsc::Sender<ServerMsg>,
    rate_limiter: &ConnectionRateLimiter,
) {
    match msg {
        ClientMsg::CreateLobby { name } => {
            if !rate_limiter.check_lobby() {
                return;
            }
            let info = state.lobbies.create(name, connection_id);
            let _ = out_tx
                .send(ServerMsg::LobbyCreated {
                    lobby_id: info.lobby_id,
                    name: info.name,
                    host_id: info.host_id,
                })
                .await;
        }
        ClientMsg::JoinLobby { lobby_id } => {
            if !rate_limiter.check_lobby() {
                return;
            }
            match state.lobbies.join(lobby_id, connection_id) {
                Ok(_) => {
                    let _ = out_tx
                        .send(ServerMsg::LobbyJoined {
                            lobby_id,
                            connection_id,
                        })
                        .await;
                }
                Err(e) => send_lobby_error(out_tx, &e).await,
            }
        }
        ClientMsg::LeaveLobby { lobby_id } => {
            if !rate_limiter.check_lobby() {
                return;
            }
            match state.lobbies.leave(lobby_id, connection_id) {
                Ok(true) => {
                    let _ = out_tx.send(ServerMsg::LobbyDismantled { lobby_id }).await;
                }
                Ok(false) => {
                    let _ = out_tx
                        .send(ServerMsg::LobbyLeft {
                            lobby_id,
                            connection_id,
                        })
                        .await;
                }
                Err(e) => send_lobby_error(out_tx, &e).await,
            }
        }
        ClientMsg::ListLobbies => {
            if !rate_limiter.check_lobby() {
                return;
            }
            let _ = out_tx
                .send(ServerMsg::LobbyList {
                    lobbies: state.lobbies.list(),
                })
                .await;
        }
        ClientMsg::StartLobby { lobby_id } => {
            if !rate_limiter.check_lobby() {
                return;
            }
            match state.lobbies.start(lobby_id, connection_id) {
                Ok(members) => start_match(lobby_id, members, state).await,
                Err(e) => send_lobby_error(out_tx, &e).await,
            }
        }
        // Everything else belongs to the connection's current match
        msg => {
            if !rate_limiter.check_input() {
                return;
            }
            let Some(match_id) = state.registry.connection_match(connection_id) else {
                return;
            };
            let Some(handle) = state.registry.get_match(match_id) else {
                return;
            };
            let leaving = matches!(msg, ClientMsg::LeaveMatch);
            let _ = handle
                .input_tx
                .send(PlayerInput {
                    connection_id,
                    msg,
                    received_at: unix_millis(),
                })
                .await;
            if leaving {
                state.registry.unassign_connection(connection_id);
            }
        }
    }
}

/// Spin up the match for a started lobby and point every member at it
async fn start_match(lobby_id: LobbyId, members: Vec<ConnectionId>, state: &AppState) {
    let seed = rand::random::<u64>();
    let (game_match, handle) = GameMatch::new(lobby_id, seed, &members);
    let stop_rx = handle.stop_tx.subscribe();
    let task = tokio::spawn(sim_loop::run(game_match, stop_rx));
    state.registry.insert_match(handle, task);
    for member in members {
        state.registry.assign_connection(member, lobby_id);
    }
    info!(match_id = %lobby_id, "match spawned from lobby");
}

async fn send_lobby_error(out_tx: &mpsc::Sender<ServerMsg>, error: &LobbyError) {
    let code = match error {
        LobbyError::NotFound => "lobby_not_found",
        LobbyError::Full => "lobby_full",
        LobbyError::AlreadyStarted => "lobby_already_started",
        LobbyError::NotHost => "not_host",
        LobbyError::AlreadyMember => "already_member",
    };
    let _ = out_tx
        .send(ServerMsg::Error {
            code: code.to_string(),
            message: error.to_string(),
        })
        .await;
}

/// Relay the current match's broadcast streams into the outbound queue.
/// The match assignment is re-checked so a connection that enters a match
/// after connecting picks the streams up, and a removed match drops them.
async fn forward_match_streams(
    connection_id: ConnectionId,
    state: AppState,
    out_tx: mpsc::Sender<ServerMsg>,
) {
    let mut current: Option<LobbyId> = None;
    let mut event_rx: Option<broadcast::Receiver<ServerMsg>> = None;
    let mut snapshot_rx: Option<broadcast::Receiver<ServerMsg>> = None;

    loop {
        let assigned = state.registry.connection_match(connection_id);
        if assigned != current {
            current = assigned;
            let handle = assigned.and_then(|id| state.registry.get_match(id));
            event_rx = handle.as_ref().map(|h| h.event_tx.subscribe());
            snapshot_rx = handle.as_ref().map(|h| h.snapshot_tx.subscribe());
        }

        let (Some(events), Some(snapshots)) = (event_rx.as_mut(), snapshot_rx.as_mut()) else {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            continue;
        };

        let mut detach = false;
        tokio::select! {
            event = events.recv() => match event {
                Ok(msg) => {
                    if out_tx.send(msg).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Events are meant to be reliable; lag here is a defect
                    // worth surfacing, not a disconnect
                    warn!(connection_id = %connection_id, lagged = n, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => detach = true,
            },
            snapshot = snapshots.recv() => match snapshot {
                Ok(msg) => {
                    if out_tx.send(msg).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Lossy by design: skip ahead, the next tick supersedes
                    debug!(connection_id = %connection_id, lagged = n, "snapshots skipped");
                }
                Err(broadcast::error::RecvError::Closed) => detach = true,
            },
        }

        if detach {
            current = None;
            event_rx = None;
            snapshot_rx = None;
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sink.send(Message::Text(json)).await
}
