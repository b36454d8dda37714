//! Game simulation modules

pub mod collision;
pub mod constants;
pub mod item;
pub mod r#match;
pub mod mob;
pub mod player;
pub mod sim_loop;
pub mod spawner;
pub mod spell;
pub mod zone;

pub use r#match::{GameMatch, MatchHandle};

use crate::ws::protocol::{ClientMsg, ConnectionId};

/// Player input received from a WebSocket session, queued into the owning
/// match's intake
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub connection_id: ConnectionId,
    pub msg: ClientMsg,
    pub received_at: u64,
}
