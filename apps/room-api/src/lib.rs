pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::directory::RoomDirectory;
use gateway::fanout::GatewayBroadcast;
use gateway::handler::RoomGateway;
use gateway::presence::PresenceRegistry;
use gateway::reaper::IdleReaper;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomDirectory>,
    pub presence: Arc<PresenceRegistry>,
    pub reaper: IdleReaper,
    pub gateway: RoomGateway,
}

impl AppState {
    /// Build the room services and wire them together.
    pub fn new(config: Config) -> Self {
        let rooms = Arc::new(RoomDirectory::new());
        let presence = Arc::new(PresenceRegistry::new());
        let reaper = IdleReaper::new(config.room_idle_timeout(), presence.clone(), rooms.clone());
        let gateway = RoomGateway::new(
            rooms.clone(),
            presence.clone(),
            reaper.clone(),
            Arc::new(GatewayBroadcast::new()),
        );

        Self {
            config: Arc::new(config),
            rooms,
            presence,
            reaper,
            gateway,
        }
    }
}
