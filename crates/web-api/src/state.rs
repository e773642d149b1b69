use std::sync::Arc;
use std::time::Duration;

use application::{PresenceRegistry, UserDirectory};
use application::services::{MessageService, RoomService};
use infrastructure::ConnectionHub;

use crate::auth::ConnectionAuthenticator;

#[derive(Clone)]
pub struct AppState {
    pub room_service: Arc<RoomService>,
    pub message_service: Arc<MessageService>,
    pub hub: Arc<ConnectionHub>,
    pub presence: Arc<PresenceRegistry>,
    pub directory: Arc<dyn UserDirectory>,
    pub authenticator: Arc<ConnectionAuthenticator>,
    pub heartbeat_timeout: Duration,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        room_service: Arc<RoomService>,
        message_service: Arc<MessageService>,
        hub: Arc<ConnectionHub>,
        presence: Arc<PresenceRegistry>,
        directory: Arc<dyn UserDirectory>,
        authenticator: Arc<ConnectionAuthenticator>,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            room_service,
            message_service,
            hub,
            presence,
            directory,
            authenticator,
            heartbeat_timeout,
        }
    }
}
