use std::sync::Arc;

use application::{PresenceRegistry, services::MessageService};

use crate::auth::JwtService;

/// 路由层共享状态。
#[derive(Clone)]
pub struct AppState {
    pub message_service: Arc<MessageService>,
    pub presence: Arc<PresenceRegistry>,
    pub jwt_service: JwtService,
}

impl AppState {
    pub fn new(
        message_service: Arc<MessageService>,
        presence: Arc<PresenceRegistry>,
        jwt_service: JwtService,
    ) -> Self {
        Self {
            message_service,
            presence,
            jwt_service,
        }
    }
}
