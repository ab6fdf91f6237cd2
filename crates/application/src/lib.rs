//! 应用层。
//!
//! 编排领域模型与仓储，承载在线状态注册表、消息事务用例和实时扇出。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod presence;
pub mod repository;
pub mod services;

pub use broadcaster::{BroadcastError, EventBroadcaster, PresenceFanout, ServerEvent};
pub use clock::{Clock, SystemClock};
pub use dto::{ConversationDto, ConversationSummaryDto, MessageDto, ParticipantDto};
pub use error::ApplicationError;
pub use presence::{ConnectionId, PresenceRegistry};
pub use repository::{ConversationRepository, MessageRepository, UserRepository};
