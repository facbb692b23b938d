use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EdgeStatus, Notification, UserProfile};

/// Events pushed over the websocket gateway. Serialized as
/// `{ "type": "...", "data": { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms the session is registered
    Ready { user_id: Uuid, username: String },

    /// Full list of users with a live session
    GetOnlineUsers { user_ids: Vec<Uuid> },

    /// Someone asked to follow the recipient
    FollowRequest {
        notification: Notification,
        user_data: UserProfile,
        rev_connection_data: EdgeStatus,
    },

    /// The recipient's follow request was accepted.
    /// `connection_data` is the recipient's own edge, seen from their side.
    RequestAccepted {
        from_user_id: Uuid,
        connection_data: EdgeStatus,
        rev_connection_data: Option<EdgeStatus>,
    },

    /// The recipient's follow request was rejected
    RequestReject {
        from_user_id: Uuid,
        connection_data: EdgeStatus,
        rev_connection_data: Option<EdgeStatus>,
    },

    /// A request sent to the recipient was withdrawn
    RequestCancel {
        from_user_id: Uuid,
        rev_connection_data: EdgeStatus,
    },

    /// Someone stopped following the recipient
    UnfollowConnection {
        from_user_id: Uuid,
        rev_connection_data: EdgeStatus,
    },
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::GetOnlineUsers { .. } => "getOnlineUsers",
            Self::FollowRequest { .. } => "followRequest",
            Self::RequestAccepted { .. } => "requestAccepted",
            Self::RequestReject { .. } => "requestReject",
            Self::RequestCancel { .. } => "requestCancel",
            Self::UnfollowConnection { .. } => "unfollowConnection",
        }
    }
}
