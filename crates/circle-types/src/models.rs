use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Status label carried by a directed connection edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Requested,
    Accepted,
    Rejected,
    Cancelled,
    Unfollowed,
}

impl ConnectionStatus {
    pub const ALL: [ConnectionStatus; 5] = [
        Self::Requested,
        Self::Accepted,
        Self::Rejected,
        Self::Cancelled,
        Self::Unfollowed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Unfollowed => "unfollowed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown connection status '{0}'")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown notification type '{0}'")]
pub struct UnknownNotificationType(pub String);

impl FromStr for ConnectionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    FollowRequest,
    RequestAccept,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FollowRequest => "followRequest",
            Self::RequestAccept => "requestAccept",
        }
    }

    /// Text shown next to the source user's name.
    pub fn message(self) -> &'static str {
        match self {
            Self::FollowRequest => "Wants to follow you.",
            Self::RequestAccept => "accepted your request",
        }
    }
}

impl FromStr for NotificationType {
    type Err = UnknownNotificationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "followRequest" => Ok(Self::FollowRequest),
            "requestAccept" => Ok(Self::RequestAccept),
            other => Err(UnknownNotificationType(other.to_string())),
        }
    }
}

/// Public view of an account. Email and password hash never leave the
/// server through this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub user_name: String,
    pub full_name: String,
    /// Display URL, already resolved from the stored avatar reference.
    pub profile_pic: Option<String>,
    pub followers_count: i64,
    pub followings_count: i64,
}

/// Display fields of the user that caused a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub user_name: String,
    pub full_name: String,
    pub profile_pic: Option<String>,
}

/// Status record of one directed edge as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStatus {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub notification_type: NotificationType,
    pub from_user: UserSummary,
    pub to_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// An image post. `image` is a display URL, never a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author: UserSummary,
    pub image: String,
    pub caption: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: Uuid,
    pub author: UserSummary,
    pub image: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_label() {
        for status in ConnectionStatus::ALL {
            assert_eq!(status.as_str().parse::<ConnectionStatus>(), Ok(status));
        }
        assert!("pending".parse::<ConnectionStatus>().is_err());
        assert_eq!(
            "Requested".parse::<ConnectionStatus>().unwrap_err().to_string(),
            "unknown connection status 'Requested'"
        );
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionStatus::Unfollowed).unwrap();
        assert_eq!(json, "\"unfollowed\"");
    }

    #[test]
    fn notification_type_uses_camel_case_tags() {
        let json = serde_json::to_string(&NotificationType::FollowRequest).unwrap();
        assert_eq!(json, "\"followRequest\"");
        assert_eq!(
            "requestAccept".parse::<NotificationType>(),
            Ok(NotificationType::RequestAccept)
        );
        assert!("follow_request".parse::<NotificationType>().is_err());
    }
}
