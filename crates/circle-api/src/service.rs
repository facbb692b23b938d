//! Connection service: request / accept / reject / cancel / unfollow.
//!
//! Each operation runs its whole read-check-write sequence (edge status,
//! follower counters, notification) inside one database transaction, so a
//! failure part-way leaves nothing behind. The real-time push happens after
//! commit and is best-effort: a recipient without a live session simply
//! misses it and sees the stored notification on the next fetch.

use tracing::{debug, info};
use uuid::Uuid;

use circle_db::Database;
use circle_db::models::{ConnectionRow, NotificationRow, UserRow};
use circle_db::queries::{
    adjust_follow_counts, find_connection, find_user, insert_notification, write_connection,
};
use circle_types::api::ConnectionResponse;
use circle_types::connection::{ConnectionOp, EdgeSide, transition};
use circle_types::events::GatewayEvent;
use circle_types::models::NotificationType;

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};
use crate::views;

/// Everything one committed operation produced, re-read after the writes.
#[derive(Debug)]
pub struct Applied {
    pub op: ConnectionOp,
    pub caller: UserRow,
    pub counterpart: UserRow,
    /// caller -> counterpart
    pub forward: Option<ConnectionRow>,
    /// counterpart -> caller
    pub reverse: Option<ConnectionRow>,
    pub notification: Option<NotificationRow>,
}

/// Validate and apply `op` from `caller_id` towards `counterpart_id`.
///
/// `expected_status` is the client's `?status=` parameter; it must name the
/// operation's target status so a stale client cannot trigger the wrong move.
pub fn apply(
    db: &Database,
    op: ConnectionOp,
    caller_id: Uuid,
    counterpart_id: Uuid,
    expected_status: Option<&str>,
) -> Result<Applied, ApiError> {
    if expected_status != Some(op.target_status().as_str()) {
        return Err(ApiError::invalid_request());
    }
    if caller_id == counterpart_id {
        return Err(ApiError::invalid_request());
    }

    let caller_key = caller_id.to_string();
    let counterpart_key = counterpart_id.to_string();

    db.with_tx(|tx| {
        if find_user(tx, &caller_key)?.is_none() {
            return Err(ApiError::Validation("Please login again and try again.".into()));
        }
        if find_user(tx, &counterpart_key)?.is_none() {
            return Err(ApiError::user_not_found());
        }

        let (edge_from, edge_to) = match op.edge() {
            EdgeSide::Forward => (&caller_key, &counterpart_key),
            EdgeSide::Reverse => (&counterpart_key, &caller_key),
        };
        let current = find_connection(tx, edge_from, edge_to)?;
        let next = transition(current.as_ref().map(|row| row.status), op)?;

        let edge_id = current
            .map(|row| row.id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        write_connection(tx, &edge_id, edge_from, edge_to, next)?;

        match op {
            // the caller gains a follower, the requester follows one more
            ConnectionOp::Accept => {
                adjust_follow_counts(tx, &caller_key, 1, 0)?;
                adjust_follow_counts(tx, &counterpart_key, 0, 1)?;
            }
            ConnectionOp::Unfollow => {
                adjust_follow_counts(tx, &caller_key, 0, -1)?;
                adjust_follow_counts(tx, &counterpart_key, -1, 0)?;
            }
            ConnectionOp::Request | ConnectionOp::Reject | ConnectionOp::Cancel => {}
        }

        let notification = match op {
            ConnectionOp::Request => Some(NotificationType::FollowRequest),
            ConnectionOp::Accept => Some(NotificationType::RequestAccept),
            ConnectionOp::Reject | ConnectionOp::Cancel | ConnectionOp::Unfollow => None,
        }
        .map(|kind| {
            insert_notification(tx, &Uuid::new_v4().to_string(), &counterpart_key, &caller_key, kind)
        })
        .transpose()?;

        let caller = find_user(tx, &caller_key)?
            .ok_or_else(|| anyhow::anyhow!("caller {caller_key} vanished mid-transaction"))?;
        let counterpart = find_user(tx, &counterpart_key)?
            .ok_or_else(|| anyhow::anyhow!("user {counterpart_key} vanished mid-transaction"))?;

        Ok(Applied {
            op,
            caller,
            counterpart,
            forward: find_connection(tx, &caller_key, &counterpart_key)?,
            reverse: find_connection(tx, &counterpart_key, &caller_key)?,
            notification,
        })
    })
}

/// Apply an operation, push the matching gateway event to the counterpart,
/// and build the HTTP response.
///
/// `from_self_profile` only matters for cancel: the caller withdrew from
/// their own profile page, so the response carries the caller's profile.
pub async fn perform(
    state: &AppState,
    op: ConnectionOp,
    caller_id: Uuid,
    counterpart_id: Uuid,
    expected_status: Option<String>,
    from_self_profile: bool,
) -> Result<ConnectionResponse, ApiError> {
    let applied = run_blocking(state, move |s| {
        apply(&s.db, op, caller_id, counterpart_id, expected_status.as_deref())
    })
    .await?;

    info!(
        "{} ({}) {} -> {} ({})",
        applied.caller.user_name, caller_id, op.name(), applied.counterpart.user_name, counterpart_id
    );

    let media = &state.media;
    let counterpart = views::profile(&applied.counterpart, media)?;
    let forward = views::maybe_edge(applied.forward.as_ref())?;
    let reverse = views::maybe_edge(applied.reverse.as_ref())?;

    match state.dispatcher.session_for(counterpart_id).await {
        Some(session_id) => {
            let event = gateway_event(&applied, state)?;
            if !state.dispatcher.send_to_user(counterpart_id, event).await {
                debug!("session {} of {} closed before the {} push", session_id, counterpart_id, op.name());
            }
        }
        None => debug!("{} offline, skipping {} push", counterpart_id, op.name()),
    }

    let name = &applied.counterpart.full_name;
    let message = match op {
        ConnectionOp::Request => format!("Follow request sent to {name}."),
        ConnectionOp::Accept => format!("You have accepted {name}'s follow request"),
        ConnectionOp::Reject => format!("You have rejected {name}'s follow request"),
        ConnectionOp::Cancel => format!("You have cancelled your follow request to {name}"),
        ConnectionOp::Unfollow => format!("You have unfollowed {name}"),
    };

    let (user_data, request_to_remove_id) = match op {
        ConnectionOp::Cancel if from_self_profile => {
            (views::profile(&applied.caller, media)?, Some(counterpart_id))
        }
        ConnectionOp::Cancel => (counterpart, Some(counterpart_id)),
        _ => (counterpart, None),
    };

    Ok(ConnectionResponse {
        message,
        user_data,
        connection_data: forward,
        rev_connection_data: reverse,
        request_to_remove_id,
    })
}

/// The event the counterpart sees, phrased from their side: their own edge
/// is `connection_data`, the caller's edge is `rev_connection_data`.
fn gateway_event(applied: &Applied, state: &AppState) -> Result<GatewayEvent, ApiError> {
    let from_user_id = views::parse_id(&applied.caller.id)?;
    let forward = views::maybe_edge(applied.forward.as_ref())?;
    let reverse = views::maybe_edge(applied.reverse.as_ref())?;
    let missing = |side: &str| {
        ApiError::Internal(anyhow::anyhow!("{} edge missing after {}", side, applied.op.name()))
    };

    let event = match applied.op {
        ConnectionOp::Request => {
            let notification = applied
                .notification
                .as_ref()
                .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("request stored no notification")))?;
            GatewayEvent::FollowRequest {
                notification: views::notification(notification, &state.media)?,
                user_data: views::profile(&applied.caller, &state.media)?,
                rev_connection_data: forward.ok_or_else(|| missing("forward"))?,
            }
        }
        ConnectionOp::Accept => GatewayEvent::RequestAccepted {
            from_user_id,
            connection_data: reverse.ok_or_else(|| missing("reverse"))?,
            rev_connection_data: forward,
        },
        ConnectionOp::Reject => GatewayEvent::RequestReject {
            from_user_id,
            connection_data: reverse.ok_or_else(|| missing("reverse"))?,
            rev_connection_data: forward,
        },
        ConnectionOp::Cancel => GatewayEvent::RequestCancel {
            from_user_id,
            rev_connection_data: forward.ok_or_else(|| missing("forward"))?,
        },
        ConnectionOp::Unfollow => GatewayEvent::UnfollowConnection {
            from_user_id,
            rev_connection_data: forward.ok_or_else(|| missing("forward"))?,
        },
    };
    Ok(event)
}
