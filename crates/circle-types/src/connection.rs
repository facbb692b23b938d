//! Follow-edge lifecycle.
//!
//! Every legal move of a directed edge is listed in [`transition`]; anything
//! not listed there is rejected. Callers look up the edge the operation acts
//! on (see [`ConnectionOp::edge`]), ask for the next status, and only then
//! write.

use thiserror::Error;

use crate::models::ConnectionStatus;

/// An operation issued by the authenticated caller against a counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionOp {
    Request,
    Accept,
    Reject,
    Cancel,
    Unfollow,
}

/// Which of the two edges between caller and counterpart an operation mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSide {
    /// caller -> counterpart
    Forward,
    /// counterpart -> caller
    Reverse,
}

impl ConnectionOp {
    pub const ALL: [ConnectionOp; 5] = [
        Self::Request,
        Self::Accept,
        Self::Reject,
        Self::Cancel,
        Self::Unfollow,
    ];

    /// The status the edge ends in when the operation succeeds. Clients must
    /// echo it back as the `status` query parameter.
    pub fn target_status(self) -> ConnectionStatus {
        match self {
            Self::Request => ConnectionStatus::Requested,
            Self::Accept => ConnectionStatus::Accepted,
            Self::Reject => ConnectionStatus::Rejected,
            Self::Cancel => ConnectionStatus::Cancelled,
            Self::Unfollow => ConnectionStatus::Unfollowed,
        }
    }

    /// Accept and reject answer a request that was sent *to* the caller, so
    /// they act on the counterpart's edge.
    pub fn edge(self) -> EdgeSide {
        match self {
            Self::Accept | Self::Reject => EdgeSide::Reverse,
            Self::Request | Self::Cancel | Self::Unfollow => EdgeSide::Forward,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
            Self::Unfollow => "unfollow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Connection not found.")]
    NotFound,

    #[error("Connection already {0}.")]
    AlreadyInState(ConnectionStatus),

    #[error("You already follow this user.")]
    AlreadyFollowing,

    #[error("Your request has been accepted, you can unfollow from their account.")]
    MustUnfollow,

    #[error("There is no pending request to {op}.", op = .0.name())]
    NoPendingRequest(ConnectionOp),

    #[error("You are not following this user.")]
    NotFollowing,
}

/// Next status of an edge currently in `current` (`None` when no record
/// exists) after `op`.
pub fn transition(
    current: Option<ConnectionStatus>,
    op: ConnectionOp,
) -> Result<ConnectionStatus, TransitionError> {
    use ConnectionOp as Op;
    use ConnectionStatus as S;

    match (current, op) {
        // request: first contact or re-request after the edge went dead
        (None, Op::Request) => Ok(S::Requested),
        (Some(S::Cancelled | S::Rejected | S::Unfollowed), Op::Request) => Ok(S::Requested),
        (Some(S::Requested), Op::Request) => Err(TransitionError::AlreadyInState(S::Requested)),
        (Some(S::Accepted), Op::Request) => Err(TransitionError::AlreadyFollowing),

        (Some(S::Requested), Op::Accept) => Ok(S::Accepted),
        (Some(S::Accepted), Op::Accept) => Err(TransitionError::AlreadyInState(S::Accepted)),
        (Some(S::Rejected | S::Cancelled | S::Unfollowed), Op::Accept) => {
            Err(TransitionError::NoPendingRequest(Op::Accept))
        }

        (Some(S::Requested), Op::Reject) => Ok(S::Rejected),
        (Some(S::Rejected), Op::Reject) => Err(TransitionError::AlreadyInState(S::Rejected)),
        (Some(S::Accepted | S::Cancelled | S::Unfollowed), Op::Reject) => {
            Err(TransitionError::NoPendingRequest(Op::Reject))
        }

        (Some(S::Requested), Op::Cancel) => Ok(S::Cancelled),
        (Some(S::Cancelled), Op::Cancel) => Err(TransitionError::AlreadyInState(S::Cancelled)),
        (Some(S::Accepted), Op::Cancel) => Err(TransitionError::MustUnfollow),
        (Some(S::Rejected | S::Unfollowed), Op::Cancel) => {
            Err(TransitionError::NoPendingRequest(Op::Cancel))
        }

        (Some(S::Accepted), Op::Unfollow) => Ok(S::Unfollowed),
        (Some(S::Unfollowed), Op::Unfollow) => Err(TransitionError::AlreadyInState(S::Unfollowed)),
        (Some(S::Requested | S::Rejected | S::Cancelled), Op::Unfollow) => {
            Err(TransitionError::NotFollowing)
        }

        (None, Op::Accept | Op::Reject | Op::Cancel | Op::Unfollow) => {
            Err(TransitionError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionOp as Op;
    use ConnectionStatus as S;

    fn all_states() -> Vec<Option<S>> {
        std::iter::once(None)
            .chain(S::ALL.into_iter().map(Some))
            .collect()
    }

    #[test]
    fn legal_moves_are_exactly_the_lifecycle() {
        let legal = [
            (None, Op::Request, S::Requested),
            (Some(S::Cancelled), Op::Request, S::Requested),
            (Some(S::Rejected), Op::Request, S::Requested),
            (Some(S::Unfollowed), Op::Request, S::Requested),
            (Some(S::Requested), Op::Accept, S::Accepted),
            (Some(S::Requested), Op::Reject, S::Rejected),
            (Some(S::Requested), Op::Cancel, S::Cancelled),
            (Some(S::Accepted), Op::Unfollow, S::Unfollowed),
        ];

        for current in all_states() {
            for op in Op::ALL {
                let expected = legal
                    .iter()
                    .find(|(from, o, _)| *from == current && *o == op)
                    .map(|(_, _, to)| *to);
                match (transition(current, op), expected) {
                    (Ok(next), Some(want)) => assert_eq!(next, want, "{current:?} {op:?}"),
                    (Err(_), None) => {}
                    (got, want) => panic!("{current:?} {op:?}: got {got:?}, want {want:?}"),
                }
            }
        }
    }

    #[test]
    fn successful_moves_land_on_the_target_status() {
        for current in all_states() {
            for op in Op::ALL {
                if let Ok(next) = transition(current, op) {
                    assert_eq!(next, op.target_status());
                }
            }
        }
    }

    #[test]
    fn repeating_an_operation_is_a_conflict() {
        for op in Op::ALL {
            let err = transition(Some(op.target_status()), op).unwrap_err();
            assert_eq!(err, TransitionError::AlreadyInState(op.target_status()));
        }
    }

    #[test]
    fn cancel_after_accept_asks_for_unfollow() {
        assert_eq!(
            transition(Some(S::Accepted), Op::Cancel),
            Err(TransitionError::MustUnfollow)
        );
    }

    #[test]
    fn missing_edge_is_not_found_except_for_request() {
        for op in [Op::Accept, Op::Reject, Op::Cancel, Op::Unfollow] {
            assert_eq!(transition(None, op), Err(TransitionError::NotFound));
        }
    }

    #[test]
    fn accept_and_reject_act_on_the_reverse_edge() {
        assert_eq!(Op::Accept.edge(), EdgeSide::Reverse);
        assert_eq!(Op::Reject.edge(), EdgeSide::Reverse);
        assert_eq!(Op::Request.edge(), EdgeSide::Forward);
        assert_eq!(Op::Cancel.edge(), EdgeSide::Forward);
        assert_eq!(Op::Unfollow.edge(), EdgeSide::Forward);
    }

    #[test]
    fn error_messages_read_naturally() {
        assert_eq!(
            TransitionError::AlreadyInState(S::Requested).to_string(),
            "Connection already requested."
        );
        assert_eq!(
            TransitionError::NoPendingRequest(Op::Accept).to_string(),
            "There is no pending request to accept."
        );
    }
}
