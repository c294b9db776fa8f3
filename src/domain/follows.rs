//! Follow relationship transitions.
//!
//! A (follower, author) pair is either not-following or following. Both
//! transitions are idempotent; the store's unique constraint backs the
//! create path.

/// What a follow request should do to the follow relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowAction {
    /// Insert the edge unless it already exists.
    CreateIfAbsent,
    /// Leave the relation untouched.
    Ignore,
}

/// Decide the follow transition for `follower_id` → `author_id`.
///
/// Following yourself is silently ignored rather than rejected.
pub fn follow_action(follower_id: i64, author_id: i64) -> FollowAction {
    if follower_id == author_id {
        FollowAction::Ignore
    } else {
        FollowAction::CreateIfAbsent
    }
}
