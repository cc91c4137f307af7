//! FIFO waitlist bookkeeping for a lobby roster.
//!
//! Waiting positions must stay a contiguous 1-based sequence in join order.
//! These helpers mutate the in-plan roster only, so a renumbering always
//! lands in the same conditional write as the join or leave that caused it.

use uuid::Uuid;

use crate::state::lobby::{Participant, ParticipantState};

/// Position a newly waitlisted participant takes: one past the current tail.
pub fn next_position(roster: &[Participant]) -> u32 {
    roster
        .iter()
        .filter(|row| row.state == ParticipantState::Waiting)
        .count() as u32
        + 1
}

/// Move the head of the waitlist into an active slot.
///
/// The promoted row keeps its identity and join time; every other waiting
/// row shifts down by one. Returns the promoted user, or `None` when nobody
/// is waiting.
pub fn promote_first(roster: &mut [Participant]) -> Option<Uuid> {
    let head = roster
        .iter_mut()
        .find(|row| row.state == ParticipantState::Waiting && row.waiting_position == Some(1))?;

    head.state = ParticipantState::Active;
    head.waiting_position = None;
    let promoted = head.user_id;

    remove_and_renumber(roster, 1);
    Some(promoted)
}

/// Close the gap left by the waiting row that held `removed_position`.
///
/// Every waiting row behind the removed one shifts down by one; rows at or
/// before it keep their rank.
pub fn remove_and_renumber(roster: &mut [Participant], removed_position: u32) {
    for row in roster.iter_mut() {
        if row.state != ParticipantState::Waiting {
            continue;
        }
        match row.waiting_position {
            Some(position) if position > removed_position => {
                row.waiting_position = Some(position - 1);
            }
            _ => {}
        }
    }
}
