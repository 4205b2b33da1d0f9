use std::cmp::Ordering;

use crate::{dto::fff::LeaderboardEntry, state::game::OptionKey};

/// A participant whose ordering reached the FFF screen.
#[derive(Debug, Clone, PartialEq)]
pub struct FffParticipant {
    /// Unique name within the round.
    pub name: String,
    /// Submitted ordering.
    pub answer_order: Vec<OptionKey>,
    /// Seconds to complete the ordering.
    pub time: f64,
    /// Whether the ordering equals the canonical one.
    pub correct: bool,
}

impl FffParticipant {
    /// Score a submission against `correct_order`.
    pub fn new(name: String, answer_order: Vec<OptionKey>, time: f64, correct_order: &[OptionKey]) -> Self {
        let correct = answer_order == correct_order;
        Self {
            name,
            answer_order,
            time,
            correct,
        }
    }
}

/// Correct orderings first, then by time within each group.
pub fn rank(participants: &[FffParticipant]) -> Vec<LeaderboardEntry> {
    let mut ordered: Vec<&FffParticipant> = participants.iter().collect();
    ordered.sort_by(|left, right| match (left.correct, right.correct) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => left.time.total_cmp(&right.time),
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, participant)| LeaderboardEntry {
            rank: index + 1,
            name: participant.name.clone(),
            answer_order: participant.answer_order.clone(),
            time: participant.time,
            correct: participant.correct,
        })
        .collect()
}

/// The first `limit` ranked entries.
pub fn leaderboard(participants: &[FffParticipant], limit: usize) -> Vec<LeaderboardEntry> {
    let mut entries = rank(participants);
    entries.truncate(limit);
    entries
}
