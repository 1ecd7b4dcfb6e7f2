use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::lead::Lead;

/// Transient map of "moved into its current column at T" timestamps. Not
/// persisted; both store writers notify it the moment they apply a column
/// change, so a freshly dropped card surfaces at the top of its new column
/// without any server-side rank field.
#[derive(Debug, Clone, Default)]
pub struct RecentMoves {
    moves: HashMap<Uuid, DateTime<Utc>>,
}

impl RecentMoves {
    pub fn note(&mut self, lead: Uuid, at: DateTime<Utc>) {
        self.moves.insert(lead, at);
    }

    pub fn moved_at(&self, lead: Uuid) -> Option<DateTime<Utc>> {
        self.moves.get(&lead).copied()
    }

    pub fn forget(&mut self, lead: Uuid) {
        self.moves.remove(&lead);
    }
}

/// Display order within a column: recently moved cards first (most recent
/// move first), then everything else by creation time descending.
pub fn rank<'a>(leads: impl IntoIterator<Item = &'a Lead>, moves: &RecentMoves) -> Vec<&'a Lead> {
    let mut ranked: Vec<&Lead> = leads.into_iter().collect();
    ranked.sort_by(|a, b| {
        match (moves.moved_at(a.id), moves.moved_at(b.id)) {
            (Some(a_move), Some(b_move)) => b_move.cmp(&a_move),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.created_at.cmp(&a.created_at),
        }
    });
    ranked
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{RecentMoves, rank};
    use crate::lead::{Lead, LeadDraft};

    fn lead_created(name: &str, minutes_ago: i64) -> Lead {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        Lead::from_draft(
            LeadDraft {
                name: name.to_string(),
                ..LeadDraft::default()
            },
            now - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn moved_cards_sort_above_settled_ones() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let old = lead_created("old", 600);
        let newer = lead_created("newer", 10);
        let moved = lead_created("moved", 300);

        let mut moves = RecentMoves::default();
        moves.note(moved.id, now);

        let ranked = rank([&old, &newer, &moved], &moves);
        let names: Vec<&str> = ranked.iter().map(|lead| lead.name.as_str()).collect();
        assert_eq!(names, ["moved", "newer", "old"]);
    }

    #[test]
    fn most_recent_move_wins_between_moved_cards() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let a = lead_created("a", 50);
        let b = lead_created("b", 40);

        let mut moves = RecentMoves::default();
        moves.note(a.id, now - Duration::minutes(5));
        moves.note(b.id, now);

        let ranked = rank([&a, &b], &moves);
        assert_eq!(ranked[0].name, "b");
    }

    #[test]
    fn rank_is_idempotent() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let a = lead_created("a", 90);
        let b = lead_created("b", 20);
        let c = lead_created("c", 45);

        let mut moves = RecentMoves::default();
        moves.note(c.id, now);

        let first: Vec<_> = rank([&a, &b, &c], &moves).iter().map(|l| l.id).collect();
        let second: Vec<_> = rank([&a, &b, &c], &moves).iter().map(|l| l.id).collect();
        assert_eq!(first, second);
    }
}
