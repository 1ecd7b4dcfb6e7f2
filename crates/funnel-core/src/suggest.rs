use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{day_of, days_since};
use crate::lead::{ContactChannel, HistoryEvent, HistoryKind, Lead, QuoteStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    FirstContactFollowUp,
    MediaFeedback,
    QuoteFollowUp,
    LastAttempt,
}

/// Evaluation order. Each rule inspects one lead and yields at most one
/// suggestion, so `(lead, rule)` identifies a suggestion across batches.
pub const RULES: [Rule; 4] = [
    Rule::FirstContactFollowUp,
    Rule::MediaFeedback,
    Rule::QuoteFollowUp,
    Rule::LastAttempt,
];

impl Rule {
    pub fn label(&self) -> &'static str {
        match self {
            Rule::FirstContactFollowUp => "first contact follow-up",
            Rule::MediaFeedback => "media feedback",
            Rule::QuoteFollowUp => "quote follow-up",
            Rule::LastAttempt => "last attempt",
        }
    }
}

/// Stable identity for accepting/dismissing a suggestion. Deliberately
/// excludes the batch position: one rule fires at most once per lead, so the
/// pair survives reordering between generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionKey {
    pub lead: Uuid,
    pub rule: Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub lead: Uuid,
    pub lead_name: String,
    pub rule: Rule,
    pub action: String,
    pub channel: ContactChannel,
    pub reason: String,
    pub date: NaiveDate,
    pub days_waiting: i64,
}

impl Suggestion {
    pub fn key(&self) -> SuggestionKey {
        SuggestionKey {
            lead: self.lead,
            rule: self.rule,
        }
    }
}

/// Suggestion identities the user accepted or dismissed; regeneration
/// filters against it so handled suggestions never resurface.
#[derive(Debug, Clone, Default)]
pub struct DismissalSet {
    keys: HashSet<SuggestionKey>,
}

impl DismissalSet {
    pub fn new(keys: Vec<SuggestionKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn record(&mut self, key: SuggestionKey) {
        self.keys.insert(key);
    }

    pub fn contains(&self, key: &SuggestionKey) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> Vec<SuggestionKey> {
        let mut keys: Vec<SuggestionKey> = self.keys.iter().copied().collect();
        keys.sort_by(|a, b| a.lead.cmp(&b.lead).then(a.rule.label().cmp(b.rule.label())));
        keys
    }
}

/// Full recomputation over the current leads; volume is low and a fresh pass
/// is simpler than incremental bookkeeping.
pub fn generate(leads: &[Lead], now: DateTime<Utc>) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = Vec::new();
    for lead in leads {
        for rule in RULES {
            if let Some(suggestion) = check(rule, lead, now) {
                suggestions.push(suggestion);
            }
        }
    }
    suggestions.sort_by_key(|suggestion| std::cmp::Reverse(suggestion.days_waiting));
    suggestions
}

fn check(rule: Rule, lead: &Lead, now: DateTime<Utc>) -> Option<Suggestion> {
    let days = days_since(lead.last_contact, now);
    match rule {
        Rule::FirstContactFollowUp => {
            if lead.column_id != "contacted" || days < 2 {
                return None;
            }
            let last = lead.history.last()?;
            if !looks_outbound(last) || has_earlier_reply(&lead.history) {
                return None;
            }
            Some(build(
                lead,
                rule,
                format!("Follow up with {} – message 2", lead.name),
                format!("First contact {days} days ago with no reply"),
                now,
                days,
            ))
        }
        Rule::MediaFeedback => {
            if !matches!(lead.column_id.as_str(), "visit_pending" | "negotiation") || days < 1 {
                return None;
            }
            let last = lead.history.last()?;
            if !contains_any(&last.text, &["video", "demo", "loom"]) {
                return None;
            }
            Some(build(
                lead,
                rule,
                format!("Ask for feedback on the video – {}", lead.name),
                format!("Video sent {days} day(s) ago with no reply"),
                now,
                days,
            ))
        }
        Rule::QuoteFollowUp => {
            if lead.column_id != "quote_sent" || !(2..=3).contains(&days) {
                return None;
            }
            let quote_evidence = lead.quote_status == QuoteStatus::Sent
                || lead
                    .history
                    .last()
                    .is_some_and(|event| contains_any(&event.text, &["quote", "proposal"]));
            if !quote_evidence {
                return None;
            }
            Some(build(
                lead,
                rule,
                format!("Follow up on the quote – {}", lead.name),
                format!("Quote sent {days} days ago with no reply"),
                now,
                days,
            ))
        }
        Rule::LastAttempt => {
            if !matches!(lead.column_id.as_str(), "contacted" | "visit_pending") || days < 5 {
                return None;
            }
            Some(build(
                lead,
                rule,
                format!("Last attempt to reach {}", lead.name),
                format!("No reply for {days} days"),
                now,
                days,
            ))
        }
    }
}

fn build(
    lead: &Lead,
    rule: Rule,
    action: String,
    reason: String,
    now: DateTime<Utc>,
    days: i64,
) -> Suggestion {
    Suggestion {
        lead: lead.id,
        lead_name: lead.name.clone(),
        rule,
        action,
        channel: first_channel(lead),
        reason,
        date: day_of(now),
        days_waiting: days,
    }
}

fn first_channel(lead: &Lead) -> ContactChannel {
    lead.contact_channels
        .first()
        .copied()
        .unwrap_or(ContactChannel::Whatsapp)
}

fn looks_outbound(event: &HistoryEvent) -> bool {
    event.kind == HistoryKind::Contact
        || contains_any(&event.text, &["message", "sent", "whatsapp", "instagram"])
}

fn has_earlier_reply(history: &[HistoryEvent]) -> bool {
    history
        .iter()
        .rev()
        .skip(1)
        .any(|event| contains_any(&event.text, &["replied", "responded", "answered"]))
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    let haystack = text.to_lowercase();
    needles.iter().any(|needle| haystack.contains(needle))
}
