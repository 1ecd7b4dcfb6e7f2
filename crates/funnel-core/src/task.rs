use anyhow::bail;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lead::ContactChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
    Rescheduled,
}

/// A follow-up task tied to a lead, keyed to a calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub date: NaiveDate,
    pub action: String,
    pub channel: ContactChannel,
    pub status: TaskStatus,

    #[serde(default)]
    pub rescheduled_to: Option<NaiveDate>,

    #[serde(default)]
    pub note: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn from_draft(draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id: draft.lead_id,
            date: draft.date,
            action: draft.action,
            channel: draft.channel,
            status: TaskStatus::Pending,
            rescheduled_to: None,
            note: draft.note,
            created_at: now,
        }
    }

    /// A rescheduled task surfaces on its new day, not the original one.
    pub fn occurs_on(&self, day: NaiveDate) -> bool {
        match (self.status, self.rescheduled_to) {
            (TaskStatus::Rescheduled, Some(moved)) => moved == day,
            (TaskStatus::Rescheduled, None) => false,
            _ => self.date == day,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub lead_id: Uuid,
    pub date: NaiveDate,
    pub action: String,
    pub channel: ContactChannel,
    pub note: Option<String>,
}

impl TaskDraft {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.action.trim().is_empty() {
            bail!("a task needs an action");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub date: Option<NaiveDate>,
    pub action: Option<String>,
    pub channel: Option<ContactChannel>,
    pub status: Option<TaskStatus>,
    pub rescheduled_to: Option<Option<NaiveDate>>,
    pub note: Option<Option<String>>,
}

impl TaskPatch {
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(date) = self.date {
            task.date = date;
        }
        if let Some(action) = &self.action {
            task.action = action.clone();
        }
        if let Some(channel) = self.channel {
            task.channel = channel;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(rescheduled_to) = self.rescheduled_to {
            task.rescheduled_to = rescheduled_to;
        }
        if let Some(note) = &self.note {
            task.note = note.clone();
        }
    }
}
