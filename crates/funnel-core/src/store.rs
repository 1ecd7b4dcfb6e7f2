use tracing::debug;
use uuid::Uuid;

use crate::lead::{HistoryEvent, Lead};
use crate::task::Task;

/// In-memory view of the remote collections, newest first, plus the
/// currently selected lead. The mutation controller and the realtime merge
/// layer are its only writers.
#[derive(Debug, Default)]
pub struct EntityStore {
    leads: Vec<Lead>,
    tasks: Vec<Task>,
    selected: Option<Uuid>,
}

impl EntityStore {
    pub fn load_leads(&mut self, leads: Vec<Lead>) {
        debug!(count = leads.len(), "loaded leads");
        self.leads = leads;
        if let Some(id) = self.selected
            && self.lead(id).is_none()
        {
            self.selected = None;
        }
    }

    pub fn load_tasks(&mut self, tasks: Vec<Task>) {
        debug!(count = tasks.len(), "loaded tasks");
        self.tasks = tasks;
    }

    pub fn leads(&self) -> &[Lead] {
        &self.leads
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn lead(&self, id: Uuid) -> Option<&Lead> {
        self.leads.iter().find(|lead| lead.id == id)
    }

    pub(crate) fn lead_mut(&mut self, id: Uuid) -> Option<&mut Lead> {
        self.leads.iter_mut().find(|lead| lead.id == id)
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Replace in place when the id is known, prepend when it is new.
    pub fn upsert_lead(&mut self, lead: Lead) {
        match self.leads.iter_mut().find(|existing| existing.id == lead.id) {
            Some(existing) => *existing = lead,
            None => self.leads.insert(0, lead),
        }
    }

    pub fn upsert_task(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.insert(0, task),
        }
    }

    /// Removes the lead; clears the selection if it pointed at it.
    pub fn remove_lead(&mut self, id: Uuid) -> Option<Lead> {
        let index = self.leads.iter().position(|lead| lead.id == id)?;
        if self.selected == Some(id) {
            self.selected = None;
        }
        Some(self.leads.remove(index))
    }

    pub fn remove_task(&mut self, id: Uuid) -> Option<Task> {
        let index = self.tasks.iter().position(|task| task.id == id)?;
        Some(self.tasks.remove(index))
    }

    /// Splices a freshly fetched history into the owning lead without
    /// touching any other field.
    pub fn set_history(&mut self, id: Uuid, history: Vec<HistoryEvent>) {
        if let Some(lead) = self.lead_mut(id) {
            lead.history = history;
        }
    }

    pub fn select(&mut self, id: Option<Uuid>) {
        self.selected = id;
    }

    pub fn selected_id(&self) -> Option<Uuid> {
        self.selected
    }

    pub fn selected_lead(&self) -> Option<&Lead> {
        self.selected.and_then(|id| self.lead(id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::EntityStore;
    use crate::lead::{Lead, LeadDraft};

    fn lead(name: &str) -> Lead {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        Lead::from_draft(
            LeadDraft {
                name: name.to_string(),
                ..LeadDraft::default()
            },
            now,
        )
    }

    #[test]
    fn upsert_prepends_new_and_replaces_known() {
        let mut store = EntityStore::default();
        let first = lead("first");
        let second = lead("second");
        store.upsert_lead(first.clone());
        store.upsert_lead(second.clone());
        assert_eq!(store.leads()[0].id, second.id);

        let mut renamed = first.clone();
        renamed.name = "renamed".to_string();
        store.upsert_lead(renamed);
        assert_eq!(store.leads().len(), 2);
        assert_eq!(store.leads()[1].name, "renamed");
    }

    #[test]
    fn removing_the_selected_lead_clears_selection() {
        let mut store = EntityStore::default();
        let lead = lead("only");
        let id = lead.id;
        store.upsert_lead(lead);
        store.select(Some(id));
        assert!(store.selected_lead().is_some());

        store.remove_lead(id);
        assert!(store.selected_id().is_none());
        assert!(store.selected_lead().is_none());
    }
}
