use std::collections::HashMap;
use std::collections::VecDeque;

use anyhow::bail;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::column::{Column, ColumnCatalog, ColumnPatch};
use crate::drag::{DragState, HoverHalf};
use crate::gateway::{ChangeKind, Effect, RemoteEvent, Ticket};
use crate::lead::{ContactChannel, HistoryEvent, Lead, LeadDraft, LeadPatch, Service};
use crate::order::ColumnOrder;
use crate::profile::BoardProfile;
use crate::rank::{RecentMoves, rank};
use crate::store::EntityStore;
use crate::suggest::{self, DismissalSet, Suggestion, SuggestionKey};
use crate::task::{Task, TaskDraft, TaskPatch, TaskStatus};

/// Snapshot held for one in-flight mutation. Failure inverts exactly the
/// optimistic application that created it, nothing more.
#[derive(Debug, Clone)]
enum Rollback {
    LeadUpdated(Lead),
    LeadCreated(Uuid),
    LeadDeleted(Lead),
    TaskUpdated(Task),
    TaskCreated(Uuid),
    TaskDeleted(Task),
}

/// One in-flight optimistic mutation: how to undo it, and which history
/// events to append remotely once the primary write is confirmed. Appending
/// only after confirmation keeps a rolled-back mutation from leaving its
/// activity event behind on the server.
#[derive(Debug, Clone)]
struct PendingMutation {
    rollback: Rollback,
    history: Vec<HistoryEvent>,
}

/// The board engine: entity store, optimistic mutation controller, realtime
/// merge layer, column order, card ranking, drag state, and suggestions,
/// behind one owned object. All methods are synchronous; remote work leaves
/// as [`Effect`] values and comes back through the resolution methods.
#[derive(Debug, Default)]
pub struct Engine {
    store: EntityStore,
    catalog: ColumnCatalog,
    order: ColumnOrder,
    moves: RecentMoves,
    drag: DragState,
    dismissed: DismissalSet,
    pending: HashMap<Ticket, PendingMutation>,
    outbox: VecDeque<Effect>,
    next_ticket: u64,
    last_error: Option<String>,
}

impl Engine {
    pub fn new(profile: BoardProfile) -> Self {
        let catalog = ColumnCatalog::new(profile.custom_columns);
        let mut order = ColumnOrder::new(profile.column_order);
        order.sync(&catalog.known_ids());

        Self {
            catalog,
            order,
            dismissed: DismissalSet::new(profile.dismissed),
            ..Self::default()
        }
    }

    /// Snapshot of everything persisted outside the remote store.
    pub fn profile(&self) -> BoardProfile {
        BoardProfile {
            column_order: self.order.ids().to_vec(),
            custom_columns: self.catalog.custom_columns().to_vec(),
            dismissed: self.dismissed.keys(),
        }
    }

    pub fn load_leads(&mut self, leads: Vec<Lead>) {
        self.store.load_leads(leads);
    }

    pub fn load_tasks(&mut self, tasks: Vec<Task>) {
        self.store.load_tasks(tasks);
    }

    // ---- read side -------------------------------------------------------

    pub fn leads(&self) -> &[Lead] {
        self.store.leads()
    }

    pub fn lead(&self, id: Uuid) -> Option<&Lead> {
        self.store.lead(id)
    }

    pub fn search(&self, query: &str) -> Vec<&Lead> {
        let needle = query.to_lowercase();
        self.store
            .leads()
            .iter()
            .filter(|lead| {
                lead.name.to_lowercase().contains(&needle)
                    || lead.project_type.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.store.task(id)
    }

    pub fn tasks_on(&self, day: NaiveDate) -> Vec<&Task> {
        self.store
            .tasks()
            .iter()
            .filter(|task| task.occurs_on(day))
            .collect()
    }

    pub fn pending_tasks_on(&self, day: NaiveDate) -> Vec<&Task> {
        self.tasks_on(day)
            .into_iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .collect()
    }

    pub fn columns(&self) -> &ColumnCatalog {
        &self.catalog
    }

    pub fn ordered_columns(&self) -> Vec<Column> {
        self.order.ordered(&self.catalog)
    }

    /// Ranked cards for one column: recently dropped cards first, then
    /// newest created.
    pub fn column_cards(&self, column_id: &str) -> Vec<&Lead> {
        let in_column = self
            .store
            .leads()
            .iter()
            .filter(|lead| lead.column_id == column_id);
        rank(in_column, &self.moves)
    }

    pub fn suggestions(&self, now: DateTime<Utc>) -> Vec<Suggestion> {
        suggest::generate(self.store.leads(), now)
            .into_iter()
            .filter(|suggestion| !self.dismissed.contains(&suggestion.key()))
            .collect()
    }

    pub fn drag(&self) -> &DragState {
        &self.drag
    }

    pub fn selected_lead(&self) -> Option<&Lead> {
        self.store.selected_lead()
    }

    pub fn selected_id(&self) -> Option<Uuid> {
        self.store.selected_id()
    }

    pub fn select_lead(&mut self, id: Option<Uuid>) -> anyhow::Result<()> {
        if let Some(id) = id
            && self.store.lead(id).is_none()
        {
            bail!("unknown lead: {id}");
        }
        self.store.select(id);
        Ok(())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn report_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Drains the queued remote work. The host performs it and answers via
    /// the confirm/fail/ingest methods.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        self.outbox.drain(..).collect()
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.pending.is_empty()
    }

    // ---- optimistic mutation controller ----------------------------------

    #[instrument(skip(self, draft))]
    pub fn create_lead(&mut self, draft: LeadDraft, now: DateTime<Utc>) -> anyhow::Result<Ticket> {
        draft.validate()?;
        let lead = Lead::from_draft(draft, now);
        let id = lead.id;
        debug!(lead = %id, "creating lead optimistically");

        self.store.upsert_lead(lead.clone());
        let history = lead.history.clone();
        let ticket = self.issue(Rollback::LeadCreated(id), history);
        self.outbox.push_back(Effect::CreateLead { ticket, lead });
        Ok(ticket)
    }

    /// Generic field update; the merged patch re-asserts `contact_channels`
    /// and `services` so a partial remote write cannot drop them.
    pub fn update_lead(
        &mut self,
        id: Uuid,
        patch: LeadPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Ticket> {
        self.submit_lead_update(id, patch, None, now)
    }

    #[instrument(skip(self))]
    pub fn move_lead(
        &mut self,
        id: Uuid,
        column_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Ticket> {
        let Some(column) = self.catalog.get(column_id) else {
            bail!("unknown column: {column_id}");
        };
        let activity = format!("Status updated: {}", column.title);
        let patch = LeadPatch {
            column_id: Some(column_id.to_string()),
            last_contact: Some(now),
            context: Some(activity.clone()),
            ..LeadPatch::default()
        };
        self.submit_lead_update(id, patch, Some(HistoryEvent::system(activity, now)), now)
    }

    pub fn rename_lead(
        &mut self,
        id: Uuid,
        name: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Ticket> {
        if name.trim().is_empty() {
            bail!("a lead needs a name");
        }
        let patch = LeadPatch {
            name: Some(name.to_string()),
            ..LeadPatch::default()
        };
        self.submit_lead_update(id, patch, None, now)
    }

    pub fn add_note(
        &mut self,
        id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Ticket> {
        if text.trim().is_empty() {
            bail!("a note needs some text");
        }
        let patch = LeadPatch {
            context: Some(text.to_string()),
            last_contact: Some(now),
            ..LeadPatch::default()
        };
        self.submit_lead_update(id, patch, Some(HistoryEvent::note(text, now)), now)
    }

    /// Toggles a contact channel. Turning the first channel on for a lead
    /// still in `new` promotes it to `contacted` with a system event — the
    /// "first contact" transition.
    #[instrument(skip(self))]
    pub fn toggle_channel(
        &mut self,
        id: Uuid,
        channel: ContactChannel,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Ticket> {
        let Some(lead) = self.store.lead(id) else {
            bail!("unknown lead: {id}");
        };

        let mut channels = lead.contact_channels.clone();
        let mut patch = LeadPatch::default();
        let mut event = None;

        if channels.contains(&channel) {
            channels.retain(|existing| *existing != channel);
            patch.contact_channels = Some(channels);
        } else {
            channels.push(channel);
            patch.contact_channels = Some(channels);
            patch.last_contact = Some(now);

            if lead.column_id == "new" {
                let activity = "First contact made".to_string();
                patch.column_id = Some("contacted".to_string());
                patch.context = Some(activity.clone());
                event = Some(HistoryEvent::system(activity, now));
            }
        }

        self.submit_lead_update(id, patch, event, now)
    }

    pub fn set_services(
        &mut self,
        id: Uuid,
        services: Vec<Service>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Ticket> {
        let patch = LeadPatch {
            services: Some(services),
            ..LeadPatch::default()
        };
        self.submit_lead_update(id, patch, None, now)
    }

    #[instrument(skip(self))]
    pub fn delete_lead(&mut self, id: Uuid) -> anyhow::Result<Ticket> {
        let Some(snapshot) = self.store.remove_lead(id) else {
            bail!("unknown lead: {id}");
        };
        self.moves.forget(id);
        let ticket = self.issue(Rollback::LeadDeleted(snapshot), Vec::new());
        self.outbox.push_back(Effect::DeleteLead { ticket, id });
        Ok(ticket)
    }

    #[instrument(skip(self, draft))]
    pub fn create_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<Ticket> {
        draft.validate()?;
        if self.store.lead(draft.lead_id).is_none() {
            bail!("unknown lead: {}", draft.lead_id);
        }

        let task = Task::from_draft(draft, now);
        let id = task.id;
        self.store.upsert_task(task.clone());
        let ticket = self.issue(Rollback::TaskCreated(id), Vec::new());
        self.outbox.push_back(Effect::CreateTask { ticket, task });
        Ok(ticket)
    }

    pub fn update_task(&mut self, id: Uuid, patch: TaskPatch) -> anyhow::Result<Ticket> {
        self.submit_task_update(id, patch)
    }

    pub fn complete_task(&mut self, id: Uuid) -> anyhow::Result<Ticket> {
        let patch = TaskPatch {
            status: Some(TaskStatus::Done),
            ..TaskPatch::default()
        };
        self.submit_task_update(id, patch)
    }

    pub fn reschedule_task(&mut self, id: Uuid, to: NaiveDate) -> anyhow::Result<Ticket> {
        let patch = TaskPatch {
            status: Some(TaskStatus::Rescheduled),
            rescheduled_to: Some(Some(to)),
            ..TaskPatch::default()
        };
        self.submit_task_update(id, patch)
    }

    #[instrument(skip(self))]
    pub fn delete_task(&mut self, id: Uuid) -> anyhow::Result<Ticket> {
        let Some(snapshot) = self.store.remove_task(id) else {
            bail!("unknown task: {id}");
        };
        let ticket = self.issue(Rollback::TaskDeleted(snapshot), Vec::new());
        self.outbox.push_back(Effect::DeleteTask { ticket, id });
        Ok(ticket)
    }

    fn submit_lead_update(
        &mut self,
        id: Uuid,
        patch: LeadPatch,
        event: Option<HistoryEvent>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Ticket> {
        let Some(current) = self.store.lead(id) else {
            bail!("unknown lead: {id}");
        };
        let patch = patch.reasserted_for(current);
        let snapshot = current.clone();

        if let Some(target) = patch.column_id.as_deref()
            && target != snapshot.column_id
        {
            self.moves.note(id, now);
        }

        if let Some(lead) = self.store.lead_mut(id) {
            patch.apply_to(lead);
            if let Some(event) = &event {
                lead.history.push(event.clone());
            }
        }

        let ticket = self.issue(Rollback::LeadUpdated(snapshot), event.into_iter().collect());
        self.outbox.push_back(Effect::UpdateLead {
            ticket,
            id,
            fields: patch,
        });
        Ok(ticket)
    }

    fn submit_task_update(&mut self, id: Uuid, patch: TaskPatch) -> anyhow::Result<Ticket> {
        let Some(current) = self.store.task(id) else {
            bail!("unknown task: {id}");
        };
        let snapshot = current.clone();

        let mut updated = snapshot.clone();
        patch.apply_to(&mut updated);
        self.store.upsert_task(updated);

        let ticket = self.issue(Rollback::TaskUpdated(snapshot), Vec::new());
        self.outbox.push_back(Effect::UpdateTask {
            ticket,
            id,
            fields: patch,
        });
        Ok(ticket)
    }

    fn issue(&mut self, rollback: Rollback, history: Vec<HistoryEvent>) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.pending.insert(ticket, PendingMutation { rollback, history });
        ticket
    }

    // ---- reconciliation --------------------------------------------------

    /// Success path: the server row replaces the optimistic one, except that
    /// an omitted (empty) `contact_channels`/`services`/`history` means
    /// "unchanged", never "cleared". The mutation's history events go out
    /// now that the primary write stuck; the append is reconciled by a full
    /// history re-fetch afterwards, which makes it idempotent.
    #[instrument(skip(self, row))]
    pub fn confirm_lead(&mut self, ticket: Ticket, row: Lead) {
        let Some(pending) = self.pending.remove(&ticket) else {
            warn!(?ticket, "resolution for an unknown ticket");
            return;
        };

        match pending.rollback {
            Rollback::LeadUpdated(_) | Rollback::LeadCreated(_) => {
                let mut confirmed = row;
                if let Some(current) = self.store.lead(confirmed.id) {
                    if confirmed.contact_channels.is_empty()
                        && !current.contact_channels.is_empty()
                    {
                        confirmed.contact_channels = current.contact_channels.clone();
                    }
                    if confirmed.services.is_empty() && !current.services.is_empty() {
                        confirmed.services = current.services.clone();
                    }
                    if confirmed.history.is_empty() && !current.history.is_empty() {
                        confirmed.history = current.history.clone();
                    }
                }
                let id = confirmed.id;
                self.store.upsert_lead(confirmed);
                for event in pending.history {
                    self.outbox.push_back(Effect::AppendHistory { lead: id, event });
                }
            }
            other => warn!(?other, "lead confirmation for a mismatched mutation"),
        }
    }

    #[instrument(skip(self, row))]
    pub fn confirm_task(&mut self, ticket: Ticket, row: Task) {
        let Some(pending) = self.pending.remove(&ticket) else {
            warn!(?ticket, "resolution for an unknown ticket");
            return;
        };

        match pending.rollback {
            Rollback::TaskUpdated(_) | Rollback::TaskCreated(_) => {
                self.store.upsert_task(row);
            }
            other => warn!(?other, "task confirmation for a mismatched mutation"),
        }
    }

    /// Success path for deletes: nothing to merge, the row is already gone.
    pub fn confirm_removal(&mut self, ticket: Ticket) {
        if self.pending.remove(&ticket).is_none() {
            warn!(?ticket, "resolution for an unknown ticket");
        }
    }

    /// Failure path: restore the pre-mutation snapshot and surface a single
    /// user-visible message. The snapshot may itself be stale when another
    /// mutation started later; that is accepted, not defended against.
    #[instrument(skip(self, message))]
    pub fn fail(&mut self, ticket: Ticket, message: impl Into<String>) {
        if let Some(pending) = self.pending.remove(&ticket) {
            match pending.rollback {
                Rollback::LeadUpdated(snapshot) | Rollback::LeadDeleted(snapshot) => {
                    self.store.upsert_lead(snapshot);
                }
                Rollback::LeadCreated(id) => {
                    self.store.remove_lead(id);
                }
                Rollback::TaskUpdated(snapshot) | Rollback::TaskDeleted(snapshot) => {
                    self.store.upsert_task(snapshot);
                }
                Rollback::TaskCreated(id) => {
                    self.store.remove_task(id);
                }
            }
        } else {
            warn!(?ticket, "failure for an unknown ticket");
        }
        self.last_error = Some(message.into());
    }

    // ---- realtime merge layer --------------------------------------------

    /// Entry point for pushed change notifications. Inserts and updates
    /// request an authoritative refresh; deletes apply immediately.
    #[instrument(skip(self))]
    pub fn on_remote_event(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::Lead {
                kind: ChangeKind::Delete,
                id,
            } => {
                debug!(lead = %id, "remote lead delete");
                self.store.remove_lead(id);
                self.moves.forget(id);
            }
            RemoteEvent::Lead { id, .. } => {
                self.outbox.push_back(Effect::FetchLead { id });
            }
            RemoteEvent::LeadHistory { lead } => {
                self.outbox.push_back(Effect::FetchHistory { lead });
            }
            RemoteEvent::Task {
                kind: ChangeKind::Delete,
                id,
            } => {
                debug!(task = %id, "remote task delete");
                self.store.remove_task(id);
            }
            RemoteEvent::Task { id, .. } => {
                self.outbox.push_back(Effect::FetchTask { id });
            }
        }
    }

    /// Last-write-wins upsert of an authoritative row. A column change
    /// arriving from another session bumps the card like a local drag would.
    pub fn ingest_lead(&mut self, lead: Lead, now: DateTime<Utc>) {
        if let Some(previous) = self.store.lead(lead.id)
            && previous.column_id != lead.column_id
        {
            self.moves.note(lead.id, now);
        }
        self.store.upsert_lead(lead);
    }

    pub fn ingest_lead_history(&mut self, lead: Uuid, history: Vec<HistoryEvent>) {
        self.store.set_history(lead, history);
    }

    pub fn ingest_task(&mut self, task: Task) {
        self.store.upsert_task(task);
    }

    // ---- drag interaction ------------------------------------------------

    pub fn begin_card_drag(&mut self, lead: Uuid) {
        if self.store.lead(lead).is_none() {
            debug!(lead = %lead, "drag start for an unknown lead");
            return;
        }
        self.drag.start_card(lead);
    }

    pub fn drag_card_over(&mut self, column_id: &str) {
        self.drag.card_over(column_id);
    }

    pub fn drag_card_leave(&mut self) {
        self.drag.card_leave();
    }

    /// Card drop: runs the column-change mutation for the dragged lead.
    /// Returns `Ok(None)` when no card drag was active — including while a
    /// column drag is live, which suppresses card drops entirely.
    pub fn drop_card(
        &mut self,
        column_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Ticket>> {
        let Some(lead) = self.drag.drop_card() else {
            return Ok(None);
        };
        self.move_lead(lead, column_id, now).map(Some)
    }

    pub fn begin_column_drag(&mut self, column_id: &str) {
        if !self.catalog.contains(column_id) {
            debug!(column_id, "drag start for an unknown column");
            return;
        }
        self.drag.start_column(column_id);
    }

    pub fn drag_column_over(&mut self, column_index: usize, half: HoverHalf) {
        self.drag.column_over(column_index, half);
    }

    /// Column drop: applies the reorder recorded by the hover tracking.
    /// Returns whether an order change happened.
    pub fn drop_column(&mut self) -> bool {
        let Some((column, index)) = self.drag.drop_column() else {
            return false;
        };
        self.order.reorder(&column, index);
        true
    }

    pub fn cancel_drag(&mut self) {
        self.drag.cancel();
    }

    // ---- columns ---------------------------------------------------------

    pub fn add_column(&mut self, column: Column) -> anyhow::Result<()> {
        self.catalog.add(column)?;
        self.order.sync(&self.catalog.known_ids());
        Ok(())
    }

    pub fn update_column(&mut self, id: &str, patch: ColumnPatch) -> anyhow::Result<()> {
        self.catalog.update(id, patch)?;
        self.order.sync(&self.catalog.known_ids());
        Ok(())
    }

    pub fn remove_column(&mut self, id: &str) -> anyhow::Result<()> {
        let occupied = self
            .store
            .leads()
            .iter()
            .filter(|lead| lead.column_id == id)
            .count();
        if occupied > 0 {
            bail!("column {id} still has {occupied} lead(s)");
        }
        self.catalog.remove(id)?;
        self.order.sync(&self.catalog.known_ids());
        Ok(())
    }

    pub fn reorder_columns(&mut self, moved_id: &str, target_index: usize) {
        self.order.reorder(moved_id, target_index);
    }

    // ---- suggestions -----------------------------------------------------

    pub fn dismiss_suggestion(&mut self, key: SuggestionKey) {
        self.dismissed.record(key);
    }

    /// Converts a suggestion into a real task. The caller may have edited
    /// the draft first; the suggestion identity is retired either way once
    /// the task is accepted.
    pub fn accept_suggestion(
        &mut self,
        key: SuggestionKey,
        draft: TaskDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Ticket> {
        let ticket = self.create_task(draft, now)?;
        self.dismissed.record(key);
        Ok(ticket)
    }
}
