use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::lead::{HistoryEvent, Lead, LeadPatch};
use crate::task::{Task, TaskPatch};

/// Handle for one in-flight optimistic mutation. Resolution (confirm or
/// fail) is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A push notification from the remote store. The push subscription itself
/// lives in the host: whatever channel it uses, events end up in
/// [`Engine::on_remote_event`]; dropping that wiring is the unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEvent {
    Lead { kind: ChangeKind, id: Uuid },
    LeadHistory { lead: Uuid },
    Task { kind: ChangeKind, id: Uuid },
}

/// Remote work the engine has queued. The engine never performs IO; a host
/// drains these and answers through the resolution methods, so an
/// outstanding request suspends nothing but itself.
#[derive(Debug, Clone)]
pub enum Effect {
    CreateLead { ticket: Ticket, lead: Lead },
    UpdateLead { ticket: Ticket, id: Uuid, fields: LeadPatch },
    DeleteLead { ticket: Ticket, id: Uuid },
    AppendHistory { lead: Uuid, event: HistoryEvent },
    FetchLead { id: Uuid },
    FetchHistory { lead: Uuid },
    CreateTask { ticket: Ticket, task: Task },
    UpdateTask { ticket: Ticket, id: Uuid, fields: TaskPatch },
    DeleteTask { ticket: Ticket, id: Uuid },
    FetchTask { id: Uuid },
}

/// The remote persistence service, as far as the engine cares: CRUD per
/// collection plus the history side table. Fetches of single rows return the
/// row with its history joined.
pub trait RemoteGateway {
    fn fetch_leads(&mut self) -> anyhow::Result<Vec<Lead>>;
    fn fetch_lead(&mut self, id: Uuid) -> anyhow::Result<Option<Lead>>;
    fn create_lead(&mut self, lead: &Lead) -> anyhow::Result<Lead>;
    fn update_lead(&mut self, id: Uuid, fields: &LeadPatch) -> anyhow::Result<Lead>;
    fn delete_lead(&mut self, id: Uuid) -> anyhow::Result<()>;
    fn append_history(&mut self, lead: Uuid, event: &HistoryEvent) -> anyhow::Result<()>;
    fn fetch_history(&mut self, lead: Uuid) -> anyhow::Result<Vec<HistoryEvent>>;
    fn fetch_tasks(&mut self) -> anyhow::Result<Vec<Task>>;
    fn fetch_task(&mut self, id: Uuid) -> anyhow::Result<Option<Task>>;
    fn create_task(&mut self, task: &Task) -> anyhow::Result<Task>;
    fn update_task(&mut self, id: Uuid, fields: &TaskPatch) -> anyhow::Result<Task>;
    fn delete_task(&mut self, id: Uuid) -> anyhow::Result<()>;
}

/// Drains queued effects against a gateway until the queue is dry, feeding
/// every outcome back into the engine. One possible schedule of the
/// interleaving a long-lived host would drive; failures on ticketed writes
/// roll back, failures on refreshes are logged and skipped.
pub fn pump(engine: &mut Engine, gateway: &mut dyn RemoteGateway, now: DateTime<Utc>) {
    loop {
        let effects = engine.take_effects();
        if effects.is_empty() {
            return;
        }

        for effect in effects {
            run_effect(engine, gateway, effect, now);
        }
    }
}

fn run_effect(engine: &mut Engine, gateway: &mut dyn RemoteGateway, effect: Effect, now: DateTime<Utc>) {
    match effect {
        Effect::CreateLead { ticket, lead } => match gateway.create_lead(&lead) {
            Ok(row) => engine.confirm_lead(ticket, row),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "lead create failed");
                engine.fail(ticket, "Failed to create the lead. Try again.");
            }
        },
        Effect::UpdateLead { ticket, id, fields } => match gateway.update_lead(id, &fields) {
            Ok(row) => engine.confirm_lead(ticket, row),
            Err(err) => {
                warn!(lead = %id, error = %format!("{err:#}"), "lead update failed");
                engine.fail(ticket, "Failed to update the lead. Try again.");
            }
        },
        Effect::DeleteLead { ticket, id } => match gateway.delete_lead(id) {
            Ok(()) => engine.confirm_removal(ticket),
            Err(err) => {
                warn!(lead = %id, error = %format!("{err:#}"), "lead delete failed");
                engine.fail(ticket, "Failed to delete the lead.");
            }
        },
        Effect::AppendHistory { lead, event } => match gateway.append_history(lead, &event) {
            Ok(()) => match gateway.fetch_history(lead) {
                Ok(history) => engine.ingest_lead_history(lead, history),
                Err(err) => {
                    warn!(lead = %lead, error = %format!("{err:#}"), "history refresh failed; keeping local timeline");
                }
            },
            Err(err) => {
                warn!(lead = %lead, error = %format!("{err:#}"), "history append failed");
                engine.report_error("Failed to record the activity.");
            }
        },
        Effect::FetchLead { id } => match gateway.fetch_lead(id) {
            Ok(Some(lead)) => engine.ingest_lead(lead, now),
            Ok(None) => debug!(lead = %id, "remote row vanished before refresh"),
            Err(err) => {
                warn!(lead = %id, error = %format!("{err:#}"), "lead refresh failed; keeping last known state");
            }
        },
        Effect::FetchHistory { lead } => match gateway.fetch_history(lead) {
            Ok(history) => engine.ingest_lead_history(lead, history),
            Err(err) => {
                warn!(lead = %lead, error = %format!("{err:#}"), "history refresh failed; keeping last known state");
            }
        },
        Effect::CreateTask { ticket, task } => match gateway.create_task(&task) {
            Ok(row) => engine.confirm_task(ticket, row),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "task create failed");
                engine.fail(ticket, "Failed to create the task. Try again.");
            }
        },
        Effect::UpdateTask { ticket, id, fields } => match gateway.update_task(id, &fields) {
            Ok(row) => engine.confirm_task(ticket, row),
            Err(err) => {
                warn!(task = %id, error = %format!("{err:#}"), "task update failed");
                engine.fail(ticket, "Failed to update the task. Try again.");
            }
        },
        Effect::DeleteTask { ticket, id } => match gateway.delete_task(id) {
            Ok(()) => engine.confirm_removal(ticket),
            Err(err) => {
                warn!(task = %id, error = %format!("{err:#}"), "task delete failed");
                engine.fail(ticket, "Failed to delete the task.");
            }
        },
        Effect::FetchTask { id } => match gateway.fetch_task(id) {
            Ok(Some(task)) => engine.ingest_task(task),
            Ok(None) => debug!(task = %id, "remote row vanished before refresh"),
            Err(err) => {
                warn!(task = %id, error = %format!("{err:#}"), "task refresh failed; keeping last known state");
            }
        },
    }
}
