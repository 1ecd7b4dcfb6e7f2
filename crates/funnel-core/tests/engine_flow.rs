use chrono::{Duration, Utc};
use funnel_core::drag::HoverHalf;
use funnel_core::engine::Engine;
use funnel_core::gateway::{ChangeKind, RemoteEvent, RemoteGateway, pump};
use funnel_core::lead::{
    ContactChannel, HistoryEvent, Lead, LeadDraft, LeadPatch, QuoteStatus, Service, ServiceStatus,
};
use funnel_core::localstore::LocalStore;
use funnel_core::profile::BoardProfile;
use funnel_core::task::{Task, TaskPatch, TaskStatus};
use tempfile::tempdir;
use uuid::Uuid;

fn engine_over(store: &mut LocalStore) -> Engine {
    let mut engine = Engine::new(BoardProfile::default());
    engine.load_leads(store.fetch_leads().expect("fetch leads"));
    engine.load_tasks(store.fetch_tasks().expect("fetch tasks"));
    engine
}

fn draft(name: &str) -> LeadDraft {
    LeadDraft {
        name: name.to_string(),
        contact_channels: vec![ContactChannel::Whatsapp],
        services: vec![Service {
            id: "svc-1".to_string(),
            name: "Cleaning".to_string(),
            status: ServiceStatus::Proposed,
            price: Some(80.0),
        }],
        ..LeadDraft::default()
    }
}

#[test]
fn optimistic_mutation_reconciles_against_the_gateway() {
    let temp = tempdir().expect("tempdir");
    let mut store = LocalStore::open(temp.path()).expect("open store");
    let mut engine = engine_over(&mut store);
    let now = Utc::now();

    engine.create_lead(draft("Acme Pools"), now).expect("create");
    let id = engine.leads()[0].id;

    // Optimistic: visible before any remote work ran.
    assert_eq!(engine.leads().len(), 1);
    assert_eq!(engine.leads()[0].history.len(), 1);

    pump(&mut engine, &mut store, now);
    assert!(engine.last_error().is_none());

    engine.move_lead(id, "contacted", now).expect("move");

    // Optimistic again: column, context, and timeline updated synchronously.
    let lead = engine.lead(id).expect("lead");
    assert_eq!(lead.column_id, "contacted");
    assert_eq!(lead.context, "Status updated: Contacted");
    assert_eq!(
        lead.history.last().map(|event| event.text.as_str()),
        Some("Status updated: Contacted")
    );

    pump(&mut engine, &mut store, now);
    assert!(engine.last_error().is_none());
    assert!(!engine.has_pending_mutations());

    // After reconciliation the store matches the authoritative row.
    let local = engine.lead(id).expect("lead").clone();
    let remote = store.fetch_lead(id).expect("fetch").expect("row");
    assert_eq!(local.column_id, remote.column_id);
    assert_eq!(local.contact_channels, remote.contact_channels);
    assert_eq!(local.services, remote.services);
    assert_eq!(local.history, remote.history);
    assert_eq!(remote.history.len(), 2);
}

/// Gateway that echoes update responses without the collection fields, the
/// way a partial select does. Omission must read as "unchanged".
struct SparseEchoGateway<'a> {
    inner: &'a mut LocalStore,
}

impl RemoteGateway for SparseEchoGateway<'_> {
    fn fetch_leads(&mut self) -> anyhow::Result<Vec<Lead>> {
        self.inner.fetch_leads()
    }

    fn fetch_lead(&mut self, id: Uuid) -> anyhow::Result<Option<Lead>> {
        self.inner.fetch_lead(id)
    }

    fn create_lead(&mut self, lead: &Lead) -> anyhow::Result<Lead> {
        self.inner.create_lead(lead)
    }

    fn update_lead(&mut self, id: Uuid, fields: &LeadPatch) -> anyhow::Result<Lead> {
        let mut row = self.inner.update_lead(id, fields)?;
        row.contact_channels = Vec::new();
        row.services = Vec::new();
        row.history = Vec::new();
        Ok(row)
    }

    fn delete_lead(&mut self, id: Uuid) -> anyhow::Result<()> {
        self.inner.delete_lead(id)
    }

    fn append_history(&mut self, lead: Uuid, event: &HistoryEvent) -> anyhow::Result<()> {
        self.inner.append_history(lead, event)
    }

    fn fetch_history(&mut self, lead: Uuid) -> anyhow::Result<Vec<HistoryEvent>> {
        self.inner.fetch_history(lead)
    }

    fn fetch_tasks(&mut self) -> anyhow::Result<Vec<Task>> {
        self.inner.fetch_tasks()
    }

    fn fetch_task(&mut self, id: Uuid) -> anyhow::Result<Option<Task>> {
        self.inner.fetch_task(id)
    }

    fn create_task(&mut self, task: &Task) -> anyhow::Result<Task> {
        self.inner.create_task(task)
    }

    fn update_task(&mut self, id: Uuid, fields: &TaskPatch) -> anyhow::Result<Task> {
        self.inner.update_task(id, fields)
    }

    fn delete_task(&mut self, id: Uuid) -> anyhow::Result<()> {
        self.inner.delete_task(id)
    }
}

#[test]
fn column_only_move_never_clears_channels_or_services() {
    let temp = tempdir().expect("tempdir");
    let mut store = LocalStore::open(temp.path()).expect("open store");
    let mut engine = engine_over(&mut store);
    let now = Utc::now();

    engine.create_lead(draft("Acme Pools"), now).expect("create");
    let id = engine.leads()[0].id;
    pump(&mut engine, &mut store, now);

    // Drag the card into another column; the server echo omits collections.
    engine.begin_card_drag(id);
    engine.drag_card_over("negotiation");
    engine
        .drop_card("negotiation", now)
        .expect("drop")
        .expect("card drag was active");

    let mut sparse = SparseEchoGateway { inner: &mut store };
    pump(&mut engine, &mut sparse, now);
    assert!(engine.last_error().is_none());

    let lead = engine.lead(id).expect("lead");
    assert_eq!(lead.column_id, "negotiation");
    assert_eq!(lead.contact_channels, vec![ContactChannel::Whatsapp]);
    assert_eq!(lead.services.len(), 1);

    // The merged patch re-asserted the collections on the wire as well.
    let remote = store.fetch_lead(id).expect("fetch").expect("row");
    assert_eq!(remote.contact_channels, vec![ContactChannel::Whatsapp]);
    assert_eq!(remote.services.len(), 1);
}

/// Gateway that rejects every write, for exercising rollback.
struct RefusingGateway<'a> {
    inner: &'a mut LocalStore,
}

impl RemoteGateway for RefusingGateway<'_> {
    fn fetch_leads(&mut self) -> anyhow::Result<Vec<Lead>> {
        self.inner.fetch_leads()
    }

    fn fetch_lead(&mut self, id: Uuid) -> anyhow::Result<Option<Lead>> {
        self.inner.fetch_lead(id)
    }

    fn create_lead(&mut self, _lead: &Lead) -> anyhow::Result<Lead> {
        anyhow::bail!("gateway unreachable")
    }

    fn update_lead(&mut self, _id: Uuid, _fields: &LeadPatch) -> anyhow::Result<Lead> {
        anyhow::bail!("gateway unreachable")
    }

    fn delete_lead(&mut self, _id: Uuid) -> anyhow::Result<()> {
        anyhow::bail!("gateway unreachable")
    }

    fn append_history(&mut self, _lead: Uuid, _event: &HistoryEvent) -> anyhow::Result<()> {
        anyhow::bail!("gateway unreachable")
    }

    fn fetch_history(&mut self, lead: Uuid) -> anyhow::Result<Vec<HistoryEvent>> {
        self.inner.fetch_history(lead)
    }

    fn fetch_tasks(&mut self) -> anyhow::Result<Vec<Task>> {
        self.inner.fetch_tasks()
    }

    fn fetch_task(&mut self, id: Uuid) -> anyhow::Result<Option<Task>> {
        self.inner.fetch_task(id)
    }

    fn create_task(&mut self, _task: &Task) -> anyhow::Result<Task> {
        anyhow::bail!("gateway unreachable")
    }

    fn update_task(&mut self, _id: Uuid, _fields: &TaskPatch) -> anyhow::Result<Task> {
        anyhow::bail!("gateway unreachable")
    }

    fn delete_task(&mut self, _id: Uuid) -> anyhow::Result<()> {
        anyhow::bail!("gateway unreachable")
    }
}

#[test]
fn failed_remote_write_rolls_back_to_the_exact_snapshot() {
    let temp = tempdir().expect("tempdir");
    let mut store = LocalStore::open(temp.path()).expect("open store");
    let mut engine = engine_over(&mut store);
    let now = Utc::now();

    engine.create_lead(draft("Acme Pools"), now).expect("create");
    let id = engine.leads()[0].id;
    pump(&mut engine, &mut store, now);
    // Pick up the reconciled timeline before mutating again.
    let before = engine.lead(id).expect("lead").clone();

    engine.move_lead(id, "won", now).expect("move");
    assert_eq!(engine.lead(id).expect("lead").column_id, "won");

    let mut refusing = RefusingGateway { inner: &mut store };
    pump(&mut engine, &mut refusing, now);

    let after = engine.lead(id).expect("lead");
    assert_eq!(*after, before);
    assert_eq!(after.history.len(), before.history.len());
    assert_eq!(engine.last_error(), Some("Failed to update the lead. Try again."));

    engine.clear_error();
    assert!(engine.last_error().is_none());
}

#[test]
fn toggling_the_first_channel_promotes_a_new_lead() {
    let temp = tempdir().expect("tempdir");
    let mut store = LocalStore::open(temp.path()).expect("open store");
    let mut engine = engine_over(&mut store);
    let now = Utc::now();

    let draft = LeadDraft {
        name: "Fresh Lead".to_string(),
        services: vec![Service {
            id: "svc-9".to_string(),
            name: "Landscaping".to_string(),
            status: ServiceStatus::Proposed,
            price: None,
        }],
        ..LeadDraft::default()
    };
    engine.create_lead(draft, now).expect("create");
    let id = engine.leads()[0].id;
    pump(&mut engine, &mut store, now);

    let before = engine.lead(id).expect("lead").clone();
    assert_eq!(before.column_id, "new");

    engine
        .toggle_channel(id, ContactChannel::Whatsapp, now)
        .expect("toggle");
    pump(&mut engine, &mut store, now);

    let lead = engine.lead(id).expect("lead");
    assert_eq!(lead.column_id, "contacted");
    assert_eq!(lead.contact_channels, vec![ContactChannel::Whatsapp]);
    assert_eq!(lead.services, before.services);
    assert_eq!(lead.history.len(), before.history.len() + 1);
    assert_eq!(
        lead.history.last().map(|event| event.text.as_str()),
        Some("First contact made")
    );

    // Toggling off removes the channel without another promotion.
    engine
        .toggle_channel(id, ContactChannel::Whatsapp, now)
        .expect("toggle off");
    pump(&mut engine, &mut store, now);
    let lead = engine.lead(id).expect("lead");
    assert!(lead.contact_channels.is_empty());
    assert_eq!(lead.column_id, "contacted");
}

#[test]
fn remote_delete_clears_the_open_selection() {
    let temp = tempdir().expect("tempdir");
    let mut store = LocalStore::open(temp.path()).expect("open store");
    let mut engine = engine_over(&mut store);
    let now = Utc::now();

    engine.create_lead(draft("Vanishing"), now).expect("create");
    let id = engine.leads()[0].id;
    pump(&mut engine, &mut store, now);

    engine.select_lead(Some(id)).expect("select");
    assert!(engine.selected_lead().is_some());

    // Another session deletes the row; the push channel tells us.
    store.delete_lead(id).expect("remote delete");
    engine.on_remote_event(RemoteEvent::Lead {
        kind: ChangeKind::Delete,
        id,
    });

    assert!(engine.selected_lead().is_none());
    assert!(engine.lead(id).is_none());
}

#[test]
fn remote_update_refreshes_the_open_detail_view() {
    let temp = tempdir().expect("tempdir");
    let mut store = LocalStore::open(temp.path()).expect("open store");
    let mut engine = engine_over(&mut store);
    let now = Utc::now();

    engine.create_lead(draft("Original"), now).expect("create");
    let id = engine.leads()[0].id;
    pump(&mut engine, &mut store, now);
    engine.select_lead(Some(id)).expect("select");

    // Another session renames the lead and moves it.
    let patch = LeadPatch {
        name: Some("Renamed Elsewhere".to_string()),
        column_id: Some("negotiation".to_string()),
        ..LeadPatch::default()
    };
    store.update_lead(id, &patch).expect("remote update");

    engine.on_remote_event(RemoteEvent::Lead {
        kind: ChangeKind::Update,
        id,
    });
    pump(&mut engine, &mut store, now);

    let selected = engine.selected_lead().expect("still selected");
    assert_eq!(selected.name, "Renamed Elsewhere");
    assert_eq!(selected.column_id, "negotiation");

    // The remote move ranks the card like a local drag would.
    let cards = engine.column_cards("negotiation");
    assert_eq!(cards.first().map(|lead| lead.id), Some(id));
}

#[test]
fn accepted_suggestions_become_tasks_and_never_resurface() {
    let temp = tempdir().expect("tempdir");
    let mut store = LocalStore::open(temp.path()).expect("open store");
    let mut engine = engine_over(&mut store);
    let now = Utc::now();

    let draft = LeadDraft {
        name: "Quote Chaser".to_string(),
        column_id: Some("quote_sent".to_string()),
        quote_status: Some(QuoteStatus::Sent),
        last_contact: Some(now - Duration::days(2)),
        contact_channels: vec![ContactChannel::Mail],
        ..LeadDraft::default()
    };
    engine.create_lead(draft, now).expect("create");
    pump(&mut engine, &mut store, now);

    let suggestions = engine.suggestions(now);
    assert_eq!(suggestions.len(), 1);
    let suggestion = suggestions[0].clone();
    assert_eq!(suggestion.channel, ContactChannel::Mail);

    let task_draft = funnel_core::task::TaskDraft {
        lead_id: suggestion.lead,
        date: suggestion.date,
        action: suggestion.action.clone(),
        channel: suggestion.channel,
        note: Some(suggestion.reason.clone()),
    };
    engine
        .accept_suggestion(suggestion.key(), task_draft, now)
        .expect("accept");
    pump(&mut engine, &mut store, now);

    assert_eq!(engine.tasks().len(), 1);
    assert_eq!(engine.tasks()[0].status, TaskStatus::Pending);
    assert!(engine.suggestions(now).is_empty());

    // The dismissal survives a fresh session through the profile.
    let mut next_session = Engine::new(engine.profile());
    next_session.load_leads(store.fetch_leads().expect("fetch"));
    assert!(next_session.suggestions(now).is_empty());
}

#[test]
fn column_drag_inserts_before_the_hovered_half() {
    let mut engine = Engine::new(BoardProfile::default());
    let original: Vec<String> = engine
        .ordered_columns()
        .into_iter()
        .map(|column| column.id)
        .collect();
    let dragged = original[2].clone();

    engine.begin_column_drag(&dragged);
    engine.drag_column_over(0, HoverHalf::Left);
    assert!(engine.drop_column());

    let reordered: Vec<String> = engine
        .ordered_columns()
        .into_iter()
        .map(|column| column.id)
        .collect();
    assert_eq!(reordered[0], dragged);
    assert_eq!(reordered[1], original[0]);
    assert_eq!(reordered[2], original[1]);
    assert_eq!(reordered[3], original[3]);
}

#[test]
fn task_lifecycle_round_trips_through_the_store() {
    let temp = tempdir().expect("tempdir");
    let mut store = LocalStore::open(temp.path()).expect("open store");
    let mut engine = engine_over(&mut store);
    let now = Utc::now();
    let today = now.date_naive();

    engine.create_lead(draft("Tasked"), now).expect("create");
    let lead_id = engine.leads()[0].id;
    pump(&mut engine, &mut store, now);

    let task_draft = funnel_core::task::TaskDraft {
        lead_id,
        date: today,
        action: "Send brochure".to_string(),
        channel: ContactChannel::Mail,
        note: None,
    };
    engine.create_task(task_draft, now).expect("create task");
    let task_id = engine.tasks()[0].id;
    pump(&mut engine, &mut store, now);

    assert_eq!(engine.pending_tasks_on(today).len(), 1);

    let tomorrow = today.succ_opt().expect("tomorrow");
    engine.reschedule_task(task_id, tomorrow).expect("reschedule");
    pump(&mut engine, &mut store, now);

    assert!(engine.tasks_on(today).is_empty());
    assert_eq!(engine.tasks_on(tomorrow).len(), 1);

    let remote = store.fetch_task(task_id).expect("fetch").expect("row");
    assert_eq!(remote.status, TaskStatus::Rescheduled);
    assert_eq!(remote.rescheduled_to, Some(tomorrow));
}
