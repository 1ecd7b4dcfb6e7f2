use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::gateway::RemoteGateway;
use crate::lead::{HistoryEvent, Lead, LeadPatch};
use crate::task::{Task, TaskPatch};

/// File-backed gateway: one JSONL file per collection under the data
/// directory, replaced atomically on every write. Lead rows are stored
/// without their history; the history lives in its own file keyed by the
/// owning lead, mirroring the remote side table.
#[derive(Debug)]
pub struct LocalStore {
    pub data_dir: PathBuf,
    pub leads_path: PathBuf,
    pub history_path: PathBuf,
    pub tasks_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryRow {
    lead: Uuid,
    event: HistoryEvent,
}

impl LocalStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let leads_path = data_dir.join("leads.data");
        let history_path = data_dir.join("history.data");
        let tasks_path = data_dir.join("tasks.data");

        for path in [&leads_path, &history_path, &tasks_path] {
            if !path.exists() {
                fs::write(path, "")?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            leads = %leads_path.display(),
            history = %history_path.display(),
            tasks = %tasks_path.display(),
            "opened local store"
        );

        Ok(Self {
            data_dir,
            leads_path,
            history_path,
            tasks_path,
        })
    }

    fn load_lead_rows(&self) -> anyhow::Result<Vec<Lead>> {
        load_jsonl(&self.leads_path).context("failed to load leads.data")
    }

    fn save_lead_rows(&self, leads: &[Lead]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.leads_path, leads).context("failed to save leads.data")
    }

    fn load_history_rows(&self) -> anyhow::Result<Vec<HistoryRow>> {
        load_jsonl(&self.history_path).context("failed to load history.data")
    }

    fn save_history_rows(&self, rows: &[HistoryRow]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.history_path, rows).context("failed to save history.data")
    }

    fn load_task_rows(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    fn save_task_rows(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    fn history_for(&self, lead: Uuid) -> anyhow::Result<Vec<HistoryEvent>> {
        let mut events: Vec<HistoryEvent> = self
            .load_history_rows()?
            .into_iter()
            .filter(|row| row.lead == lead)
            .map(|row| row.event)
            .collect();
        events.sort_by_key(|event| event.at);
        Ok(events)
    }
}

impl RemoteGateway for LocalStore {
    #[tracing::instrument(skip(self))]
    fn fetch_leads(&mut self) -> anyhow::Result<Vec<Lead>> {
        let mut leads = self.load_lead_rows()?;
        let mut history = self.load_history_rows()?;
        history.sort_by_key(|row| row.event.at);

        for lead in &mut leads {
            lead.history = history
                .iter()
                .filter(|row| row.lead == lead.id)
                .map(|row| row.event.clone())
                .collect();
        }

        leads.sort_by_key(|lead| std::cmp::Reverse(lead.created_at));
        debug!(count = leads.len(), "fetched leads");
        Ok(leads)
    }

    fn fetch_lead(&mut self, id: Uuid) -> anyhow::Result<Option<Lead>> {
        let Some(mut lead) = self
            .load_lead_rows()?
            .into_iter()
            .find(|lead| lead.id == id)
        else {
            return Ok(None);
        };
        lead.history = self.history_for(id)?;
        Ok(Some(lead))
    }

    #[tracing::instrument(skip(self, lead), fields(id = %lead.id))]
    fn create_lead(&mut self, lead: &Lead) -> anyhow::Result<Lead> {
        let mut rows = self.load_lead_rows()?;
        if rows.iter().any(|row| row.id == lead.id) {
            return Err(anyhow!("lead already exists: {}", lead.id));
        }

        let mut row = lead.clone();
        row.history = Vec::new();
        rows.push(row.clone());
        self.save_lead_rows(&rows)?;
        Ok(row)
    }

    #[tracing::instrument(skip(self, fields))]
    fn update_lead(&mut self, id: Uuid, fields: &LeadPatch) -> anyhow::Result<Lead> {
        let mut rows = self.load_lead_rows()?;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| anyhow!("lead not found: {id}"))?;

        fields.apply_to(row);
        let mut updated = row.clone();
        self.save_lead_rows(&rows)?;

        updated.history = self.history_for(id)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    fn delete_lead(&mut self, id: Uuid) -> anyhow::Result<()> {
        let mut rows = self.load_lead_rows()?;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        if rows.len() == before {
            return Err(anyhow!("lead not found: {id}"));
        }
        self.save_lead_rows(&rows)?;

        let mut history = self.load_history_rows()?;
        history.retain(|row| row.lead != id);
        self.save_history_rows(&history)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, event))]
    fn append_history(&mut self, lead: Uuid, event: &HistoryEvent) -> anyhow::Result<()> {
        let mut rows = self.load_history_rows()?;
        rows.push(HistoryRow {
            lead,
            event: event.clone(),
        });
        self.save_history_rows(&rows)
    }

    fn fetch_history(&mut self, lead: Uuid) -> anyhow::Result<Vec<HistoryEvent>> {
        self.history_for(lead)
    }

    #[tracing::instrument(skip(self))]
    fn fetch_tasks(&mut self) -> anyhow::Result<Vec<Task>> {
        let mut tasks = self.load_task_rows()?;
        tasks.sort_by_key(|task| (task.date, task.created_at));
        Ok(tasks)
    }

    fn fetch_task(&mut self, id: Uuid) -> anyhow::Result<Option<Task>> {
        Ok(self.load_task_rows()?.into_iter().find(|task| task.id == id))
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    fn create_task(&mut self, task: &Task) -> anyhow::Result<Task> {
        let mut rows = self.load_task_rows()?;
        if rows.iter().any(|row| row.id == task.id) {
            return Err(anyhow!("task already exists: {}", task.id));
        }
        rows.push(task.clone());
        self.save_task_rows(&rows)?;
        Ok(task.clone())
    }

    #[tracing::instrument(skip(self, fields))]
    fn update_task(&mut self, id: Uuid, fields: &TaskPatch) -> anyhow::Result<Task> {
        let mut rows = self.load_task_rows()?;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;

        fields.apply_to(row);
        let updated = row.clone();
        self.save_task_rows(&rows)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    fn delete_task(&mut self, id: Uuid) -> anyhow::Result<()> {
        let mut rows = self.load_task_rows()?;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        if rows.len() == before {
            return Err(anyhow!("task not found: {id}"));
        }
        self.save_task_rows(&rows)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
