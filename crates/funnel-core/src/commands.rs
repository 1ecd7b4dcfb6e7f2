use anyhow::{anyhow, bail};
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::cli::{ColumnCmd, Command, ServiceCmd, SuggestCmd, TaskCmd};
use crate::column::{Column, ColumnPatch};
use crate::config::Config;
use crate::datetime::{day_of, parse_day};
use crate::engine::Engine;
use crate::gateway::{RemoteGateway, pump};
use crate::lead::{ContactChannel, Lead, LeadDraft, Service, ServiceStatus, QuoteStatus};
use crate::localstore::LocalStore;
use crate::profile::BoardProfile;
use crate::render::Renderer;
use crate::task::{Task, TaskDraft};

/// One CLI invocation: load the remote view, restore the local profile, run
/// a single engine operation, pump the queued remote work, persist the
/// profile, and surface the engine's error slot as the exit status.
#[instrument(skip(store, _cfg, renderer, command))]
pub fn dispatch(
    store: &mut LocalStore,
    _cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let profile_path = store.data_dir.join("profile.json");
    let profile = BoardProfile::load(&profile_path)?;

    let mut engine = Engine::new(profile);
    engine.load_leads(store.fetch_leads()?);
    engine.load_tasks(store.fetch_tasks()?);

    match command {
        Command::Board => {
            let board: Vec<(Column, Vec<Lead>)> = engine
                .ordered_columns()
                .into_iter()
                .map(|column| {
                    let cards = engine
                        .column_cards(&column.id)
                        .into_iter()
                        .cloned()
                        .collect();
                    (column, cards)
                })
                .collect();
            renderer.print_board(&board, now)?;
        }

        Command::Leads { query, quote_sent } => {
            let query = query.unwrap_or_default();
            let leads: Vec<&Lead> = engine
                .search(&query)
                .into_iter()
                .filter(|lead| !quote_sent || lead.quote_status == QuoteStatus::Sent)
                .collect();
            renderer.print_lead_table(&leads, now)?;
        }

        Command::Show { lead } => {
            let id = resolve_lead(&engine, &lead)?;
            engine.select_lead(Some(id))?;
            if let Some(lead) = engine.selected_lead() {
                renderer.print_lead_info(lead)?;
            }
        }

        Command::Add {
            name,
            column,
            phone,
            email,
            project,
            source,
            location,
            note,
        } => {
            let draft = LeadDraft {
                name: name.clone(),
                phone: phone.unwrap_or_default(),
                email: email.unwrap_or_default(),
                project_type: project.unwrap_or_default(),
                source: source.unwrap_or_default(),
                location: location.unwrap_or_default(),
                column_id: column,
                context: note.unwrap_or_default(),
                ..LeadDraft::default()
            };
            engine.create_lead(draft, now)?;
            println!("Created lead {name}.");
        }

        Command::Move { lead, column } => {
            let id = resolve_lead(&engine, &lead)?;
            engine.move_lead(id, &column, now)?;
            println!("Moved lead to {column}.");
        }

        Command::Rename { lead, name } => {
            let id = resolve_lead(&engine, &lead)?;
            engine.rename_lead(id, &name, now)?;
            println!("Renamed lead to {name}.");
        }

        Command::Note { lead, text } => {
            let id = resolve_lead(&engine, &lead)?;
            let text = text.join(" ");
            engine.add_note(id, &text, now)?;
            println!("Noted.");
        }

        Command::Channel { lead, channel } => {
            let id = resolve_lead(&engine, &lead)?;
            let channel: ContactChannel = channel.parse()?;
            engine.toggle_channel(id, channel, now)?;
            println!("Toggled {channel}.");
        }

        Command::Service { action } => match action {
            ServiceCmd::Add { lead, name, price } => {
                let id = resolve_lead(&engine, &lead)?;
                let mut services = engine
                    .lead(id)
                    .map(|lead| lead.services.clone())
                    .unwrap_or_default();
                services.push(Service {
                    id: Uuid::new_v4().to_string(),
                    name: name.clone(),
                    status: ServiceStatus::Proposed,
                    price,
                });
                engine.set_services(id, services, now)?;
                println!("Added service {name}.");
            }
            ServiceCmd::Rm { lead, name } => {
                let id = resolve_lead(&engine, &lead)?;
                let needle = name.to_lowercase();
                let mut services = engine
                    .lead(id)
                    .map(|lead| lead.services.clone())
                    .unwrap_or_default();
                let before = services.len();
                services.retain(|service| service.name.to_lowercase() != needle);
                if services.len() == before {
                    bail!("no service named {name}");
                }
                engine.set_services(id, services, now)?;
                println!("Removed service {name}.");
            }
        },

        Command::Remove { lead } => {
            let id = resolve_lead(&engine, &lead)?;
            engine.delete_lead(id)?;
            println!("Deleted lead.");
        }

        Command::Column { action } => match action {
            ColumnCmd::List => {
                for (idx, column) in engine.ordered_columns().iter().enumerate() {
                    let marker = if column.is_custom { " (custom)" } else { "" };
                    println!("{idx}. {} [{}]{marker}", column.title, column.id);
                }
            }
            ColumnCmd::Add { id, title, color } => {
                engine.add_column(Column::custom(id.as_str(), title.as_str(), color.as_str()))?;
                println!("Added column {title}.");
            }
            ColumnCmd::Edit { id, title, color } => {
                engine.update_column(
                    &id,
                    ColumnPatch {
                        title,
                        color,
                        ..ColumnPatch::default()
                    },
                )?;
                println!("Updated column {id}.");
            }
            ColumnCmd::Rm { id } => {
                engine.remove_column(&id)?;
                println!("Removed column {id}.");
            }
            ColumnCmd::Move { id, index } => {
                engine.reorder_columns(&id, index);
                println!("Moved column {id} to position {index}.");
            }
        },

        Command::Tasks { day } => {
            let tasks: Vec<Task> = match day {
                Some(day) => {
                    let day = parse_day(&day, day_of(now))?;
                    engine.tasks_on(day).into_iter().cloned().collect()
                }
                None => engine.tasks().to_vec(),
            };
            let named = with_lead_names(&engine, tasks);
            renderer.print_task_table(&named)?;
        }

        Command::Task { action } => match action {
            TaskCmd::Add {
                lead,
                date,
                action,
                channel,
                note,
            } => {
                let id = resolve_lead(&engine, &lead)?;
                let draft = TaskDraft {
                    lead_id: id,
                    date: parse_day(&date, day_of(now))?,
                    action: action.join(" "),
                    channel: channel.parse()?,
                    note,
                };
                engine.create_task(draft, now)?;
                println!("Created task.");
            }
            TaskCmd::Done { task } => {
                let id = resolve_task(&engine, &task)?;
                engine.complete_task(id)?;
                println!("Task done.");
            }
            TaskCmd::Reschedule { task, date } => {
                let id = resolve_task(&engine, &task)?;
                let to = parse_day(&date, day_of(now))?;
                engine.reschedule_task(id, to)?;
                println!("Task rescheduled to {date}.");
            }
            TaskCmd::Rm { task } => {
                let id = resolve_task(&engine, &task)?;
                engine.delete_task(id)?;
                println!("Task deleted.");
            }
        },

        Command::Suggest { action } => match action {
            None => {
                let suggestions = engine.suggestions(now);
                renderer.print_suggestions(&suggestions)?;
            }
            Some(SuggestCmd::Accept {
                index,
                date,
                action,
            }) => {
                let suggestions = engine.suggestions(now);
                let suggestion = suggestions
                    .get(index.checked_sub(1).ok_or_else(|| anyhow!("indices start at 1"))?)
                    .ok_or_else(|| anyhow!("no suggestion at index {index}"))?
                    .clone();

                let draft = TaskDraft {
                    lead_id: suggestion.lead,
                    date: match date {
                        Some(date) => parse_day(&date, day_of(now))?,
                        None => suggestion.date,
                    },
                    action: action.unwrap_or_else(|| suggestion.action.clone()),
                    channel: suggestion.channel,
                    note: Some(suggestion.reason.clone()),
                };
                engine.accept_suggestion(suggestion.key(), draft, now)?;
                println!("Accepted: {}", suggestion.action);
            }
            Some(SuggestCmd::Dismiss { index }) => {
                let suggestions = engine.suggestions(now);
                let suggestion = suggestions
                    .get(index.checked_sub(1).ok_or_else(|| anyhow!("indices start at 1"))?)
                    .ok_or_else(|| anyhow!("no suggestion at index {index}"))?;
                engine.dismiss_suggestion(suggestion.key());
                println!("Dismissed: {}", suggestion.action);
            }
        },
    }

    pump(&mut engine, store, now);
    engine.profile().save(&profile_path)?;

    if let Some(message) = engine.last_error() {
        bail!("{message}");
    }

    info!("command finished");
    Ok(())
}

fn with_lead_names(engine: &Engine, tasks: Vec<Task>) -> Vec<(Task, String)> {
    tasks
        .into_iter()
        .map(|task| {
            let name = engine
                .lead(task.lead_id)
                .map(|lead| lead.name.clone())
                .unwrap_or_else(|| "(gone)".to_string());
            (task, name)
        })
        .collect()
}

/// Accepts a full id, a unique id prefix, or a unique case-insensitive name
/// fragment.
fn resolve_lead(engine: &Engine, selector: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(selector) {
        if engine.lead(id).is_some() {
            return Ok(id);
        }
        bail!("no lead with id {id}");
    }

    let needle = selector.to_lowercase();
    let by_prefix: Vec<Uuid> = engine
        .leads()
        .iter()
        .filter(|lead| lead.id.to_string().starts_with(&needle))
        .map(|lead| lead.id)
        .collect();
    match by_prefix.as_slice() {
        [id] => return Ok(*id),
        [] => {}
        _ => bail!("lead selector is ambiguous: {selector}"),
    }

    let by_name: Vec<Uuid> = engine
        .leads()
        .iter()
        .filter(|lead| lead.name.to_lowercase().contains(&needle))
        .map(|lead| lead.id)
        .collect();
    match by_name.as_slice() {
        [id] => Ok(*id),
        [] => bail!("no lead matches {selector}"),
        _ => bail!("lead selector is ambiguous: {selector}"),
    }
}

fn resolve_task(engine: &Engine, selector: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(selector) {
        if engine.task(id).is_some() {
            return Ok(id);
        }
        bail!("no task with id {id}");
    }

    let needle = selector.to_lowercase();
    let by_prefix: Vec<Uuid> = engine
        .tasks()
        .iter()
        .filter(|task| task.id.to_string().starts_with(&needle))
        .map(|task| task.id)
        .collect();
    match by_prefix.as_slice() {
        [id] => Ok(*id),
        [] => bail!("no task matches {selector}"),
        _ => bail!("task selector is ambiguous: {selector}"),
    }
}
