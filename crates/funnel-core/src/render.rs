use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::column::Column;
use crate::config::Config;
use crate::datetime::{days_since, format_day};
use crate::lead::Lead;
use crate::suggest::Suggestion;
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, board, now))]
    pub fn print_board(
        &mut self,
        board: &[(Column, Vec<Lead>)],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        for (column, cards) in board {
            let header = format!("{} ({})", column.title, cards.len());
            writeln!(out, "{}", self.paint(&header, "36"))?;

            if cards.is_empty() {
                writeln!(out, "  (empty)")?;
            }
            for lead in cards {
                let days = days_since(lead.last_contact, now);
                let waiting = if days <= 0 {
                    "today".to_string()
                } else {
                    format!("{days}d ago")
                };
                let channels = lead
                    .contact_channels
                    .iter()
                    .map(|channel| channel.label())
                    .collect::<Vec<_>>()
                    .join(",");
                writeln!(
                    out,
                    "  {}  {}  [{}]  last contact {}",
                    self.paint(&short_id(lead), "33"),
                    lead.name,
                    channels,
                    waiting
                )?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, leads, now))]
    pub fn print_lead_table(
        &mut self,
        leads: &[&Lead],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Column".to_string(),
            "Channels".to_string(),
            "Last".to_string(),
        ];

        let mut rows = Vec::with_capacity(leads.len());
        for lead in leads {
            let id = self.paint(&short_id(lead), "33");
            let channels = lead
                .contact_channels
                .iter()
                .map(|channel| channel.label())
                .collect::<Vec<_>>()
                .join(",");
            let days = days_since(lead.last_contact, now);
            let last = if days >= 5 {
                self.paint(&format!("{days}d"), "31")
            } else {
                format!("{days}d")
            };
            rows.push(vec![id, lead.name.clone(), lead.column_id.clone(), channels, last]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, lead))]
    pub fn print_lead_info(&mut self, lead: &Lead) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", lead.id)?;
        writeln!(out, "name      {}", lead.name)?;
        writeln!(out, "column    {}", lead.column_id)?;
        if !lead.phone.is_empty() {
            writeln!(out, "phone     {}", lead.phone)?;
        }
        if !lead.email.is_empty() {
            writeln!(out, "email     {}", lead.email)?;
        }
        if !lead.project_type.is_empty() {
            writeln!(out, "project   {}", lead.project_type)?;
        }
        writeln!(out, "source    {}", lead.source)?;
        if !lead.location.is_empty() {
            writeln!(out, "location  {}", lead.location)?;
        }
        writeln!(out, "quote     {:?}", lead.quote_status)?;
        writeln!(out, "urgency   {:?}", lead.urgency)?;
        let channels = lead
            .contact_channels
            .iter()
            .map(|channel| channel.label())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "channels  {channels}")?;
        for service in &lead.services {
            let price = service
                .price
                .map(|price| format!(" ({price:.2})"))
                .unwrap_or_default();
            writeln!(out, "service   {} [{:?}]{}", service.name, service.status, price)?;
        }
        writeln!(out, "created   {}", lead.created_at.format("%Y-%m-%d %H:%M"))?;
        writeln!(out, "contact   {}", lead.last_contact.format("%Y-%m-%d %H:%M"))?;

        if !lead.history.is_empty() {
            writeln!(out)?;
            for event in &lead.history {
                writeln!(
                    out,
                    "{}  {:8}  {}",
                    event.at.format("%Y-%m-%d %H:%M"),
                    format!("{:?}", event.kind).to_lowercase(),
                    event.text
                )?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&mut self, tasks: &[(Task, String)]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Date".to_string(),
            "Status".to_string(),
            "Lead".to_string(),
            "Channel".to_string(),
            "Action".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for (task, lead_name) in tasks {
            let id = self.paint(&task.id.to_string()[..8], "33");
            let date = match (task.status, task.rescheduled_to) {
                (TaskStatus::Rescheduled, Some(moved)) => {
                    format!("{} -> {}", format_day(task.date), format_day(moved))
                }
                _ => format_day(task.date),
            };
            let status = match task.status {
                TaskStatus::Pending => "pending".to_string(),
                TaskStatus::Done => self.paint("done", "32"),
                TaskStatus::Rescheduled => self.paint("moved", "35"),
            };
            rows.push(vec![
                id,
                date,
                status,
                lead_name.clone(),
                task.channel.label().to_string(),
                task.action.clone(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, suggestions))]
    pub fn print_suggestions(&mut self, suggestions: &[Suggestion]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if suggestions.is_empty() {
            writeln!(out, "Nothing to suggest right now.")?;
            return Ok(());
        }

        for (idx, suggestion) in suggestions.iter().enumerate() {
            writeln!(
                out,
                "{:2}. {}  [{}]",
                idx + 1,
                self.paint(&suggestion.action, "1"),
                suggestion.channel.label()
            )?;
            writeln!(
                out,
                "    {} — {}",
                suggestion.rule.label(),
                suggestion.reason
            )?;
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(lead: &Lead) -> String {
    lead.id.to_string()[..8].to_string()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
