use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactChannel {
    Instagram,
    Whatsapp,
    Mail,
}

impl ContactChannel {
    pub fn label(&self) -> &'static str {
        match self {
            ContactChannel::Instagram => "instagram",
            ContactChannel::Whatsapp => "whatsapp",
            ContactChannel::Mail => "mail",
        }
    }
}

impl std::fmt::Display for ContactChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ContactChannel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" | "ig" => Ok(ContactChannel::Instagram),
            "whatsapp" | "wa" => Ok(ContactChannel::Whatsapp),
            "mail" | "email" => Ok(ContactChannel::Mail),
            other => bail!("unknown contact channel: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    None,
    Generated,
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Proposed,
    Accepted,
    Rejected,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub status: ServiceStatus,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    System,
    Note,
    Contact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub kind: HistoryKind,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl HistoryEvent {
    pub fn system(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: HistoryKind::System,
            text: text.into(),
            at,
        }
    }

    pub fn note(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: HistoryKind::Note,
            text: text.into(),
            at,
        }
    }

    pub fn contact(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: HistoryKind::Contact,
            text: text.into(),
            at,
        }
    }
}

/// A lead as known locally. `column_id` is an open string namespace on
/// purpose: custom columns share it with the predefined set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,

    #[serde(default)]
    pub phone: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub instagram: Option<String>,

    #[serde(default)]
    pub website: Option<String>,

    #[serde(default)]
    pub project_type: String,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub location: String,

    pub column_id: String,

    #[serde(default)]
    pub budget: Option<String>,

    pub quote_status: QuoteStatus,

    pub urgency: Urgency,

    pub last_contact: DateTime<Utc>,

    #[serde(default)]
    pub contact_channels: Vec<ContactChannel>,

    #[serde(default)]
    pub services: Vec<Service>,

    #[serde(default)]
    pub context: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub history: Vec<HistoryEvent>,
}

impl Lead {
    pub fn from_draft(draft: LeadDraft, now: DateTime<Utc>) -> Self {
        let mut history = vec![HistoryEvent::system("Lead created manually", now)];
        if !draft.context.trim().is_empty() {
            history.push(HistoryEvent::note(draft.context.clone(), now));
        }

        Self {
            id: Uuid::new_v4(),
            name: draft.name,
            phone: draft.phone,
            email: draft.email,
            instagram: draft.instagram,
            website: draft.website,
            project_type: draft.project_type,
            source: if draft.source.is_empty() {
                "direct".to_string()
            } else {
                draft.source
            },
            location: draft.location,
            column_id: draft.column_id.unwrap_or_else(|| "new".to_string()),
            budget: draft.budget,
            quote_status: draft.quote_status.unwrap_or(QuoteStatus::None),
            urgency: draft.urgency.unwrap_or(Urgency::Medium),
            last_contact: draft.last_contact.unwrap_or(now),
            contact_channels: draft.contact_channels,
            services: draft.services,
            context: draft.context,
            created_at: now,
            history,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeadDraft {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub instagram: Option<String>,
    pub website: Option<String>,
    pub project_type: String,
    pub source: String,
    pub location: String,
    pub column_id: Option<String>,
    pub budget: Option<String>,
    pub quote_status: Option<QuoteStatus>,
    pub urgency: Option<Urgency>,
    pub last_contact: Option<DateTime<Utc>>,
    pub contact_channels: Vec<ContactChannel>,
    pub services: Vec<Service>,
    pub context: String,
}

impl LeadDraft {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            bail!("a lead needs a name");
        }
        Ok(())
    }
}

/// Partial update for a lead. `None` means "leave untouched"; nullable
/// fields use a nested `Option` to distinguish clearing from skipping.
#[derive(Debug, Clone, Default)]
pub struct LeadPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub instagram: Option<Option<String>>,
    pub website: Option<Option<String>>,
    pub project_type: Option<String>,
    pub source: Option<String>,
    pub location: Option<String>,
    pub column_id: Option<String>,
    pub budget: Option<Option<String>>,
    pub quote_status: Option<QuoteStatus>,
    pub urgency: Option<Urgency>,
    pub last_contact: Option<DateTime<Utc>>,
    pub contact_channels: Option<Vec<ContactChannel>>,
    pub services: Option<Vec<Service>>,
    pub context: Option<String>,
}

impl LeadPatch {
    /// Re-assert the fields other flows also write. A patch that does not
    /// mention `contact_channels` or `services` must still carry the current
    /// values so a partial remote write cannot drop them.
    pub fn reasserted_for(mut self, lead: &Lead) -> Self {
        if self.contact_channels.is_none() {
            self.contact_channels = Some(lead.contact_channels.clone());
        }
        if self.services.is_none() {
            self.services = Some(lead.services.clone());
        }
        self
    }

    pub fn apply_to(&self, lead: &mut Lead) {
        if let Some(name) = &self.name {
            lead.name = name.clone();
        }
        if let Some(phone) = &self.phone {
            lead.phone = phone.clone();
        }
        if let Some(email) = &self.email {
            lead.email = email.clone();
        }
        if let Some(instagram) = &self.instagram {
            lead.instagram = instagram.clone();
        }
        if let Some(website) = &self.website {
            lead.website = website.clone();
        }
        if let Some(project_type) = &self.project_type {
            lead.project_type = project_type.clone();
        }
        if let Some(source) = &self.source {
            lead.source = source.clone();
        }
        if let Some(location) = &self.location {
            lead.location = location.clone();
        }
        if let Some(column_id) = &self.column_id {
            lead.column_id = column_id.clone();
        }
        if let Some(budget) = &self.budget {
            lead.budget = budget.clone();
        }
        if let Some(quote_status) = self.quote_status {
            lead.quote_status = quote_status;
        }
        if let Some(urgency) = self.urgency {
            lead.urgency = urgency;
        }
        if let Some(last_contact) = self.last_contact {
            lead.last_contact = last_contact;
        }
        if let Some(contact_channels) = &self.contact_channels {
            lead.contact_channels = contact_channels.clone();
        }
        if let Some(services) = &self.services {
            lead.services = services.clone();
        }
        if let Some(context) = &self.context {
            lead.context = context.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{ContactChannel, Lead, LeadDraft, LeadPatch, Service, ServiceStatus};

    fn sample_lead() -> Lead {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut lead = Lead::from_draft(
            LeadDraft {
                name: "Acme Pools".to_string(),
                ..LeadDraft::default()
            },
            now,
        );
        lead.contact_channels = vec![ContactChannel::Whatsapp];
        lead.services = vec![Service {
            id: "svc-1".to_string(),
            name: "Maintenance".to_string(),
            status: ServiceStatus::Proposed,
            price: Some(120.0),
        }];
        lead
    }

    #[test]
    fn reassert_preserves_untouched_collections() {
        let lead = sample_lead();
        let patch = LeadPatch {
            column_id: Some("contacted".to_string()),
            ..LeadPatch::default()
        }
        .reasserted_for(&lead);

        assert_eq!(patch.contact_channels.as_deref(), Some(lead.contact_channels.as_slice()));
        assert_eq!(patch.services.as_deref(), Some(lead.services.as_slice()));
    }

    #[test]
    fn reassert_keeps_explicit_values() {
        let lead = sample_lead();
        let patch = LeadPatch {
            contact_channels: Some(vec![]),
            ..LeadPatch::default()
        }
        .reasserted_for(&lead);

        assert_eq!(patch.contact_channels, Some(vec![]));
        assert_eq!(patch.services.as_deref(), Some(lead.services.as_slice()));
    }

    #[test]
    fn apply_patch_only_touches_named_fields() {
        let mut lead = sample_lead();
        let before = lead.clone();
        LeadPatch {
            column_id: Some("contacted".to_string()),
            ..LeadPatch::default()
        }
        .apply_to(&mut lead);

        assert_eq!(lead.column_id, "contacted");
        assert_eq!(lead.contact_channels, before.contact_channels);
        assert_eq!(lead.services, before.services);
        assert_eq!(lead.history.len(), before.history.len());
    }

    #[test]
    fn draft_requires_a_name() {
        assert!(LeadDraft::default().validate().is_err());
        let draft = LeadDraft {
            name: "Someone".to_string(),
            ..LeadDraft::default()
        };
        assert!(draft.validate().is_ok());
    }
}
