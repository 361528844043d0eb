//! Ticket domain model and storage.
//!
//! Tickets come from two places: bulk ingestion of historical data
//! ([`TicketSource::Imported`]) and submissions through the resolve endpoint
//! ([`TicketSource::Submitted`]). Only imported tickets with a resolution
//! make up the similarity corpus.
//!
//! # Architecture
//!
//! - [`Ticket`]: a single ticket snapshot
//! - [`TicketStore`]: thread-safe store with per-ticket locking and an
//!   embedding cache keyed by description revision

mod store;

pub use store::{CorpusEntry, TicketStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque ticket identifier.
pub type TicketId = Uuid;

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    New,
    Pending,
    InProgress,
    Resolved,
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(Self::New),
            "pending" => Ok(Self::Pending),
            "in-progress" | "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("Invalid ticket status: {other}")),
        }
    }
}

/// Ticket priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("Invalid priority: {other}")),
        }
    }
}

/// Where a ticket came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketSource {
    /// Historical ticket loaded through ingestion.
    Imported,
    /// Ticket submitted for resolution.
    Submitted,
}

/// A user-reported issue, optionally paired with a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub description: String,
    pub resolution: Option<String>,
    pub status: TicketStatus,
    pub priority: Priority,
    pub source: TicketSource,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// A freshly submitted ticket awaiting resolution.
    pub fn submitted(description: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            resolution: None,
            status: TicketStatus::New,
            priority,
            source: TicketSource::Submitted,
            created_at: Utc::now(),
        }
    }

    /// A historical ticket with a known resolution.
    pub fn imported(
        description: impl Into<String>,
        resolution: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            resolution: Some(resolution.into()),
            status: TicketStatus::Resolved,
            priority,
            source: TicketSource::Imported,
            created_at: Utc::now(),
        }
    }

    /// Whether this ticket belongs to the similarity corpus.
    pub fn is_historical(&self) -> bool {
        self.source == TicketSource::Imported
            && self
                .resolution
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty())
    }
}

/// Optional status/priority predicate for listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TicketFilter {
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl TicketFilter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.status.is_none_or(|s| s == ticket.status)
            && self.priority.is_none_or(|p| p == ticket.priority)
    }
}

/// Partial update applied to a stored ticket.
///
/// `resolution: Some(None)` clears the resolution.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketUpdate {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "double_option")]
    pub resolution: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl TicketUpdate {
    pub fn status(status: TicketStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn resolved_with(resolution: impl Into<String>) -> Self {
        Self {
            resolution: Some(Some(resolution.into())),
            status: Some(TicketStatus::Resolved),
            ..Self::default()
        }
    }

    /// Apply to a ticket; returns whether the description changed.
    pub(crate) fn apply(self, ticket: &mut Ticket) -> bool {
        let mut description_changed = false;
        if let Some(description) = self.description {
            description_changed = description != ticket.description;
            ticket.description = description;
        }
        if let Some(resolution) = self.resolution {
            ticket.resolution = resolution;
        }
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(priority) = self.priority {
            ticket.priority = priority;
        }
        description_changed
    }
}

// Distinguishes an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
