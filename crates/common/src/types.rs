use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Kind of external resource a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    GithubIssue,
    GithubPullRequest,
    GithubRepository,
    StackoverflowQuestion,
}

impl LinkType {
    /// Every supported link type. The update router must cover all of them.
    pub const ALL: [LinkType; 4] = [
        LinkType::GithubIssue,
        LinkType::GithubPullRequest,
        LinkType::GithubRepository,
        LinkType::StackoverflowQuestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::GithubIssue => "github_issue",
            LinkType::GithubPullRequest => "github_pull_request",
            LinkType::GithubRepository => "github_repository",
            LinkType::StackoverflowQuestion => "stackoverflow_question",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LinkType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::InvalidLink(format!("unknown link type '{s}'")))
    }
}

/// Type-specific coordinates of a tracked resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkDescriptor {
    GithubIssue {
        owner: String,
        repo: String,
        number: i64,
    },
    GithubPullRequest {
        owner: String,
        repo: String,
        number: i64,
    },
    GithubRepository {
        owner: String,
        repo: String,
    },
    StackoverflowQuestion {
        question_id: i64,
    },
}

impl LinkDescriptor {
    pub fn link_type(&self) -> LinkType {
        match self {
            LinkDescriptor::GithubIssue { .. } => LinkType::GithubIssue,
            LinkDescriptor::GithubPullRequest { .. } => LinkType::GithubPullRequest,
            LinkDescriptor::GithubRepository { .. } => LinkType::GithubRepository,
            LinkDescriptor::StackoverflowQuestion { .. } => LinkType::StackoverflowQuestion,
        }
    }
}

/// Raw `links` row as stored by the registry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LinkRow {
    pub id: i64,
    pub url: String,
    pub link_type: String,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub item_number: Option<i64>,
    pub question_id: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub last_checked: DateTime<Utc>,
    pub version: i64,
}

/// A link whose activity is periodically polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub id: i64,
    pub url: String,
    pub descriptor: LinkDescriptor,
    /// Timestamp of the last confirmed activity; `None` until the first check.
    pub last_modified: Option<DateTime<Utc>>,
    /// Timestamp of the last poll attempt (advanced at claim time).
    pub last_checked: DateTime<Utc>,
    pub version: i64,
}

impl TrackedResource {
    pub fn link_type(&self) -> LinkType {
        self.descriptor.link_type()
    }
}

impl TryFrom<LinkRow> for TrackedResource {
    type Error = AppError;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        let link_type: LinkType = row.link_type.parse()?;
        let missing = |field: &str| {
            AppError::InvalidLink(format!(
                "link {} of type {} has no {}",
                row.id, link_type, field
            ))
        };

        let descriptor = match link_type {
            LinkType::GithubIssue | LinkType::GithubPullRequest => {
                let owner = row.owner.clone().ok_or_else(|| missing("owner"))?;
                let repo = row.repo.clone().ok_or_else(|| missing("repo"))?;
                let number = row.item_number.ok_or_else(|| missing("item_number"))?;
                if link_type == LinkType::GithubIssue {
                    LinkDescriptor::GithubIssue {
                        owner,
                        repo,
                        number,
                    }
                } else {
                    LinkDescriptor::GithubPullRequest {
                        owner,
                        repo,
                        number,
                    }
                }
            }
            LinkType::GithubRepository => LinkDescriptor::GithubRepository {
                owner: row.owner.clone().ok_or_else(|| missing("owner"))?,
                repo: row.repo.clone().ok_or_else(|| missing("repo"))?,
            },
            LinkType::StackoverflowQuestion => LinkDescriptor::StackoverflowQuestion {
                question_id: row.question_id.ok_or_else(|| missing("question_id"))?,
            },
        };

        Ok(TrackedResource {
            id: row.id,
            url: row.url,
            descriptor,
            last_modified: row.last_modified,
            last_checked: row.last_checked,
            version: row.version,
        })
    }
}

/// The most recent relevant event observed for a resource. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDetail {
    pub occurred_at: DateTime<Utc>,
    /// Actor or title of the event.
    pub label: String,
    /// Human-readable, length-bounded description.
    pub description: String,
}

impl ActivityDetail {
    pub fn new(
        occurred_at: DateTime<Utc>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            occurred_at,
            label: label.into(),
            description: description.into(),
        }
    }
}

/// Wire payload delivered to notification consumers.
///
/// Consumers deduplicate on `(id, occurred_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: i64,
    pub url: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
    pub subscriber_ids: BTreeSet<i64>,
}

/// A staged notification awaiting publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: i64,
    pub topic: String,
    pub message_key: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    /// `None` while pending; set exactly once after a confirmed publish.
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }
}

/// Outbox row to be written alongside a `last_modified` update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxMessage {
    pub topic: String,
    pub message_key: String,
    pub payload: String,
}

impl NewOutboxMessage {
    /// Serialize an event for `topic`, keyed by the resource id.
    pub fn for_event(topic: &str, event: &NotificationEvent) -> Result<Self, AppError> {
        Ok(Self {
            topic: topic.to_string(),
            message_key: event.id.to_string(),
            payload: serde_json::to_string(event)?,
        })
    }
}

/// Snapshot of the outbox backlog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxStats {
    pub pending: i64,
    pub processed: i64,
    pub oldest_pending_at: Option<DateTime<Utc>>,
}
