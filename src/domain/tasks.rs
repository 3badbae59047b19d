//! Task domain types
//!
//! Follow-up work items inside an organisation, optionally tied to a contact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::require_text;
use crate::api::{Listable, SortKey};
use crate::error::ApiResult;

/// Task status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "done" => Self::Done,
            _ => Self::Todo,
        }
    }
}

/// Task priority enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Medium,
        }
    }
}

/// Request DTO for creating a task
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contact_id: Option<Uuid>,
}

impl CreateTaskRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        self.title = require_text("title", &self.title)?;
        Ok(self)
    }
}

/// Request DTO for updating a task
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contact_id: Option<Uuid>,
}

impl UpdateTaskRequest {
    pub fn validated(mut self) -> ApiResult<Self> {
        if let Some(title) = &self.title {
            self.title = Some(require_text("title", title)?);
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskFilter {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
}

/// Response DTO for task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub contact_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskResponse {
    pub fn matches(&self, filter: &TaskFilter) -> bool {
        filter.status.map_or(true, |s| s == self.status)
            && filter.assignee_id.map_or(true, |a| self.assignee_id == Some(a))
    }
}

impl Listable for TaskResponse {
    const SORT_COLUMNS: &'static [&'static str] =
        &["title", "status", "priority", "due_date", "created_at"];

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str()];
        fields.extend(self.description.as_deref());
        fields
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "title" => SortKey::text(&self.title),
            "status" => SortKey::text(self.status.as_str()),
            "priority" => SortKey::Number(self.priority as i64),
            "due_date" => self.due_date.map(SortKey::Timestamp).unwrap_or(SortKey::Missing),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_priority_round_trip() {
        for status in [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done] {
            assert_eq!(TaskStatus::parse(status.as_str()), status);
        }
        for priority in [
            TaskPriority::Low,
            TaskPriority::Medium,
            TaskPriority::High,
            TaskPriority::Urgent,
        ] {
            assert_eq!(TaskPriority::parse(priority.as_str()), priority);
        }
    }

    #[test]
    fn priority_sorts_by_urgency() {
        assert!(TaskPriority::Urgent > TaskPriority::High);
        assert!((TaskPriority::Low as i64) < (TaskPriority::Medium as i64));
    }

    #[test]
    fn defaults_from_json() {
        let req: CreateTaskRequest =
            serde_json::from_value(serde_json::json!({ "title": "Relancer le client" })).unwrap();
        assert_eq!(req.status, TaskStatus::Todo);
        assert_eq!(req.priority, TaskPriority::Medium);
    }
}
