use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Waiting,
    Completed,
    Deleted,
    Recurring,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Waiting => "waiting",
            Status::Completed => "completed",
            Status::Deleted => "deleted",
            Status::Recurring => "recurring",
        }
    }
}

impl FromStr for Status {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "waiting" => Ok(Status::Waiting),
            "completed" => Ok(Status::Completed),
            "deleted" => Ok(Status::Deleted),
            "recurring" => Ok(Status::Recurring),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "H")]
    High,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "L")]
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "H",
            Priority::Medium => "M",
            Priority::Low => "L",
        }
    }
}

impl FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h" | "high" => Ok(Priority::High),
            "m" | "medium" => Ok(Priority::Medium),
            "l" | "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub entry: DateTime<Utc>,
    pub description: String,
}

/// Field accessors the engine needs from a record. Records are never mutated
/// by the engine and are shared between threads as `Arc<R>`.
pub trait Record: Send + Sync + 'static {
    fn id(&self) -> u64;
    fn status(&self) -> Status;
    fn project(&self) -> Option<&str>;
    fn priority(&self) -> Option<Priority>;
    fn urgency(&self) -> f64;
    fn tags(&self) -> &[String];
    fn due(&self) -> Option<DateTime<Utc>>;
    fn scheduled(&self) -> Option<DateTime<Utc>>;
    fn description(&self) -> &str;
    fn annotations(&self) -> &[Annotation] {
        &[]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    #[serde(default)]
    pub uuid: Option<String>,
    pub description: String,
    pub status: Status,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub urgency: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled: Option<DateTime<Utc>>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Task {
    pub fn new(id: u64, description: impl Into<String>, status: Status) -> Self {
        Self {
            id,
            uuid: None,
            description: description.into(),
            status,
            project: None,
            priority: None,
            urgency: 0.0,
            tags: Vec::new(),
            due: None,
            scheduled: None,
            annotations: Vec::new(),
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_urgency(mut self, urgency: f64) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_scheduled(mut self, scheduled: DateTime<Utc>) -> Self {
        self.scheduled = Some(scheduled);
        self
    }
}

impl Record for Task {
    fn id(&self) -> u64 {
        self.id
    }
    fn status(&self) -> Status {
        self.status
    }
    fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }
    fn priority(&self) -> Option<Priority> {
        self.priority
    }
    fn urgency(&self) -> f64 {
        self.urgency
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
    fn due(&self) -> Option<DateTime<Utc>> {
        self.due
    }
    fn scheduled(&self) -> Option<DateTime<Utc>> {
        self.scheduled
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parses_letters_and_words() {
        assert_eq!("H".parse::<Priority>(), Ok(Priority::High));
        assert_eq!("medium".parse::<Priority>(), Ok(Priority::Medium));
        assert_eq!("l".parse::<Priority>(), Ok(Priority::Low));
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn status_round_trips_display() {
        for s in [Status::Pending, Status::Waiting, Status::Completed, Status::Deleted, Status::Recurring] {
            assert_eq!(s.to_string().parse::<Status>(), Ok(s));
        }
    }

    #[test]
    fn task_deserializes_with_missing_optionals() {
        let t: Task = serde_json::from_str(r#"{"id":7,"description":"x","status":"waiting","priority":"H"}"#).unwrap();
        assert_eq!(t.status, Status::Waiting);
        assert_eq!(t.priority, Some(Priority::High));
        assert!(t.tags.is_empty());
        assert!(t.due.is_none());
    }
}
