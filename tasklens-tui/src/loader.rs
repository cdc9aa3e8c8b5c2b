use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tasklens_common::{Result, TaskLensError};
use tasklens_core::{Annotation, DataProvider, Priority, Status, Task};

const TW_DATE: &str = "%Y%m%dT%H%M%SZ";

/// Taskwarrior `task export` file (a JSON array of task objects).
pub struct JsonTaskFile {
    path: PathBuf,
    name: String,
}

impl JsonTaskFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }
}

impl DataProvider<Task> for JsonTaskFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Task>> {
        let text = std::fs::read_to_string(&self.path)?;
        parse_export(&text)
    }
}

#[derive(Deserialize)]
struct RawAnnotation {
    entry: String,
    description: String,
}

#[derive(Deserialize)]
struct RawTask {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    uuid: Option<String>,
    description: String,
    status: String,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    urgency: f64,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    due: Option<String>,
    #[serde(default)]
    scheduled: Option<String>,
    #[serde(default)]
    annotations: Vec<RawAnnotation>,
}

/// Parses an export. Completed and deleted tasks carry id 0 there; those are
/// numbered after the highest real id. Records with an unknown status are
/// skipped, bad dates fail the whole load.
pub fn parse_export(text: &str) -> Result<Vec<Task>> {
    let raw: Vec<RawTask> = serde_json::from_str(text)?;
    let mut next_id = raw.iter().map(|r| r.id).max().unwrap_or(0).saturating_add(1);
    let mut out = Vec::with_capacity(raw.len());
    for r in raw {
        let Ok(status) = r.status.parse::<Status>() else {
            tracing::warn!(status = %r.status, uuid = ?r.uuid, "skipping task with unknown status");
            continue;
        };
        let id = if r.id == 0 {
            let id = next_id;
            next_id = next_id.saturating_add(1);
            id
        } else {
            r.id
        };
        let annotations = r
            .annotations
            .into_iter()
            .map(|a| Ok(Annotation { entry: parse_date(&a.entry)?, description: a.description }))
            .collect::<Result<Vec<_>>>()?;
        out.push(Task {
            id,
            uuid: r.uuid,
            description: r.description,
            status,
            project: r.project.filter(|p| !p.is_empty()),
            priority: r.priority.as_deref().and_then(|p| p.parse::<Priority>().ok()),
            urgency: r.urgency,
            tags: r.tags,
            due: r.due.as_deref().map(parse_date).transpose()?,
            scheduled: r.scheduled.as_deref().map(parse_date).transpose()?,
            annotations,
        });
    }
    Ok(out)
}

/// `20240510T120000Z` (Taskwarrior) or RFC 3339.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TW_DATE) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| TaskLensError::Other(format!("invalid date {s:?}: {e}")))
}

#[derive(Serialize)]
struct ExportTask<'a> {
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<&'a str>,
    description: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<&'a str>,
    urgency: f64,
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    due: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheduled: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<ExportAnnotation<'a>>,
}

#[derive(Serialize)]
struct ExportAnnotation<'a> {
    entry: String,
    description: &'a str,
}

fn no_tags(tags: &&[String]) -> bool {
    tags.is_empty()
}

/// Writes tasks in the same export shape `parse_export` reads.
pub fn to_export_json(tasks: &[Task]) -> Result<String> {
    let rows: Vec<ExportTask> = tasks
        .iter()
        .map(|t| ExportTask {
            id: t.id,
            uuid: t.uuid.as_deref(),
            description: &t.description,
            status: t.status.as_str(),
            project: t.project.as_deref(),
            priority: t.priority.map(|p| p.as_str()),
            urgency: t.urgency,
            tags: &t.tags,
            due: t.due.map(|d| d.format(TW_DATE).to_string()),
            scheduled: t.scheduled.map(|d| d.format(TW_DATE).to_string()),
            annotations: t
                .annotations
                .iter()
                .map(|a| ExportAnnotation { entry: a.entry.format(TW_DATE).to_string(), description: &a.description })
                .collect(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}
