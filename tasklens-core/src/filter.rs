use crate::record::{Priority, Record, Status};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt::Write;

// --- predicates ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterGroup {
    pub kind: GroupKind,
    pub children: Vec<Filter>,
}

impl FilterGroup {
    pub fn and(children: Vec<Filter>) -> Self {
        Self { kind: GroupKind::And, children }
    }

    pub fn or(children: Vec<Filter>) -> Self {
        Self { kind: GroupKind::Or, children }
    }

    /// AND of nothing matches everything, OR of nothing matches nothing.
    pub fn matches<R: Record>(&self, record: &R) -> bool {
        match self.kind {
            GroupKind::And => self.children.iter().all(|f| f.matches(record)),
            GroupKind::Or => self.children.iter().any(|f| f.matches(record)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Status(Status),
    /// matches the project itself and its dotted sub-projects (`work` matches `work.email`)
    Project(String),
    Priority(Priority),
    Tag(String),
    UrgencyRange { min: f64, max: f64 },
    DueDateRange { start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>> },
    /// case-sensitive substring over the description, no unicode normalization
    TextSearch(String),
    HasDueDate,
    HasProject,
    Not(Box<Filter>),
    Group(FilterGroup),
}

impl Filter {
    pub fn and(children: Vec<Filter>) -> Self {
        Filter::Group(FilterGroup::and(children))
    }

    pub fn or(children: Vec<Filter>) -> Self {
        Filter::Group(FilterGroup::or(children))
    }

    pub fn negate(inner: Filter) -> Self {
        Filter::Not(Box::new(inner))
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        match self {
            Filter::Status(s) => record.status() == *s,
            Filter::Project(p) => record.project().is_some_and(|rp| project_matches(rp, p)),
            Filter::Priority(p) => record.priority() == Some(*p),
            Filter::Tag(t) => record.tags().iter().any(|rt| rt == t),
            Filter::UrgencyRange { min, max } => {
                let u = record.urgency();
                u >= *min && u <= *max // NaN never matches
            }
            Filter::DueDateRange { start, end } => match record.due() {
                Some(d) => start.map_or(true, |s| d >= s) && end.map_or(true, |e| d <= e),
                None => false,
            },
            Filter::TextSearch(needle) => record.description().contains(needle.as_str()),
            Filter::HasDueDate => record.due().is_some(),
            Filter::HasProject => record.project().is_some(),
            Filter::Not(inner) => !inner.matches(record),
            Filter::Group(g) => g.matches(record),
        }
    }

    /// Canonical text form; equal filters produce equal signatures.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        let _ = match self {
            Filter::Status(s) => write!(out, "status={s}"),
            Filter::Project(p) => write!(out, "project={p:?}"),
            Filter::Priority(p) => write!(out, "priority={p}"),
            Filter::Tag(t) => write!(out, "tag={t:?}"),
            Filter::UrgencyRange { min, max } => write!(out, "urgency=[{min:?},{max:?}]"),
            Filter::DueDateRange { start, end } => write!(
                out,
                "due=[{},{}]",
                start.map(|d| d.to_rfc3339()).unwrap_or_default(),
                end.map(|d| d.to_rfc3339()).unwrap_or_default()
            ),
            Filter::TextSearch(s) => write!(out, "text={s:?}"),
            Filter::HasDueDate => write!(out, "has_due"),
            Filter::HasProject => write!(out, "has_project"),
            Filter::Not(inner) => {
                out.push_str("not(");
                inner.write_signature(out);
                write!(out, ")")
            }
            Filter::Group(g) => {
                out.push_str(match g.kind {
                    GroupKind::And => "and(",
                    GroupKind::Or => "or(",
                });
                for (i, child) in g.children.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    child.write_signature(out);
                }
                write!(out, ")")
            }
        };
    }
}

fn project_matches(record_project: &str, wanted: &str) -> bool {
    record_project == wanted
        || (record_project.len() > wanted.len()
            && record_project.starts_with(wanted)
            && record_project.as_bytes()[wanted.len()] == b'.')
}

// --- ordering ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sorter {
    Urgency { descending: bool },
    DueDate { descending: bool },
    Project { descending: bool },
}

impl Sorter {
    /// Missing due dates and projects order after present ones in both directions.
    pub fn compare<R: Record>(&self, a: &R, b: &R) -> Ordering {
        match *self {
            Sorter::Urgency { descending } => directed(a.urgency().total_cmp(&b.urgency()), descending),
            Sorter::DueDate { descending } => compare_optional(a.due(), b.due(), descending),
            Sorter::Project { descending } => compare_optional(a.project(), b.project(), descending),
        }
    }

    pub fn signature(&self) -> String {
        let (name, descending) = match *self {
            Sorter::Urgency { descending } => ("urgency", descending),
            Sorter::DueDate { descending } => ("due", descending),
            Sorter::Project { descending } => ("project", descending),
        };
        format!("{name}{}", if descending { '-' } else { '+' })
    }
}

fn directed(ord: Ordering, descending: bool) -> Ordering {
    if descending {
        ord.reverse()
    } else {
        ord
    }
}

fn compare_optional<T: Ord>(a: Option<T>, b: Option<T>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => directed(x.cmp(&y), descending),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
