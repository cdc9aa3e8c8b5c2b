use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tasklens_core::{Annotation, Priority, Status, Task};

const PROJECTS: &[&str] = &["work", "work.email", "work.reports", "home", "home.garden", "errands", "learning"];
const TAGS: &[&str] = &["urgent", "next", "someday", "phone", "waiting-on", "review", "bug"];
const VERBS: &[&str] = &["Write", "Review", "Call", "Fix", "Plan", "Email", "Clean", "Read", "Book", "Prepare"];
const NOUNS: &[&str] = &["report", "budget", "dentist", "garden", "slides", "invoice", "car", "notes", "trip", "backlog"];

/// Deterministic synthetic tasks for exercising large collections.
pub fn synthetic_tasks(count: usize, seed: u64, now: DateTime<Utc>) -> Vec<Task> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=count as u64)
        .map(|id| {
            let status = match rng.random_range(0..100) {
                0..=59 => Status::Pending,
                60..=69 => Status::Waiting,
                70..=89 => Status::Completed,
                90..=96 => Status::Deleted,
                _ => Status::Recurring,
            };
            let description = format!(
                "{} {} #{id}",
                VERBS[rng.random_range(0..VERBS.len())],
                NOUNS[rng.random_range(0..NOUNS.len())]
            );
            let mut task = Task::new(id, description, status);
            task.uuid = Some(format!("{seed:08x}-{id:012x}"));
            if rng.random_bool(0.85) {
                task.project = Some(PROJECTS[rng.random_range(0..PROJECTS.len())].to_string());
            }
            task.priority = match rng.random_range(0..4) {
                0 => Some(Priority::High),
                1 => Some(Priority::Medium),
                2 => Some(Priority::Low),
                _ => None,
            };
            for _ in 0..rng.random_range(0..3) {
                let tag = TAGS[rng.random_range(0..TAGS.len())].to_string();
                if !task.tags.contains(&tag) {
                    task.tags.push(tag);
                }
            }
            if rng.random_bool(0.5) {
                task.due = Some(now + Duration::hours(rng.random_range(-240..=720)));
            }
            if rng.random_bool(0.1) {
                task.scheduled = Some(now + Duration::hours(rng.random_range(0..=168)));
            }
            if rng.random_bool(0.05) {
                task.annotations.push(Annotation {
                    entry: now - Duration::hours(rng.random_range(1..=48)),
                    description: "follow up".to_string(),
                });
            }
            task.urgency = urgency_of(&task, now);
            task
        })
        .collect()
}

// rough taskwarrior-style weighting
fn urgency_of(task: &Task, now: DateTime<Utc>) -> f64 {
    let mut u = match task.priority {
        Some(Priority::High) => 6.0,
        Some(Priority::Medium) => 3.9,
        Some(Priority::Low) => 1.8,
        None => 0.0,
    };
    if task.project.is_some() {
        u += 1.0;
    }
    if task.tags.iter().any(|t| t == "next") {
        u += 15.0;
    }
    u += 0.8 * task.tags.len().min(3) as f64;
    if let Some(due) = task.due {
        let days = (due - now).num_hours() as f64 / 24.0;
        u += 12.0 * ((14.0 - days) / 21.0).clamp(0.2, 1.0);
    }
    if task.status == Status::Waiting {
        u -= 3.0;
    }
    (u * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap()
    }

    #[test]
    fn same_seed_same_tasks() {
        let a = synthetic_tasks(200, 7, now());
        let b = synthetic_tasks(200, 7, now());
        assert_eq!(a, b);
        assert_ne!(a, synthetic_tasks(200, 8, now()));
    }

    #[test]
    fn ids_are_dense_and_tags_unique() {
        let tasks = synthetic_tasks(500, 1, now());
        assert!(tasks.iter().enumerate().all(|(i, t)| t.id == i as u64 + 1));
        for t in &tasks {
            let mut tags = t.tags.clone();
            tags.dedup();
            tags.sort();
            tags.dedup();
            assert_eq!(tags.len(), t.tags.len());
            assert!(t.urgency.is_finite());
        }
    }
}
