use chrono::{DateTime, Utc};
use tasklens_core::{ItemRenderer, LineStyle, Priority, Record, RenderError, Status, StyledLine, Task};

const MAX_DESCRIPTION_LINES: usize = 3;

/// One header line per task (id, priority, project, due, urgency, start of
/// the description), continuation lines for long descriptions and
/// optionally one line per annotation.
pub struct TaskRenderer {
    show_annotations: bool,
    now: Option<DateTime<Utc>>,
}

impl TaskRenderer {
    pub fn new(show_annotations: bool) -> Self {
        Self { show_annotations, now: None }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn style_for(&self, task: &Task, now: DateTime<Utc>) -> LineStyle {
        match task.status() {
            Status::Completed | Status::Deleted => LineStyle::Dimmed,
            _ if task.due().is_some_and(|d| d < now) => LineStyle::Error,
            _ if task.priority() == Some(Priority::High) => LineStyle::Warning,
            Status::Waiting => LineStyle::Dimmed,
            _ => LineStyle::Normal,
        }
    }
}

impl ItemRenderer<Task> for TaskRenderer {
    fn render(&self, task: &Task, width: usize) -> Result<Vec<StyledLine>, RenderError> {
        if width < 8 {
            return Err(RenderError::Record { id: task.id, reason: format!("width {width} too narrow") });
        }
        let now = self.now.unwrap_or_else(Utc::now);
        let style = self.style_for(task, now);
        let project = task.project().unwrap_or("-");
        let due = task.due().map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        let prefix = format!(
            "{:>5} {:1} {:<12.12} {:<10} {:>5.1} ",
            task.id,
            task.priority().map(|p| p.as_str()).unwrap_or(" "),
            project,
            due,
            task.urgency()
        );
        let prefix_len = prefix.chars().count();

        let mut lines = Vec::new();
        if prefix_len + 4 > width {
            // too narrow for columns: id and description only
            let text = format!("{} {}", task.id, task.description());
            for chunk in wrap(&text, width).into_iter().take(MAX_DESCRIPTION_LINES) {
                lines.push(StyledLine::new(chunk, style));
            }
        } else {
            let indent = " ".repeat(prefix_len);
            for (i, chunk) in wrap(task.description(), width - prefix_len)
                .into_iter()
                .take(MAX_DESCRIPTION_LINES)
                .enumerate()
            {
                let head = if i == 0 { prefix.as_str() } else { indent.as_str() };
                lines.push(StyledLine::new(format!("{head}{chunk}"), style));
            }
            if !task.tags().is_empty() {
                let tags: Vec<String> = task.tags().iter().map(|t| format!("+{t}")).collect();
                if let Some(first) = lines.first_mut() {
                    let joined = format!(" {}", tags.join(" "));
                    if first.text.chars().count() + joined.chars().count() <= width {
                        first.text.push_str(&joined);
                    }
                }
            }
        }
        if self.show_annotations {
            for a in task.annotations() {
                let text = format!("      {} {}", a.entry.format("%Y-%m-%d"), a.description);
                lines.push(StyledLine::new(text, LineStyle::Accent));
            }
        }
        if lines.is_empty() {
            lines.push(StyledLine::new(format!("{:>5}", task.id), style));
        }
        Ok(lines)
    }
}

// greedy word wrap on char counts; words longer than `width` are split
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    let mut line = String::new();
    let mut line_len = 0;
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if line_len > 0 {
                out.push(std::mem::take(&mut line));
                line_len = 0;
            }
            let rest = word.split_off(width);
            out.push(word.into_iter().collect());
            word = rest;
        }
        let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
        if needed > width && line_len > 0 {
            out.push(std::mem::take(&mut line));
            line_len = 0;
        }
        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line_len += word.len();
        line.extend(word);
    }
    if line_len > 0 {
        out.push(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tasklens_core::Annotation;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap()
    }

    #[test]
    fn wrap_splits_on_words_and_long_tokens() {
        assert_eq!(wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert!(wrap("   ", 4).is_empty());
    }

    #[test]
    fn header_line_carries_columns() {
        let t = Task::new(42, "Ship it", Status::Pending)
            .with_project("work")
            .with_priority(Priority::High)
            .with_urgency(9.25)
            .with_tag("next");
        let lines = TaskRenderer::new(false).with_now(now()).render(&t, 80).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].text.starts_with("   42 H work"));
        assert!(lines[0].text.contains("Ship it +next"));
        assert_eq!(lines[0].style, LineStyle::Warning);
    }

    #[test]
    fn long_descriptions_wrap_and_annotations_follow() {
        let mut t = Task::new(1, "one two three four five six seven eight nine ten", Status::Completed);
        t.annotations.push(Annotation { entry: now(), description: "note".into() });
        let lines = TaskRenderer::new(true).with_now(now()).render(&t, 50).unwrap();
        assert!(lines.len() >= 3);
        assert!(lines.iter().all(|l| l.text.chars().count() <= 50));
        assert_eq!(lines[0].style, LineStyle::Dimmed);
        assert_eq!(lines.last().map(|l| l.style), Some(LineStyle::Accent));
    }

    #[test]
    fn overdue_is_flagged_and_tiny_width_errors() {
        let t = Task::new(3, "late", Status::Pending).with_due(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        let r = TaskRenderer::new(false).with_now(now());
        assert_eq!(r.render(&t, 60).unwrap()[0].style, LineStyle::Error);
        assert!(r.render(&t, 4).is_err());
        let narrow = r.render(&t, 12).unwrap();
        assert_eq!(narrow[0].text, "3 late");
    }
}
