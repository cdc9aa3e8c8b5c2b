use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::tui::app::{App, Mode};
use crate::tui::theme::Theme;

const SAVED_PANEL_WIDTH: u16 = 32;

fn split(area: Rect, has_saved: bool) -> (Rect, Rect, Rect, Option<Rect>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1)])
        .split(area);
    if !has_saved {
        return (chunks[0], chunks[1], chunks[2], None);
    }
    let mid = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(SAVED_PANEL_WIDTH)])
        .split(chunks[1]);
    (chunks[0], mid[0], chunks[2], Some(mid[1]))
}

/// Inner rect of the task list for a frame of `area`; the viewport is sized to it.
pub fn list_area(area: Rect, has_saved: bool) -> Rect {
    let (_, list, _, _) = split(area, has_saved);
    Block::default().borders(Borders::ALL).inner(list)
}

pub fn render(frame: &mut Frame, app: &App) {
    let theme = &app.theme;
    let area = frame.area();
    let (top, list, bottom, saved) = split(area, !app.saved_queries.is_empty());
    render_topbar(frame, app, top, theme);
    render_list(frame, app, list, theme);
    if let Some(saved) = saved {
        render_saved(frame, app, saved, theme);
    }
    render_bottombar(frame, app, bottom, theme);
    match app.mode {
        Mode::QueryInput => render_query_overlay(frame, app, area),
        Mode::Help => render_help(frame, area),
        Mode::Browse => {}
    }
}

fn render_topbar(frame: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let query = if app.active_query.is_empty() { "(all)".to_string() } else { app.active_query.clone() };
    let line = Line::from(vec![
        Span::styled(" tasklens ", Style::default().fg(theme.header).add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "| {} | v{} | {} / {} tasks | query: {} | sort: {}",
            app.input_path,
            app.engine.version(),
            app.result_count,
            app.total_count(),
            query,
            app.sorter_label()
        )),
    ]);
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(theme.bg).fg(theme.fg)), area);
}

fn render_list(frame: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let total = app.viewport.total_count();
    let position = if total == 0 { 0 } else { app.viewport.cursor() + 1 };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Tasks {position}/{total}"))
        .border_style(Style::default().fg(theme.accent));
    if total == 0 {
        frame.render_widget(Paragraph::new("No tasks match.").block(block), area);
        return;
    }
    let (buf, _) = app.render_list();
    let lines: Vec<Line> = buf
        .lines()
        .iter()
        .map(|l| Line::from(Span::styled(l.text.clone(), theme.line_style(l.style))))
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_saved(frame: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let items: Vec<ListItem> = app
        .saved_queries
        .iter()
        .map(|s| {
            let count = s.count.map(|c| c.to_string()).unwrap_or_else(|| "...".into());
            let style = if s.query == app.active_query {
                Style::default().fg(theme.highlight)
            } else {
                Style::default().fg(theme.fg)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<22}", truncate(&s.query, 22)), style),
                Span::styled(format!("{count:>7}"), Style::default().fg(theme.success)),
            ]))
        })
        .collect();
    frame.render_widget(List::new(items).block(Block::default().borders(Borders::ALL).title("Saved (n)")), area);
}

fn render_bottombar(frame: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let last = app.last_outcome.as_deref().unwrap_or("-");
    let mut spans = vec![Span::raw(format!(
        " {} | cache {:.0}% | bg {} running {} queued | last: {} | q:quit ?:help /:query",
        app.status_msg,
        app.cache_hit_rate() * 100.0,
        app.processor.running_count(),
        app.processor.queued_count(),
        last
    ))];
    if let Some(slow) = app.regression_summary() {
        spans.push(Span::styled(format!(" | slow: {slow}"), Style::default().fg(theme.warning)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.bg).fg(theme.fg)), area);
}

fn render_query_overlay(frame: &mut Frame, app: &App, area: Rect) {
    let popup = centered_rect(60, 20, area);
    frame.render_widget(Clear, popup);
    let content = format!(
        "> {}_\n\nproject:<p> status:<s> priority:H|M|L +tag -tag due:<date> sort:<key>[-]\nEnter: apply  Esc: cancel",
        app.query_input
    );
    frame.render_widget(
        Paragraph::new(content)
            .block(Block::default().borders(Borders::ALL).title("Query"))
            .wrap(Wrap { trim: false }),
        popup,
    );
}

fn render_help(frame: &mut Frame, area: Rect) {
    let text = vec![
        Line::from(Span::styled("Keybindings", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  q          Quit"),
        Line::from("  ?          Toggle help"),
        Line::from("  j/k        Move cursor"),
        Line::from("  PgDn/PgUp  Page"),
        Line::from("  C-d/C-u    Half page"),
        Line::from("  g/G        Top / bottom"),
        Line::from("  /          Edit query"),
        Line::from("  c          Clear query"),
        Line::from("  s          Cycle sort"),
        Line::from("  S          Save query"),
        Line::from("  n          Next saved query"),
        Line::from("  r          Reload file"),
    ];
    let popup = centered_rect(40, 60, area);
    frame.render_widget(Clear, popup);
    frame.render_widget(Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Help (?)")), popup);
}

fn centered_rect(px: u16, py: u16, r: Rect) -> Rect {
    let v = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - py) / 2),
            Constraint::Percentage(py),
            Constraint::Percentage((100 - py) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - px) / 2),
            Constraint::Percentage(px),
            Constraint::Percentage((100 - px) / 2),
        ])
        .split(v[1])[1]
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}
