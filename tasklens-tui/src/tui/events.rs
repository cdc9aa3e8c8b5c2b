use crate::tui::app::{App, Mode};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub fn handle_key(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }
    match app.mode {
        Mode::Help => app.mode = Mode::Browse,
        Mode::QueryInput => handle_query_input(app, key),
        Mode::Browse => handle_browse(app, key),
    }
}

fn handle_query_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_query(),
        KeyCode::Enter => app.submit_query(),
        KeyCode::Backspace => {
            app.query_input.pop();
        }
        KeyCode::Char(c) => app.query_input.push(c),
        _ => {}
    }
}

fn handle_browse(app: &mut App, key: KeyEvent) {
    let half_page = (app.page_size() / 2).max(1) as isize;
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('?') => app.mode = Mode::Help,
        KeyCode::Char('/') => app.begin_query(),
        KeyCode::Char('j') | KeyCode::Down => app.viewport.move_cursor(1),
        KeyCode::Char('k') | KeyCode::Up => app.viewport.move_cursor(-1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => app.viewport.move_cursor(half_page),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => app.viewport.move_cursor(-half_page),
        KeyCode::PageDown | KeyCode::Char(' ') => app.viewport.move_cursor(app.page_size() as isize),
        KeyCode::PageUp => app.viewport.move_cursor(-(app.page_size() as isize)),
        KeyCode::Char('g') | KeyCode::Home => app.viewport.scroll_to_top(),
        KeyCode::Char('G') | KeyCode::End => app.viewport.scroll_to_bottom(),
        KeyCode::Char('c') => app.clear_query(),
        KeyCode::Char('s') => app.cycle_sorter(),
        KeyCode::Char('S') => app.save_current_query(),
        KeyCode::Char('r') => app.request_reload(),
        KeyCode::Char('n') => app.next_saved_query(),
        KeyCode::Esc => app.status_msg.clear(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::app::tests_app::app;

    fn press(app: &mut App, code: KeyCode) {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_str(app: &mut App, s: &str) {
        for c in s.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn navigation_keys_move_cursor() {
        let mut app = app();
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Down);
        assert_eq!(app.viewport.cursor(), 2);
        press(&mut app, KeyCode::Char('k'));
        assert_eq!(app.viewport.cursor(), 1);
        press(&mut app, KeyCode::Char('G'));
        assert_eq!(app.viewport.cursor(), 59);
        assert_eq!(app.viewport.scroll_position(), 50);
        press(&mut app, KeyCode::PageUp);
        assert_eq!(app.viewport.cursor(), 49);
        press(&mut app, KeyCode::Char('g'));
        assert_eq!(app.viewport.cursor(), 0);
        assert_eq!(app.viewport.scroll_position(), 0);
    }

    #[test]
    fn query_input_applies_on_enter() {
        let mut app = app();
        press(&mut app, KeyCode::Char('/'));
        assert_eq!(app.mode, Mode::QueryInput);
        type_str(&mut app, "project:workq");
        press(&mut app, KeyCode::Backspace);
        // 'q' while typing is text, not quit
        assert!(!app.should_quit);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.mode, Mode::Browse);
        assert_eq!(app.active_query, "project:work");
        assert_eq!(app.result_count, 30);
    }

    #[test]
    fn escape_discards_query_and_help_closes_on_any_key() {
        let mut app = app();
        press(&mut app, KeyCode::Char('/'));
        type_str(&mut app, "status:completed");
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.mode, Mode::Browse);
        assert_eq!(app.result_count, 60);
        press(&mut app, KeyCode::Char('?'));
        assert_eq!(app.mode, Mode::Help);
        press(&mut app, KeyCode::Char('q'));
        assert_eq!(app.mode, Mode::Browse);
        assert!(!app.should_quit);
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[test]
    fn ctrl_c_quits_from_any_mode() {
        let mut app = app();
        press(&mut app, KeyCode::Char('/'));
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }
}
