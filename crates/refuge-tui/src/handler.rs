use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use std::time::Instant;

use crate::app::{App, Screen};
use crate::input::TextInput;
use crate::tui::AppEvent;

const PAGE: u16 = 10;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize(_, _) => {}
        AppEvent::Channel(event) => app.handle_session_event(event),
        AppEvent::Tick => app.tick(Instant::now()),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work on every screen
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.screen {
        Screen::Landing => handle_landing(app, key),
        Screen::Login => handle_login(app, key),
        Screen::Chat => handle_chat(app, key),
    }
}

fn handle_landing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Enter | KeyCode::Char(' ') => app.get_started(),
        _ => {}
    }
}

fn handle_login(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Esc => app.show_landing(),
        KeyCode::Tab | KeyCode::Down => app.next_login_field(),
        KeyCode::BackTab | KeyCode::Up => app.prev_login_field(),
        KeyCode::Enter => app.submit_login(),

        KeyCode::Char('t') if ctrl => app.toggle_login_mode(),
        KeyCode::Char('g') if ctrl => app.start_google(),
        KeyCode::Char('r') if ctrl => app.reset_password(),

        _ => {
            edit_input(app.focused_input(), key);
        }
    }
}

fn handle_chat(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char('l') if ctrl => app.logout(),
        KeyCode::Char('r') if ctrl => app.reconnect(),

        KeyCode::Enter => {
            if app.can_send() {
                app.send_message();
            }
        }

        // Transcript scrolling
        KeyCode::PageUp => app.scroll_chat_up(PAGE),
        KeyCode::PageDown => app.scroll_chat_down(PAGE),
        KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Down => app.scroll_chat_down(1),

        _ => {
            // Typing ahead is allowed; only sending is gated
            edit_input(&mut app.chat_input, key);
        }
    }
}

/// Apply a line-editing key to `input`. Returns whether the key was used.
fn edit_input(input: &mut TextInput, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('a') => {
                input.home();
                true
            }
            KeyCode::Char('e') => {
                input.end();
                true
            }
            KeyCode::Char('u') => {
                input.clear();
                true
            }
            _ => false,
        };
    }

    match key.code {
        KeyCode::Char(c) => input.insert(c),
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        _ => return false,
    }
    true
}

fn handle_paste(app: &mut App, text: &str) {
    match app.screen {
        Screen::Login => app.focused_input().insert_str(text),
        Screen::Chat => app.chat_input.insert_str(text),
        Screen::Landing => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.screen != Screen::Chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_chat_down(3),
        MouseEventKind::ScrollUp => app.scroll_chat_up(3),
        _ => {}
    }
}
