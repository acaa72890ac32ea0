use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use restyle_core::Key;

use crate::app::App;
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Keys owned by the front end
    match key.code {
        KeyCode::Esc => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('d') if ctrl => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('s') if ctrl => {
            app.show_stylesheet = !app.show_stylesheet;
            return;
        }
        KeyCode::PageUp => {
            app.scroll_page_up();
            return;
        }
        KeyCode::PageDown => {
            app.scroll_page_down();
            return;
        }
        _ => {}
    }

    // Typing snaps the view back to the prompt
    app.follow();
    app.controller.handle_key(to_key(key));
}

/// Map a crossterm key press to the controller's key vocabulary.
pub fn to_key(key: KeyEvent) -> Key {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => Key::Interrupt,
        KeyCode::Char(_) if ctrl || key.modifiers.contains(KeyModifiers::ALT) => Key::Other,
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Backspace => Key::Backspace,
        _ => Key::Other,
    }
}
