use restyle_core::{default_preamble, ChatController, Command, Config};
use tokio::sync::mpsc;

use crate::theme::ThemeSink;
use crate::transcript::Transcript;

pub type Controller = ChatController<Transcript, ThemeSink>;

pub struct App {
    pub should_quit: bool,
    pub controller: Controller,

    // Transcript viewport
    /// Lines scrolled up from the bottom; 0 follows the cursor.
    pub scroll_back: u16,
    pub transcript_height: u16,

    /// Shows or hides the stylesheet panel.
    pub show_stylesheet: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for the busy indicator
}

impl App {
    pub fn new(config: &Config, commands: mpsc::UnboundedSender<Command>) -> Self {
        let controller = ChatController::new(
            commands,
            Transcript::new(),
            ThemeSink::new(config.style_export_path.clone()),
            &config.model_name,
            default_preamble(config.system_prompt.as_deref()),
            config.style_order,
        );

        Self {
            should_quit: false,
            controller,
            scroll_back: 0,
            transcript_height: 0,
            show_stylesheet: true,
            animation_frame: 0,
        }
    }

    pub fn tick_animation(&mut self) {
        self.animation_frame = (self.animation_frame + 1) % 3;
    }

    pub fn scroll_page_up(&mut self) {
        let page = self.transcript_height.max(1);
        let max = self.max_scroll_back();
        self.scroll_back = self.scroll_back.saturating_add(page).min(max);
    }

    pub fn scroll_page_down(&mut self) {
        let page = self.transcript_height.max(1);
        self.scroll_back = self.scroll_back.saturating_sub(page);
    }

    /// Jump back to the live end of the transcript.
    pub fn follow(&mut self) {
        self.scroll_back = 0;
    }

    fn max_scroll_back(&self) -> u16 {
        let total = self.controller.terminal().line_count();
        let height = self.transcript_height as usize;
        total.saturating_sub(height).min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restyle_core::TerminalSurface;

    fn app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(&Config::default(), tx)
    }

    #[test]
    fn test_scroll_is_clamped() {
        let mut app = app();
        app.transcript_height = 10;
        for i in 0..25 {
            app.controller.terminal_mut().write(&format!("line {i}\r\n"));
        }

        app.scroll_page_up();
        assert_eq!(app.scroll_back, 10);
        app.scroll_page_up();
        assert_eq!(app.scroll_back, 16);
        app.scroll_page_down();
        assert_eq!(app.scroll_back, 6);
        app.follow();
        assert_eq!(app.scroll_back, 0);
    }

    #[test]
    fn test_animation_cycles() {
        let mut app = app();
        for _ in 0..4 {
            app.tick_animation();
        }
        assert_eq!(app.animation_frame, 1);
    }
}
