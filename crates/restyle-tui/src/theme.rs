//! Applies the model-written stylesheet to the terminal view.
//!
//! Only a handful of properties mean anything in a terminal: `color`,
//! `background`/`background-color` and `border-color`. Selectors are
//! ignored and the last declaration of each property wins, the same way a
//! later rule overrides an earlier one of equal specificity.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use ratatui::style::{Color, Style};
use regex::Regex;
use restyle_core::StyleSink;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Theme {
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub border: Option<Color>,
}

fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[\s{;])(background-color|background|border-color|color)\s*:\s*([^;}]+)")
            .expect("declaration regex is valid")
    })
}

impl Theme {
    pub fn from_css(css: &str) -> Self {
        let mut theme = Theme::default();

        for caps in declaration_regex().captures_iter(css) {
            let Some(color) = parse_color(&caps[2]) else {
                debug!(value = &caps[2], "unsupported color value");
                continue;
            };
            match caps[1].to_ascii_lowercase().as_str() {
                "color" => theme.fg = Some(color),
                "background" | "background-color" => theme.bg = Some(color),
                "border-color" => theme.border = Some(color),
                _ => {}
            }
        }

        theme
    }

    /// Style for the transcript body.
    pub fn text_style(&self) -> Style {
        let mut style = Style::default();
        if let Some(fg) = self.fg {
            style = style.fg(fg);
        }
        if let Some(bg) = self.bg {
            style = style.bg(bg);
        }
        style
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.border.unwrap_or(Color::DarkGray))
    }
}

/// First color found in a declaration value, e.g. `#0f0`, `rgb(0, 255, 0)`,
/// or a named color. Shorthand values like `#000 url(x.png)` work too.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim().trim_end_matches("!important").trim();
    let lower = value.to_ascii_lowercase();

    if let Some(args) = lower
        .strip_prefix("rgb(")
        .or_else(|| lower.strip_prefix("rgba("))
    {
        let args = args.split(')').next()?;
        let parts: Vec<u8> = args
            .split([',', ' ', '/'])
            .filter(|p| !p.is_empty())
            .take(3)
            .map(|p| p.trim().parse::<u8>().ok())
            .collect::<Option<_>>()?;
        if let [r, g, b] = parts[..] {
            return Some(Color::Rgb(r, g, b));
        }
        return None;
    }

    lower.split_whitespace().find_map(parse_token)
}

fn parse_token(token: &str) -> Option<Color> {
    if let Some(hex) = token.strip_prefix('#') {
        return parse_hex(hex);
    }

    let color = match token {
        "black" => Color::Black,
        "red" | "darkred" | "maroon" => Color::Red,
        "green" | "darkgreen" | "lime" => Color::Green,
        "yellow" | "gold" | "orange" => Color::Yellow,
        "blue" | "navy" | "darkblue" => Color::Blue,
        "magenta" | "fuchsia" | "purple" | "violet" | "pink" => Color::Magenta,
        "cyan" | "aqua" | "teal" | "turquoise" => Color::Cyan,
        "white" => Color::White,
        "gray" | "grey" | "silver" | "lightgray" | "lightgrey" => Color::Gray,
        "darkgray" | "darkgrey" | "dimgray" => Color::DarkGray,
        "lightred" | "salmon" | "coral" | "tomato" => Color::LightRed,
        "lightgreen" | "limegreen" => Color::LightGreen,
        "lightyellow" => Color::LightYellow,
        "lightblue" | "skyblue" => Color::LightBlue,
        "lightcyan" => Color::LightCyan,
        "transparent" | "inherit" | "initial" => Color::Reset,
        _ => return None,
    };
    Some(color)
}

fn parse_hex(hex: &str) -> Option<Color> {
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 | 4 => {
            let mut digits = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
            Some(Color::Rgb(digits.next()??, digits.next()??, digits.next()??))
        }
        6 | 8 => Some(Color::Rgb(
            channel(hex.get(0..2)?)?,
            channel(hex.get(2..4)?)?,
            channel(hex.get(4..6)?)?,
        )),
        _ => None,
    }
}

/// `StyleSink` that keeps the current theme and optionally mirrors the raw
/// stylesheet to a file.
#[derive(Debug, Default)]
pub struct ThemeSink {
    css: String,
    theme: Theme,
    export_path: Option<PathBuf>,
}

impl ThemeSink {
    pub fn new(export_path: Option<PathBuf>) -> Self {
        Self {
            export_path,
            ..Self::default()
        }
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    fn export(&self) {
        let Some(path) = &self.export_path else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(error = %e, path = %parent.display(), "could not create style export dir");
                return;
            }
        }
        if let Err(e) = fs::write(path, &self.css) {
            warn!(error = %e, path = %path.display(), "could not export stylesheet");
        }
    }
}

impl StyleSink for ThemeSink {
    fn replace_style(&mut self, css: &str) {
        if css == self.css {
            return;
        }
        self.css = css.to_string();
        self.theme = Theme::from_css(css);
        self.export();
    }
}
