use ratatui::{
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use restyle_core::Phase;

use crate::app::App;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area);

    if app.show_stylesheet {
        let [transcript_area, style_area] = Layout::horizontal([
            Constraint::Percentage(65),
            Constraint::Percentage(35),
        ])
        .areas(body_area);
        render_transcript(app, frame, transcript_area);
        render_stylesheet(app, frame, style_area);
    } else {
        render_transcript(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" restyle ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            "ask the model to change how this terminal looks",
            Style::default().fg(Color::Gray),
        ),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let theme = app.controller.style_sink().theme();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border_style())
        .title(" Terminal ");
    let inner = block.inner(area);

    // Store height for page scrolling
    app.transcript_height = inner.height;

    let transcript = app.controller.terminal();
    let height = inner.height as usize;
    let total = transcript.line_count();
    let bottom = total.saturating_sub(app.scroll_back as usize);
    let top = bottom.saturating_sub(height);

    let lines: Vec<Line> = transcript
        .lines()
        .skip(top)
        .take(bottom - top)
        .map(Line::from)
        .collect();

    let paragraph = Paragraph::new(Text::from(lines))
        .style(theme.text_style())
        .block(block);
    frame.render_widget(paragraph, area);

    // Show the cursor only when following the live end
    let (row, col) = transcript.cursor();
    if app.scroll_back == 0 && row >= top && row < bottom {
        let x = inner.x.saturating_add(col.min(inner.width.saturating_sub(1) as usize) as u16);
        let y = inner.y + (row - top) as u16;
        frame.set_cursor_position(Position::new(x, y));
    }
}

fn render_stylesheet(app: &App, frame: &mut Frame, area: Rect) {
    let css = app.controller.stylesheet();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Stylesheet ");

    let text = if css.is_empty() {
        Text::from(Span::styled(
            "No CSS yet. Try \"make the background navy\".",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(css.lines().map(Line::from).collect::<Vec<_>>())
    };

    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(Color::Green))
        .wrap(Wrap { trim: false })
        .block(block);
    frame.render_widget(paragraph, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let status = app.controller.status();

    let status_style = match status.phase() {
        Phase::Ready => Style::default().bg(Color::Green).fg(Color::Black),
        Phase::Generating => Style::default().bg(Color::Yellow).fg(Color::Black),
        Phase::Error => Style::default().bg(Color::Red).fg(Color::White),
        Phase::Initializing | Phase::Downloading(_) => {
            Style::default().bg(Color::Blue).fg(Color::White)
        }
    };

    let mut label = format!(" {} ", status.label());
    if matches!(status.phase(), Phase::Generating | Phase::Initializing) {
        label.push_str(&".".repeat(app.animation_frame as usize + 1));
        label.push(' ');
    }

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![
        Span::styled(label, status_style.add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {} ", status.model_name()), label_style),
    ];
    if status.interruptable() {
        spans.extend([
            Span::styled(" ^C ", key_style),
            Span::styled(" stop ", label_style),
        ]);
    }
    spans.extend([
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" ^S ", key_style),
        Span::styled(" css ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
