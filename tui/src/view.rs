use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Widget, Wrap},
    Frame,
};
use slide_core::{Controls, EditBuffer, NarrationState, SlideView};
use unicode_width::UnicodeWidthStr;

use crate::app::{App, Field, Mode};

pub fn ui(f: &mut Frame, app: &App) {
    let view = app.presenter().view();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(7),
            Constraint::Length(3),
        ])
        .split(f.area());
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(rows[0]);

    f.render_widget(slide_panel(&view), top[0]);
    f.render_widget(notes_panel(&view), top[1]);
    f.render_widget(activity_panel(app.log(), rows[1].height), rows[1]);

    let mode = match app.mode() {
        Mode::Present => "PRESENT",
        Mode::Edit(_) => "EDIT",
        Mode::Chat => "CHAT",
    };
    let status = match app.mode() {
        Mode::Chat => format!("> {}", app.input()),
        _ => app.status().to_string(),
    };
    StatusBar::new(mode, &status, &hints(app.mode(), view.controls)).render(rows[2], f.buffer_mut());

    if let (Some(buffer), Mode::Edit(field)) = (&view.editor, app.mode()) {
        let area = centered(f.area(), 70, 70);
        f.render_widget(Clear, area);
        render_editor(f, area, buffer, field);
    }
}

fn slide_panel(view: &SlideView) -> Paragraph<'static> {
    let mut title = format!(" Slide {} of {} ", view.index + 1, view.len);
    if let Some(kind) = view.busy {
        title.push_str(&format!("· {kind} running "));
    }
    Paragraph::new(markdown_lines(&view.slide.content))
        .block(Block::default().title(title).borders(Borders::ALL))
        .wrap(Wrap { trim: false })
}

/// Headings bold, bullets dotted, everything else verbatim.
fn markdown_lines(content: &str) -> Text<'static> {
    let lines: Vec<Line<'static>> = content
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if let Some(heading) = trimmed.strip_prefix('#') {
                Line::from(Span::styled(
                    heading.trim_start_matches('#').trim().to_string(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))
            } else if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
                Line::from(format!("  • {item}"))
            } else {
                Line::from(line.to_string())
            }
        })
        .collect();
    Text::from(lines)
}

fn notes_panel(view: &SlideView) -> Paragraph<'static> {
    let mut lines = vec![
        Line::from(Span::styled("Notes", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(view.slide.notes.clone()),
        Line::from(""),
        Line::from(Span::styled("Background", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(view.slide.background_query.clone()),
    ];
    if let Some(url) = &view.background {
        lines.push(Line::from(Span::styled(
            url.to_string(),
            Style::default().fg(Color::DarkGray),
        )));
    }
    if let NarrationState::Playing { text } = &view.narration {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("🔊 {text}"),
            Style::default().fg(Color::Green),
        )));
    }
    Paragraph::new(lines)
        .block(Block::default().title(" Speaker ").borders(Borders::ALL))
        .wrap(Wrap { trim: true })
}

fn activity_panel(log: &[String], height: u16) -> List<'static> {
    let visible = usize::from(height.saturating_sub(2));
    let start = log.len().saturating_sub(visible);
    let items: Vec<ListItem> = log[start..]
        .iter()
        .map(|line| ListItem::new(line.clone()))
        .collect();
    List::new(items).block(Block::default().title(" Activity ").borders(Borders::ALL))
}

fn render_editor(f: &mut Frame, area: Rect, buffer: &EditBuffer, active: Field) {
    let block = Block::default()
        .title(" Edit slide (Tab: next field, Ctrl+S: save, Esc: cancel) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(4),
            Constraint::Length(3),
            Constraint::Length(5),
        ])
        .split(inner);
    let fields = [
        (Field::Content, &buffer.content),
        (Field::Background, &buffer.background_query),
        (Field::Notes, &buffer.notes),
    ];
    for ((field, value), part) in fields.into_iter().zip(parts.iter()) {
        let style = if field == active {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };
        let mut text = value.clone();
        if field == active {
            text.push('▏');
        }
        f.render_widget(
            Paragraph::new(text)
                .block(Block::default().title(field.label()).borders(Borders::ALL).border_style(style))
                .wrap(Wrap { trim: false }),
            *part,
        );
    }
}

fn hints(mode: Mode, controls: Controls) -> String {
    match mode {
        Mode::Present => {
            let keys = [
                (controls.previous, "←"),
                (controls.next, "→"),
                (controls.add, "a add"),
                (controls.generate, "g generate"),
                (controls.delete, "d delete"),
                (controls.narrate, "s speak"),
                (controls.edit, "e edit"),
                (controls.chat, "c chat"),
            ];
            let mut enabled: Vec<&str> = keys
                .iter()
                .filter(|(on, _)| *on)
                .map(|(_, label)| *label)
                .collect();
            enabled.push("q quit");
            enabled.join("  ")
        }
        Mode::Edit(_) => "Tab field  Ctrl+S save  Esc cancel".to_string(),
        Mode::Chat => "Enter send  Esc back".to_string(),
    }
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let width = area.width * percent_x / 100;
    let height = area.height * percent_y / 100;
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

pub struct StatusBar<'a> {
    mode: &'a str,
    status: &'a str,
    hints: &'a str,
}

impl<'a> StatusBar<'a> {
    pub fn new(mode: &'a str, status: &'a str, hints: &'a str) -> Self {
        Self { mode, status, hints }
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut ratatui::buffer::Buffer) {
        let room = usize::from(area.width.saturating_sub(4));
        let used = self.mode.width() + 2 + self.status.width() + 5;
        let hints = if used + self.hints.width() > room {
            ""
        } else {
            self.hints
        };
        let line = Line::from(vec![
            Span::styled(
                format!(" {} ", self.mode),
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(self.status.to_string(), Style::default().fg(Color::Yellow)),
            Span::raw("  |  "),
            Span::styled(hints.to_string(), Style::default().fg(Color::Gray)),
        ]);
        Paragraph::new(line)
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Left)
            .render(area, buf);
    }
}
